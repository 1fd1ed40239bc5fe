// Delivery tracker: per-message status and the acks that moved it
//
// Unknown ids degrade to defaults instead of failing: an untracked message
// reads as PENDING with no acks, and acks or receipts for it are dropped.

use crate::message::{DeliveryAck, DeliveryStatus, ReadReceipt};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct Tracked {
    status: DeliveryStatus,
    acks: Vec<DeliveryAck>,
}

/// Delivery state for outgoing messages
#[derive(Debug, Default)]
pub struct DeliveryTracker {
    messages: RwLock<HashMap<String, Tracked>>,
}

impl DeliveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or update) tracking with a status given as its wire name.
    ///
    /// Only `PENDING`, `DELIVERED` and `READ` are accepted; anything else is
    /// ignored. Returns whether the status was applied.
    pub fn track_message(&self, message_id: &str, status: &str) -> bool {
        match status.parse::<DeliveryStatus>() {
            Ok(status) => {
                self.track(message_id, status);
                true
            }
            Err(_) => {
                debug!("Ignoring unknown status {:?} for {}", status, message_id);
                false
            }
        }
    }

    /// Start (or update) tracking a message
    pub fn track(&self, message_id: &str, status: DeliveryStatus) {
        let mut messages = self.messages.write();
        messages.entry(message_id.to_string()).or_default().status = status;
        debug!("Tracking {} as {}", message_id, status);
    }

    /// Build an ack for a message we received
    pub fn generate_ack(
        &self,
        message_id: &str,
        recipient_id: &str,
        nickname: &str,
        hop_count: u32,
    ) -> DeliveryAck {
        DeliveryAck::new(message_id, recipient_id, nickname, hop_count)
    }

    /// Record an incoming ack.
    ///
    /// Returns the new status if this ack changed it, `None` otherwise
    /// (including for untracked messages, which are left alone). A direct
    /// ack marks the message DELIVERED unless it is already READ.
    pub fn process_ack(&self, ack: &DeliveryAck) -> Option<DeliveryStatus> {
        let mut messages = self.messages.write();
        let Some(tracked) = messages.get_mut(&ack.message_id) else {
            debug!("Ack for untracked message {}", ack.message_id);
            return None;
        };

        tracked.acks.push(ack.clone());
        if ack.is_direct() && tracked.status < DeliveryStatus::Delivered {
            tracked.status = DeliveryStatus::Delivered;
            info!("Message {} delivered to {}", ack.message_id, ack.nickname);
            return Some(DeliveryStatus::Delivered);
        }
        None
    }

    /// Record a read receipt. Returns true if the message moved to READ.
    pub fn process_read_receipt(&self, receipt: &ReadReceipt) -> bool {
        self.mark_read(&receipt.message_id)
    }

    /// Mark a tracked message READ. No-op for untracked or already-read ids.
    pub fn mark_read(&self, message_id: &str) -> bool {
        let mut messages = self.messages.write();
        match messages.get_mut(message_id) {
            Some(tracked) if tracked.status != DeliveryStatus::Read => {
                tracked.status = DeliveryStatus::Read;
                info!("Message {} read", message_id);
                true
            }
            _ => false,
        }
    }

    /// Current status; PENDING for untracked ids
    pub fn get_status(&self, message_id: &str) -> DeliveryStatus {
        self.messages
            .read()
            .get(message_id)
            .map(|tracked| tracked.status)
            .unwrap_or_default()
    }

    /// Copy of every ack recorded for a message
    pub fn get_acks(&self, message_id: &str) -> Vec<DeliveryAck> {
        self.messages
            .read()
            .get(message_id)
            .map(|tracked| tracked.acks.clone())
            .unwrap_or_default()
    }

    pub fn is_tracked(&self, message_id: &str) -> bool {
        self.messages.read().contains_key(message_id)
    }

    pub fn tracked_count(&self) -> usize {
        self.messages.read().len()
    }
}
