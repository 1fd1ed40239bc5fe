// Message types: chat messages and the receipts that track them

use super::MessageError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Sender name used for locally generated channel events
pub const SYSTEM_SENDER: &str = "system";

/// Delivery status of a message.
///
/// Ordered: a status only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    /// Sent, no acknowledgment yet
    Pending,
    /// A zero-hop ack arrived from the recipient
    Delivered,
    /// The recipient reported reading it
    Read,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "PENDING",
            DeliveryStatus::Delivered => "DELIVERED",
            DeliveryStatus::Read => "READ",
        }
    }
}

impl Default for DeliveryStatus {
    fn default() -> Self {
        DeliveryStatus::Pending
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(DeliveryStatus::Pending),
            "DELIVERED" => Ok(DeliveryStatus::Delivered),
            "READ" => Ok(DeliveryStatus::Read),
            other => Err(MessageError::UnknownStatus(other.to_string())),
        }
    }
}

/// A chat message as seen by the application.
///
/// Everything except `delivery_status` is fixed once the message has been
/// built or decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub sender: String,
    pub content: String,
    /// Milliseconds since the unix epoch
    pub timestamp: f64,
    pub is_relay: bool,
    pub original_sender: Option<String>,
    pub is_private: bool,
    pub recipient_nickname: Option<String>,
    #[serde(rename = "senderPeerID")]
    pub sender_peer_id: String,
    pub mentions: Vec<String>,
    pub channel: Option<String>,
    pub encrypted_content: Option<Vec<u8>>,
    pub is_encrypted: bool,
    pub delivery_status: DeliveryStatus,
}

impl ChatMessage {
    /// Create a new outgoing text message
    pub fn text(
        sender: impl Into<String>,
        sender_peer_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let content = content.into();
        Self {
            id: Uuid::new_v4(),
            sender: sender.into(),
            mentions: extract_mentions(&content),
            content,
            timestamp: crate::current_timestamp_millis() as f64,
            is_relay: false,
            original_sender: None,
            is_private: false,
            recipient_nickname: None,
            sender_peer_id: sender_peer_id.into(),
            channel: None,
            encrypted_content: None,
            is_encrypted: false,
            delivery_status: DeliveryStatus::Pending,
        }
    }

    /// A locally generated channel event. System messages are born delivered.
    pub fn system(content: impl Into<String>) -> Self {
        let mut message = Self::text(SYSTEM_SENDER, SYSTEM_SENDER, content);
        message.mentions.clear();
        message.delivery_status = DeliveryStatus::Delivered;
        message
    }

    pub fn in_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn private_to(mut self, nickname: impl Into<String>) -> Self {
        self.is_private = true;
        self.recipient_nickname = Some(nickname.into());
        self
    }

    /// Mark as relayed on behalf of `original_sender`
    pub fn relayed_from(mut self, original_sender: impl Into<String>) -> Self {
        self.is_relay = true;
        self.original_sender = Some(original_sender.into());
        self
    }

    /// Attach channel ciphertext; the plaintext content is left empty
    pub fn with_ciphertext(mut self, ciphertext: Vec<u8>) -> Self {
        self.is_encrypted = true;
        self.content.clear();
        self.encrypted_content = Some(ciphertext);
        self
    }

    pub fn is_system(&self) -> bool {
        self.sender == SYSTEM_SENDER
    }
}

/// Collect `@name` tokens from message text, in order, without duplicates
pub fn extract_mentions(content: &str) -> Vec<String> {
    let mut mentions: Vec<String> = Vec::new();
    for word in content.split_whitespace() {
        let Some(name) = word.strip_prefix('@') else {
            continue;
        };
        let name: String = name
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if !name.is_empty() && !mentions.contains(&name) {
            mentions.push(name);
        }
    }
    mentions
}

/// Receipt asserting that a message reached a peer after `hop_count` hops
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAck {
    pub id: Uuid,
    #[serde(rename = "messageID")]
    pub message_id: String,
    #[serde(rename = "recipientID")]
    pub recipient_id: String,
    pub nickname: String,
    pub hop_count: u32,
    /// Milliseconds since the unix epoch
    pub timestamp: u64,
}

impl DeliveryAck {
    pub fn new(
        message_id: impl Into<String>,
        recipient_id: impl Into<String>,
        nickname: impl Into<String>,
        hop_count: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            message_id: message_id.into(),
            recipient_id: recipient_id.into(),
            nickname: nickname.into(),
            hop_count,
            timestamp: crate::current_timestamp_millis(),
        }
    }

    /// True when the ack came straight from the recipient
    pub fn is_direct(&self) -> bool {
        self.hop_count == 0
    }
}

/// Receipt asserting that the recipient has read a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    #[serde(rename = "messageID")]
    pub message_id: String,
    #[serde(rename = "readerID")]
    pub reader_id: String,
    /// Milliseconds since the unix epoch
    pub timestamp: u64,
}

impl ReadReceipt {
    pub fn new(message_id: impl Into<String>, reader_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            reader_id: reader_id.into(),
            timestamp: crate::current_timestamp_millis(),
        }
    }
}
