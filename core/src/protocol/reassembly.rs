/// Fragment reassembly with bounded capacity and age-based expiry
///
/// Buffers are keyed by (sender, timestamp). A buffer lives until its
/// FRAGMENT_END arrives, it goes quiet for longer than the timeout, or it is
/// pushed out by newer buffers once `max_pending` is reached. Only a
/// FRAGMENT_START opens a buffer, so slices of a dropped packet are discarded
/// rather than reassembled into a truncated one.

use super::{PeerId, WireError, MAX_PAYLOAD_SIZE};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default number of packets that may be mid-reassembly at once
pub const DEFAULT_MAX_PENDING: usize = 64;

/// Default idle time after which a partial packet is discarded
pub const DEFAULT_REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Identifies the packet a fragment belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FragmentKey {
    pub sender_id: PeerId,
    pub timestamp: u64,
}

impl fmt::Display for FragmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.sender_id, self.timestamp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblyConfig {
    pub max_pending: usize,
    pub timeout: Duration,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            max_pending: DEFAULT_MAX_PENDING,
            timeout: DEFAULT_REASSEMBLY_TIMEOUT,
        }
    }
}

#[derive(Debug)]
struct PendingPacket {
    data: Vec<u8>,
    first_seen: Instant,
    last_seen: Instant,
    fragments: usize,
}

/// Partial packets awaiting their terminal fragment
#[derive(Debug)]
pub struct ReassemblyBuffer {
    config: ReassemblyConfig,
    pending: HashMap<FragmentKey, PendingPacket>,
}

impl ReassemblyBuffer {
    pub fn new(config: ReassemblyConfig) -> Self {
        Self {
            config,
            pending: HashMap::new(),
        }
    }

    pub fn config(&self) -> &ReassemblyConfig {
        &self.config
    }

    /// Number of packets currently mid-reassembly
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Open a buffer with a FRAGMENT_START slice.
    ///
    /// A repeated START for the same key restarts that buffer. At capacity
    /// the oldest buffer is evicted to make room.
    pub fn start(&mut self, key: FragmentKey, chunk: &[u8], now: Instant) -> Result<(), WireError> {
        if chunk.len() > MAX_PAYLOAD_SIZE {
            return Err(WireError::ReassemblyOverflow(key.to_string()));
        }
        if self.pending.remove(&key).is_some() {
            debug!("Restarting reassembly for {}", key);
        } else if self.pending.len() >= self.config.max_pending {
            self.evict_oldest();
        }

        self.pending.insert(
            key,
            PendingPacket {
                data: chunk.to_vec(),
                first_seen: now,
                last_seen: now,
                fragments: 1,
            },
        );
        Ok(())
    }

    /// Append a FRAGMENT_CONTINUE slice.
    ///
    /// Returns false if no START is buffered for the key (never seen,
    /// evicted or expired); the slice is dropped. Fails with
    /// `ReassemblyOverflow` (and drops the partial packet) if the
    /// accumulated bytes would exceed the maximum payload size.
    pub fn append(&mut self, key: FragmentKey, chunk: &[u8], now: Instant) -> Result<bool, WireError> {
        let Some(pending) = self.pending.get_mut(&key) else {
            debug!("Dropping orphan fragment for {}", key);
            return Ok(false);
        };

        let total = pending.data.len() + chunk.len();
        if total > MAX_PAYLOAD_SIZE {
            self.pending.remove(&key);
            warn!(
                "Dropping reassembly for {}: {} bytes exceeds payload limit",
                key, total
            );
            return Err(WireError::ReassemblyOverflow(key.to_string()));
        }

        pending.data.extend_from_slice(chunk);
        pending.last_seen = now;
        pending.fragments += 1;
        Ok(true)
    }

    /// Consume the terminal slice and return the full payload.
    ///
    /// Returns `None` when no START is buffered for the key, so a tail whose
    /// head was evicted or expired is never passed off as a whole packet.
    pub fn complete(&mut self, key: FragmentKey, chunk: &[u8]) -> Result<Option<Vec<u8>>, WireError> {
        let Some(pending) = self.pending.remove(&key) else {
            debug!("Dropping terminal fragment without a start for {}", key);
            return Ok(None);
        };

        let mut data = pending.data;
        if data.len() + chunk.len() > MAX_PAYLOAD_SIZE {
            warn!("Dropping reassembly for {}: terminal fragment overflows", key);
            return Err(WireError::ReassemblyOverflow(key.to_string()));
        }

        data.extend_from_slice(chunk);
        debug!(
            "Reassembled {} bytes from {} fragments for {}",
            data.len(),
            pending.fragments + 1,
            key
        );
        Ok(Some(data))
    }

    /// Drop every partial packet that has been idle longer than the timeout.
    /// Returns how many were discarded.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let timeout = self.config.timeout;
        let before = self.pending.len();
        self.pending.retain(|key, pending| {
            let keep = now.saturating_duration_since(pending.last_seen) < timeout;
            if !keep {
                debug!(
                    "Expired partial packet {} ({} fragments, {} bytes)",
                    key,
                    pending.fragments,
                    pending.data.len()
                );
            }
            keep
        });
        before - self.pending.len()
    }

    /// Discard everything
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .pending
            .iter()
            .min_by_key(|(_, pending)| pending.first_seen)
            .map(|(key, _)| *key);

        if let Some(key) = oldest {
            self.pending.remove(&key);
            warn!("Reassembly capacity reached, evicted {}", key);
        }
    }
}

impl Default for ReassemblyBuffer {
    fn default() -> Self {
        Self::new(ReassemblyConfig::default())
    }
}
