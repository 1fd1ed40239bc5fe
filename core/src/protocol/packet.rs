/// Packet and peer identifier types

use super::{WireError, DEFAULT_TTL, PEER_ID_SIZE, PROTOCOL_VERSION, SIGNATURE_SIZE};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 8-byte peer identifier. All zeros addresses every peer (broadcast).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId([u8; PEER_ID_SIZE]);

impl PeerId {
    /// Broadcast address
    pub const BROADCAST: PeerId = PeerId([0u8; PEER_ID_SIZE]);

    pub const fn new(bytes: [u8; PEER_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build a peer id from arbitrary bytes.
    ///
    /// Short input is zero-padded, long input is truncated. Never fails.
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut id = [0u8; PEER_ID_SIZE];
        let len = bytes.len().min(PEER_ID_SIZE);
        id[..len].copy_from_slice(&bytes[..len]);
        Self(id)
    }

    pub fn as_bytes(&self) -> &[u8; PEER_ID_SIZE] {
        &self.0
    }

    pub fn is_broadcast(&self) -> bool {
        self.0 == [0u8; PEER_ID_SIZE]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; PEER_ID_SIZE]> for PeerId {
    fn from(bytes: [u8; PEER_ID_SIZE]) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for PeerId {
    fn from(bytes: &[u8]) -> Self {
        Self::from_slice(bytes)
    }
}

impl From<&str> for PeerId {
    fn from(value: &str) -> Self {
        Self::from_slice(value.as_bytes())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.to_hex())
    }
}

/// Packet type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PacketType {
    /// Plain chat payload (0x00)
    Data = 0x00,
    /// First slice of an oversize packet (0x01)
    FragmentStart = 0x01,
    /// Interior slice (0x02)
    FragmentContinue = 0x02,
    /// Terminal marker; completes reassembly (0x03)
    FragmentEnd = 0x03,
    /// Chat payload addressed to a password-protected channel (0x04)
    EncryptedChannel = 0x04,
}

impl PacketType {
    /// Convert from u8 to PacketType
    pub fn from_u8(value: u8) -> Result<Self, WireError> {
        match value {
            0x00 => Ok(PacketType::Data),
            0x01 => Ok(PacketType::FragmentStart),
            0x02 => Ok(PacketType::FragmentContinue),
            0x03 => Ok(PacketType::FragmentEnd),
            0x04 => Ok(PacketType::EncryptedChannel),
            other => Err(WireError::InvalidPacketType(other)),
        }
    }

    /// Convert to u8
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn is_fragment(&self) -> bool {
        matches!(
            self,
            PacketType::FragmentStart | PacketType::FragmentContinue | PacketType::FragmentEnd
        )
    }
}

/// A logical mesh packet.
///
/// Packets are built by the sender, framed by `WireCodec`, and rebuilt on
/// the receiving side. Fragmented packets only exist as reassembly state
/// between the first and the terminal frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub version: u8,
    pub packet_type: PacketType,
    pub sender_id: PeerId,
    /// `PeerId::BROADCAST` for channel and public traffic
    pub recipient_id: PeerId,
    /// Milliseconds since the unix epoch
    pub timestamp: u64,
    /// Remaining hop budget
    pub ttl: u8,
    pub payload: Vec<u8>,
    pub signature: Option<[u8; SIGNATURE_SIZE]>,
}

impl Packet {
    /// Create a packet stamped with the current time and the default hop budget
    pub fn new(
        packet_type: PacketType,
        sender_id: PeerId,
        recipient_id: PeerId,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            packet_type,
            sender_id,
            recipient_id,
            timestamp: crate::current_timestamp_millis(),
            ttl: DEFAULT_TTL,
            payload,
            signature: None,
        }
    }

    pub fn with_ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_broadcast(&self) -> bool {
        self.recipient_id.is_broadcast()
    }

    /// Stable identity used for seen-packet suppression.
    ///
    /// Excludes ttl and type, which change as the packet is relayed and
    /// fragmented: sender(8) | timestamp(8) | blake3(payload)[..8].
    pub fn identity(&self) -> Vec<u8> {
        let digest = blake3::hash(&self.payload);
        let mut id = Vec::with_capacity(PEER_ID_SIZE + 16);
        id.extend_from_slice(self.sender_id.as_bytes());
        id.extend_from_slice(&self.timestamp.to_be_bytes());
        id.extend_from_slice(&digest.as_bytes()[..8]);
        id
    }
}
