//! Wire protocol: binary packet framing for the BLE broadcast mesh
//!
//! This module provides:
//! - Packet: routing envelope (sender, recipient, timestamp, ttl, payload, signature)
//! - WireCodec: fixed 29-byte big-endian header, fragmentation of oversize payloads
//! - ReassemblyBuffer: bounded, age-limited buffering of in-flight fragments
//! - Packet signing: optional Ed25519 signature carried in the trailing 64 bytes
//!
//! Frame layout:
//! [1] version | [1] type | [8] sender | [8] recipient | [8] timestamp (ms)
//! [1] ttl | [2] payload length | [N] payload | [64] optional signature

pub mod codec;
pub mod packet;
pub mod reassembly;
pub mod signing;

pub use codec::{WireCodec, WireConfig};
pub use packet::{Packet, PacketType, PeerId};
pub use reassembly::{FragmentKey, ReassemblyBuffer, ReassemblyConfig};

use thiserror::Error;

/// Wire protocol errors
///
/// Decoding never panics; every malformed frame maps to one of these.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("Buffer too short: need {need} bytes, got {got}")]
    BufferTooShort { need: usize, got: usize },

    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("Invalid packet type: {0}")]
    InvalidPacketType(u8),

    #[error("Payload too large: {0} bytes (max {MAX})", MAX = MAX_PAYLOAD_SIZE)]
    PayloadTooLarge(usize),

    #[error("Invalid fragment chunk size: {0}")]
    InvalidChunkSize(usize),

    #[error("Reassembly buffer overflow for {0}")]
    ReassemblyOverflow(String),

    #[error("Packet carries no signature")]
    MissingSignature,

    #[error("Signature verification failed")]
    BadSignature,
}

/// Current wire protocol version
pub const PROTOCOL_VERSION: u8 = 0x01;

/// version(1) + type(1) + sender(8) + recipient(8) + timestamp(8) + ttl(1) + payload length(2)
pub const HEADER_SIZE: usize = 29;

/// Peer identifiers are always exactly 8 bytes on the wire
pub const PEER_ID_SIZE: usize = 8;

/// Ed25519 signature size
pub const SIGNATURE_SIZE: usize = 64;

/// Payload length is a u16 on the wire
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Payloads above this size are split into fragments
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Hop budget given to freshly originated packets
pub const DEFAULT_TTL: u8 = 5;
