//! Transport seam for the broadcast radio
//!
//! The core never touches radio APIs. A host supplies a `Transport` that
//! advertises, scans and sends opaque frames, and feeds arriving frames back
//! through `MeshCore::on_frame_received`.

pub mod loopback;

pub use loopback::LoopbackTransport;

use crate::protocol::PeerId;
use thiserror::Error;

/// Outbound side of the radio
pub trait Transport: Send + Sync {
    /// Begin advertising as `local_peer`
    fn start_advertising(&self, local_peer: PeerId) -> Result<(), TransportError>;

    /// Peers currently visible
    fn scan_peers(&self) -> Result<Vec<PeerId>, TransportError>;

    /// Broadcast one frame, at most one chunk plus header and signature
    fn send_frame(&self, frame: &[u8]) -> Result<(), TransportError>;
}

/// Errors that can occur in the transport layer
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Transport not available: {0}")]
    NotAvailable(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Scan failed: {0}")]
    ScanFailed(String),
}
