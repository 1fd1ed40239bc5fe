//! In-process transport that records frames instead of transmitting them
//!
//! Useful for wiring two cores together in tests and for hosts that want to
//! drive the radio themselves by draining the outbox.

use super::{Transport, TransportError};
use crate::protocol::PeerId;
use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct LoopbackTransport {
    sent: Mutex<Vec<Vec<u8>>>,
    visible: Mutex<Vec<PeerId>>,
    advertising: Mutex<Option<PeerId>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a peer show up in `scan_peers`
    pub fn add_visible_peer(&self, peer: PeerId) {
        let mut visible = self.visible.lock();
        if !visible.contains(&peer) {
            visible.push(peer);
        }
    }

    pub fn remove_visible_peer(&self, peer: &PeerId) {
        self.visible.lock().retain(|p| p != peer);
    }

    /// Id passed to the last `start_advertising`
    pub fn advertised_as(&self) -> Option<PeerId> {
        *self.advertising.lock()
    }

    /// Remove and return every frame sent so far, oldest first
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl Transport for LoopbackTransport {
    fn start_advertising(&self, local_peer: PeerId) -> Result<(), TransportError> {
        *self.advertising.lock() = Some(local_peer);
        Ok(())
    }

    fn scan_peers(&self) -> Result<Vec<PeerId>, TransportError> {
        Ok(self.visible.lock().clone())
    }

    fn send_frame(&self, frame: &[u8]) -> Result<(), TransportError> {
        self.sent.lock().push(frame.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_frames() {
        let transport = LoopbackTransport::new();
        transport.send_frame(b"one").unwrap();
        transport.send_frame(b"two").unwrap();
        assert_eq!(transport.sent_count(), 2);
        assert_eq!(transport.take_sent(), vec![b"one".to_vec(), b"two".to_vec()]);
        assert_eq!(transport.sent_count(), 0);
    }

    #[test]
    fn test_visible_peers() {
        let transport = LoopbackTransport::new();
        let peer = PeerId::from("peer0001");
        transport.add_visible_peer(peer);
        transport.add_visible_peer(peer);
        assert_eq!(transport.scan_peers().unwrap(), vec![peer]);
        transport.remove_visible_peer(&peer);
        assert!(transport.scan_peers().unwrap().is_empty());
    }

    #[test]
    fn test_advertising() {
        let transport = LoopbackTransport::new();
        assert_eq!(transport.advertised_as(), None);
        transport.start_advertising(PeerId::from("me")).unwrap();
        assert_eq!(transport.advertised_as(), Some(PeerId::from("me")));
    }
}
