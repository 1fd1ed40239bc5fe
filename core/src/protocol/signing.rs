// Packet signatures: Ed25519 over the hop-invariant parts of a packet
//
// Relays rewrite ttl on every hop and fragmentation rewrites the type byte,
// so neither is covered. Signed bytes:
//   version(1) | sender(8) | recipient(8) | timestamp(8) | payload(N)

use super::{Packet, WireError};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

impl Packet {
    /// Canonical bytes covered by the packet signature
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(25 + self.payload.len());
        bytes.push(self.version);
        bytes.extend_from_slice(self.sender_id.as_bytes());
        bytes.extend_from_slice(self.recipient_id.as_bytes());
        bytes.extend_from_slice(&self.timestamp.to_be_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Sign the packet in place
    pub fn sign(&mut self, signing_key: &SigningKey) {
        let signature = signing_key.sign(&self.signing_bytes());
        self.signature = Some(signature.to_bytes());
    }

    /// Verify the carried signature against the sender's public key
    pub fn verify(&self, verifying_key: &VerifyingKey) -> Result<(), WireError> {
        let signature = self.signature.ok_or(WireError::MissingSignature)?;
        verifying_key
            .verify(&self.signing_bytes(), &Signature::from_bytes(&signature))
            .map_err(|_| WireError::BadSignature)
    }
}
