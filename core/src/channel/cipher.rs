// Channel cipher seam
//
// Key derivation and commitment checks live in this crate; the content
// cipher for protected channels is supplied by the host.

use super::keys::ChannelKey;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("Encryption failed: {0}")]
    Encrypt(String),
    #[error("Decryption failed: {0}")]
    Decrypt(String),
}

/// Symmetric cipher keyed by a channel key
pub trait ChannelCipher: Send + Sync {
    fn encrypt(&self, key: &ChannelKey, plaintext: &[u8]) -> Result<Vec<u8>, CipherError>;
    fn decrypt(&self, key: &ChannelKey, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError>;
}
