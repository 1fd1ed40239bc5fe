// Channel keys: password-derived 32-byte keys and their commitments

use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const CHANNEL_KEY_SIZE: usize = 32;

/// PBKDF2 work factor for channel passwords
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 100_000;

/// Symmetric channel key. Wiped from memory on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ChannelKey([u8; CHANNEL_KEY_SIZE]);

impl ChannelKey {
    pub fn from_bytes(bytes: [u8; CHANNEL_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CHANNEL_KEY_SIZE] {
        &self.0
    }

    /// One-way digest that lets peers check a key without revealing it
    pub fn commitment(&self) -> KeyCommitment {
        KeyCommitment(Sha256::digest(self.0).into())
    }
}

impl fmt::Debug for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChannelKey(<redacted>)")
    }
}

/// SHA-256 of a channel key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCommitment([u8; 32]);

impl KeyCommitment {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// True if `key` is the key this commitment was made from
    pub fn verify(&self, key: &ChannelKey) -> bool {
        key.commitment() == *self
    }
}

/// Turns a channel password into a key
pub trait KeyDerivation: Send + Sync {
    fn derive_key(&self, password: &str, salt: &[u8]) -> ChannelKey;
}

/// PBKDF2-HMAC-SHA256
#[derive(Debug, Clone, Copy)]
pub struct Pbkdf2KeyDerivation {
    iterations: u32,
}

impl Pbkdf2KeyDerivation {
    pub fn new() -> Self {
        Self::with_iterations(DEFAULT_PBKDF2_ITERATIONS)
    }

    /// Zero is bumped to one
    pub fn with_iterations(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}

impl Default for Pbkdf2KeyDerivation {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyDerivation for Pbkdf2KeyDerivation {
    fn derive_key(&self, password: &str, salt: &[u8]) -> ChannelKey {
        let mut key = [0u8; CHANNEL_KEY_SIZE];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, self.iterations, &mut key);
        let derived = ChannelKey(key);
        key.zeroize();
        derived
    }
}
