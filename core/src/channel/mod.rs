// Channels: named group contexts with optional password protection

pub mod cipher;
pub mod keys;
pub mod manager;

pub use cipher::{ChannelCipher, CipherError};
pub use keys::{
    ChannelKey, KeyCommitment, KeyDerivation, Pbkdf2KeyDerivation, CHANNEL_KEY_SIZE,
    DEFAULT_PBKDF2_ITERATIONS,
};
pub use manager::{
    is_valid_channel_name, key_store_name, ChannelInfo, ChannelManager, ReceiveOutcome,
};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Invalid channel name: {0}")]
    InvalidChannelName(String),
    #[error("{peer_id} is not the owner of {channel}")]
    Unauthorized { channel: String, peer_id: String },
    #[error("Password verification failed for {0}")]
    AuthenticationFailure(String),
    #[error("Unknown channel: {0}")]
    NotFound(String),
}
