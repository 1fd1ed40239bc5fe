// Message module: chat message types and the payload codec

pub mod codec;
pub mod types;

pub use codec::{decode_message, encode_message, MessageCodec, DEFAULT_BLOCK_SIZE};
pub use types::{extract_mentions, ChatMessage, DeliveryAck, DeliveryStatus, ReadReceipt};

use crate::privacy::PaddingError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("Message too short: need at least {need} bytes, got {got}")]
    TooShort { need: usize, got: usize },
    #[error("Field {field} truncated: need {need} bytes, {remaining} remaining")]
    Truncated {
        field: &'static str,
        need: usize,
        remaining: usize,
    },
    #[error("Field {field} too long to encode: {len} bytes")]
    FieldTooLong { field: &'static str, len: usize },
    #[error("Field {0} is not valid UTF-8")]
    InvalidUtf8(&'static str),
    #[error("Unknown delivery status: {0}")]
    UnknownStatus(String),
    #[error(transparent)]
    Padding(#[from] PaddingError),
}
