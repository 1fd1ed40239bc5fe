// Message codec: chat payload layout with padded content
//
// Layout (big-endian):
//   timestamp(8) | isRelay(1) | isPrivate(1) | isEncrypted(1) |
//   recipientNicknameLen(2) | recipientNickname |
//   senderPeerIDLen(2) | senderPeerID |
//   paddedContentLen(2) | paddedContent
//
// Absent strings encode as zero length. Content is constant-fill padded to
// a block multiple so message sizes leak only coarse length information.

use super::types::{extract_mentions, ChatMessage, DeliveryStatus};
use super::MessageError;
use crate::privacy::padding::{pkcs7_pad, pkcs7_unpad};
use uuid::Uuid;

/// Anything shorter cannot hold the fixed fields
pub const MIN_MESSAGE_SIZE: usize = 12;

/// Default content padding block
pub const DEFAULT_BLOCK_SIZE: usize = 256;

/// Chat payload encoder/decoder with a configurable padding block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageCodec {
    block_size: usize,
}

impl MessageCodec {
    /// Create a codec padding content to `block_size` (valid range 1..=256)
    pub fn new(block_size: usize) -> Result<Self, MessageError> {
        // Surface bad configuration here rather than on the first encode
        pkcs7_pad(&[], block_size)?;
        Ok(Self { block_size })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Serialize a message. Fails rather than truncating an oversize field.
    pub fn encode(&self, message: &ChatMessage) -> Result<Vec<u8>, MessageError> {
        let recipient = message.recipient_nickname.as_deref().unwrap_or_default();
        let padded = pkcs7_pad(message.content.as_bytes(), self.block_size)?;

        let mut out = Vec::with_capacity(
            MIN_MESSAGE_SIZE + 5 + recipient.len() + message.sender_peer_id.len() + padded.len(),
        );
        let timestamp = if message.timestamp.is_finite() {
            message.timestamp.max(0.0) as u64
        } else {
            0
        };
        out.extend_from_slice(&timestamp.to_be_bytes());
        out.push(message.is_relay as u8);
        out.push(message.is_private as u8);
        out.push(message.is_encrypted as u8);
        write_field(&mut out, "recipientNickname", recipient.as_bytes())?;
        write_field(&mut out, "senderPeerID", message.sender_peer_id.as_bytes())?;
        write_field(&mut out, "content", &padded)?;
        Ok(out)
    }

    /// Parse a message payload.
    ///
    /// The wire carries no message id, nickname or channel: the result has a
    /// nil id, uses the peer id as sender, and starts out PENDING.
    pub fn decode(&self, bytes: &[u8]) -> Result<ChatMessage, MessageError> {
        if bytes.len() < MIN_MESSAGE_SIZE {
            return Err(MessageError::TooShort {
                need: MIN_MESSAGE_SIZE,
                got: bytes.len(),
            });
        }

        let mut reader = Reader::new(bytes);
        let timestamp = reader.u64("timestamp")?;
        let is_relay = reader.u8("isRelay")? == 1;
        let is_private = reader.u8("isPrivate")? == 1;
        let is_encrypted = reader.u8("isEncrypted")? == 1;
        let recipient_nickname = reader.string("recipientNickname")?;
        let sender_peer_id = reader.string("senderPeerID")?;
        let padded = reader.field("content")?;
        let content = String::from_utf8(pkcs7_unpad(padded))
            .map_err(|_| MessageError::InvalidUtf8("content"))?;

        let sender_peer_id = sender_peer_id.unwrap_or_default();
        Ok(ChatMessage {
            id: Uuid::nil(),
            sender: sender_peer_id.clone(),
            mentions: extract_mentions(&content),
            content,
            timestamp: timestamp as f64,
            is_relay,
            original_sender: None,
            is_private,
            recipient_nickname,
            sender_peer_id,
            channel: None,
            encrypted_content: None,
            is_encrypted,
            delivery_status: DeliveryStatus::Pending,
        })
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

/// Encode with the default 256-byte padding block
pub fn encode_message(message: &ChatMessage) -> Result<Vec<u8>, MessageError> {
    MessageCodec::default().encode(message)
}

/// Decode a payload produced by `encode_message`
pub fn decode_message(bytes: &[u8]) -> Result<ChatMessage, MessageError> {
    MessageCodec::default().decode(bytes)
}

fn write_field(out: &mut Vec<u8>, field: &'static str, bytes: &[u8]) -> Result<(), MessageError> {
    let len = u16::try_from(bytes.len()).map_err(|_| MessageError::FieldTooLong {
        field,
        len: bytes.len(),
    })?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, field: &'static str, n: usize) -> Result<&'a [u8], MessageError> {
        let remaining = self.buf.len() - self.pos;
        if n > remaining {
            return Err(MessageError::Truncated {
                field,
                need: n,
                remaining,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, MessageError> {
        Ok(self.take(field, 1)?[0])
    }

    fn u16(&mut self, field: &'static str) -> Result<u16, MessageError> {
        let bytes = self.take(field, 2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u64(&mut self, field: &'static str) -> Result<u64, MessageError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(field, 8)?);
        Ok(u64::from_be_bytes(raw))
    }

    /// Length-prefixed byte field
    fn field(&mut self, field: &'static str) -> Result<&'a [u8], MessageError> {
        let len = self.u16(field)? as usize;
        self.take(field, len)
    }

    /// Length-prefixed UTF-8 string; zero length reads as absent
    fn string(&mut self, field: &'static str) -> Result<Option<String>, MessageError> {
        let bytes = self.field(field)?;
        if bytes.is_empty() {
            return Ok(None);
        }
        std::str::from_utf8(bytes)
            .map(|s| Some(s.to_string()))
            .map_err(|_| MessageError::InvalidUtf8(field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ChatMessage {
        let mut msg = ChatMessage::text("alice", "a1b2c3d4", "hello @bob");
        msg.timestamp = 1_700_000_000_123.0;
        msg
    }

    #[test]
    fn test_encode_layout() {
        let encoded = encode_message(&sample()).unwrap();

        assert_eq!(&encoded[..8], &1_700_000_000_123u64.to_be_bytes());
        assert_eq!(&encoded[8..11], &[0, 0, 0]);
        // No recipient nickname
        assert_eq!(&encoded[11..13], &[0, 0]);
        assert_eq!(&encoded[13..15], &[0, 8]);
        assert_eq!(&encoded[15..23], b"a1b2c3d4");
        assert_eq!(&encoded[23..25], &256u16.to_be_bytes());
        assert_eq!(encoded.len(), 25 + 256);
        assert_eq!(*encoded.last().unwrap(), (256 - 10) as u8);
    }

    #[test]
    fn test_round_trip() {
        let msg = sample().private_to("bob").relayed_from("carol");
        let decoded = decode_message(&encode_message(&msg).unwrap()).unwrap();

        assert_eq!(decoded.content, msg.content);
        assert_eq!(decoded.timestamp, msg.timestamp);
        assert!(decoded.is_relay);
        assert!(decoded.is_private);
        assert!(!decoded.is_encrypted);
        assert_eq!(decoded.recipient_nickname.as_deref(), Some("bob"));
        assert_eq!(decoded.sender_peer_id, "a1b2c3d4");
        assert_eq!(decoded.mentions, vec!["bob".to_string()]);
        assert_eq!(decoded.delivery_status, DeliveryStatus::Pending);
        // Not carried on the wire
        assert!(decoded.id.is_nil());
        assert!(decoded.original_sender.is_none());
    }

    #[test]
    fn test_empty_content() {
        let mut msg = sample();
        msg.content.clear();
        let encoded = encode_message(&msg).unwrap();
        assert_eq!(decode_message(&encoded).unwrap().content, "");
    }

    #[test]
    fn test_block_aligned_content() {
        let mut msg = sample();
        msg.content = "x".repeat(256);
        let encoded = encode_message(&msg).unwrap();
        assert_eq!(encoded.len(), 25 + 512);
        assert_eq!(decode_message(&encoded).unwrap().content, msg.content);
    }

    #[test]
    fn test_multibyte_content() {
        let mut msg = sample();
        msg.content = "héllo wörld 🛰".to_string();
        let decoded = decode_message(&encode_message(&msg).unwrap()).unwrap();
        assert_eq!(decoded.content, msg.content);
    }

    #[test]
    fn test_custom_block_size() {
        let codec = MessageCodec::new(16).unwrap();
        let encoded = codec.encode(&sample()).unwrap();
        assert_eq!(encoded.len(), 25 + 16);
        assert_eq!(codec.decode(&encoded).unwrap().content, "hello @bob");
    }

    #[test]
    fn test_invalid_block_size() {
        assert!(matches!(
            MessageCodec::new(0),
            Err(MessageError::Padding(_))
        ));
        assert!(MessageCodec::new(512).is_err());
    }

    #[test]
    fn test_too_short() {
        assert_eq!(
            decode_message(&[0u8; 11]),
            Err(MessageError::TooShort { need: 12, got: 11 })
        );
        assert!(decode_message(&[]).is_err());
    }

    #[test]
    fn test_declared_length_exceeds_remaining() {
        let mut encoded = encode_message(&sample()).unwrap();
        encoded.truncate(encoded.len() - 1);
        assert!(matches!(
            decode_message(&encoded),
            Err(MessageError::Truncated { field: "content", .. })
        ));

        let mut bogus = vec![0u8; 11];
        bogus.extend_from_slice(&500u16.to_be_bytes());
        assert!(matches!(
            decode_message(&bogus),
            Err(MessageError::Truncated {
                field: "recipientNickname",
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_utf8_field() {
        let mut bytes = vec![0u8; 11];
        bytes.extend_from_slice(&[0, 2, 0xff, 0xfe]);
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        assert_eq!(
            decode_message(&bytes),
            Err(MessageError::InvalidUtf8("recipientNickname"))
        );
    }

    #[test]
    fn test_field_too_long() {
        let mut msg = sample();
        msg.sender_peer_id = "p".repeat(70_000);
        assert!(matches!(
            encode_message(&msg),
            Err(MessageError::FieldTooLong {
                field: "senderPeerID",
                ..
            })
        ));
    }

    #[test]
    fn test_unpadded_content_passes_through() {
        // A pad length larger than the field leaves the bytes untouched
        let mut bytes = vec![0u8; 11];
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        bytes.extend_from_slice(&[0, 3, b'a', b'b', b'c']);
        assert_eq!(decode_message(&bytes).unwrap().content, "abc");
    }
}
