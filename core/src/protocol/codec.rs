/// WireCodec: packet <-> frame conversion, including fragmentation

use super::reassembly::{FragmentKey, ReassemblyBuffer, ReassemblyConfig};
use super::{
    Packet, PacketType, PeerId, WireError, DEFAULT_CHUNK_SIZE, HEADER_SIZE, MAX_PAYLOAD_SIZE,
    PEER_ID_SIZE, PROTOCOL_VERSION, SIGNATURE_SIZE,
};
use parking_lot::Mutex;
use std::time::Instant;
use tracing::debug;

/// Codec configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireConfig {
    /// Largest payload carried by a single frame; bigger payloads fragment
    pub chunk_size: usize,
    pub reassembly: ReassemblyConfig,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            reassembly: ReassemblyConfig::default(),
        }
    }
}

/// Parsed fixed header
#[derive(Debug, Clone, Copy)]
struct FrameHeader {
    version: u8,
    packet_type: PacketType,
    sender_id: PeerId,
    recipient_id: PeerId,
    timestamp: u64,
    ttl: u8,
    payload_len: usize,
}

impl FrameHeader {
    fn parse(data: &[u8]) -> Result<Self, WireError> {
        if data.len() < HEADER_SIZE {
            return Err(WireError::BufferTooShort {
                need: HEADER_SIZE,
                got: data.len(),
            });
        }

        let version = data[0];
        if version != PROTOCOL_VERSION {
            return Err(WireError::UnsupportedVersion(version));
        }

        let packet_type = PacketType::from_u8(data[1])?;
        let sender_id = PeerId::from_slice(&data[2..2 + PEER_ID_SIZE]);
        let recipient_id = PeerId::from_slice(&data[10..10 + PEER_ID_SIZE]);

        let mut timestamp_bytes = [0u8; 8];
        timestamp_bytes.copy_from_slice(&data[18..26]);
        let timestamp = u64::from_be_bytes(timestamp_bytes);

        let ttl = data[26];
        let payload_len = u16::from_be_bytes([data[27], data[28]]) as usize;

        Ok(Self {
            version,
            packet_type,
            sender_id,
            recipient_id,
            timestamp,
            ttl,
            payload_len,
        })
    }
}

/// Frames packets for the broadcast transport and reassembles inbound frames.
///
/// The codec owns its reassembly state behind a mutex, so a single instance
/// can be fed frames from several transport threads at once.
pub struct WireCodec {
    chunk_size: usize,
    reassembly: Mutex<ReassemblyBuffer>,
}

impl WireCodec {
    /// Codec with the default 1024-byte chunk size
    pub fn new() -> Self {
        let config = WireConfig::default();
        Self {
            chunk_size: config.chunk_size,
            reassembly: Mutex::new(ReassemblyBuffer::new(config.reassembly)),
        }
    }

    pub fn with_config(config: WireConfig) -> Result<Self, WireError> {
        if config.chunk_size == 0 || config.chunk_size > MAX_PAYLOAD_SIZE {
            return Err(WireError::InvalidChunkSize(config.chunk_size));
        }
        Ok(Self {
            chunk_size: config.chunk_size,
            reassembly: Mutex::new(ReassemblyBuffer::new(config.reassembly)),
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Encode a packet into one or more frames.
    ///
    /// The ttl is normalised to at least 1 and then decremented, so every
    /// emitted frame carries the budget left for the next hop. Payloads above
    /// the chunk size become START, CONTINUE..., and an empty END marker; the
    /// signature rides on the END marker and is never split.
    pub fn encode(&self, packet: &Packet) -> Result<Vec<Vec<u8>>, WireError> {
        if packet.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(WireError::PayloadTooLarge(packet.payload.len()));
        }

        let ttl = packet.ttl.max(1) - 1;

        if packet.payload.len() <= self.chunk_size {
            let frame = write_frame(
                packet,
                packet.packet_type,
                ttl,
                &packet.payload,
                packet.signature.as_ref(),
            );
            return Ok(vec![frame]);
        }

        let mut frames = Vec::with_capacity(packet.payload.len() / self.chunk_size + 2);
        for (index, chunk) in packet.payload.chunks(self.chunk_size).enumerate() {
            let fragment_type = if index == 0 {
                PacketType::FragmentStart
            } else {
                PacketType::FragmentContinue
            };
            frames.push(write_frame(packet, fragment_type, ttl, chunk, None));
        }
        frames.push(write_frame(
            packet,
            PacketType::FragmentEnd,
            ttl,
            &[],
            packet.signature.as_ref(),
        ));

        debug!(
            "Fragmented {} byte payload into {} frames",
            packet.payload.len(),
            frames.len()
        );
        Ok(frames)
    }

    /// Decode one inbound frame.
    ///
    /// - `Ok(Some(packet))`: a complete packet (single frame or finished reassembly)
    /// - `Ok(None)`: a fragment was buffered, more frames are needed
    /// - `Err(_)`: the frame is malformed and was discarded
    pub fn decode(&self, data: &[u8]) -> Result<Option<Packet>, WireError> {
        self.decode_at(data, Instant::now())
    }

    pub(crate) fn decode_at(&self, data: &[u8], now: Instant) -> Result<Option<Packet>, WireError> {
        let header = FrameHeader::parse(data)?;

        let body = &data[HEADER_SIZE..];
        if body.len() < header.payload_len {
            return Err(WireError::BufferTooShort {
                need: HEADER_SIZE + header.payload_len,
                got: data.len(),
            });
        }
        let (payload, rest) = body.split_at(header.payload_len);
        let signature = read_signature(rest);

        if !header.packet_type.is_fragment() {
            return Ok(Some(Packet {
                version: header.version,
                packet_type: header.packet_type,
                sender_id: header.sender_id,
                recipient_id: header.recipient_id,
                timestamp: header.timestamp,
                ttl: header.ttl,
                payload: payload.to_vec(),
                signature,
            }));
        }

        let key = FragmentKey {
            sender_id: header.sender_id,
            timestamp: header.timestamp,
        };

        let mut reassembly = self.reassembly.lock();
        reassembly.purge_expired(now);

        let assembled = match header.packet_type {
            PacketType::FragmentStart => {
                reassembly.start(key, payload, now)?;
                return Ok(None);
            }
            PacketType::FragmentContinue => {
                reassembly.append(key, payload, now)?;
                return Ok(None);
            }
            _ => match reassembly.complete(key, payload)? {
                Some(assembled) => assembled,
                None => return Ok(None),
            },
        };
        Ok(Some(Packet {
            version: header.version,
            packet_type: header.packet_type,
            sender_id: header.sender_id,
            recipient_id: header.recipient_id,
            timestamp: header.timestamp,
            ttl: header.ttl,
            payload: assembled,
            signature,
        }))
    }

    /// Drop partial packets that have gone quiet. Returns the number discarded.
    pub fn purge_expired(&self) -> usize {
        self.reassembly.lock().purge_expired(Instant::now())
    }

    /// Number of packets currently mid-reassembly
    pub fn pending_fragments(&self) -> usize {
        self.reassembly.lock().pending_count()
    }
}

impl Default for WireCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn write_frame(
    packet: &Packet,
    packet_type: PacketType,
    ttl: u8,
    payload: &[u8],
    signature: Option<&[u8; SIGNATURE_SIZE]>,
) -> Vec<u8> {
    let signature_len = signature.map_or(0, |_| SIGNATURE_SIZE);
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len() + signature_len);

    buf.push(PROTOCOL_VERSION);
    buf.push(packet_type.as_u8());
    buf.extend_from_slice(packet.sender_id.as_bytes());
    buf.extend_from_slice(packet.recipient_id.as_bytes());
    buf.extend_from_slice(&packet.timestamp.to_be_bytes());
    buf.push(ttl);
    // Callers guarantee payload.len() <= MAX_PAYLOAD_SIZE
    buf.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    buf.extend_from_slice(payload);
    if let Some(signature) = signature {
        buf.extend_from_slice(signature);
    }
    buf
}

fn read_signature(rest: &[u8]) -> Option<[u8; SIGNATURE_SIZE]> {
    if rest.len() < SIGNATURE_SIZE {
        return None;
    }
    let mut signature = [0u8; SIGNATURE_SIZE];
    signature.copy_from_slice(&rest[..SIGNATURE_SIZE]);
    Some(signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn make_packet(payload: Vec<u8>) -> Packet {
        Packet::new(
            PacketType::Data,
            PeerId::from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]),
            PeerId::BROADCAST,
            payload,
        )
        .with_timestamp(1_700_000_000_000)
    }

    #[test]
    fn test_single_frame_roundtrip() {
        let codec = WireCodec::new();
        let packet = make_packet(vec![9, 10]);

        let frames = codec.encode(&packet).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), HEADER_SIZE + 2);

        let decoded = codec.decode(&frames[0]).unwrap().unwrap();
        assert_eq!(decoded.version, packet.version);
        assert_eq!(decoded.sender_id, packet.sender_id);
        assert_eq!(decoded.recipient_id, packet.recipient_id);
        assert_eq!(decoded.timestamp, packet.timestamp);
        assert_eq!(decoded.payload, packet.payload);
        assert_eq!(decoded.ttl, packet.ttl - 1);
        assert_eq!(decoded.signature, None);
    }

    #[test]
    fn test_header_layout_is_big_endian() {
        let codec = WireCodec::new();
        let packet = make_packet(vec![0xAA; 3]).with_ttl(7);
        let frame = &codec.encode(&packet).unwrap()[0];

        assert_eq!(frame[0], PROTOCOL_VERSION);
        assert_eq!(frame[1], PacketType::Data.as_u8());
        assert_eq!(&frame[2..10], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&frame[10..18], &[0u8; 8]);
        assert_eq!(&frame[18..26], &1_700_000_000_000u64.to_be_bytes());
        assert_eq!(frame[26], 6);
        assert_eq!(&frame[27..29], &[0x00, 0x03]);
        assert_eq!(&frame[29..], &[0xAA; 3]);
    }

    #[test]
    fn test_zero_ttl_is_normalised() {
        let codec = WireCodec::new();
        let packet = make_packet(vec![1]).with_ttl(0);
        let frame = &codec.encode(&packet).unwrap()[0];
        assert_eq!(frame[26], 0);
    }

    #[test]
    fn test_encode_does_not_mutate_packet() {
        let codec = WireCodec::new();
        let packet = make_packet(vec![1]).with_ttl(3);
        codec.encode(&packet).unwrap();
        assert_eq!(packet.ttl, 3);
    }

    #[test]
    fn test_signature_roundtrip() {
        let codec = WireCodec::new();
        let mut packet = make_packet(b"signed".to_vec());
        packet.signature = Some([0x5A; SIGNATURE_SIZE]);

        let frames = codec.encode(&packet).unwrap();
        let decoded = codec.decode(&frames[0]).unwrap().unwrap();
        assert_eq!(decoded.signature, Some([0x5A; SIGNATURE_SIZE]));
    }

    #[test]
    fn test_empty_payload() {
        let codec = WireCodec::new();
        let packet = make_packet(Vec::new());
        let frames = codec.encode(&packet).unwrap();
        assert_eq!(frames[0].len(), HEADER_SIZE);

        let decoded = codec.decode(&frames[0]).unwrap().unwrap();
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_exact_chunk_size_is_not_fragmented() {
        let codec = WireCodec::new();
        let packet = make_packet(vec![7; DEFAULT_CHUNK_SIZE]);
        assert_eq!(codec.encode(&packet).unwrap().len(), 1);
    }

    #[test]
    fn test_fragmentation_roundtrip() {
        let codec = WireCodec::new();
        let payload: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
        let mut packet = make_packet(payload.clone());
        packet.signature = Some([0x11; SIGNATURE_SIZE]);

        let frames = codec.encode(&packet).unwrap();
        // ceil(3000 / 1024) = 3 chunks + END marker
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0][1], PacketType::FragmentStart.as_u8());
        assert_eq!(frames[1][1], PacketType::FragmentContinue.as_u8());
        assert_eq!(frames[2][1], PacketType::FragmentContinue.as_u8());
        assert_eq!(frames[3][1], PacketType::FragmentEnd.as_u8());
        assert_eq!(frames[3].len(), HEADER_SIZE + SIGNATURE_SIZE);

        for frame in &frames[..3] {
            assert_eq!(codec.decode(frame).unwrap(), None);
        }
        let decoded = codec.decode(&frames[3]).unwrap().unwrap();
        assert_eq!(decoded.payload, payload);
        assert_eq!(decoded.signature, Some([0x11; SIGNATURE_SIZE]));
        assert_eq!(decoded.packet_type, PacketType::FragmentEnd);
        assert_eq!(codec.pending_fragments(), 0);
    }

    #[test]
    fn test_custom_chunk_size() {
        let codec = WireCodec::with_config(WireConfig {
            chunk_size: 100,
            ..WireConfig::default()
        })
        .unwrap();
        let frames = codec.encode(&make_packet(vec![1; 250])).unwrap();
        assert_eq!(frames.len(), 4);
    }

    #[test]
    fn test_invalid_chunk_size_rejected() {
        let result = WireCodec::with_config(WireConfig {
            chunk_size: 0,
            ..WireConfig::default()
        });
        assert!(matches!(result, Err(WireError::InvalidChunkSize(0))));
    }

    #[test]
    fn test_oversize_payload_rejected() {
        let codec = WireCodec::new();
        let packet = make_packet(vec![0; MAX_PAYLOAD_SIZE + 1]);
        assert!(matches!(
            codec.encode(&packet),
            Err(WireError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn test_decode_empty_input() {
        let codec = WireCodec::new();
        assert!(matches!(
            codec.decode(&[]),
            Err(WireError::BufferTooShort { need: HEADER_SIZE, got: 0 })
        ));
    }

    #[test]
    fn test_decode_short_buffer() {
        let codec = WireCodec::new();
        assert!(codec.decode(&[PROTOCOL_VERSION; HEADER_SIZE - 1]).is_err());
    }

    #[test]
    fn test_decode_wrong_version() {
        let codec = WireCodec::new();
        let mut frame = codec.encode(&make_packet(vec![1, 2])).unwrap().remove(0);
        frame[0] = 0x02;
        assert_eq!(codec.decode(&frame), Err(WireError::UnsupportedVersion(0x02)));
    }

    #[test]
    fn test_decode_unknown_type() {
        let codec = WireCodec::new();
        let mut frame = codec.encode(&make_packet(vec![1, 2])).unwrap().remove(0);
        frame[1] = 0x7F;
        assert_eq!(codec.decode(&frame), Err(WireError::InvalidPacketType(0x7F)));
    }

    #[test]
    fn test_decode_truncated_payload() {
        let codec = WireCodec::new();
        let frame = codec.encode(&make_packet(vec![1; 40])).unwrap().remove(0);
        let result = codec.decode(&frame[..frame.len() - 5]);
        assert!(matches!(result, Err(WireError::BufferTooShort { .. })));
    }

    #[test]
    fn test_short_trailer_is_not_a_signature() {
        let codec = WireCodec::new();
        let mut frame = codec.encode(&make_packet(vec![1; 4])).unwrap().remove(0);
        frame.extend_from_slice(&[0xEE; SIGNATURE_SIZE - 1]);
        let decoded = codec.decode(&frame).unwrap().unwrap();
        assert_eq!(decoded.signature, None);
    }

    #[test]
    fn test_stale_fragments_expire_on_decode() {
        let codec = WireCodec::with_config(WireConfig {
            chunk_size: 10,
            reassembly: ReassemblyConfig {
                max_pending: 8,
                timeout: Duration::from_secs(5),
            },
        })
        .unwrap();
        let frames = codec.encode(&make_packet(vec![3; 25])).unwrap();

        let start = Instant::now();
        assert_eq!(codec.decode_at(&frames[0], start).unwrap(), None);
        assert_eq!(codec.pending_fragments(), 1);

        // A later fragment from another sender sweeps the stale buffer away
        let other = Packet::new(
            PacketType::Data,
            PeerId::from("other"),
            PeerId::BROADCAST,
            vec![1; 30],
        );
        let other_frames = codec.encode(&other).unwrap();
        assert_eq!(
            codec
                .decode_at(&other_frames[0], start + Duration::from_secs(6))
                .unwrap(),
            None
        );
        // Only the new sender's buffer remains
        assert_eq!(codec.pending_fragments(), 1);

        // The rest of the first packet lost its head and never completes
        for frame in &frames[1..] {
            assert_eq!(
                codec
                    .decode_at(frame, start + Duration::from_secs(6))
                    .unwrap(),
                None
            );
        }
        assert_eq!(codec.pending_fragments(), 1);
    }

    #[test]
    fn test_evicted_packet_never_completes() {
        let codec = WireCodec::with_config(WireConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            reassembly: ReassemblyConfig {
                max_pending: 1,
                timeout: Duration::from_secs(30),
            },
        })
        .unwrap();
        let first = codec.encode(&make_packet(vec![0xA1; 3000])).unwrap();
        let second = codec
            .encode(
                &Packet::new(
                    PacketType::Data,
                    PeerId::from("peer-bbb"),
                    PeerId::BROADCAST,
                    vec![0xB2; 3000],
                )
                .with_timestamp(1_700_000_000_000),
            )
            .unwrap();

        assert_eq!(codec.decode(&first[0]).unwrap(), None);
        // Capacity of one: the second packet's head pushes the first one out
        assert_eq!(codec.decode(&second[0]).unwrap(), None);
        for frame in &first[1..] {
            assert_eq!(codec.decode(frame).unwrap(), None);
        }

        for frame in &second[1..3] {
            assert_eq!(codec.decode(frame).unwrap(), None);
        }
        let decoded = codec.decode(&second[3]).unwrap().unwrap();
        assert_eq!(decoded.payload, vec![0xB2; 3000]);
    }
}
