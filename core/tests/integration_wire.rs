//! Wire-level integration tests: framing, fragmentation and reassembly
//!
//! Run with: cargo test --test integration_wire

use blemesh_core::protocol::{
    Packet, PacketType, PeerId, WireCodec, WireConfig, WireError, DEFAULT_CHUNK_SIZE, HEADER_SIZE,
};
use blemesh_core::protocol::ReassemblyConfig;
use proptest::prelude::*;
use std::time::Duration;

fn packet(payload: Vec<u8>, ttl: u8) -> Packet {
    Packet::new(
        PacketType::Data,
        PeerId::from("sender01"),
        PeerId::BROADCAST,
        payload,
    )
    .with_ttl(ttl)
    .with_timestamp(1_700_000_000_123)
}

proptest! {
    #[test]
    fn single_frame_roundtrip_decrements_ttl(
        payload in proptest::collection::vec(any::<u8>(), 0..=DEFAULT_CHUNK_SIZE),
        ttl in 1u8..=u8::MAX,
    ) {
        let codec = WireCodec::new();
        let original = packet(payload, ttl);

        let frames = codec.encode(&original).unwrap();
        prop_assert_eq!(frames.len(), 1);

        let decoded = codec.decode(&frames[0]).unwrap().unwrap();
        let mut expected = original.clone();
        expected.ttl = ttl - 1;
        prop_assert_eq!(decoded, expected);
    }

    #[test]
    fn fragmented_payload_reassembles(len in (DEFAULT_CHUNK_SIZE + 1)..6000usize) {
        let codec = WireCodec::new();
        let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let original = packet(payload.clone(), 5);

        let frames = codec.encode(&original).unwrap();
        prop_assert_eq!(frames.len(), len.div_ceil(DEFAULT_CHUNK_SIZE) + 1);

        let (last, rest) = frames.split_last().unwrap();
        for frame in rest {
            prop_assert!(codec.decode(frame).unwrap().is_none());
        }
        let decoded = codec.decode(last).unwrap().unwrap();
        prop_assert_eq!(decoded.payload, payload);
        prop_assert_eq!(decoded.packet_type, PacketType::FragmentEnd);
        prop_assert_eq!(codec.pending_fragments(), 0);
    }

    #[test]
    fn arbitrary_bytes_never_panic(data in proptest::collection::vec(any::<u8>(), 0..128)) {
        let codec = WireCodec::new();
        let _ = codec.decode(&data);
    }
}

#[test]
fn test_malformed_frames_are_invalid() {
    let codec = WireCodec::new();
    assert!(matches!(
        codec.decode(&[]),
        Err(WireError::BufferTooShort { .. })
    ));
    assert!(matches!(
        codec.decode(&[0x01; HEADER_SIZE - 1]),
        Err(WireError::BufferTooShort { .. })
    ));

    let mut frame = codec.encode(&packet(b"hi".to_vec(), 3)).unwrap().remove(0);
    frame[0] = 0x02;
    assert_eq!(codec.decode(&frame), Err(WireError::UnsupportedVersion(0x02)));

    frame[0] = 0x01;
    frame[1] = 0x7f;
    assert_eq!(codec.decode(&frame), Err(WireError::InvalidPacketType(0x7f)));
}

#[test]
fn test_declared_length_beyond_buffer() {
    let codec = WireCodec::new();
    let mut frame = codec.encode(&packet(vec![1, 2, 3], 3)).unwrap().remove(0);
    frame.truncate(frame.len() - 1);
    assert!(matches!(
        codec.decode(&frame),
        Err(WireError::BufferTooShort { .. })
    ));
}

#[test]
fn test_interleaved_senders_reassemble_independently() {
    let codec = WireCodec::new();
    let a = Packet::new(PacketType::Data, PeerId::from("peer-aaa"), PeerId::BROADCAST, vec![0xaa; 2500])
        .with_timestamp(1);
    let b = Packet::new(PacketType::Data, PeerId::from("peer-bbb"), PeerId::BROADCAST, vec![0xbb; 2500])
        .with_timestamp(1);

    let frames_a = codec.encode(&a).unwrap();
    let frames_b = codec.encode(&b).unwrap();
    assert_eq!(frames_a.len(), 4);

    let mut completed = Vec::new();
    for (fa, fb) in frames_a.iter().zip(frames_b.iter()) {
        completed.extend(codec.decode(fa).unwrap());
        completed.extend(codec.decode(fb).unwrap());
    }

    assert_eq!(completed.len(), 2);
    assert_eq!(completed[0].payload, a.payload);
    assert_eq!(completed[1].payload, b.payload);
}

#[test]
fn test_abandoned_fragments_expire() {
    let codec = WireCodec::with_config(WireConfig {
        chunk_size: 16,
        reassembly: ReassemblyConfig {
            max_pending: 4,
            timeout: Duration::from_millis(1),
        },
    })
    .unwrap();

    let frames = codec.encode(&packet(vec![7; 40], 3)).unwrap();
    assert!(codec.decode(&frames[0]).unwrap().is_none());
    assert_eq!(codec.pending_fragments(), 1);

    std::thread::sleep(Duration::from_millis(10));
    assert_eq!(codec.purge_expired(), 1);
    assert_eq!(codec.pending_fragments(), 0);
}

#[test]
fn test_reassembly_capacity_bounded() {
    let codec = WireCodec::with_config(WireConfig {
        chunk_size: 8,
        reassembly: ReassemblyConfig {
            max_pending: 2,
            timeout: Duration::from_secs(30),
        },
    })
    .unwrap();

    for ts in 0..5u64 {
        let frames = codec
            .encode(&packet(vec![1; 20], 3).with_timestamp(ts))
            .unwrap();
        let _ = codec.decode(&frames[0]);
    }
    assert!(codec.pending_fragments() <= 2);
}
