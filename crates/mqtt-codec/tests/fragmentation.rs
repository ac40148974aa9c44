//! Property: splitting an accepted byte stream into arbitrary non-empty
//! chunks and feeding it in order yields the same packet as feeding it
//! whole.

use proptest::prelude::*;

use mqtt_codec::decoder::Phase;
use mqtt_codec::encoder::{encode_packet, Encoded};
use mqtt_codec::packet::{Connect, Packet, SubscribeRequest};
use mqtt_codec::qos::QoS;
use mqtt_codec::{decode_packet, Subscribe};
use pipeline_core::{replay_decode, ByteBuf, HeapAllocator, ReplayState};

const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

fn connect_bytes(client_id: &str, keep_alive: u16) -> Vec<u8> {
    let connect = Connect {
        protocol_name: "MQTT".to_string(),
        protocol_level: 4,
        clean_session: true,
        keep_alive,
        client_id: client_id.to_string(),
        will: None,
        username: None,
        password: None,
    };
    match encode_packet(&Packet::Connect(connect), &HeapAllocator).unwrap() {
        Encoded::Single(buf) => buf.peek_readable(),
        Encoded::Publish(..) => unreachable!(),
    }
}

fn subscribe_bytes(packet_id: u16, filters: &[&str]) -> Vec<u8> {
    let subscribe = Subscribe {
        packet_id: mqtt_codec::packet::PacketId::new(packet_id).unwrap(),
        requests: filters
            .iter()
            .map(|f| SubscribeRequest { topic_filter: (*f).to_string(), requested_qos: QoS::AtLeastOnce })
            .collect(),
    };
    match encode_packet(&Packet::Subscribe(subscribe), &HeapAllocator).unwrap() {
        Encoded::Single(buf) => buf.peek_readable(),
        Encoded::Publish(..) => unreachable!(),
    }
}

/// Feeds `chunks` through the replaying decoder in order, returning the
/// first fully decoded packet (or panicking if decoding never completes or
/// fails).
fn decode_via_chunks(chunks: &[Vec<u8>], is_server: bool) -> Packet {
    let mut accum = ByteBuf::allocate(256);
    let mut state = ReplayState::new(Phase::FixedHeader);
    for chunk in chunks {
        accum.write_bytes(chunk).unwrap();
        if let Some(result) =
            replay_decode(&mut accum, &mut state, |buf, state| decode_packet(buf, state, is_server, MAX_MESSAGE_SIZE))
        {
            return result.unwrap_or_else(|failure| panic!("decode failed: {:?}", failure.error));
        }
    }
    panic!("decoding never completed across {} chunks", chunks.len());
}

/// Splits `bytes` into up to `cuts.len() + 1` non-empty, order-preserving
/// pieces using the sorted cut points in `cuts` (each clamped into
/// `1..bytes.len()`).
fn split_at_cuts(bytes: &[u8], mut cuts: Vec<usize>) -> Vec<Vec<u8>> {
    cuts.retain(|&c| c > 0 && c < bytes.len());
    cuts.sort_unstable();
    cuts.dedup();
    let mut pieces = Vec::new();
    let mut start = 0;
    for cut in cuts {
        pieces.push(bytes[start..cut].to_vec());
        start = cut;
    }
    pieces.push(bytes[start..].to_vec());
    pieces
}

proptest! {
    #[test]
    fn connect_decodes_identically_under_arbitrary_fragmentation(
        client_id in "[a-zA-Z0-9]{0,20}",
        keep_alive in 0u16..=3600,
        cuts in prop::collection::vec(0usize..40, 0..6),
    ) {
        let bytes = connect_bytes(&client_id, keep_alive);
        let whole = decode_via_chunks(&[bytes.clone()], true);
        let fragmented = decode_via_chunks(&split_at_cuts(&bytes, cuts), true);
        let (Packet::Connect(a), Packet::Connect(b)) = (whole, fragmented) else {
            panic!("expected both decodes to yield CONNECT");
        };
        prop_assert_eq!(a, b);
    }

    #[test]
    fn subscribe_decodes_identically_under_byte_at_a_time_delivery(
        packet_id in 1u16..=u16::MAX,
        filter_a in "[a-z]{1,6}",
        filter_b in "[a-z]{1,6}",
    ) {
        let bytes = subscribe_bytes(packet_id, &[&filter_a, &filter_b]);
        let whole = decode_via_chunks(&[bytes.clone()], true);
        let one_byte_at_a_time: Vec<Vec<u8>> = bytes.iter().map(|&b| vec![b]).collect();
        let fragmented = decode_via_chunks(&one_byte_at_a_time, true);
        let (Packet::Subscribe(a), Packet::Subscribe(b)) = (whole, fragmented) else {
            panic!("expected both decodes to yield SUBSCRIBE");
        };
        prop_assert_eq!(a, b);
    }
}
