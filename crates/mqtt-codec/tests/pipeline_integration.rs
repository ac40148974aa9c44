//! Drives the MQTT handlers through a real [`pipeline_core::EmbeddedChannel`]
//! rather than calling the codec functions directly, exercising the
//! decoder/encoder as the handlers a production channel would install.

use pipeline_core::{ByteBuf, ChannelConfig, HandlerSlot, Message};

use mqtt_codec::packet::{Packet, PacketId, Publish};
use mqtt_codec::qos::QoS;
use mqtt_codec::{MqttDecoderHandler, MqttEncoderHandler};

fn server_channel() -> pipeline_core::EmbeddedChannel {
    let mut config = ChannelConfig::default();
    config.is_server = true;
    pipeline_core::EmbeddedChannel::new(
        config,
        vec![
            ("mqtt-decoder", HandlerSlot::Inbound(Box::new(MqttDecoderHandler::new()))),
            ("mqtt-encoder", HandlerSlot::Outbound(Box::new(MqttEncoderHandler))),
        ],
    )
}

#[test]
fn pingreq_bytes_decode_to_a_packet_through_the_pipeline() {
    let channel = server_channel();
    let mut buf = ByteBuf::allocate(2);
    buf.write_bytes(&[0xC0, 0x00]).unwrap();
    assert!(channel.write_inbound(vec![Message::buf(buf)]));

    let msg = channel.read_inbound().expect("decoded packet");
    let packet = msg.downcast::<Packet>().expect("message should carry a Packet");
    assert!(matches!(packet, Packet::PingReq));
}

#[test]
fn fragmented_bytes_delivered_one_at_a_time_still_yield_one_packet() {
    let channel = server_channel();
    let bytes = [0xC0, 0x00];
    for &byte in &bytes {
        let mut buf = ByteBuf::allocate(1);
        buf.write_byte(byte).unwrap();
        channel.write_inbound(vec![Message::buf(buf)]);
    }
    let msg = channel.read_inbound().expect("decoded packet after the final byte arrived");
    assert!(matches!(msg.downcast::<Packet>().unwrap(), Packet::PingReq));
    assert!(channel.read_inbound().is_none(), "exactly one packet should have been emitted");
}

#[test]
fn publish_payload_is_a_zero_copy_slice_with_conserved_refcount() {
    let channel = server_channel();
    let mut input = ByteBuf::allocate(32);
    input.write_bytes(&[0x32, 0x0A, 0x00, 0x04, b't', b'e', b's', b't', 0x00, 0x2A, b'h', b'i']).unwrap();
    let before = input.ref_count();

    channel.write_inbound(vec![Message::buf(input)]);
    let msg = channel.read_inbound().expect("decoded PUBLISH");
    let packet = msg.downcast::<Packet>().expect("message should carry a Packet");
    let Packet::Publish(publish) = packet else { panic!("expected PUBLISH") };

    assert_eq!(publish.payload.peek_readable(), b"hi");
    assert_eq!(publish.payload.ref_count(), before + 1, "decoder retains the slice exactly once");
}

#[test]
fn encoder_round_trips_a_publish_written_from_above() {
    let channel = server_channel();
    let mut payload = ByteBuf::allocate(2);
    payload.write_bytes(b"hi").unwrap();
    let publish = Publish {
        dup: false,
        qos: QoS::AtLeastOnce,
        retain: false,
        topic_name: "test".to_string(),
        packet_id: PacketId::new(42).map(PacketId::get),
        payload,
    };
    assert!(channel.write_outbound(vec![Message::packet(Packet::Publish(publish))]));

    let header = channel.read_outbound().expect("PUBLISH header buffer");
    let wire = header.peek_readable();
    assert_eq!(&wire[..2], &[0x32, 0x0A]);

    let payload_buf = channel.read_outbound().expect("PUBLISH payload buffer");
    assert_eq!(payload_buf.peek_readable(), b"hi");
}
