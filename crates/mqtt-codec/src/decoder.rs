//! MQTT decoder: byte stream → packet.
//!
//! Built on [`pipeline_core::replaying`]: the parse states
//! (`FixedHeader`, `VariableHeader`, `Payload`, `BadMessage`) become the
//! [`Phase`] tag the replaying base checkpoints against. Only PUBLISH gets
//! a dedicated payload-boundary checkpoint; every other packet type is
//! small enough that decoding waits for its whole body to be buffered in
//! one step once the fixed header is known.

use pipeline_core::{ByteBuf, ReplayState, ReplayStatus};

use crate::error::DecoderError;
use crate::packet::{
    ConnAck, Connect, ConnectReturnCode, PacketId, Packet, SubAck, Subscribe, SubscribeRequest,
    Unsubscribe, Will,
};
use crate::qos::{QoS, SubscribeReturnCode};
use crate::strings;
use crate::topic;
use crate::varint::{self, RemainingLengthOutcome};

#[derive(Debug, Clone, PartialEq)]
pub struct FixedHeaderInfo {
    pub packet_type: u8,
    pub flags: u8,
    pub remaining_length: u32,
}

#[derive(Debug, Clone, PartialEq)]
struct PublishVariableHeader {
    dup: bool,
    qos: QoS,
    retain: bool,
    topic_name: String,
    packet_id: Option<u16>,
    payload_len: usize,
}

/// The decoder's checkpointed phase. `BadMessage` is
/// terminal: once entered, the decoder only ever drains bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    FixedHeader,
    Body(FixedHeaderInfo),
    PublishPayload(Box<PublishVariableHeader>),
    BadMessage,
}

impl Default for Phase {
    fn default() -> Self {
        Phase::FixedHeader
    }
}

/// A fatal decode error, optionally paired with a CONNACK the caller
/// should write through the pipeline before closing — the explicit
/// pipeline-level effect decided for the protocol-level mismatch open
/// question.
#[derive(Debug)]
pub struct MqttFailure {
    pub error: DecoderError,
    pub connack: Option<ConnAck>,
}

fn fail(error: DecoderError) -> MqttFailure {
    MqttFailure { error, connack: None }
}

/// One invocation of the MQTT decode routine, suitable for driving with
/// [`pipeline_core::replaying::replay_decode`].
pub fn decode_packet(
    buf: &mut ByteBuf,
    state: &mut ReplayState<Phase>,
    is_server: bool,
    max_message_size: usize,
) -> ReplayStatus<Packet, MqttFailure> {
    match state.state() {
        Phase::BadMessage => {
            let n = buf.readable_bytes();
            if n > 0 {
                let _ = buf.skip(n);
            }
            ReplayStatus::NeedMore
        }
        Phase::FixedHeader => decode_fixed_header(buf, state, is_server, max_message_size),
        Phase::Body(header) => decode_body(buf, state, header),
        Phase::PublishPayload(pvh) => decode_publish_payload(buf, state, *pvh),
    }
}

fn decode_fixed_header(
    buf: &mut ByteBuf,
    state: &mut ReplayState<Phase>,
    is_server: bool,
    max_message_size: usize,
) -> ReplayStatus<Packet, MqttFailure> {
    if !buf.is_readable(1) {
        state.request_replay();
        return ReplayStatus::NeedMore;
    }
    let first = buf.read_byte().expect("checked is_readable(1) above");
    let packet_type = first >> 4;
    let flags = first & 0x0F;

    match varint::decode_remaining_length(buf) {
        RemainingLengthOutcome::Incomplete => {
            state.request_replay();
            ReplayStatus::NeedMore
        }
        RemainingLengthOutcome::Malformed => ReplayStatus::Failed(fail(DecoderError::MalformedRemainingLength)),
        RemainingLengthOutcome::Value(remaining_length) => {
            let header_len = 1 + varint::encoded_len(remaining_length);
            let total = header_len + remaining_length as usize;
            if total > max_message_size {
                return ReplayStatus::Failed(fail(DecoderError::MessageTooBig { actual: total, limit: max_message_size }));
            }
            if let Err(err) = validate_signature(packet_type, flags, is_server) {
                return ReplayStatus::Failed(fail(err));
            }
            let header = FixedHeaderInfo { packet_type, flags, remaining_length };
            state.checkpoint(buf, Phase::Body(header.clone()));
            decode_body(buf, state, header)
        }
    }
}

fn expect_flags(flags: u8, expected: u8) -> Result<(), DecoderError> {
    if flags != expected {
        return Err(DecoderError::InvalidFlags(flags));
    }
    Ok(())
}

fn require_direction(is_server: bool, needs_server: bool, name: &'static str) -> Result<(), DecoderError> {
    if needs_server != is_server {
        return Err(DecoderError::UnsupportedDirection(name));
    }
    Ok(())
}

/// First-byte signature + direction-legality checks.
fn validate_signature(packet_type: u8, flags: u8, is_server: bool) -> Result<(), DecoderError> {
    match packet_type {
        1 => {
            expect_flags(flags, 0)?;
            require_direction(is_server, true, "CONNECT")
        }
        2 => {
            expect_flags(flags, 0)?;
            require_direction(is_server, false, "CONNACK")
        }
        3 => {
            let qos_bits = (flags >> 1) & 0x3;
            if qos_bits == 3 {
                return Err(DecoderError::InvalidQos(qos_bits));
            }
            Ok(())
        }
        4 | 5 | 7 => expect_flags(flags, 0),
        6 => expect_flags(flags, 0b0010),
        8 => {
            expect_flags(flags, 0b0010)?;
            require_direction(is_server, true, "SUBSCRIBE")
        }
        9 => {
            expect_flags(flags, 0)?;
            require_direction(is_server, false, "SUBACK")
        }
        10 => {
            expect_flags(flags, 0b0010)?;
            require_direction(is_server, true, "UNSUBSCRIBE")
        }
        11 => {
            expect_flags(flags, 0)?;
            require_direction(is_server, false, "UNSUBACK")
        }
        12 => {
            expect_flags(flags, 0)?;
            require_direction(is_server, true, "PINGREQ")
        }
        13 => {
            expect_flags(flags, 0)?;
            require_direction(is_server, false, "PINGRESP")
        }
        14 => {
            expect_flags(flags, 0)?;
            require_direction(is_server, true, "DISCONNECT")
        }
        _ => Err(DecoderError::InvalidFlags(flags)),
    }
}

fn decode_body(buf: &mut ByteBuf, state: &mut ReplayState<Phase>, header: FixedHeaderInfo) -> ReplayStatus<Packet, MqttFailure> {
    if header.packet_type == 3 {
        return decode_publish_variable_header(buf, state, header);
    }

    if !buf.is_readable(header.remaining_length as usize) {
        state.request_replay();
        return ReplayStatus::NeedMore;
    }
    let mut budget = header.remaining_length as usize;
    let result = match header.packet_type {
        1 => decode_connect(buf, &mut budget),
        2 => decode_connack(buf, &mut budget),
        4 => decode_packet_id_only(buf, &mut budget).map(Packet::PubAck),
        5 => decode_packet_id_only(buf, &mut budget).map(Packet::PubRec),
        6 => decode_packet_id_only(buf, &mut budget).map(Packet::PubRel),
        7 => decode_packet_id_only(buf, &mut budget).map(Packet::PubComp),
        8 => decode_subscribe(buf, &mut budget),
        9 => decode_suback(buf, &mut budget),
        10 => decode_unsubscribe(buf, &mut budget),
        11 => decode_packet_id_only(buf, &mut budget).map(Packet::UnsubAck),
        12 => decode_empty_body(header.remaining_length).map(|_| Packet::PingReq),
        13 => decode_empty_body(header.remaining_length).map(|_| Packet::PingResp),
        14 => decode_empty_body(header.remaining_length).map(|_| Packet::Disconnect),
        _ => unreachable!("packet_type validated in decode_fixed_header"),
    };
    match result {
        Ok(packet) => ReplayStatus::Done(packet),
        Err(err) => ReplayStatus::Failed(fail_for(&header, err)),
    }
}

/// Attaches a refused-protocol-version CONNACK for the one case the
/// pipeline needs to send a reply before closing.
fn fail_for(header: &FixedHeaderInfo, err: DecoderError) -> MqttFailure {
    let connack = if header.packet_type == 1 && matches!(err, DecoderError::UnexpectedProtocolLevel(_)) {
        Some(ConnAck { session_present: false, return_code: ConnectReturnCode::RefusedUnacceptableProtocolVersion })
    } else {
        None
    };
    MqttFailure { error: err, connack }
}

fn read_byte_within(buf: &mut ByteBuf, budget: &mut usize) -> Result<u8, DecoderError> {
    if *budget < 1 {
        return Err(DecoderError::UnexpectedRemainingLength);
    }
    let byte = buf.read_byte().map_err(|_| DecoderError::UnexpectedRemainingLength)?;
    *budget -= 1;
    Ok(byte)
}

fn read_u16_within(buf: &mut ByteBuf, budget: &mut usize) -> Result<u16, DecoderError> {
    if *budget < 2 {
        return Err(DecoderError::UnexpectedRemainingLength);
    }
    let value = buf.read_u16_be().map_err(|_| DecoderError::UnexpectedRemainingLength)?;
    *budget -= 2;
    Ok(value)
}

fn read_string_within(buf: &mut ByteBuf, budget: &mut usize) -> Result<String, DecoderError> {
    match strings::try_read_string(buf, budget) {
        Some(result) => result,
        None => Err(DecoderError::UnexpectedRemainingLength),
    }
}

fn read_binary_within(buf: &mut ByteBuf, budget: &mut usize) -> Result<Vec<u8>, DecoderError> {
    match strings::try_read_binary(buf, budget) {
        Some(result) => result,
        None => Err(DecoderError::UnexpectedRemainingLength),
    }
}

fn decode_connect(buf: &mut ByteBuf, budget: &mut usize) -> Result<Packet, DecoderError> {
    let protocol_name = read_string_within(buf, budget)?;
    if protocol_name != "MQTT" {
        return Err(DecoderError::UnexpectedProtocolName(protocol_name));
    }
    let protocol_level = read_byte_within(buf, budget)?;
    if protocol_level != 4 {
        return Err(DecoderError::UnexpectedProtocolLevel(protocol_level));
    }

    let flags = read_byte_within(buf, budget)?;
    if flags & 0x01 != 0 {
        return Err(DecoderError::InvalidFlags(flags)); // [MQTT-3.1.2-3]
    }
    let clean_session = flags & 0x02 != 0;
    let will_flag = flags & 0x04 != 0;
    let will_qos_bits = (flags >> 3) & 0x3;
    let will_retain = flags & 0x20 != 0;
    let password_flag = flags & 0x40 != 0;
    let username_flag = flags & 0x80 != 0;

    if !will_flag && (will_qos_bits != 0 || will_retain) {
        return Err(DecoderError::InvalidFlags(flags)); // [MQTT-3.1.2-11]
    }
    if will_flag && will_qos_bits == 3 {
        return Err(DecoderError::InvalidQos(will_qos_bits)); // [MQTT-3.1.2-14]
    }
    if password_flag && !username_flag {
        return Err(DecoderError::InvalidFlags(flags)); // [MQTT-3.1.2-22]
    }

    let keep_alive = read_u16_within(buf, budget)?;
    let client_id = read_string_within(buf, budget)?;

    let will = if will_flag {
        let topic = read_string_within(buf, budget)?;
        let message = read_binary_within(buf, budget)?;
        Some(Will {
            topic,
            message,
            qos: QoS::from_bits(will_qos_bits).expect("reserved will QoS rejected above"),
            retain: will_retain,
        })
    } else {
        None
    };
    let username = if username_flag { Some(read_string_within(buf, budget)?) } else { None };
    let password = if password_flag { Some(read_string_within(buf, budget)?) } else { None };

    Ok(Packet::Connect(Connect {
        protocol_name,
        protocol_level,
        clean_session,
        keep_alive,
        client_id,
        will,
        username,
        password,
    }))
}

fn decode_connack(buf: &mut ByteBuf, budget: &mut usize) -> Result<Packet, DecoderError> {
    let ack_flags = read_byte_within(buf, budget)?;
    let return_code_byte = read_byte_within(buf, budget)?;
    let return_code = match return_code_byte {
        0 => ConnectReturnCode::Accepted,
        1 => ConnectReturnCode::RefusedUnacceptableProtocolVersion,
        2 => ConnectReturnCode::RefusedIdentifierRejected,
        3 => ConnectReturnCode::RefusedServerUnavailable,
        4 => ConnectReturnCode::RefusedBadUsernameOrPassword,
        5 => ConnectReturnCode::RefusedNotAuthorized,
        other => return Err(DecoderError::InvalidReturnCode(other)),
    };
    Ok(Packet::ConnAck(ConnAck { session_present: ack_flags & 0x01 != 0, return_code }))
}

fn decode_packet_id_only(buf: &mut ByteBuf, budget: &mut usize) -> Result<PacketId, DecoderError> {
    let raw = read_u16_within(buf, budget)?;
    PacketId::new(raw).ok_or(DecoderError::InvalidPacketId(raw))
}

fn decode_subscribe(buf: &mut ByteBuf, budget: &mut usize) -> Result<Packet, DecoderError> {
    let packet_id = decode_packet_id_only(buf, budget)?;
    let mut requests = Vec::new();
    while *budget > 0 {
        let filter = read_string_within(buf, budget)?;
        let qos_byte = read_byte_within(buf, budget)?;
        if qos_byte >= 3 {
            return Err(DecoderError::InvalidQos(qos_byte)); // [MQTT-3.8.3-4]
        }
        topic::validate_topic_filter(&filter)?;
        requests.push(SubscribeRequest {
            topic_filter: filter,
            requested_qos: QoS::from_bits(qos_byte).expect("checked qos_byte < 3 above"),
        });
    }
    if requests.is_empty() {
        return Err(DecoderError::EmptySubscribe); // [MQTT-3.8.3-3]
    }
    Ok(Packet::Subscribe(Subscribe { packet_id, requests }))
}

fn decode_suback(buf: &mut ByteBuf, budget: &mut usize) -> Result<Packet, DecoderError> {
    let packet_id = decode_packet_id_only(buf, budget)?;
    let mut return_codes = Vec::new();
    while *budget > 0 {
        let byte = read_byte_within(buf, budget)?;
        let code = SubscribeReturnCode::from_byte(byte).ok_or(DecoderError::InvalidReturnCode(byte))?; // [MQTT-3.9.3-2]
        return_codes.push(code);
    }
    Ok(Packet::SubAck(SubAck { packet_id, return_codes }))
}

fn decode_unsubscribe(buf: &mut ByteBuf, budget: &mut usize) -> Result<Packet, DecoderError> {
    let packet_id = decode_packet_id_only(buf, budget)?;
    let mut topic_filters = Vec::new();
    while *budget > 0 {
        let filter = read_string_within(buf, budget)?;
        topic::validate_topic_filter(&filter)?;
        topic_filters.push(filter);
    }
    if topic_filters.is_empty() {
        return Err(DecoderError::EmptyUnsubscribe); // [MQTT-3.10.3-2]
    }
    Ok(Packet::Unsubscribe(Unsubscribe { packet_id, topic_filters }))
}

fn decode_empty_body(remaining_length: u32) -> Result<(), DecoderError> {
    if remaining_length != 0 {
        return Err(DecoderError::UnexpectedRemainingLength);
    }
    Ok(())
}

fn decode_publish_variable_header(
    buf: &mut ByteBuf,
    state: &mut ReplayState<Phase>,
    header: FixedHeaderInfo,
) -> ReplayStatus<Packet, MqttFailure> {
    let dup = header.flags & 0x08 != 0;
    let qos_bits = (header.flags >> 1) & 0x3;
    let retain = header.flags & 0x01 != 0;
    let qos = QoS::from_bits(qos_bits).expect("QoS 3 rejected by validate_signature");

    let mut budget = header.remaining_length as usize;
    let topic_name = match strings::try_read_string(buf, &mut budget) {
        Some(Ok(name)) => name,
        Some(Err(err)) => return ReplayStatus::Failed(fail(err)),
        None => {
            state.request_replay();
            return ReplayStatus::NeedMore;
        }
    };
    if let Err(err) = topic::validate_topic_name(&topic_name) {
        return ReplayStatus::Failed(fail(err));
    }

    let packet_id = if matches!(qos, QoS::AtLeastOnce | QoS::ExactlyOnce) {
        if !buf.is_readable(2) {
            state.request_replay();
            return ReplayStatus::NeedMore;
        }
        let raw = buf.read_u16_be().expect("checked is_readable(2) above");
        budget -= 2;
        match PacketId::new(raw) {
            Some(id) => Some(id.get()),
            None => return ReplayStatus::Failed(fail(DecoderError::InvalidPacketId(raw))),
        }
    } else {
        None
    };

    let payload_len = budget;
    let pvh = PublishVariableHeader { dup, qos, retain, topic_name, packet_id, payload_len };
    state.checkpoint(buf, Phase::PublishPayload(Box::new(pvh.clone())));
    decode_publish_payload(buf, state, pvh)
}

fn decode_publish_payload(
    buf: &mut ByteBuf,
    state: &mut ReplayState<Phase>,
    pvh: PublishVariableHeader,
) -> ReplayStatus<Packet, MqttFailure> {
    if !buf.is_readable(pvh.payload_len) {
        state.request_replay();
        return ReplayStatus::NeedMore;
    }
    let payload = buf.read_slice(pvh.payload_len).expect("checked is_readable above");
    // the decoder retains the slice exactly once so it survives the
    // input buffer's own release.
    payload.retain();
    ReplayStatus::Done(Packet::Publish(crate::packet::Publish {
        dup: pvh.dup,
        qos: pvh.qos,
        retain: pvh.retain,
        topic_name: pvh.topic_name,
        packet_id: pvh.packet_id,
        payload,
    }))
}
