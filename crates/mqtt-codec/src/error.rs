//! MQTT-specific error taxonomy, paired with stable string codes the
//! same way [`pipeline_core::PipelineError`] is.

use thiserror::Error;

/// Fatal decode errors. `NeedMoreBytes` deliberately has no variant here —
/// it is internal to the replaying decoder and never surfaces as an
/// error; it is represented as `ReplayStatus::NeedMore` instead.
#[derive(Debug, Error)]
pub enum DecoderError {
    #[error("remaining length encoding used more than 4 continuation bytes")]
    MalformedRemainingLength,

    #[error("decoded frame length {actual} exceeds configured max_message_size {limit}")]
    MessageTooBig { actual: usize, limit: usize },

    #[error("protocol name was {0:?}, expected \"MQTT\"")]
    UnexpectedProtocolName(String),

    #[error("protocol level was {0}, expected 4")]
    UnexpectedProtocolLevel(u8),

    #[error("invalid fixed header flags 0x{0:x} for this packet type")]
    InvalidFlags(u8),

    #[error("invalid QoS bits 0b{0:02b} (3 is reserved)")]
    InvalidQos(u8),

    #[error("invalid topic name: {0}")]
    InvalidTopicName(&'static str),

    #[error("invalid topic filter {filter:?}: {reason}")]
    InvalidTopicFilter { filter: String, reason: &'static str },

    #[error("packet id must be in 1..=65535, got {0}")]
    InvalidPacketId(u16),

    #[error("remaining length did not match the bytes actually consumed")]
    UnexpectedRemainingLength,

    #[error("advertised string length exceeds the remaining frame budget")]
    TruncatedString,

    #[error("packet type is not legal in this direction ({0})")]
    UnsupportedDirection(&'static str),

    #[error("SUBSCRIBE payload must contain at least one topic filter")]
    EmptySubscribe,

    #[error("UNSUBSCRIBE payload must contain at least one topic filter")]
    EmptyUnsubscribe,

    #[error("invalid SUBACK return code 0x{0:x}")]
    InvalidReturnCode(u8),
}

impl DecoderError {
    pub fn code(&self) -> &'static str {
        match self {
            DecoderError::MalformedRemainingLength => codes::MALFORMED_REMAINING_LENGTH,
            DecoderError::MessageTooBig { .. } => codes::MESSAGE_TOO_BIG,
            DecoderError::UnexpectedProtocolName(_) => codes::UNEXPECTED_PROTOCOL_NAME,
            DecoderError::UnexpectedProtocolLevel(_) => codes::UNEXPECTED_PROTOCOL_LEVEL,
            DecoderError::InvalidFlags(_) => codes::INVALID_FLAGS,
            DecoderError::InvalidQos(_) => codes::INVALID_QOS,
            DecoderError::InvalidTopicName(_) => codes::INVALID_TOPIC_NAME,
            DecoderError::InvalidTopicFilter { .. } => codes::INVALID_TOPIC_FILTER,
            DecoderError::InvalidPacketId(_) => codes::INVALID_PACKET_ID,
            DecoderError::UnexpectedRemainingLength => codes::UNEXPECTED_REMAINING_LENGTH,
            DecoderError::TruncatedString => codes::TRUNCATED_STRING,
            DecoderError::UnsupportedDirection(_) => codes::UNSUPPORTED_DIRECTION,
            DecoderError::EmptySubscribe => codes::EMPTY_SUBSCRIBE,
            DecoderError::EmptyUnsubscribe => codes::EMPTY_UNSUBSCRIBE,
            DecoderError::InvalidReturnCode(_) => codes::INVALID_RETURN_CODE,
        }
    }
}

#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("packet fields are inconsistent with its type: {0}")]
    InconsistentPacket(&'static str),

    #[error("{0}")]
    Buffer(#[from] pipeline_core::PipelineError),
}

impl EncoderError {
    pub fn code(&self) -> &'static str {
        match self {
            EncoderError::InconsistentPacket(_) => codes::INCONSISTENT_PACKET,
            EncoderError::Buffer(_) => codes::BUFFER,
        }
    }
}

pub mod codes {
    pub const MALFORMED_REMAINING_LENGTH: &str = "mqtt.decode.malformed_remaining_length";
    pub const MESSAGE_TOO_BIG: &str = "mqtt.decode.message_too_big";
    pub const UNEXPECTED_PROTOCOL_NAME: &str = "mqtt.decode.unexpected_protocol_name";
    pub const UNEXPECTED_PROTOCOL_LEVEL: &str = "mqtt.decode.unexpected_protocol_level";
    pub const INVALID_FLAGS: &str = "mqtt.decode.invalid_flags";
    pub const INVALID_QOS: &str = "mqtt.decode.invalid_qos";
    pub const INVALID_TOPIC_NAME: &str = "mqtt.decode.invalid_topic_name";
    pub const INVALID_TOPIC_FILTER: &str = "mqtt.decode.invalid_topic_filter";
    pub const INVALID_PACKET_ID: &str = "mqtt.decode.invalid_packet_id";
    pub const UNEXPECTED_REMAINING_LENGTH: &str = "mqtt.decode.unexpected_remaining_length";
    pub const TRUNCATED_STRING: &str = "mqtt.decode.truncated_string";
    pub const UNSUPPORTED_DIRECTION: &str = "mqtt.decode.unsupported_direction";
    pub const EMPTY_SUBSCRIBE: &str = "mqtt.decode.empty_subscribe";
    pub const EMPTY_UNSUBSCRIBE: &str = "mqtt.decode.empty_unsubscribe";
    pub const INVALID_RETURN_CODE: &str = "mqtt.decode.invalid_return_code";
    pub const INCONSISTENT_PACKET: &str = "mqtt.encode.inconsistent_packet";
    pub const BUFFER: &str = "mqtt.encode.buffer";
}
