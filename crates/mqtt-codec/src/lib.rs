//! MQTT 3.1.1 control-packet codec: packet model, decoder and encoder
//! built on `pipeline-core`'s buffer and replaying streaming-decoder base.
//!
//! The only pipeline-facing surface is [`handler::MqttDecoderHandler`] and
//! [`handler::MqttEncoderHandler`] — everything else here is a pure,
//! `pipeline-core`-free codec that those two handlers drive.

pub mod decoder;
pub mod encoder;
pub mod error;
pub mod handler;
pub mod packet;
pub mod qos;
mod strings;
mod topic;
mod varint;

pub use decoder::{decode_packet, MqttFailure, Phase};
pub use encoder::{encode_packet, Encoded};
pub use error::{DecoderError, EncoderError};
pub use handler::{MqttDecoderHandler, MqttEncoderHandler};
pub use packet::{
    ConnAck, Connect, ConnectReturnCode, PacketId, Packet, Publish, SubAck, Subscribe,
    SubscribeRequest, Unsubscribe, Will,
};
pub use qos::{QoS, SubscribeReturnCode};
pub use topic::{validate_topic_filter, validate_topic_name};
