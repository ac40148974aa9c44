//! Wires the decoder/encoder into a channel pipeline as an ordinary pair
//! of duplex handlers: bytes flow in on one side of a codec handler,
//! typed packets flow out the other.

use pipeline_core::{ByteBuf, Context, InboundHandler, Message, OutboundHandler, PipelineError, ReplayState};

use crate::decoder::{self, Phase};
use crate::encoder::{self, Encoded};

const INITIAL_CUMULATION_CAPACITY: usize = 4096;

/// Accumulates inbound bytes and emits decoded [`crate::packet::Packet`]
/// values as `Message::Packet` for handlers further down the pipeline.
///
/// Mirrors Netty's `ByteToMessageDecoder` cumulation strategy: as long as
/// one `channel_read` delivers a whole frame (the common case), decoding
/// runs directly against the buffer the caller handed in, with no extra
/// copy — the PUBLISH payload slice this produces shares storage with
/// that same input buffer. Only when a frame spans more than one
/// `channel_read` call does a `cumulation` buffer get allocated to merge
/// the carried-over tail with the next chunk.
pub struct MqttDecoderHandler {
    state: ReplayState<Phase>,
    cumulation: Option<ByteBuf>,
}

impl MqttDecoderHandler {
    pub fn new() -> Self {
        MqttDecoderHandler { state: ReplayState::new(Phase::FixedHeader), cumulation: None }
    }

    /// Merges a carried-over `existing` buffer (its reader cursor already
    /// sits at the last checkpoint) with the newly arrived `incoming`
    /// bytes into one fresh buffer, re-checkpointing at its start.
    fn merge(&mut self, ctx: &Context, existing: ByteBuf, incoming: ByteBuf) -> ByteBuf {
        let unread = existing.peek_readable();
        let incoming_bytes = incoming.peek_readable();
        let mut fresh = ctx
            .channel()
            .config()
            .allocator
            .allocate((unread.len() + incoming_bytes.len()).max(INITIAL_CUMULATION_CAPACITY));
        fresh.write_bytes(&unread).expect("freshly sized for unread + incoming");
        fresh.write_bytes(&incoming_bytes).expect("freshly sized for unread + incoming");
        existing.release();
        incoming.release();
        self.state.checkpoint(&fresh, self.state.state());
        fresh
    }

    fn drain(&mut self, ctx: &mut Context, buf: &mut ByteBuf) {
        let is_server = ctx.channel().config().is_server;
        let max_message_size = ctx.channel().config().max_message_size;
        loop {
            let outcome = pipeline_core::replay_decode(buf, &mut self.state, |b, state| {
                decoder::decode_packet(b, state, is_server, max_message_size)
            });
            match outcome {
                None => break,
                Some(Ok(packet)) => {
                    self.state.checkpoint(buf, Phase::FixedHeader);
                    ctx.fire_channel_read(Message::packet(packet));
                }
                Some(Err(failure)) => {
                    self.state.checkpoint(buf, Phase::BadMessage);
                    if let Some(connack) = failure.connack {
                        let allocator = ctx.channel().config().allocator.clone();
                        match encoder::encode_packet(&crate::packet::Packet::ConnAck(connack), allocator.as_ref()) {
                            Ok(Encoded::Single(connack_buf)) => ctx.write_and_flush(Message::buf(connack_buf)),
                            Ok(Encoded::Publish(..)) => unreachable!("CONNACK never encodes as Encoded::Publish"),
                            Err(err) => tracing::warn!(%err, "failed to encode refusal CONNACK"),
                        }
                    }
                    ctx.fire_exception_caught(PipelineError::Codec(Box::new(failure.error)));
                    break;
                }
            }
        }
    }
}

impl Default for MqttDecoderHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl InboundHandler for MqttDecoderHandler {
    fn channel_read(&mut self, ctx: &mut Context, msg: Message) {
        let Message::Buf(incoming) = msg else {
            tracing::warn!("mqtt decoder received a non-buffer message; dropping it unconsumed");
            return;
        };
        let mut buf = match self.cumulation.take() {
            Some(existing) => self.merge(ctx, existing, incoming),
            None => incoming,
        };
        self.drain(ctx, &mut buf);
        if buf.readable_bytes() > 0 {
            self.cumulation = Some(buf);
        } else {
            buf.release();
        }
    }
}

/// Encodes `Message::Packet(Packet)` values written from above into wire
/// bytes. Stateless: each packet's length is computed and written in one
/// pass, so no buffering is needed between calls.
pub struct MqttEncoderHandler;

impl OutboundHandler for MqttEncoderHandler {
    fn write(&mut self, ctx: &mut Context, msg: Message) {
        let packet = match msg.downcast::<crate::packet::Packet>() {
            Ok(packet) => packet,
            Err(Message::Buf(buf)) => {
                ctx.write(Message::Buf(buf));
                return;
            }
            Err(_) => {
                tracing::warn!("mqtt encoder received a message of an unexpected type; dropping it");
                return;
            }
        };

        let allocator = ctx.channel().config().allocator.clone();
        match encoder::encode_packet(&packet, allocator.as_ref()) {
            Ok(Encoded::Single(buf)) => ctx.write(Message::buf(buf)),
            Ok(Encoded::Publish(header, payload)) => {
                ctx.write(Message::buf(header));
                ctx.write(Message::buf(payload));
            }
            Err(err) => {
                ctx.fire_exception_caught(PipelineError::Codec(Box::new(err)));
            }
        }
    }
}
