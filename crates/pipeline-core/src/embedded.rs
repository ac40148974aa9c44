//! Synchronous in-memory test channel.
//!
//! An inbox you feed directly and an outbox you drain, without any real
//! I/O. The embedded channel wires that transport
//! underneath a real [`Channel`]/[`Pipeline`]/[`EventLoop`], so it drives
//! production handler code exactly as a live socket would — the only
//! difference is that nothing happens until a test calls `run_pending_tasks`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::buffer::ByteBuf;
use crate::error::Result;
use crate::event_loop::EventLoop;
use crate::pipeline::channel::DuplexTransport;
use crate::pipeline::{Channel, ChannelConfig, Context, HandlerSlot, InboundHandler, Message, Pipeline};

struct EmbeddedTransport {
    outbound_ready: Arc<Mutex<VecDeque<ByteBuf>>>,
}

impl DuplexTransport for EmbeddedTransport {
    fn write(&mut self, buf: ByteBuf) -> Result<()> {
        self.outbound_ready.lock().push_back(buf);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn local_addr(&self) -> Option<String> {
        Some("embedded".to_string())
    }

    fn peer_addr(&self) -> Option<String> {
        Some("embedded".to_string())
    }
}

/// Absorbs whatever reaches the true tail of the pipeline into a queue
/// `read_inbound` can drain, instead of the default release-or-log policy.
struct CaptureHandler {
    captured: Arc<Mutex<VecDeque<Message>>>,
}

impl InboundHandler for CaptureHandler {
    fn channel_read(&mut self, _ctx: &mut Context, msg: Message) {
        self.captured.lock().push_back(msg);
    }
}

/// A channel whose transport is two in-memory queues. Identity is the
/// fixed short/long text "embedded".
pub struct EmbeddedChannel {
    channel: Channel,
    inbound_captured: Arc<Mutex<VecDeque<Message>>>,
    outbound_ready: Arc<Mutex<VecDeque<ByteBuf>>>,
}

impl EmbeddedChannel {
    /// Builds a channel with `handlers` installed in order (head to tail),
    /// then synchronously fires `channel_registered`/`channel_active` —
    /// matching Netty's `EmbeddedChannel`, which is "live" the moment
    /// it's constructed.
    pub fn new(config: ChannelConfig, handlers: Vec<(&str, HandlerSlot)>) -> EmbeddedChannel {
        let event_loop = EventLoop::new();
        let outbound_ready = Arc::new(Mutex::new(VecDeque::new()));
        let inbound_captured = Arc::new(Mutex::new(VecDeque::new()));
        let transport = EmbeddedTransport { outbound_ready: Arc::clone(&outbound_ready) };
        let channel = Channel::new("embedded", config, event_loop, Box::new(transport));

        for (name, slot) in handlers {
            channel.pipeline().add_last(name.to_string(), slot);
        }
        channel.pipeline().add_last(
            "__embedded_capture",
            HandlerSlot::Inbound(Box::new(CaptureHandler { captured: Arc::clone(&inbound_captured) })),
        );

        channel.pipeline().fire_channel_registered();
        channel.pipeline().fire_channel_active();

        let embedded = EmbeddedChannel { channel, inbound_captured, outbound_ready };
        embedded.run_pending_tasks();
        embedded
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn pipeline(&self) -> &Pipeline {
        self.channel.pipeline()
    }

    /// Feeds `msgs` into the inbound side of the pipeline as though a
    /// transport had just read them, then runs pending tasks. Returns
    /// whether anything is now available via `read_inbound`.
    pub fn write_inbound(&self, msgs: Vec<Message>) -> bool {
        for msg in msgs {
            self.channel.pipeline().fire_channel_read(msg);
        }
        self.channel.pipeline().fire_channel_read_complete();
        self.run_pending_tasks();
        !self.inbound_captured.lock().is_empty()
    }

    /// Writes `msgs` out through the pipeline as though application code
    /// had called `write`, then flushes. Returns whether anything is now
    /// available via `read_outbound`.
    pub fn write_outbound(&self, msgs: Vec<Message>) -> bool {
        for msg in msgs {
            self.channel.pipeline().write(msg);
        }
        self.channel.pipeline().flush();
        self.run_pending_tasks();
        !self.outbound_ready.lock().is_empty()
    }

    pub fn read_inbound(&self) -> Option<Message> {
        self.inbound_captured.lock().pop_front()
    }

    pub fn read_outbound(&self) -> Option<ByteBuf> {
        self.outbound_ready.lock().pop_front()
    }

    /// Closes the channel and drains pending tasks. Returns whether either
    /// queue still has unread content.
    pub fn finish(&self) -> bool {
        self.channel.pipeline().close();
        self.run_pending_tasks();
        !self.inbound_captured.lock().is_empty() || !self.outbound_ready.lock().is_empty()
    }

    pub fn run_pending_tasks(&self) {
        self.channel.event_loop().run_tasks();
    }

    pub fn run_scheduled_pending_tasks(&self, now: Instant) -> Option<Instant> {
        self.channel.event_loop().run_scheduled_tasks(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{HandlerSlot, InboundHandler, OutboundHandler};

    struct Echo;
    impl InboundHandler for Echo {
        fn channel_read(&mut self, ctx: &mut Context, msg: Message) {
            ctx.write_and_flush(msg);
        }
    }

    #[test]
    fn echo_handler_round_trips_through_outbound_queue() {
        let channel = EmbeddedChannel::new(
            ChannelConfig::default(),
            vec![("echo", HandlerSlot::Inbound(Box::new(Echo)))],
        );
        let mut buf = ByteBuf::allocate(4);
        buf.write_bytes(b"ping").unwrap();
        assert!(channel.write_inbound(vec![Message::buf(buf)]));
        let out = channel.read_outbound().expect("echoed buffer");
        assert_eq!(out.peek_readable(), b"ping");
    }

    struct ReadDemandCounter {
        count: Arc<std::sync::atomic::AtomicUsize>,
    }
    impl OutboundHandler for ReadDemandCounter {
        fn read(&mut self, ctx: &mut Context) {
            self.count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            ctx.read();
        }
    }
    /// Issues a write, then an explicit read demand, in response to each
    /// inbound message — the behavior a handler resuming its own flow
    /// control after a write would implement by hand with `auto_read` off.
    struct WriteThenReadOnce;
    impl InboundHandler for WriteThenReadOnce {
        fn channel_read(&mut self, ctx: &mut Context, _msg: Message) {
            ctx.write_and_flush(Message::buf(ByteBuf::allocate(0)));
            ctx.read();
        }
    }

    #[test]
    fn auto_read_false_still_rearms_exactly_once_per_round_trip() {
        let mut config = ChannelConfig::default();
        config.auto_read = false;
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let channel = EmbeddedChannel::new(
            config,
            vec![
                ("counter", HandlerSlot::Outbound(Box::new(ReadDemandCounter { count: Arc::clone(&count) }))),
                ("writer", HandlerSlot::Inbound(Box::new(WriteThenReadOnce))),
            ],
        );
        channel.write_inbound(vec![Message::buf(ByteBuf::allocate(0))]);
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
        channel.write_inbound(vec![Message::buf(ByteBuf::allocate(0))]);
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
