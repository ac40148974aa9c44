//! Pipeline-level contract properties exercised through a real
//! [`EmbeddedChannel`] rather than unit-tested in isolation: ordering
//! across `add_before`/`add_after`/`replace`/`remove`, exception
//! propagation/absorption, ref-count conservation for buffers that pass
//! through untouched, and close/inactive ordering.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pipeline_core::{
    ByteBuf, ChannelConfig, ChannelState, Context, EmbeddedChannel, HandlerSlot, InboundHandler,
    Message, OutboundHandler, PipelineError,
};

struct Recorder {
    name: &'static str,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl InboundHandler for Recorder {
    fn channel_read(&mut self, ctx: &mut Context, msg: Message) {
        self.log.lock().unwrap().push(self.name);
        ctx.fire_channel_read(msg);
    }
}

#[test]
fn inbound_handlers_fire_in_head_to_tail_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let channel = EmbeddedChannel::new(
        ChannelConfig::default(),
        vec![
            ("a", HandlerSlot::Inbound(Box::new(Recorder { name: "a", log: Arc::clone(&log) }))),
            ("b", HandlerSlot::Inbound(Box::new(Recorder { name: "b", log: Arc::clone(&log) }))),
            ("c", HandlerSlot::Inbound(Box::new(Recorder { name: "c", log: Arc::clone(&log) }))),
        ],
    );
    channel.write_inbound(vec![Message::buf(ByteBuf::allocate(0))]);
    assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
}

#[test]
fn add_before_and_add_after_insert_at_the_expected_position() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let channel = EmbeddedChannel::new(
        ChannelConfig::default(),
        vec![("b", HandlerSlot::Inbound(Box::new(Recorder { name: "b", log: Arc::clone(&log) })))],
    );
    channel.pipeline().add_before(
        "b",
        "a",
        HandlerSlot::Inbound(Box::new(Recorder { name: "a", log: Arc::clone(&log) })),
    );
    channel.pipeline().add_after(
        "b",
        "c",
        HandlerSlot::Inbound(Box::new(Recorder { name: "c", log: Arc::clone(&log) })),
    );
    channel.write_inbound(vec![Message::buf(ByteBuf::allocate(0))]);
    assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
}

#[test]
fn removed_handler_is_skipped_by_later_dispatches() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let channel = EmbeddedChannel::new(
        ChannelConfig::default(),
        vec![
            ("a", HandlerSlot::Inbound(Box::new(Recorder { name: "a", log: Arc::clone(&log) }))),
            ("b", HandlerSlot::Inbound(Box::new(Recorder { name: "b", log: Arc::clone(&log) }))),
        ],
    );
    channel.pipeline().remove("a");
    channel.write_inbound(vec![Message::buf(ByteBuf::allocate(0))]);
    assert_eq!(*log.lock().unwrap(), vec!["b"]);
}

#[test]
fn replace_keeps_the_original_position_in_the_chain() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let channel = EmbeddedChannel::new(
        ChannelConfig::default(),
        vec![
            ("a", HandlerSlot::Inbound(Box::new(Recorder { name: "a", log: Arc::clone(&log) }))),
            ("b", HandlerSlot::Inbound(Box::new(Recorder { name: "b", log: Arc::clone(&log) }))),
            ("c", HandlerSlot::Inbound(Box::new(Recorder { name: "c", log: Arc::clone(&log) }))),
        ],
    );
    channel.pipeline().replace(
        "b",
        "b2",
        HandlerSlot::Inbound(Box::new(Recorder { name: "b2", log: Arc::clone(&log) })),
    );
    channel.write_inbound(vec![Message::buf(ByteBuf::allocate(0))]);
    assert_eq!(*log.lock().unwrap(), vec!["a", "b2", "c"]);
}

struct Absorber {
    caught: Arc<AtomicUsize>,
}
impl InboundHandler for Absorber {
    fn exception_caught(&mut self, _ctx: &mut Context, _err: PipelineError) {
        self.caught.fetch_add(1, Ordering::SeqCst);
    }
}

struct Thrower;
impl InboundHandler for Thrower {
    fn channel_read(&mut self, ctx: &mut Context, _msg: Message) {
        ctx.fire_exception_caught(PipelineError::RejectedTask);
    }
}

#[test]
fn a_handler_that_catches_an_exception_stops_it_from_propagating_further() {
    let caught = Arc::new(AtomicUsize::new(0));
    let channel = EmbeddedChannel::new(
        ChannelConfig::default(),
        vec![
            ("thrower", HandlerSlot::Inbound(Box::new(Thrower))),
            ("absorber", HandlerSlot::Inbound(Box::new(Absorber { caught: Arc::clone(&caught) }))),
        ],
    );
    channel.write_inbound(vec![Message::buf(ByteBuf::allocate(0))]);
    assert_eq!(caught.load(Ordering::SeqCst), 1);
}

#[test]
fn an_exception_with_no_downstream_handler_reaches_the_tail_without_panicking() {
    let channel = EmbeddedChannel::new(
        ChannelConfig::default(),
        vec![("thrower", HandlerSlot::Inbound(Box::new(Thrower)))],
    );
    channel.write_inbound(vec![Message::buf(ByteBuf::allocate(0))]);
}

struct PassThroughOutbound;
impl OutboundHandler for PassThroughOutbound {
    fn write(&mut self, ctx: &mut Context, msg: Message) {
        ctx.write(msg);
    }
}

#[test]
fn a_buffer_that_passes_through_untouched_handlers_keeps_its_refcount() {
    let channel = EmbeddedChannel::new(
        ChannelConfig::default(),
        vec![("noop", HandlerSlot::Outbound(Box::new(PassThroughOutbound)))],
    );
    let mut buf = ByteBuf::allocate(4);
    buf.write_bytes(b"data").unwrap();
    let before = buf.ref_count();
    channel.write_outbound(vec![Message::buf(buf)]);
    let out = channel.read_outbound().expect("buffer reached the transport");
    assert_eq!(out.ref_count(), before);
    assert_eq!(out.peek_readable(), b"data");
}

#[test]
fn closing_the_channel_transitions_it_to_inactive() {
    let channel = EmbeddedChannel::new(ChannelConfig::default(), vec![]);
    assert_eq!(channel.channel().state(), ChannelState::Active);
    channel.finish();
    assert_eq!(channel.channel().state(), ChannelState::Inactive);
}

#[test]
fn a_message_that_reaches_the_tail_unconsumed_is_released_not_leaked() {
    // No handler captures channel_read here, so the default embedded-tail
    // capture handler absorbs it; this just asserts write_inbound reports
    // something arrived, proving release_or_log's policy didn't panic on
    // a bare ByteBuf with no handler at all installed.
    let channel = EmbeddedChannel::new(ChannelConfig::default(), vec![]);
    let mut buf = ByteBuf::allocate(1);
    buf.write_byte(7).unwrap();
    assert!(channel.write_inbound(vec![Message::buf(buf)]));
}
