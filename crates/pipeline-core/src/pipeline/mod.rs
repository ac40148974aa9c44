//! Ordered, bidirectional handler chain.
//!
//! Represented as an arena (`Vec<Slot>`) addressed by index rather than by
//! owning pointers in both directions: each slot stores its neighbors as
//! small integers instead of `prev`/`next` smart pointers, which sidesteps
//! the aliasing problems a doubly-linked list of boxes would run into in
//! safe Rust. Removed slots are tombstoned rather than physically removed
//! so indices handed out to in-flight `Context`s never dangle.

pub mod channel;
pub mod context;
pub mod handler;

use std::sync::Arc;

use parking_lot::Mutex;

use self::channel::ChannelShared;
pub use self::channel::{Channel, ChannelConfig, ChannelState, DuplexTransport};
pub use self::context::Context;
pub use self::handler::{HandlerSlot, InboundHandler, Message, OutboundHandler};

use crate::error::PipelineError;

pub(crate) struct Slot {
    name: String,
    handler: Arc<Mutex<HandlerSlot>>,
    prev: Option<usize>,
    next: Option<usize>,
    removed: bool,
}

struct PipelineData {
    channel: Arc<ChannelShared>,
    slots: Mutex<Vec<Slot>>,
    head: Mutex<Option<usize>>,
    tail: Mutex<Option<usize>>,
}

/// Cheap, `Clone`-able handle to one channel's handler chain. Every
/// `Context` handed to a handler carries one of these plus the index of
/// the slot it represents.
#[derive(Clone)]
pub struct Pipeline {
    data: Arc<PipelineData>,
}

impl Pipeline {
    pub(crate) fn new(channel: Arc<ChannelShared>) -> Pipeline {
        Pipeline {
            data: Arc::new(PipelineData {
                channel,
                slots: Mutex::new(Vec::new()),
                head: Mutex::new(None),
                tail: Mutex::new(None),
            }),
        }
    }

    fn channel_handle(&self) -> Channel {
        Channel {
            shared: Arc::clone(&self.data.channel),
            pipeline: self.clone(),
        }
    }

    fn find(&self, name: &str) -> Option<usize> {
        let slots = self.data.slots.lock();
        slots.iter().position(|s| !s.removed && s.name == name)
    }

    pub fn add_first(&self, name: impl Into<String>, slot: HandlerSlot) {
        let name = name.into();
        let mut slots = self.data.slots.lock();
        let idx = slots.len();
        let mut head = self.data.head.lock();
        slots.push(Slot { name, handler: Arc::new(Mutex::new(slot)), prev: None, next: *head, removed: false });
        if let Some(old_head) = *head {
            slots[old_head].prev = Some(idx);
        }
        *head = Some(idx);
        let mut tail = self.data.tail.lock();
        if tail.is_none() {
            *tail = Some(idx);
        }
    }

    pub fn add_last(&self, name: impl Into<String>, slot: HandlerSlot) {
        let name = name.into();
        let mut slots = self.data.slots.lock();
        let idx = slots.len();
        let mut tail = self.data.tail.lock();
        slots.push(Slot { name, handler: Arc::new(Mutex::new(slot)), prev: *tail, next: None, removed: false });
        if let Some(old_tail) = *tail {
            slots[old_tail].next = Some(idx);
        }
        *tail = Some(idx);
        let mut head = self.data.head.lock();
        if head.is_none() {
            *head = Some(idx);
        }
    }

    pub fn add_before(&self, target: &str, name: impl Into<String>, slot: HandlerSlot) {
        let Some(target_idx) = self.find(target) else {
            tracing::warn!(target, "add_before: no such handler");
            return;
        };
        let name = name.into();
        let mut slots = self.data.slots.lock();
        let idx = slots.len();
        let prev = slots[target_idx].prev;
        slots.push(Slot { name, handler: Arc::new(Mutex::new(slot)), prev, next: Some(target_idx), removed: false });
        slots[target_idx].prev = Some(idx);
        match prev {
            Some(p) => slots[p].next = Some(idx),
            None => *self.data.head.lock() = Some(idx),
        }
    }

    pub fn add_after(&self, target: &str, name: impl Into<String>, slot: HandlerSlot) {
        let Some(target_idx) = self.find(target) else {
            tracing::warn!(target, "add_after: no such handler");
            return;
        };
        let name = name.into();
        let mut slots = self.data.slots.lock();
        let idx = slots.len();
        let next = slots[target_idx].next;
        slots.push(Slot { name, handler: Arc::new(Mutex::new(slot)), prev: Some(target_idx), next, removed: false });
        slots[target_idx].next = Some(idx);
        match next {
            Some(n) => slots[n].prev = Some(idx),
            None => *self.data.tail.lock() = Some(idx),
        }
    }

    pub fn remove(&self, name: &str) {
        let Some(idx) = self.find(name) else {
            return;
        };
        let mut slots = self.data.slots.lock();
        let (prev, next) = (slots[idx].prev, slots[idx].next);
        slots[idx].removed = true;
        match prev {
            Some(p) => slots[p].next = next,
            None => *self.data.head.lock() = next,
        }
        match next {
            Some(n) => slots[n].prev = prev,
            None => *self.data.tail.lock() = prev,
        }
    }

    /// Replaces a handler in place, keeping its position in the chain.
    pub fn replace(&self, old_name: &str, new_name: impl Into<String>, new_slot: HandlerSlot) {
        let Some(idx) = self.find(old_name) else {
            tracing::warn!(old_name, "replace: no such handler");
            return;
        };
        let mut slots = self.data.slots.lock();
        slots[idx].name = new_name.into();
        slots[idx].handler = Arc::new(Mutex::new(new_slot));
    }

    fn next_inbound(&self, from: Option<usize>) -> Option<(usize, Arc<Mutex<HandlerSlot>>)> {
        let slots = self.data.slots.lock();
        let mut cursor = match from {
            Some(idx) => slots[idx].next,
            None => *self.data.head.lock(),
        };
        while let Some(idx) = cursor {
            let slot = &slots[idx];
            if !slot.removed {
                let mut guard = slot.handler.lock();
                if guard.inbound_mut().is_some() {
                    drop(guard);
                    return Some((idx, Arc::clone(&slot.handler)));
                }
            }
            cursor = slot.next;
        }
        None
    }

    fn next_outbound(&self, from: Option<usize>) -> Option<(usize, Arc<Mutex<HandlerSlot>>)> {
        let slots = self.data.slots.lock();
        let mut cursor = match from {
            Some(idx) => slots[idx].prev,
            None => *self.data.tail.lock(),
        };
        while let Some(idx) = cursor {
            let slot = &slots[idx];
            if !slot.removed {
                let guard = slot.handler.lock();
                if guard.outbound_mut().is_some() {
                    drop(guard);
                    return Some((idx, Arc::clone(&slot.handler)));
                }
            }
            cursor = slot.prev;
        }
        None
    }

    fn in_event_loop(&self) -> bool {
        self.data.channel.event_loop.in_event_loop()
    }

    fn trampoline(&self, f: impl FnOnce() + Send + 'static) {
        if self.in_event_loop() {
            f();
        } else if let Err(err) = self.data.channel.event_loop.submit(Box::new(f)) {
            tracing::warn!(?err, "dropped pipeline event: event loop rejected trampolined task");
        }
    }

    // --- inbound entry points, invoked by whatever drives the channel ---

    pub fn fire_channel_registered(&self) {
        let pipeline = self.clone();
        self.trampoline(move || dispatch_inbound_registered(&pipeline, None));
    }

    pub fn fire_channel_unregistered(&self) {
        let pipeline = self.clone();
        self.trampoline(move || dispatch_inbound_unregistered(&pipeline, None));
    }

    pub fn fire_channel_active(&self) {
        let pipeline = self.clone();
        self.trampoline(move || dispatch_inbound_active(&pipeline, None));
    }

    pub fn fire_channel_inactive(&self) {
        let pipeline = self.clone();
        self.trampoline(move || dispatch_inbound_inactive(&pipeline, None));
    }

    pub fn fire_channel_read(&self, msg: Message) {
        let pipeline = self.clone();
        self.trampoline(move || dispatch_inbound_read(&pipeline, None, msg));
    }

    pub fn fire_channel_read_complete(&self) {
        let pipeline = self.clone();
        self.trampoline(move || dispatch_inbound_read_complete(&pipeline, None));
    }

    pub fn fire_user_event_triggered(&self, evt: Box<dyn std::any::Any + Send>) {
        let pipeline = self.clone();
        self.trampoline(move || dispatch_inbound_user_event(&pipeline, None, evt));
    }

    pub fn fire_exception_caught(&self, err: PipelineError) {
        let pipeline = self.clone();
        self.trampoline(move || dispatch_inbound_exception(&pipeline, None, err));
    }

    // --- outbound entry points ---

    pub fn write(&self, msg: Message) {
        let pipeline = self.clone();
        self.trampoline(move || dispatch_outbound_write(&pipeline, None, msg));
    }

    pub fn flush(&self) {
        let pipeline = self.clone();
        self.trampoline(move || dispatch_outbound_flush(&pipeline, None));
    }

    pub fn write_and_flush(&self, msg: Message) {
        let pipeline = self.clone();
        self.trampoline(move || {
            dispatch_outbound_write(&pipeline, None, msg);
            dispatch_outbound_flush(&pipeline, None);
        });
    }

    pub fn close(&self) {
        let pipeline = self.clone();
        self.trampoline(move || dispatch_outbound_close(&pipeline, None));
    }

    pub fn read(&self) {
        let pipeline = self.clone();
        self.trampoline(move || dispatch_outbound_read(&pipeline, None));
    }
}

// Free functions rather than recursive `Context` methods: each call looks
// up the next eligible slot fresh, so a handler that never forwards simply
// stops the chain instead of needing special-cased early returns.

pub(crate) fn dispatch_inbound_registered(pipeline: &Pipeline, from: Option<usize>) {
    match pipeline.next_inbound(from) {
        Some((idx, handler)) => {
            let mut ctx = Context::new(pipeline.clone(), idx);
            handler.lock().inbound_mut().unwrap().channel_registered(&mut ctx);
        }
        None => {}
    }
}

pub(crate) fn dispatch_inbound_unregistered(pipeline: &Pipeline, from: Option<usize>) {
    if let Some((idx, handler)) = pipeline.next_inbound(from) {
        let mut ctx = Context::new(pipeline.clone(), idx);
        handler.lock().inbound_mut().unwrap().channel_unregistered(&mut ctx);
    }
}

pub(crate) fn dispatch_inbound_active(pipeline: &Pipeline, from: Option<usize>) {
    if let Some((idx, handler)) = pipeline.next_inbound(from) {
        let mut ctx = Context::new(pipeline.clone(), idx);
        handler.lock().inbound_mut().unwrap().channel_active(&mut ctx);
    } else {
        pipeline.channel_handle().set_state(ChannelState::Active);
    }
}

pub(crate) fn dispatch_inbound_inactive(pipeline: &Pipeline, from: Option<usize>) {
    if let Some((idx, handler)) = pipeline.next_inbound(from) {
        let mut ctx = Context::new(pipeline.clone(), idx);
        handler.lock().inbound_mut().unwrap().channel_inactive(&mut ctx);
    } else {
        pipeline.channel_handle().set_state(ChannelState::Inactive);
    }
}

pub(crate) fn dispatch_inbound_read(pipeline: &Pipeline, from: Option<usize>, msg: Message) {
    match pipeline.next_inbound(from) {
        Some((idx, handler)) => {
            let mut ctx = Context::new(pipeline.clone(), idx);
            handler.lock().inbound_mut().unwrap().channel_read(&mut ctx, msg);
        }
        None => msg.release_or_log("pipeline tail"),
    }
}

pub(crate) fn dispatch_inbound_read_complete(pipeline: &Pipeline, from: Option<usize>) {
    if let Some((idx, handler)) = pipeline.next_inbound(from) {
        let mut ctx = Context::new(pipeline.clone(), idx);
        handler.lock().inbound_mut().unwrap().channel_read_complete(&mut ctx);
        return;
    }
    if pipeline.channel_handle().config().auto_read {
        dispatch_outbound_read(pipeline, None);
    }
}

pub(crate) fn dispatch_inbound_user_event(pipeline: &Pipeline, from: Option<usize>, evt: Box<dyn std::any::Any + Send>) {
    if let Some((idx, handler)) = pipeline.next_inbound(from) {
        let mut ctx = Context::new(pipeline.clone(), idx);
        handler.lock().inbound_mut().unwrap().user_event_triggered(&mut ctx, evt);
    }
}

pub(crate) fn dispatch_inbound_exception(pipeline: &Pipeline, from: Option<usize>, err: PipelineError) {
    match pipeline.next_inbound(from) {
        Some((idx, handler)) => {
            let mut ctx = Context::new(pipeline.clone(), idx);
            handler.lock().inbound_mut().unwrap().exception_caught(&mut ctx, err);
        }
        None => tracing::error!(error = %err, "exception reached pipeline tail unhandled"),
    }
}

pub(crate) fn dispatch_outbound_write(pipeline: &Pipeline, from: Option<usize>, msg: Message) {
    match pipeline.next_outbound(from) {
        Some((idx, handler)) => {
            let mut ctx = Context::new(pipeline.clone(), idx);
            handler.lock().outbound_mut().unwrap().write(&mut ctx, msg);
        }
        None => {
            let channel = pipeline.channel_handle();
            if let Message::Buf(buf) = msg {
                if let Err(err) = channel.shared.transport.lock().write(buf) {
                    dispatch_inbound_exception(pipeline, None, err);
                }
            } else {
                tracing::warn!("non-buffer message reached transport head without an encoder handler");
            }
        }
    }
}

pub(crate) fn dispatch_outbound_flush(pipeline: &Pipeline, from: Option<usize>) {
    match pipeline.next_outbound(from) {
        Some((idx, handler)) => {
            let mut ctx = Context::new(pipeline.clone(), idx);
            handler.lock().outbound_mut().unwrap().flush(&mut ctx);
        }
        None => {
            let channel = pipeline.channel_handle();
            if let Err(err) = channel.shared.transport.lock().flush() {
                dispatch_inbound_exception(pipeline, None, err);
            }
        }
    }
}

pub(crate) fn dispatch_outbound_close(pipeline: &Pipeline, from: Option<usize>) {
    match pipeline.next_outbound(from) {
        Some((idx, handler)) => {
            let mut ctx = Context::new(pipeline.clone(), idx);
            handler.lock().outbound_mut().unwrap().close(&mut ctx);
        }
        None => {
            let channel = pipeline.channel_handle();
            let _ = channel.shared.transport.lock().close();
            channel.set_state(ChannelState::Inactive);
            dispatch_inbound_inactive(pipeline, None);
        }
    }
}

pub(crate) fn dispatch_outbound_read(pipeline: &Pipeline, from: Option<usize>) {
    if let Some((idx, handler)) = pipeline.next_outbound(from) {
        let mut ctx = Context::new(pipeline.clone(), idx);
        handler.lock().outbound_mut().unwrap().read(&mut ctx);
    }
}

pub(crate) fn dispatch_outbound_bind(pipeline: &Pipeline, from: Option<usize>, addr: String) {
    if let Some((idx, handler)) = pipeline.next_outbound(from) {
        let mut ctx = Context::new(pipeline.clone(), idx);
        handler.lock().outbound_mut().unwrap().bind(&mut ctx, addr);
    } else {
        pipeline.channel_handle().set_state(ChannelState::Registered);
    }
}

pub(crate) fn dispatch_outbound_connect(pipeline: &Pipeline, from: Option<usize>, remote: String, local: Option<String>) {
    if let Some((idx, handler)) = pipeline.next_outbound(from) {
        let mut ctx = Context::new(pipeline.clone(), idx);
        handler.lock().outbound_mut().unwrap().connect(&mut ctx, remote, local);
    } else {
        dispatch_inbound_active(pipeline, None);
    }
}

pub(crate) fn dispatch_outbound_disconnect(pipeline: &Pipeline, from: Option<usize>) {
    if let Some((idx, handler)) = pipeline.next_outbound(from) {
        let mut ctx = Context::new(pipeline.clone(), idx);
        handler.lock().outbound_mut().unwrap().disconnect(&mut ctx);
    } else {
        dispatch_outbound_close(pipeline, None);
    }
}

pub(crate) fn dispatch_outbound_deregister(pipeline: &Pipeline, from: Option<usize>) {
    if let Some((idx, handler)) = pipeline.next_outbound(from) {
        let mut ctx = Context::new(pipeline.clone(), idx);
        handler.lock().outbound_mut().unwrap().deregister(&mut ctx);
    } else {
        dispatch_inbound_unregistered(pipeline, None);
    }
}
