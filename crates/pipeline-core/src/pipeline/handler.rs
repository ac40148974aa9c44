//! Handler capability traits.
//!
//! Mirrors the three-way split Netty uses: a handler can
//! be purely inbound, purely outbound, or duplex (both). Rather than one
//! fat trait with optional methods, each direction gets its own trait with
//! default "forward to the next context" implementations, and a handler
//! registers as one of [`HandlerSlot`]'s three variants — the pipeline
//! only ever invokes the methods that variant actually owns.

use std::any::Any;

use super::context::Context;
use crate::error::PipelineError;

/// Events routed head→tail.
#[allow(unused_variables)]
pub trait InboundHandler: Send {
    fn channel_registered(&mut self, ctx: &mut Context) {
        ctx.fire_channel_registered();
    }

    fn channel_unregistered(&mut self, ctx: &mut Context) {
        ctx.fire_channel_unregistered();
    }

    fn channel_active(&mut self, ctx: &mut Context) {
        ctx.fire_channel_active();
    }

    fn channel_inactive(&mut self, ctx: &mut Context) {
        ctx.fire_channel_inactive();
    }

    fn channel_read(&mut self, ctx: &mut Context, msg: Message) {
        ctx.fire_channel_read(msg);
    }

    fn channel_read_complete(&mut self, ctx: &mut Context) {
        ctx.fire_channel_read_complete();
    }

    fn user_event_triggered(&mut self, ctx: &mut Context, evt: Box<dyn Any + Send>) {
        ctx.fire_user_event_triggered(evt);
    }

    /// A handler that does not re-fire this terminates propagation.
    fn exception_caught(&mut self, ctx: &mut Context, err: PipelineError) {
        ctx.fire_exception_caught(err);
    }
}

/// Events routed tail→head.
#[allow(unused_variables)]
pub trait OutboundHandler: Send {
    fn bind(&mut self, ctx: &mut Context, local_addr: String) {
        ctx.bind(local_addr);
    }

    fn connect(&mut self, ctx: &mut Context, remote_addr: String, local_addr: Option<String>) {
        ctx.connect(remote_addr, local_addr);
    }

    fn disconnect(&mut self, ctx: &mut Context) {
        ctx.disconnect();
    }

    fn close(&mut self, ctx: &mut Context) {
        ctx.close();
    }

    fn deregister(&mut self, ctx: &mut Context) {
        ctx.deregister();
    }

    /// Read demand, issued either by application code or by
    /// `auto_read`'s automatic re-arm after `channel_read_complete`.
    fn read(&mut self, ctx: &mut Context) {
        ctx.read();
    }

    fn write(&mut self, ctx: &mut Context, msg: Message) {
        ctx.write(msg);
    }

    fn flush(&mut self, ctx: &mut Context) {
        ctx.flush();
    }
}

/// A message flowing through the pipeline: either a ref-counted byte
/// buffer (the wire-level unit) or an opaque decoded/application object
/// (the packet-level unit once a codec has run). Keeping both under one
/// enum is what lets a single `channel_read`/`write` signature carry bytes
/// on one side of a codec and typed packets on the other.
pub enum Message {
    Buf(crate::buffer::ByteBuf),
    Packet(Box<dyn Any + Send>),
}

impl Message {
    pub fn buf(buf: crate::buffer::ByteBuf) -> Self {
        Message::Buf(buf)
    }

    pub fn packet<T: Any + Send>(value: T) -> Self {
        Message::Packet(Box::new(value))
    }

    pub fn downcast<T: Any + Send>(self) -> Result<T, Message> {
        match self {
            Message::Packet(boxed) => match boxed.downcast::<T>() {
                Ok(value) => Ok(*value),
                Err(boxed) => Err(Message::Packet(boxed)),
            },
            other => Err(other),
        }
    }

    /// The tail sentinel's default policy for anything that reaches it
    /// unconsumed: release ref-counted buffers, drop (and log) everything
    /// else.
    pub fn release_or_log(self, context: &str) {
        match self {
            Message::Buf(buf) => {
                buf.release();
            }
            Message::Packet(_) => {
                tracing::debug!(context, "message reached pipeline tail unconsumed");
            }
        }
    }
}

/// The three ways a handler may participate in the pipeline.
pub enum HandlerSlot {
    Inbound(Box<dyn InboundHandler>),
    Outbound(Box<dyn OutboundHandler>),
    Duplex(Box<dyn InboundHandler>, Box<dyn OutboundHandler>),
}

impl HandlerSlot {
    pub fn inbound_mut(&mut self) -> Option<&mut dyn InboundHandler> {
        match self {
            HandlerSlot::Inbound(h) => Some(h.as_mut()),
            HandlerSlot::Duplex(h, _) => Some(h.as_mut()),
            HandlerSlot::Outbound(_) => None,
        }
    }

    pub fn outbound_mut(&mut self) -> Option<&mut dyn OutboundHandler> {
        match self {
            HandlerSlot::Outbound(h) => Some(h.as_mut()),
            HandlerSlot::Duplex(_, h) => Some(h.as_mut()),
            HandlerSlot::Inbound(_) => None,
        }
    }
}
