//! A handler's view of its position in the pipeline — an invoker, in the
//! same spirit as Netty's `ChannelHandlerContext`.

use std::any::Any;

use super::channel::Channel;
use super::handler::Message;
use super::{
    dispatch_inbound_active, dispatch_inbound_exception, dispatch_inbound_inactive,
    dispatch_inbound_read, dispatch_inbound_read_complete, dispatch_inbound_registered,
    dispatch_inbound_unregistered, dispatch_inbound_user_event, dispatch_outbound_bind,
    dispatch_outbound_close, dispatch_outbound_connect, dispatch_outbound_deregister,
    dispatch_outbound_disconnect, dispatch_outbound_flush, dispatch_outbound_read,
    dispatch_outbound_write, Pipeline,
};
use crate::error::PipelineError;

/// Handed to every handler callback. `fire_*` continues an inbound event
/// to the next eligible handler after this one; the plain outbound
/// operations (`write`, `flush`, `close`, ...) continue toward the head.
pub struct Context {
    pipeline: Pipeline,
    index: usize,
}

impl Context {
    pub(crate) fn new(pipeline: Pipeline, index: usize) -> Context {
        Context { pipeline, index }
    }

    pub fn channel(&self) -> Channel {
        self.pipeline.channel_handle()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    fn trampoline(&self, f: impl FnOnce() + Send + 'static) {
        self.pipeline.trampoline(f);
    }

    pub fn fire_channel_registered(&mut self) {
        let (pipeline, from) = (self.pipeline.clone(), Some(self.index));
        self.trampoline(move || dispatch_inbound_registered(&pipeline, from));
    }

    pub fn fire_channel_unregistered(&mut self) {
        let (pipeline, from) = (self.pipeline.clone(), Some(self.index));
        self.trampoline(move || dispatch_inbound_unregistered(&pipeline, from));
    }

    pub fn fire_channel_active(&mut self) {
        let (pipeline, from) = (self.pipeline.clone(), Some(self.index));
        self.trampoline(move || dispatch_inbound_active(&pipeline, from));
    }

    pub fn fire_channel_inactive(&mut self) {
        let (pipeline, from) = (self.pipeline.clone(), Some(self.index));
        self.trampoline(move || dispatch_inbound_inactive(&pipeline, from));
    }

    pub fn fire_channel_read(&mut self, msg: Message) {
        let (pipeline, from) = (self.pipeline.clone(), Some(self.index));
        self.trampoline(move || dispatch_inbound_read(&pipeline, from, msg));
    }

    pub fn fire_channel_read_complete(&mut self) {
        let (pipeline, from) = (self.pipeline.clone(), Some(self.index));
        self.trampoline(move || dispatch_inbound_read_complete(&pipeline, from));
    }

    pub fn fire_user_event_triggered(&mut self, evt: Box<dyn Any + Send>) {
        let (pipeline, from) = (self.pipeline.clone(), Some(self.index));
        self.trampoline(move || dispatch_inbound_user_event(&pipeline, from, evt));
    }

    /// A handler that does not call this absorbs the exception, ending
    /// propagation.
    pub fn fire_exception_caught(&mut self, err: PipelineError) {
        let (pipeline, from) = (self.pipeline.clone(), Some(self.index));
        self.trampoline(move || dispatch_inbound_exception(&pipeline, from, err));
    }

    pub fn bind(&mut self, local_addr: String) {
        let (pipeline, from) = (self.pipeline.clone(), Some(self.index));
        self.trampoline(move || dispatch_outbound_bind(&pipeline, from, local_addr));
    }

    pub fn connect(&mut self, remote_addr: String, local_addr: Option<String>) {
        let (pipeline, from) = (self.pipeline.clone(), Some(self.index));
        self.trampoline(move || dispatch_outbound_connect(&pipeline, from, remote_addr, local_addr));
    }

    pub fn disconnect(&mut self) {
        let (pipeline, from) = (self.pipeline.clone(), Some(self.index));
        self.trampoline(move || dispatch_outbound_disconnect(&pipeline, from));
    }

    pub fn close(&mut self) {
        let (pipeline, from) = (self.pipeline.clone(), Some(self.index));
        self.trampoline(move || dispatch_outbound_close(&pipeline, from));
    }

    pub fn deregister(&mut self) {
        let (pipeline, from) = (self.pipeline.clone(), Some(self.index));
        self.trampoline(move || dispatch_outbound_deregister(&pipeline, from));
    }

    pub fn read(&mut self) {
        let (pipeline, from) = (self.pipeline.clone(), Some(self.index));
        self.trampoline(move || dispatch_outbound_read(&pipeline, from));
    }

    pub fn write(&mut self, msg: Message) {
        let (pipeline, from) = (self.pipeline.clone(), Some(self.index));
        self.trampoline(move || dispatch_outbound_write(&pipeline, from, msg));
    }

    pub fn flush(&mut self) {
        let (pipeline, from) = (self.pipeline.clone(), Some(self.index));
        self.trampoline(move || dispatch_outbound_flush(&pipeline, from));
    }

    pub fn write_and_flush(&mut self, msg: Message) {
        let (pipeline, from) = (self.pipeline.clone(), Some(self.index));
        self.trampoline(move || {
            dispatch_outbound_write(&pipeline, from, msg);
            dispatch_outbound_flush(&pipeline, from);
        });
    }
}
