//! Event-driven channel pipeline core: ref-counted buffers, a cooperative
//! event loop, a handler pipeline, a replaying streaming-decoder base, and
//! a synchronous embedded test channel.
//!
//! This crate is protocol-agnostic; the `mqtt-codec` crate plugs a
//! concrete wire codec into the pipeline built here.

pub mod buffer;
pub mod embedded;
pub mod error;
pub mod event_loop;
pub mod pipeline;
pub mod replaying;

pub use buffer::{BufferAllocator, ByteBuf, HeapAllocator};
pub use embedded::EmbeddedChannel;
pub use error::{PipelineError, PipelineErrorContext, Result};
pub use event_loop::EventLoop;
pub use pipeline::{
    Channel, ChannelConfig, ChannelState, Context, HandlerSlot, InboundHandler, Message,
    OutboundHandler, Pipeline,
};
pub use replaying::{replay_decode, ReplayState, ReplayStatus};
