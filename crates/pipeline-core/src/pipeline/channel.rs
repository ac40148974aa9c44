//! Channel identity, configuration, and lifecycle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::buffer::{BufferAllocator, HeapAllocator};
use crate::error::Result;
use crate::event_loop::EventLoop;

use super::Pipeline;

/// Lifecycle states a channel moves through monotonically: created is the
/// state before `registered`, and `closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
    Initialized = 0,
    Registered = 1,
    Active = 2,
    Inactive = 3,
    Closed = 4,
}

impl ChannelState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ChannelState::Initialized,
            1 => ChannelState::Registered,
            2 => ChannelState::Active,
            3 => ChannelState::Inactive,
            _ => ChannelState::Closed,
        }
    }
}

/// Options recognised by the core. Unknown extension keys are logged,
/// not fatal, so application handlers can stash arbitrary values without
/// the core rejecting the configuration outright.
pub struct ChannelConfig {
    pub max_message_size: usize,
    pub is_server: bool,
    pub auto_read: bool,
    pub allocator: Arc<dyn BufferAllocator>,
    extensions: HashMap<String, String>,
}

impl ChannelConfig {
    pub fn new(max_message_size: usize, is_server: bool) -> Self {
        ChannelConfig {
            max_message_size,
            is_server,
            auto_read: true,
            allocator: Arc::new(HeapAllocator),
            extensions: HashMap::new(),
        }
    }

    /// Sets an opaque extension option. The core never interprets these;
    /// it only logs that one was set — unknown options are logged, not
    /// fatal.
    pub fn set_extension(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        tracing::debug!(key = %key, value = %value, "unrecognised channel option set");
        self.extensions.insert(key, value);
    }

    pub fn extension(&self, key: &str) -> Option<&str> {
        self.extensions.get(key).map(String::as_str)
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig::new(8 * 1024 * 1024, true)
    }
}

/// The abstract duplex byte transport the core consumes. Concrete
/// transports (TCP sockets, the embedded in-memory queues) implement
/// this; this crate
/// never depends on any of them directly.
pub trait DuplexTransport: Send {
    fn write(&mut self, buf: crate::buffer::ByteBuf) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    fn local_addr(&self) -> Option<String> {
        None
    }
    fn peer_addr(&self) -> Option<String> {
        None
    }
}

pub(crate) struct ChannelShared {
    pub id: String,
    pub config: ChannelConfig,
    pub event_loop: Arc<EventLoop>,
    pub transport: parking_lot::Mutex<Box<dyn DuplexTransport>>,
    state: AtomicU8,
}

/// Identity + configuration + pipeline + event-loop binding.
/// Cheaply `Clone`-able; clones share the same underlying channel.
#[derive(Clone)]
pub struct Channel {
    pub(crate) shared: Arc<ChannelShared>,
    pub(crate) pipeline: Pipeline,
}

impl Channel {
    pub fn new(
        id: impl Into<String>,
        config: ChannelConfig,
        event_loop: Arc<EventLoop>,
        transport: Box<dyn DuplexTransport>,
    ) -> Channel {
        let shared = Arc::new(ChannelShared {
            id: id.into(),
            config,
            event_loop,
            transport: parking_lot::Mutex::new(transport),
            state: AtomicU8::new(ChannelState::Initialized as u8),
        });
        let pipeline = Pipeline::new(Arc::clone(&shared));
        Channel { shared, pipeline }
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }

    pub fn event_loop(&self) -> &Arc<EventLoop> {
        &self.shared.event_loop
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.state() == ChannelState::Active
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.state(), ChannelState::Closed)
    }

    pub(crate) fn set_state(&self, state: ChannelState) {
        self.shared.state.store(state as u8, Ordering::Release);
    }
}
