//! Stable, string-coded error taxonomy for the buffer/loop/pipeline core.
//!
//! Pairs a `thiserror` enum with a `codes` module of stable identifiers so
//! observability tooling can key on error codes without parsing `Display`
//! text.

use std::fmt;

/// Errors raised by the buffer, event loop and pipeline components.
///
/// `Underflow`/`Overflow` are the buffer's boundary violations.
/// `RejectedTask` fires when `submit`/`schedule` is called on an event loop
/// that has entered graceful shutdown. `Transport` wraps whatever
/// error a concrete duplex transport surfaced; the pipeline treats it as
/// opaque and simply forwards it as an `exception_caught` event.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("buffer underflow: attempted to read past the writer cursor")]
    Underflow,

    #[error("buffer overflow: attempted to write past capacity")]
    Overflow,

    #[error("task rejected: event loop is shutting down or already closed")]
    RejectedTask,

    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// A codec handler's decode/encode step failed. Distinct from
    /// `Transport` since the byte stream itself is fine; it's what a codec
    /// made of it that wasn't — protocol errors surface as `exception_caught`,
    /// not as a special pipeline event.
    #[error("codec error: {0}")]
    Codec(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl PipelineError {
    /// Stable error code for observability/log correlation.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Underflow => codes::BUFFER_UNDERFLOW,
            PipelineError::Overflow => codes::BUFFER_OVERFLOW,
            PipelineError::RejectedTask => codes::LOOP_REJECTED_TASK,
            PipelineError::Transport(_) => codes::TRANSPORT_IO,
            PipelineError::Codec(_) => codes::CODEC,
        }
    }
}

/// Stable error codes, independent of the `Display` wording above.
pub mod codes {
    pub const BUFFER_UNDERFLOW: &str = "buffer.underflow";
    pub const BUFFER_OVERFLOW: &str = "buffer.overflow";
    pub const LOOP_REJECTED_TASK: &str = "loop.rejected_task";
    pub const TRANSPORT_IO: &str = "transport.io";
    pub const CODEC: &str = "codec.error";
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PipelineError>;

impl fmt::Display for PipelineErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.error)
    }
}

/// Pairs an error with its stable code for handlers that want to log both
/// without re-deriving the code from the error variant.
#[derive(Debug)]
pub struct PipelineErrorContext {
    pub code: &'static str,
    pub error: PipelineError,
}

impl From<PipelineError> for PipelineErrorContext {
    fn from(error: PipelineError) -> Self {
        let code = error.code();
        PipelineErrorContext { code, error }
    }
}
