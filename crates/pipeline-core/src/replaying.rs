//! Streaming decoder base with checkpoint/replay semantics.
//!
//! Lets a decode routine read from a buffer as though it always had enough
//! bytes. When it doesn't, the routine calls [`ReplayState::request_replay`]
//! instead of erroring; the base rewinds the buffer's reader cursor back to
//! the last committed checkpoint and waits for more bytes to arrive before
//! invoking the routine again. No exceptions or unwinding are involved —
//! the routine communicates "not enough yet" purely through its return
//! value.

use crate::buffer::ByteBuf;

/// What a decode routine returns after one invocation.
pub enum ReplayStatus<T, E> {
    /// One complete unit was decoded.
    Done(T),
    /// Not enough bytes were available; replay from the last checkpoint
    /// once more bytes arrive.
    NeedMore,
    /// Decoding failed in a way that can never be recovered by replay.
    Failed(E),
}

/// A user-defined tag describing which phase of a multi-step decode has
/// been committed. The MQTT decoder uses this to distinguish
/// `FixedHeader`/`VariableHeader`/`Payload`/`BadMessage`, carrying along
/// whatever fields of those phases a later phase needs without re-reading
/// them from the buffer (`Clone` rather than `Copy` so a phase can carry
/// owned data like a parsed protocol name).
pub trait StateTag: Clone + PartialEq + std::fmt::Debug + Send + 'static {}
impl<T: Clone + PartialEq + std::fmt::Debug + Send + 'static> StateTag for T {}

/// The `(current_state, committed_reader_index)` pair the base maintains on
/// behalf of a single channel's decode routine. Decode routines receive a
/// `&mut` reference to this and call `checkpoint`/`request_replay` against
/// it instead of managing their own rewind logic.
pub struct ReplayState<S: StateTag> {
    state: S,
    committed_reader: usize,
    replay_requested: bool,
}

impl<S: StateTag> ReplayState<S> {
    pub fn new(initial: S) -> Self {
        ReplayState {
            state: initial,
            committed_reader: 0,
            replay_requested: false,
        }
    }

    /// The state tag as of the last checkpoint.
    pub fn state(&self) -> S {
        self.state.clone()
    }

    /// Commits progress: the cursor at `buf`'s current reader position
    /// becomes the new replay point, and `new_state` becomes the tag
    /// returned by `state()` until the next checkpoint.
    pub fn checkpoint(&mut self, buf: &ByteBuf, new_state: S) {
        self.committed_reader = buf.reader_index();
        self.state = new_state;
    }

    /// Signals that the current invocation ran out of bytes; the base will
    /// rewind to the last checkpoint and retry once more bytes arrive.
    pub fn request_replay(&mut self) {
        self.replay_requested = true;
    }

    fn take_replay_request(&mut self) -> bool {
        std::mem::replace(&mut self.replay_requested, false)
    }
}

/// Drives a decode routine against an accumulating buffer, applying
/// checkpoint/replay semantics around each invocation.
///
/// `routine` is called with the buffer's reader cursor positioned at the
/// last committed checkpoint and the current `ReplayState`; it returns one
/// of `Done`/`NeedMore`/`Failed`. On `NeedMore` the reader cursor is
/// restored to the checkpoint recorded in `state` (so unconsumed partial
/// reads don't leak forward) and `None` is returned, meaning "wait for more
/// bytes". On `Failed`, the caller is expected to drive the decoder to a
/// terminal state itself — a decode exception transitions the decoder to
/// a terminal `BadMessage` state; this base does not hardcode that
/// transition since it is protocol-specific.
pub fn replay_decode<S, T, E>(
    buf: &mut ByteBuf,
    state: &mut ReplayState<S>,
    routine: impl FnOnce(&mut ByteBuf, &mut ReplayState<S>) -> ReplayStatus<T, E>,
) -> Option<Result<T, E>>
where
    S: StateTag,
{
    buf.set_reader_index(state.committed_reader);
    match routine(buf, state) {
        ReplayStatus::Done(value) => {
            state.take_replay_request();
            Some(Ok(value))
        }
        ReplayStatus::NeedMore => {
            state.take_replay_request();
            buf.set_reader_index(state.committed_reader);
            None
        }
        ReplayStatus::Failed(err) => {
            state.take_replay_request();
            Some(Err(err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum DemoState {
        Start,
        GotLen,
    }

    /// Toy routine: reads a one-byte length then that many payload bytes,
    /// checkpointing in between, to exercise replay across a short read.
    fn decode_demo(buf: &mut ByteBuf, st: &mut ReplayState<DemoState>) -> ReplayStatus<Vec<u8>, &'static str> {
        if st.state() == DemoState::Start {
            if !buf.is_readable(1) {
                st.request_replay();
                return ReplayStatus::NeedMore;
            }
            let len = buf.read_byte().unwrap() as usize;
            st.checkpoint(buf, DemoState::GotLen);
            return decode_payload(buf, st, len);
        }
        decode_payload(buf, st, 0)
    }

    fn decode_payload(
        buf: &mut ByteBuf,
        st: &mut ReplayState<DemoState>,
        _len: usize,
    ) -> ReplayStatus<Vec<u8>, &'static str> {
        // For the test we just try to read 2 bytes regardless; real
        // decoders would carry `len` forward via the state tag.
        if !buf.is_readable(2) {
            st.request_replay();
            return ReplayStatus::NeedMore;
        }
        let mut out = [0u8; 2];
        buf.read_bytes_into(&mut out).unwrap();
        ReplayStatus::Done(out.to_vec())
    }

    #[test]
    fn short_read_replays_from_checkpoint() {
        let mut state = ReplayState::new(DemoState::Start);
        let mut buf = ByteBuf::allocate(8);
        buf.write_byte(2).unwrap();

        let result = replay_decode(&mut buf, &mut state, decode_demo);
        assert!(result.is_none());

        buf.write_bytes(b"hi").unwrap();
        let result = replay_decode(&mut buf, &mut state, decode_demo);
        match result {
            Some(Ok(bytes)) => assert_eq!(bytes, b"hi"),
            other => panic!("expected Done(\"hi\"), got {:?}", other.map(|r| r.is_ok())),
        }
    }
}
