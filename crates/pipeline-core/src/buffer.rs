//! Ref-counted byte buffer with independent reader/writer cursors.
//!
//! Backed by [`bytes::BytesMut`]. Unlike plain
//! `Bytes`/`BytesMut`, `ByteBuf` tracks an explicit, observable reference
//! count so `retain`/`release` can be driven by handler code directly
//! instead of relying on `Arc`'s automatic `Drop`-based counting — the
//! pipeline's ownership-passing contract needs a count callers can
//! inspect and manipulate, not just a smart pointer that happens to be
//! reference counted under the hood.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use parking_lot::Mutex;

use crate::error::{PipelineError, Result};

/// Shared backing storage for one allocation. All views produced from the
/// same `allocate()` call (via `slice`, `duplicate`) point at this same
/// `Backing` and share its `refcount`.
struct Backing {
    data: Mutex<BytesMut>,
}

/// A ref-counted byte buffer with independent `reader ≤ writer ≤ capacity`
/// cursors.
///
/// Reads and writes operate relative to a `window` (`base`, `capacity`)
/// into the shared backing storage, so `read_slice` and `duplicate` can
/// hand out zero-copy views without touching the underlying bytes.
pub struct ByteBuf {
    backing: Arc<Backing>,
    refcount: Arc<AtomicUsize>,
    base: usize,
    capacity: usize,
    reader: usize,
    writer: usize,
}

impl ByteBuf {
    /// Allocates a fresh buffer with `capacity` bytes of writable space and
    /// a reference count of 1.
    pub fn allocate(capacity: usize) -> Self {
        ByteBuf {
            backing: Arc::new(Backing {
                data: Mutex::new(BytesMut::with_capacity(capacity)),
            }),
            refcount: Arc::new(AtomicUsize::new(1)),
            base: 0,
            capacity,
            reader: 0,
            writer: 0,
        }
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.refcount.load(Ordering::Acquire) == 0 {
            return Err(PipelineError::Underflow);
        }
        Ok(())
    }

    /// Bytes available to read (`writer - reader`).
    pub fn readable_bytes(&self) -> usize {
        self.writer - self.reader
    }

    /// Whether at least `n` bytes remain to read.
    pub fn is_readable(&self, n: usize) -> bool {
        self.readable_bytes() >= n
    }

    /// Remaining writable capacity (`capacity - writer`).
    pub fn writable_bytes(&self) -> usize {
        self.capacity - self.writer
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        self.ensure_alive()?;
        if !self.is_readable(1) {
            return Err(PipelineError::Underflow);
        }
        let data = self.backing.data.lock();
        let byte = data[self.base + self.reader];
        drop(data);
        self.reader += 1;
        Ok(byte)
    }

    pub fn read_u16_be(&mut self) -> Result<u16> {
        self.ensure_alive()?;
        if !self.is_readable(2) {
            return Err(PipelineError::Underflow);
        }
        let data = self.backing.data.lock();
        let hi = data[self.base + self.reader];
        let lo = data[self.base + self.reader + 1];
        drop(data);
        self.reader += 2;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    /// Copies `dst.len()` bytes into `dst`, advancing the reader cursor.
    pub fn read_bytes_into(&mut self, dst: &mut [u8]) -> Result<()> {
        self.ensure_alive()?;
        if !self.is_readable(dst.len()) {
            return Err(PipelineError::Underflow);
        }
        let data = self.backing.data.lock();
        let start = self.base + self.reader;
        dst.copy_from_slice(&data[start..start + dst.len()]);
        drop(data);
        self.reader += dst.len();
        Ok(())
    }

    /// Current reader cursor position, relative to this view's window.
    /// Used by the replaying decoder base to checkpoint and rewind.
    pub fn reader_index(&self) -> usize {
        self.reader
    }

    /// Rewinds (or advances) the reader cursor to an absolute position
    /// previously obtained from `reader_index`. Never moves past `writer`.
    pub fn set_reader_index(&mut self, index: usize) {
        debug_assert!(index <= self.writer, "reader index must not pass the writer cursor");
        self.reader = index.min(self.writer);
    }

    /// Advances the reader cursor without copying.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.ensure_alive()?;
        if !self.is_readable(n) {
            return Err(PipelineError::Underflow);
        }
        self.reader += n;
        Ok(())
    }

    /// Zero-copy view of the next `n` readable bytes. Advances this
    /// buffer's reader cursor by `n`. The returned buffer shares backing
    /// storage and the reference count with `self`: releasing one affects
    /// both, which is why a caller that wants the slice to outlive the
    /// buffer it was carved from must `retain()` it first.
    pub fn read_slice(&mut self, n: usize) -> Result<ByteBuf> {
        self.ensure_alive()?;
        if !self.is_readable(n) {
            return Err(PipelineError::Underflow);
        }
        let view = ByteBuf {
            backing: Arc::clone(&self.backing),
            refcount: Arc::clone(&self.refcount),
            base: self.base + self.reader,
            capacity: n,
            reader: 0,
            writer: n,
        };
        self.reader += n;
        Ok(view)
    }

    pub fn write_byte(&mut self, value: u8) -> Result<()> {
        self.ensure_alive()?;
        if self.writable_bytes() < 1 {
            return Err(PipelineError::Overflow);
        }
        let mut data = self.backing.data.lock();
        data.put_u8(value);
        drop(data);
        self.writer += 1;
        Ok(())
    }

    pub fn write_u16_be(&mut self, value: u16) -> Result<()> {
        self.ensure_alive()?;
        if self.writable_bytes() < 2 {
            return Err(PipelineError::Overflow);
        }
        let mut data = self.backing.data.lock();
        data.put_u16(value);
        drop(data);
        self.writer += 2;
        Ok(())
    }

    pub fn write_bytes(&mut self, src: &[u8]) -> Result<()> {
        self.ensure_alive()?;
        if self.writable_bytes() < src.len() {
            return Err(PipelineError::Overflow);
        }
        let mut data = self.backing.data.lock();
        data.put_slice(src);
        drop(data);
        self.writer += src.len();
        Ok(())
    }

    /// Independent-cursor view sharing storage and reference count with
    /// `self`. Unlike `read_slice`, the window and content are identical
    /// to `self`'s — only the reader/writer cursors are copied rather than
    /// reset, and advancing one instance's cursors never affects the
    /// other's.
    pub fn duplicate(&self) -> ByteBuf {
        ByteBuf {
            backing: Arc::clone(&self.backing),
            refcount: Arc::clone(&self.refcount),
            base: self.base,
            capacity: self.capacity,
            reader: self.reader,
            writer: self.writer,
        }
    }

    /// Deep copy into freshly allocated storage with a new reference count
    /// of 1, entirely independent of `self`.
    pub fn copy(&self) -> Result<ByteBuf> {
        self.ensure_alive()?;
        let data = self.backing.data.lock();
        let slice = &data[self.base..self.base + self.capacity];
        let mut fresh = BytesMut::with_capacity(self.capacity);
        fresh.put_slice(slice);
        drop(data);
        Ok(ByteBuf {
            backing: Arc::new(Backing {
                data: Mutex::new(fresh),
            }),
            refcount: Arc::new(AtomicUsize::new(1)),
            base: 0,
            capacity: self.capacity,
            reader: self.reader,
            writer: self.writer,
        })
    }

    /// Copies out the readable region as an owned `Vec<u8>` without moving
    /// the reader cursor. Convenience for tests and codecs that need a
    /// fully materialized string/payload.
    pub fn peek_readable(&self) -> Vec<u8> {
        let data = self.backing.data.lock();
        data[self.base + self.reader..self.base + self.writer].to_vec()
    }

    /// Current reference count. Mostly useful for tests asserting
    /// ref-count conservation across operations that share storage.
    pub fn ref_count(&self) -> usize {
        self.refcount.load(Ordering::Acquire)
    }

    /// Increments the reference count by one.
    pub fn retain(&self) {
        self.refcount.fetch_add(1, Ordering::AcqRel);
    }

    /// Increments the reference count by `k`.
    pub fn retain_n(&self, k: usize) {
        self.refcount.fetch_add(k, Ordering::AcqRel);
    }

    /// Decrements the reference count by one, returning `true` iff this
    /// call dropped it to zero. Calling `release` on an already-zero
    /// buffer is a contract violation — the count transitions 1→0 exactly
    /// once, and after release the buffer may not be accessed — and panics,
    /// mirroring Netty's `IllegalReferenceCountException` behavior.
    pub fn release(&self) -> bool {
        let previous = self.refcount.fetch_sub(1, Ordering::AcqRel);
        assert!(previous > 0, "release called on a buffer with refcount 0");
        previous == 1
    }

    /// Observational hint for leak-tracking tooling layered on top of this
    /// crate; the core itself does nothing with it.
    pub fn touch(&self, hint: &str) {
        tracing::trace!(hint, "buffer touched");
    }
}

/// Allocates writable [`ByteBuf`] instances. Channels are configured with
/// one of these (the channel config's `allocator` option) so handlers never call
/// `ByteBuf::allocate` directly and stay portable across pooling
/// strategies.
pub trait BufferAllocator: Send + Sync + 'static {
    fn allocate(&self, capacity: usize) -> ByteBuf;
}

/// The default allocator: a thin `ByteBuf::allocate` wrapper with no
/// pooling. Sufficient for the embedded channel and for tests; production
/// hosts are expected to supply a pooling allocator instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl BufferAllocator for HeapAllocator {
    fn allocate(&self, capacity: usize) -> ByteBuf {
        ByteBuf::allocate(capacity)
    }
}

/// Types whose lifetime is governed by an explicit, observable reference
/// count rather than by Rust's ownership rules alone.
pub trait RefCounted {
    fn retain(&self);
    fn release(&self) -> bool;
}

impl RefCounted for ByteBuf {
    fn retain(&self) {
        ByteBuf::retain(self)
    }

    fn release(&self) -> bool {
        ByteBuf::release(self)
    }
}

/// Wraps a ref-counted payload and delegates `retain`/`release` to it.
/// `replace` produces a new holder around a different payload, leaving the
/// previous payload's ownership with the caller — the holder never
/// silently drops what it used to wrap.
pub struct BufHolder<T: RefCounted> {
    payload: T,
}

impl<T: RefCounted> BufHolder<T> {
    pub fn new(payload: T) -> Self {
        BufHolder { payload }
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn retain(&self) {
        self.payload.retain();
    }

    pub fn release(&self) -> bool {
        self.payload.release()
    }

    /// Consumes this holder, returning the payload it wrapped and a new
    /// holder around `new_payload`.
    pub fn replace(self, new_payload: T) -> (T, BufHolder<T>) {
        (self.payload, BufHolder::new(new_payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let mut buf = ByteBuf::allocate(16);
        buf.write_u16_be(0x1234).unwrap();
        buf.write_bytes(b"hi").unwrap();
        assert_eq!(buf.readable_bytes(), 4);
        assert_eq!(buf.read_u16_be().unwrap(), 0x1234);
        let mut dst = [0u8; 2];
        buf.read_bytes_into(&mut dst).unwrap();
        assert_eq!(&dst, b"hi");
    }

    #[test]
    fn read_past_writer_underflows() {
        let mut buf = ByteBuf::allocate(4);
        buf.write_byte(1).unwrap();
        assert!(buf.read_u16_be().is_err());
    }

    #[test]
    fn write_past_capacity_overflows() {
        let mut buf = ByteBuf::allocate(1);
        buf.write_byte(1).unwrap();
        assert!(matches!(buf.write_byte(2), Err(PipelineError::Overflow)));
    }

    #[test]
    fn slice_shares_storage_and_refcount() {
        let mut buf = ByteBuf::allocate(8);
        buf.write_bytes(b"payload!").unwrap();
        let before = buf.ref_count();
        let slice = buf.read_slice(7).unwrap();
        assert_eq!(slice.ref_count(), before);
        slice.retain();
        assert_eq!(buf.ref_count(), before + 1);
        assert_eq!(slice.peek_readable(), b"payload");
    }

    #[test]
    fn duplicate_has_independent_cursors() {
        let mut buf = ByteBuf::allocate(4);
        buf.write_bytes(b"abcd").unwrap();
        let mut dup = buf.duplicate();
        let _ = buf.read_byte().unwrap();
        assert_eq!(buf.readable_bytes(), 3);
        assert_eq!(dup.readable_bytes(), 4);
        let _ = dup.read_byte().unwrap();
        assert_eq!(dup.readable_bytes(), 3);
    }

    #[test]
    fn copy_is_independent_storage() {
        let mut buf = ByteBuf::allocate(4);
        buf.write_bytes(b"abcd").unwrap();
        let copy = buf.copy().unwrap();
        assert_eq!(copy.ref_count(), 1);
        assert_ne!(copy.ref_count(), buf.ref_count() + 1);
    }

    #[test]
    fn release_to_zero_reports_true_once() {
        let buf = ByteBuf::allocate(1);
        buf.retain();
        assert!(!buf.release());
        assert!(buf.release());
    }

    #[test]
    #[should_panic]
    fn release_below_zero_panics() {
        let buf = ByteBuf::allocate(1);
        assert!(buf.release());
        buf.release();
    }
}
