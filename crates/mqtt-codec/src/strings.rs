//! Length-prefixed string/binary field helpers.
//!
//! Each `try_read_*` takes the remaining bytes still owed to the current
//! frame as `budget` (tracked by the caller against the fixed header's
//! remaining-length) and returns `None` when the buffer simply hasn't
//! received enough bytes yet — a replay condition, not an error — versus
//! `Some(Err(..))` when the advertised length could never fit the frame,
//! which is a real protocol violation.

use pipeline_core::ByteBuf;

use crate::error::DecoderError;

pub fn try_read_string(buf: &mut ByteBuf, budget: &mut usize) -> Option<Result<String, DecoderError>> {
    try_read_binary(buf, budget).map(|res| res.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
}

pub fn try_read_binary(buf: &mut ByteBuf, budget: &mut usize) -> Option<Result<Vec<u8>, DecoderError>> {
    if *budget < 2 || !buf.is_readable(2) {
        if *budget < 2 {
            return Some(Err(DecoderError::TruncatedString));
        }
        return None;
    }
    let len = buf.read_u16_be().ok()? as usize;
    if 2 + len > *budget {
        return Some(Err(DecoderError::TruncatedString));
    }
    if !buf.is_readable(len) {
        return None;
    }
    let mut raw = vec![0u8; len];
    buf.read_bytes_into(&mut raw).ok()?;
    *budget -= 2 + len;
    Some(Ok(raw))
}

/// Encodes `s` as a u16-BE length-prefixed UTF-8 string.
pub fn write_string(buf: &mut ByteBuf, s: &str) -> pipeline_core::Result<()> {
    buf.write_u16_be(s.len() as u16)?;
    buf.write_bytes(s.as_bytes())
}

pub fn write_binary(buf: &mut ByteBuf, bytes: &[u8]) -> pipeline_core::Result<()> {
    buf.write_u16_be(bytes.len() as u16)?;
    buf.write_bytes(bytes)
}

/// Encoded size of a length-prefixed string/binary field, for pre-sizing
/// output buffers.
pub fn encoded_len(bytes_len: usize) -> usize {
    2 + bytes_len
}
