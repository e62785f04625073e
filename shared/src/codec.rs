//! Fixed-layout message encoding.

use bytes::{Buf, BufMut};
use thiserror::Error;

/// Decode-time rejection of a datagram payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedMessage {
    #[error("datagram is empty")]
    Empty,

    #[error("wrong length for tag {tag}: expected {expected} bytes, got {actual}")]
    Length {
        tag: u8,
        expected: usize,
        actual: usize,
    },

    #[error("unexpected tag: expected {expected}, got {actual}")]
    Tag { expected: u8, actual: u8 },

    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: i64 },
}

/// A message with a fixed tag and a fixed total byte size.
///
/// Implementors only describe their body; the tag byte and the size check
/// are handled by the provided methods.
pub trait Message: Sized {
    const TAG: u8;
    /// Total size including the tag byte.
    const SIZE: usize;

    fn encode_body(&self, buf: &mut Vec<u8>);

    /// Reads the body. `buf` holds exactly `SIZE - 1` bytes.
    fn decode_body(buf: &mut &[u8]) -> Result<Self, MalformedMessage>;

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.put_u8(Self::TAG);
        self.encode_body(&mut buf);
        debug_assert_eq!(buf.len(), Self::SIZE);
        buf
    }

    fn decode(data: &[u8]) -> Result<Self, MalformedMessage> {
        if data.is_empty() {
            return Err(MalformedMessage::Empty);
        }
        if data.len() != Self::SIZE {
            return Err(MalformedMessage::Length {
                tag: data[0],
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut buf = data;
        let tag = buf.get_u8();
        if tag != Self::TAG {
            return Err(MalformedMessage::Tag {
                expected: Self::TAG,
                actual: tag,
            });
        }
        Self::decode_body(&mut buf)
    }
}
