//! Raw datagram container.

use crate::codec::MalformedMessage;
use std::net::SocketAddr;

/// Byte size of the type tag at the start of every datagram.
pub const HEADER_SIZE: usize = 1;

/// Largest payload a single UDP receive can produce.
pub const MAX_UDP_SIZE: usize = 65536;

/// One UDP payload together with the remote address it came from or goes to.
///
/// The payload is never empty: byte 0 is the message type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    payload: Vec<u8>,
    remote: SocketAddr,
}

impl Datagram {
    /// Wraps a payload, rejecting buffers too short to carry a tag.
    pub fn new(payload: Vec<u8>, remote: SocketAddr) -> Result<Self, MalformedMessage> {
        if payload.len() < HEADER_SIZE {
            return Err(MalformedMessage::Empty);
        }
        Ok(Self { payload, remote })
    }

    /// Message type tag.
    pub fn tag(&self) -> u8 {
        self.payload[0]
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Always false, kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
