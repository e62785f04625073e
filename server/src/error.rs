//! Error types for the room server.

use std::io;
use thiserror::Error;

/// Failures of the UDP socket runtime.
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("failed to bind UDP socket to {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        source: io::Error,
    },

    #[error("failed to send datagram to {addr}: {source}")]
    Send {
        addr: std::net::SocketAddr,
        source: io::Error,
    },

    #[error("UDP socket is not running")]
    NotRunning,

    #[error("failed to read local address: {0}")]
    LocalAddr(io::Error),
}

/// Unexpected failure inside a dispatched handler. Fatal to the socket.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("socket failure in handler: {0}")]
    Socket(#[from] SocketError),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl HandlerError {
    pub fn invariant(description: impl Into<String>) -> Self {
        Self::Invariant(description.into())
    }
}

#[derive(Error, Debug)]
pub enum RoomError {
    #[error("room {id} needs a positive max player count")]
    InvalidCapacity { id: i64 },

    #[error("room {id} needs a positive dispatch limit")]
    InvalidPolicy { id: i64 },

    #[error("room {id} is already registered")]
    DuplicateRoom { id: i64 },

    #[error(transparent)]
    Socket(#[from] SocketError),
}

/// Admission failures of a join request. Never fatal.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    #[error("room {0} does not exist")]
    UnknownRoom(i64),

    #[error("room {0} is full")]
    RoomFull(i64),

    #[error("player {0} is already connected")]
    AlreadyConnected(i64),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("store serialization error: {0}")]
    Serde(#[from] bincode::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
