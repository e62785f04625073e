use shared::{ConnectResult, MalformedMessage};
use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("client socket error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed server datagram: {0}")]
    Malformed(#[from] MalformedMessage),

    #[error("unknown server datagram tag {0}")]
    UnknownResponse(u8),

    #[error("no server response within {0:?}")]
    Timeout(Duration),

    #[error("server refused connect: {0:?}")]
    Rejected(ConnectResult),
}
