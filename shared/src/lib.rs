//! # Shared Wire Contract
//!
//! Types that both ends of a room connection agree on: the [`Datagram`]
//! container, the fixed-layout message codecs, the opaque [`Token`] used for
//! admission, and the [`RoomInfo`] projection handed out by room discovery.
//!
//! ## Framing
//!
//! Every datagram starts with a one byte type tag. Each message type has a
//! constant total size; a buffer whose length differs from that size is
//! rejected with [`MalformedMessage`]. Integers and floats are little-endian.
//!
//! Request tags (client to server) and response tags (server to client) are
//! separate namespaces, so tag `0` is both `ConnectRequest` and
//! `ConnectedResponse`. Tags from [`GAME_TAG_BASE`] upward belong to the game.

pub mod codec;
pub mod datagram;
pub mod messages;
pub mod room_info;
pub mod token;
pub mod transform;

pub use codec::{MalformedMessage, Message};
pub use datagram::{Datagram, HEADER_SIZE, MAX_UDP_SIZE};
pub use messages::{
    ConnectRequest, ConnectResult, ConnectedResponse, DisconnectReason, DisconnectRequest,
    DisconnectedResponse, RequestType, ResponseType, TransformRequest, TransformedResponse,
    GAME_TAG_BASE,
};
pub use room_info::RoomInfo;
pub use token::{Token, TOKEN_SIZE};
pub use transform::PlayerTransform;
