//! Message catalog for the room protocol.

use crate::codec::{MalformedMessage, Message};
use crate::token::{Token, TOKEN_SIZE};
use crate::transform::PlayerTransform;
use bytes::{Buf, BufMut};

/// First tag available to game payloads in either direction.
pub const GAME_TAG_BASE: u8 = 2;

/// Tags of datagrams sent by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestType {
    Connect = 0,
    Disconnect = 1,
    Transform = 2,
}

impl RequestType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Connect),
            1 => Some(Self::Disconnect),
            2 => Some(Self::Transform),
            _ => None,
        }
    }
}

/// Tags of datagrams sent by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseType {
    Connected = 0,
    Disconnected = 1,
    Transformed = 2,
}

impl ResponseType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Connected),
            1 => Some(Self::Disconnected),
            2 => Some(Self::Transformed),
            _ => None,
        }
    }
}

/// Outcome of a connect handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectResult {
    BadRequest = 0,
    Success = 1,
    IncorrectToken = 2,
}

impl TryFrom<u8> for ConnectResult {
    type Error = MalformedMessage;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::BadRequest),
            1 => Ok(Self::Success),
            2 => Ok(Self::IncorrectToken),
            _ => Err(MalformedMessage::InvalidValue {
                field: "connect result",
                value: value as i64,
            }),
        }
    }
}

/// Why the server ended a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum DisconnectReason {
    UnknownDatagram = 0,
    Requested = 1,
    RoomClosed = 2,
    RequestTimeout = 3,
}

impl TryFrom<i32> for DisconnectReason {
    type Error = MalformedMessage;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::UnknownDatagram),
            1 => Ok(Self::Requested),
            2 => Ok(Self::RoomClosed),
            3 => Ok(Self::RequestTimeout),
            _ => Err(MalformedMessage::InvalidValue {
                field: "disconnect reason",
                value: value as i64,
            }),
        }
    }
}

/// Client asks to bind its endpoint to a pending session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub player_id: i64,
    pub connect_token: Token,
}

impl Message for ConnectRequest {
    const TAG: u8 = RequestType::Connect as u8;
    const SIZE: usize = 1 + 8 + TOKEN_SIZE;

    fn encode_body(&self, buf: &mut Vec<u8>) {
        buf.put_i64_le(self.player_id);
        self.connect_token.put(buf);
    }

    fn decode_body(buf: &mut &[u8]) -> Result<Self, MalformedMessage> {
        let player_id = buf.get_i64_le();
        let connect_token = Token::get(buf);
        Ok(Self {
            player_id,
            connect_token,
        })
    }
}

/// Client leaves the room. The reason is informational only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectRequest {
    pub reason: i32,
}

impl Message for DisconnectRequest {
    const TAG: u8 = RequestType::Disconnect as u8;
    const SIZE: usize = 1 + 4;

    fn encode_body(&self, buf: &mut Vec<u8>) {
        buf.put_i32_le(self.reason);
    }

    fn decode_body(buf: &mut &[u8]) -> Result<Self, MalformedMessage> {
        Ok(Self {
            reason: buf.get_i32_le(),
        })
    }
}

/// Client reports its own transform.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformRequest {
    pub transform: PlayerTransform,
}

impl Message for TransformRequest {
    const TAG: u8 = RequestType::Transform as u8;
    const SIZE: usize = 1 + PlayerTransform::BYTE_SIZE;

    fn encode_body(&self, buf: &mut Vec<u8>) {
        self.transform.put(buf);
    }

    fn decode_body(buf: &mut &[u8]) -> Result<Self, MalformedMessage> {
        Ok(Self {
            transform: PlayerTransform::get(buf),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedResponse {
    pub result: ConnectResult,
}

impl Message for ConnectedResponse {
    const TAG: u8 = ResponseType::Connected as u8;
    const SIZE: usize = 1 + 1;

    fn encode_body(&self, buf: &mut Vec<u8>) {
        buf.put_u8(self.result as u8);
    }

    fn decode_body(buf: &mut &[u8]) -> Result<Self, MalformedMessage> {
        Ok(Self {
            result: ConnectResult::try_from(buf.get_u8())?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectedResponse {
    pub reason: DisconnectReason,
}

impl Message for DisconnectedResponse {
    const TAG: u8 = ResponseType::Disconnected as u8;
    const SIZE: usize = 1 + 4;

    fn encode_body(&self, buf: &mut Vec<u8>) {
        buf.put_i32_le(self.reason as i32);
    }

    fn decode_body(buf: &mut &[u8]) -> Result<Self, MalformedMessage> {
        Ok(Self {
            reason: DisconnectReason::try_from(buf.get_i32_le())?,
        })
    }
}

/// Relayed transform of another player in the room.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedResponse {
    pub player_id: i64,
    pub transform: PlayerTransform,
}

impl Message for TransformedResponse {
    const TAG: u8 = ResponseType::Transformed as u8;
    const SIZE: usize = 1 + 8 + PlayerTransform::BYTE_SIZE;

    fn encode_body(&self, buf: &mut Vec<u8>) {
        buf.put_i64_le(self.player_id);
        self.transform.put(buf);
    }

    fn decode_body(buf: &mut &[u8]) -> Result<Self, MalformedMessage> {
        let player_id = buf.get_i64_le();
        let transform = PlayerTransform::get(buf);
        Ok(Self {
            player_id,
            transform,
        })
    }
}
