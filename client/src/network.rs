use crate::error::ClientError;
use log::{debug, info, trace};
use shared::{
    ConnectRequest, ConnectResult, ConnectedResponse, DisconnectReason, DisconnectRequest,
    DisconnectedResponse, Message, PlayerTransform, ResponseType, Token, TransformRequest,
    TransformedResponse, MAX_UDP_SIZE,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};

/// Something the room told this client.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Connected(ConnectResult),
    Disconnected(DisconnectReason),
    Transformed {
        player_id: i64,
        transform: PlayerTransform,
    },
}

impl ServerEvent {
    /// Decodes a datagram sent by a room.
    pub fn decode(payload: &[u8]) -> Result<Self, ClientError> {
        let tag = *payload
            .first()
            .ok_or(ClientError::Malformed(shared::MalformedMessage::Empty))?;

        match ResponseType::from_tag(tag) {
            Some(ResponseType::Connected) => {
                Ok(Self::Connected(ConnectedResponse::decode(payload)?.result))
            }
            Some(ResponseType::Disconnected) => Ok(Self::Disconnected(
                DisconnectedResponse::decode(payload)?.reason,
            )),
            Some(ResponseType::Transformed) => {
                let response = TransformedResponse::decode(payload)?;
                Ok(Self::Transformed {
                    player_id: response.player_id,
                    transform: response.transform,
                })
            }
            None => Err(ClientError::UnknownResponse(tag)),
        }
    }
}

/// UDP connection to a single room.
pub struct RoomClient {
    socket: UdpSocket,
    server_addr: SocketAddr,
    player_id: Option<i64>,
}

impl RoomClient {
    /// Binds an ephemeral local port matching the server's address family.
    pub async fn bind(server_addr: SocketAddr) -> Result<Self, ClientError> {
        let local: SocketAddr = if server_addr.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(local).await?;
        debug!("Room client bound to {}", socket.local_addr()?);

        Ok(Self {
            socket,
            server_addr,
            player_id: None,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ClientError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// Player id of the accepted connect, if any.
    pub fn player_id(&self) -> Option<i64> {
        self.player_id
    }

    pub async fn send_raw(&self, payload: &[u8]) -> Result<(), ClientError> {
        self.socket.send_to(payload, self.server_addr).await?;
        trace!("Sent {} bytes to {}", payload.len(), self.server_addr);
        Ok(())
    }

    async fn send_message<M: Message>(&self, message: &M) -> Result<(), ClientError> {
        self.send_raw(&message.encode()).await
    }

    /// Performs the connect handshake and waits for the room's verdict.
    ///
    /// Events other than `Connected` that arrive meanwhile are discarded.
    pub async fn connect(
        &mut self,
        player_id: i64,
        connect_token: Token,
        timeout: Duration,
    ) -> Result<ConnectResult, ClientError> {
        let request = ConnectRequest {
            player_id,
            connect_token,
        };
        self.send_message(&request).await?;

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.recv_event(remaining).await? {
                ServerEvent::Connected(result) => {
                    if result == ConnectResult::Success {
                        self.player_id = Some(player_id);
                        info!("Connected to {} as player {}", self.server_addr, player_id);
                    }
                    return Ok(result);
                }
                other => trace!("Ignored {:?} while connecting", other),
            }
        }
    }

    pub async fn send_transform(&self, transform: PlayerTransform) -> Result<(), ClientError> {
        self.send_message(&TransformRequest { transform }).await
    }

    pub async fn disconnect(&mut self, reason: DisconnectReason) -> Result<(), ClientError> {
        self.send_message(&DisconnectRequest {
            reason: reason as i32,
        })
        .await?;
        self.player_id = None;
        info!("Disconnect sent to {}", self.server_addr);
        Ok(())
    }

    /// Waits for the next datagram from the server and decodes it.
    ///
    /// Datagrams from other senders and empty ones are skipped.
    pub async fn recv_event(&self, timeout: Duration) -> Result<ServerEvent, ClientError> {
        let deadline = Instant::now() + timeout;
        let mut buf = vec![0u8; MAX_UDP_SIZE];

        loop {
            let (len, from) = timeout_at(deadline, self.socket.recv_from(&mut buf))
                .await
                .map_err(|_| ClientError::Timeout(timeout))??;

            if from != self.server_addr {
                trace!("Skipped datagram from {}", from);
                continue;
            }
            if len == 0 {
                continue;
            }

            let event = ServerEvent::decode(&buf[..len])?;
            trace!("Received {:?}", event);
            return Ok(event);
        }
    }
}
