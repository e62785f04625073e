//! # Room Client Library
//!
//! This library provides the client side of the room session layer. A player
//! first obtains a connect token from the control plane, then uses a
//! [`network::RoomClient`] to complete the UDP handshake with the room and to
//! exchange game traffic with it.
//!
//! ## Connection Lifecycle
//!
//! ### Handshake
//! The client sends a `ConnectRequest` with its player id and token and waits
//! for the room's `ConnectedResponse`. Only `Success` binds the client's
//! endpoint to the session; `IncorrectToken` and `BadRequest` leave it
//! unbound. A room answers nothing at all when it does not know the player.
//!
//! ### Session Traffic
//! Once connected, the client streams transform updates. The room relays each
//! accepted update to the other players as a `TransformedResponse`, and may
//! end the session at any time with a `DisconnectedResponse` naming the
//! reason.
//!
//! ### Leaving
//! [`network::RoomClient::disconnect`] asks the room to end the session. The
//! room confirms with `Disconnected { Requested }`.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{RoomClient, ServerEvent};
//! use shared::{ConnectResult, DisconnectReason, PlayerTransform, Token};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let token = Token::from_base64("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=")
//!         .ok_or("bad token")?;
//!
//!     let mut client = RoomClient::bind("127.0.0.1:8080".parse()?).await?;
//!     if client.connect(42, token, Duration::from_secs(2)).await? == ConnectResult::Success {
//!         client.send_transform(PlayerTransform::at(1.0, 0.0, 2.0)).await?;
//!         if let ServerEvent::Transformed { player_id, .. } =
//!             client.recv_event(Duration::from_secs(1)).await?
//!         {
//!             println!("player {} moved", player_id);
//!         }
//!         client.disconnect(DisconnectReason::Requested).await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod network;

pub use error::ClientError;
pub use network::{RoomClient, ServerEvent};
