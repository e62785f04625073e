//! # Room Server Library
//!
//! This library provides the server side of the room session layer: UDP
//! sockets that turn raw datagrams into authenticated player sessions, the
//! registry of rooms those sessions live in, and the account service that
//! admits players to rooms.
//!
//! ## Core Responsibilities
//!
//! ### Socket Runtime
//! Each room owns one UDP endpoint with a single receive loop. Datagrams are
//! copied out of the receive buffer and handed to a dispatcher; transient
//! transport errors are skipped, anything else closes the socket.
//!
//! ### Bounded Dispatch
//! Handlers run off the receive loop under a hard concurrency limit. The
//! tasked dispatcher sheds datagrams once the limit is reached; the queued
//! dispatcher buffers a bounded number of them for a single consumer. A
//! handler that fails or panics takes its socket down.
//!
//! ### Session State Machine
//! A player is admitted through the control plane and receives a one-time
//! connect token. The room only binds the player's endpoint after a
//! `ConnectRequest` carrying that token arrives. From then on datagrams from
//! that endpoint are session traffic: disconnects, game payloads, or protocol
//! violations that evict the player.
//!
//! ## Module Organization
//!
//! ### Socket Module (`socket`)
//! UDP bind, receive loop, thread-safe send and idempotent close.
//!
//! ### Dispatch Module (`dispatch`)
//! Shed-on-overload and bounded-queue dispatch policies.
//!
//! ### Room Modules (`room`, `players`, `game`)
//! The per-room state machine, its two-key session index, and the pluggable
//! handler for game datagrams (player transforms by default).
//!
//! ### Directory and Sweeper (`directory`, `sweeper`)
//! Concurrent room registry with point-in-time listings, and the periodic
//! task that evicts silent sessions with `RequestTimeout`.
//!
//! ### Control Plane (`control`)
//! Sign-up, sign-in, room discovery and join-room ticketing, independent of
//! any particular transport.
//!
//! ### Support (`clock`, `store`, `config`, `error`)
//! Time sources, key-value persistence, TOML configuration and error types.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::clock::MonotonicClock;
//! use server::config::DispatchPolicy;
//! use server::directory::RoomDirectory;
//! use server::game::TransformHandler;
//! use server::room::{Room, RoomConfig};
//! use server::store::{MemoryDatabase, PlayerSnapshot};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let room = Room::new(
//!         RoomConfig {
//!             id: 1,
//!             name: "Lobby".to_string(),
//!             max_players: 16,
//!             policy: DispatchPolicy::Shed { max_tasks: 64 },
//!         },
//!         Arc::new(MemoryDatabase::<i64, PlayerSnapshot>::new()),
//!         Arc::new(MonotonicClock::new()),
//!         Arc::new(TransformHandler::new()),
//!     )?;
//!     room.start("127.0.0.1:8080".parse()?).await?;
//!
//!     let directory = RoomDirectory::new();
//!     directory.register(room)?;
//!
//!     // The player presents this token in its ConnectRequest
//!     let (_info, token) = directory.join_player(1, 42, "alice")?;
//!     println!("connect token: {}", token.to_base64());
//!
//!     directory.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Shutdown
//!
//! Closing a room is a hard stop and notifies nobody. A graceful shutdown is
//! two steps: disconnect every player with `RoomClosed`, then close.
//! [`directory::RoomDirectory::shutdown`] does both for every room.

pub mod clock;
pub mod config;
pub mod control;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod game;
pub mod players;
pub mod room;
pub mod socket;
pub mod store;
pub mod sweeper;
