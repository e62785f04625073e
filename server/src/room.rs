//! Room session state machine
//!
//! A [`Room`] owns one UDP [`Socket`] and the sessions of the players admitted
//! to it. Sessions move through three states:
//!
//! - **Pending**: created by [`Room::join_player`], holds a fresh connect token
//!   and no endpoint.
//! - **Connected**: a `ConnectRequest` carrying the session's token arrived and
//!   bound the sender's endpoint.
//! - **Disconnected**: removed from the index, terminal.
//!
//! All index mutations happen under one lock; replies and broadcasts are sent
//! after the lock is released. Whoever removes a session from the index first
//! performs its disconnect side effects, concurrent callers see `false`.

use crate::clock::Clock;
use crate::config::DispatchPolicy;
use crate::dispatch::{QueuePump, QueuedDispatcher, TaskedDispatcher, TaskedHandler};
use crate::error::{HandlerError, JoinError, RoomError, SocketError};
use crate::game::{GameHandler, GameVerdict};
use crate::players::{Admission, PlayerIndex, PlayerSession};
use crate::socket::Socket;
use crate::store::{Database, PlayerSnapshot};
use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;
use shared::{
    ConnectRequest, ConnectResult, ConnectedResponse, Datagram, DisconnectReason,
    DisconnectRequest, DisconnectedResponse, Message, RequestType, RoomInfo, Token,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

/// Longest room name kept after sanitizing, in characters.
pub const MAX_ROOM_NAME_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct RoomConfig {
    pub id: i64,
    pub name: String,
    pub max_players: usize,
    pub policy: DispatchPolicy,
}

/// Strips control characters and the `;` list separator, trims, and caps the
/// length. Falls back to `"Room {id}"` when nothing is left.
pub fn sanitize_name(id: i64, name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control() && *c != ';')
        .collect();
    let truncated: String = cleaned.trim().chars().take(MAX_ROOM_NAME_LEN).collect();
    let truncated = truncated.trim_end();

    if truncated.is_empty() {
        format!("Room {}", id)
    } else {
        truncated.to_string()
    }
}

/// Side effect decided under the session lock, performed after releasing it.
enum Action {
    None,
    Reply(Vec<u8>),
    Disconnect(i64, DisconnectReason),
    Broadcast(Vec<u8>, Vec<SocketAddr>),
}

pub struct Room {
    id: i64,
    name: String,
    policy: DispatchPolicy,
    players: Mutex<PlayerIndex>,
    socket: Socket,
    store: Arc<dyn Database<i64, PlayerSnapshot>>,
    clock: Arc<dyn Clock>,
    game: Arc<dyn GameHandler>,
    /// Present for the queued policy, shared by every start of the room.
    queue: Option<Arc<QueuedDispatcher>>,
    pump: Mutex<Option<QueuePump>>,
}

impl Room {
    pub fn new(
        config: RoomConfig,
        store: Arc<dyn Database<i64, PlayerSnapshot>>,
        clock: Arc<dyn Clock>,
        game: Arc<dyn GameHandler>,
    ) -> Result<Arc<Self>, RoomError> {
        if config.max_players == 0 {
            return Err(RoomError::InvalidCapacity { id: config.id });
        }
        if config.policy.limit() == 0 {
            return Err(RoomError::InvalidPolicy { id: config.id });
        }

        let name = sanitize_name(config.id, &config.name);
        let queue = match config.policy {
            DispatchPolicy::Queue { capacity } => Some(Arc::new(QueuedDispatcher::new(capacity))),
            DispatchPolicy::Shed { .. } => None,
        };
        debug!("Created room {} ({:?})", config.id, name);

        Ok(Arc::new(Self {
            id: config.id,
            name,
            policy: config.policy,
            players: Mutex::new(PlayerIndex::new(config.id, config.max_players)),
            socket: Socket::new(format!("room-{}", config.id)),
            store,
            clock,
            game,
            queue,
            pump: Mutex::new(None),
        }))
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn is_running(&self) -> bool {
        self.socket.is_running()
    }

    /// Point-in-time projection for room discovery.
    pub fn info(&self) -> RoomInfo {
        let players = self.players.lock();
        self.info_from(&players)
    }

    fn info_from(&self, players: &PlayerIndex) -> RoomInfo {
        RoomInfo {
            id: self.id,
            name: self.name.clone(),
            player_count: players.len(),
            max_player_count: players.max_players(),
        }
    }

    pub fn player(&self, id: i64) -> Option<PlayerSession> {
        self.players.lock().get(id).cloned()
    }

    pub fn player_count(&self) -> usize {
        self.players.lock().len()
    }

    /// Binds the room socket and installs the configured dispatcher.
    ///
    /// In queued mode a pump left over from a previous run is stopped before
    /// the socket binds again, and exactly one pump drains the room's queue.
    pub async fn start(self: &Arc<Self>, local_addr: SocketAddr) -> Result<SocketAddr, RoomError> {
        let bound = match &self.queue {
            Some(queue) => {
                if !self.socket.is_running() {
                    let stale = self.pump.lock().take();
                    if let Some(pump) = stale {
                        debug!("Room {} replacing queue pump of a previous run", self.id);
                        pump.stop().await;
                    }
                }

                let bound = self.socket.start(local_addr, queue.clone()).await?;

                let mut pump = self.pump.lock();
                if pump.is_none() {
                    *pump = Some(QueuePump::spawn(
                        Arc::clone(queue),
                        Arc::clone(self),
                        self.socket.clone(),
                    ));
                }
                bound
            }
            None => {
                let dispatcher =
                    Arc::new(TaskedDispatcher::new(Arc::clone(self), self.policy.limit()));
                self.socket.start(local_addr, dispatcher).await?
            }
        };

        info!("Room {} ({}) listening on {}", self.id, self.name, bound);
        Ok(bound)
    }

    /// Admits a player as a pending session and mints its connect token.
    ///
    /// A player still pending is re-admitted with a new token; the old one
    /// stops working. A connected player, or a new player when pending and
    /// connected sessions already fill the room, is refused.
    pub fn join_player(
        &self,
        account_id: i64,
        display_name: &str,
    ) -> Result<(RoomInfo, Token), JoinError> {
        let token = Token::generate();
        let now = self.clock.now_ms();
        let restored = self.store.read(&account_id);

        let mut players = self.players.lock();
        let admission = players.admit(account_id, display_name.to_string(), token, now)?;

        if admission == Admission::Inserted {
            if let (Some(snapshot), Some(session)) = (restored, players.get_mut(account_id)) {
                session.transform = snapshot.transform;
            }
        }

        let info = self.info_from(&players);
        drop(players);

        info!(
            "Player {} joined room {} ({:?}, {}/{})",
            account_id, self.id, admission, info.player_count, info.max_player_count
        );
        Ok((info, token))
    }

    /// Ends a session. Returns false if no session existed for `id`.
    ///
    /// A connected player is told why and its snapshot is persisted. Neither
    /// failing rolls the removal back.
    pub async fn disconnect_player(&self, id: i64, reason: DisconnectReason) -> bool {
        let removed = self.players.lock().remove(id);
        let Some(session) = removed else {
            trace!(
                "Player {} not in room {} on disconnect ({:?})",
                id,
                self.id,
                reason
            );
            return false;
        };

        self.finish_disconnect(session, reason).await;
        true
    }

    /// Side effects of a removal: notify the bound endpoint, persist.
    async fn finish_disconnect(&self, session: PlayerSession, reason: DisconnectReason) {
        let id = session.id;
        let Some(remote) = session.remote else {
            info!(
                "Disconnected pending player {} from room {} ({:?})",
                id, self.id, reason
            );
            return;
        };

        if let Err(e) = self
            .socket
            .send_message(&DisconnectedResponse { reason }, remote)
            .await
        {
            warn!("Failed to notify player {} of disconnect: {}", id, e);
        }

        let snapshot = PlayerSnapshot {
            id,
            display_name: session.display_name,
            transform: session.transform,
        };
        if !self.store.write(id, snapshot) {
            error!(
                "Failed to persist player {} on disconnect from room {}",
                id, self.id
            );
        }

        info!(
            "Disconnected player {} at {} from room {} ({:?})",
            id, remote, self.id, reason
        );
    }

    /// First step of a graceful shutdown. Returns how many sessions ended.
    pub async fn disconnect_all(&self, reason: DisconnectReason) -> usize {
        let ids = self.players.lock().ids();
        let mut disconnected = 0;
        for id in ids {
            if self.disconnect_player(id, reason).await {
                disconnected += 1;
            }
        }
        disconnected
    }

    /// Evicts sessions silent for longer than `timeout_ms`, pending included.
    ///
    /// Each candidate is checked again at removal time, so activity or a
    /// re-join after selection keeps the session.
    pub async fn sweep_timeouts(&self, timeout_ms: i64) -> Vec<i64> {
        let candidates = self.players.lock().timed_out(self.clock.now_ms(), timeout_ms);

        let mut evicted = Vec::with_capacity(candidates.len());
        for id in candidates {
            let now = self.clock.now_ms();
            let removed = self.players.lock().remove_if_timed_out(id, now, timeout_ms);
            let Some(session) = removed else {
                trace!(
                    "Player {} in room {} active again before eviction",
                    id,
                    self.id
                );
                continue;
            };

            self.finish_disconnect(session, DisconnectReason::RequestTimeout)
                .await;
            evicted.push(id);
        }
        evicted
    }

    /// Stops datagram processing. Sessions are left as they are; call
    /// [`Room::disconnect_all`] first to notify players.
    pub async fn close(&self) {
        let pump = self.pump.lock().take();
        if let Some(pump) = pump {
            pump.stop().await;
        }
        self.socket.close().await;
        info!("Room {} closed", self.id);
    }

    /// Runs one datagram through the session state machine.
    pub async fn handle_datagram(&self, datagram: Datagram) -> Result<(), HandlerError> {
        let now = self.clock.now_ms();
        let remote = datagram.remote();

        let action = {
            let mut players = self.players.lock();
            match players.id_by_addr(remote) {
                None => self.on_unbound_datagram(&mut players, &datagram, now)?,
                Some(id) => self.on_session_datagram(&mut players, id, &datagram, now),
            }
        };

        match action {
            Action::None => {}
            Action::Reply(payload) => self.reply(&payload, remote).await?,
            Action::Disconnect(id, reason) => {
                self.disconnect_player(id, reason).await;
            }
            Action::Broadcast(payload, targets) => {
                for target in targets {
                    if let Err(e) = self.socket.send(&payload, target).await {
                        warn!("Failed to relay to {} in room {}: {}", target, self.id, e);
                    }
                }
            }
        }
        Ok(())
    }

    async fn reply(&self, payload: &[u8], remote: SocketAddr) -> Result<(), HandlerError> {
        match self.socket.send(payload, remote).await {
            Ok(_) => Ok(()),
            Err(SocketError::NotRunning) => {
                debug!("Room {} closed before replying to {}", self.id, remote);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Only a connect handshake is meaningful from an endpoint without a
    /// session.
    fn on_unbound_datagram(
        &self,
        players: &mut PlayerIndex,
        datagram: &Datagram,
        now: i64,
    ) -> Result<Action, HandlerError> {
        let remote = datagram.remote();
        if RequestType::from_tag(datagram.tag()) != Some(RequestType::Connect) {
            trace!(
                "Dropped datagram without session (room: {}, remote: {}, tag: {})",
                self.id,
                remote,
                datagram.tag()
            );
            return Ok(Action::None);
        }

        let request = match ConnectRequest::decode(datagram.payload()) {
            Ok(request) => request,
            Err(e) => {
                info!(
                    "Bad connect request in room {} from {}: {}",
                    self.id, remote, e
                );
                return Ok(connected_reply(ConnectResult::BadRequest));
            }
        };

        let player_id = request.player_id;
        let Some(session) = players.get(player_id) else {
            trace!(
                "Connect for unknown player {} in room {} from {}",
                player_id,
                self.id,
                remote
            );
            return Ok(Action::None);
        };

        if let Some(bound) = session.remote {
            debug!(
                "Ignored connect for player {} from {}, already bound to {} in room {}",
                player_id, remote, bound, self.id
            );
            return Ok(Action::None);
        }

        if session.connect_token != request.connect_token {
            warn!(
                "Incorrect connect token for player {} from {} in room {}",
                player_id, remote, self.id
            );
            return Ok(connected_reply(ConnectResult::IncorrectToken));
        }

        if !players.bind(player_id, remote, now) {
            return Err(HandlerError::invariant(format!(
                "pending player {} could not bind unused endpoint {}",
                player_id, remote
            )));
        }

        info!(
            "Connected player {} from {} in room {}",
            player_id, remote, self.id
        );
        Ok(connected_reply(ConnectResult::Success))
    }

    fn on_session_datagram(
        &self,
        players: &mut PlayerIndex,
        id: i64,
        datagram: &Datagram,
        now: i64,
    ) -> Action {
        match RequestType::from_tag(datagram.tag()) {
            Some(RequestType::Connect) => {
                trace!(
                    "Second connect request from player {} in room {}",
                    id,
                    self.id
                );
                Action::None
            }
            Some(RequestType::Disconnect) => match DisconnectRequest::decode(datagram.payload()) {
                Ok(_) => Action::Disconnect(id, DisconnectReason::Requested),
                Err(e) => {
                    warn!("Malformed disconnect from player {}: {}", id, e);
                    Action::Disconnect(id, DisconnectReason::UnknownDatagram)
                }
            },
            _ => self.on_game_datagram(players, id, datagram, now),
        }
    }

    fn on_game_datagram(
        &self,
        players: &mut PlayerIndex,
        id: i64,
        datagram: &Datagram,
        now: i64,
    ) -> Action {
        let Some(session) = players.get_mut(id) else {
            return Action::None;
        };

        match self.game.handle(session, datagram, now) {
            GameVerdict::Accepted { broadcast } => {
                session.last_action_ms = now;
                match broadcast {
                    Some(payload) => {
                        let targets = players.connected_addrs_except(id);
                        Action::Broadcast(payload, targets)
                    }
                    None => Action::None,
                }
            }
            GameVerdict::Throttled => Action::None,
            GameVerdict::Unknown => {
                warn!(
                    "Unknown datagram (tag: {}) from player {} in room {}, evicting",
                    datagram.tag(),
                    id,
                    self.id
                );
                Action::Disconnect(id, DisconnectReason::UnknownDatagram)
            }
        }
    }
}

fn connected_reply(result: ConnectResult) -> Action {
    Action::Reply(ConnectedResponse { result }.encode())
}

impl TaskedHandler for Room {
    fn on_tasked_datagram(
        &self,
        datagram: Datagram,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send {
        self.handle_datagram(datagram)
    }
}
