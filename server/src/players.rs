//! Player session bookkeeping for a single room
//!
//! A room tracks every admitted player in a [`PlayerIndex`], which keeps two
//! lookups in step with each other:
//! - by player id, for the control plane and for disconnects
//! - by remote endpoint, for routing incoming datagrams
//!
//! A session starts out pending (no endpoint) when the control plane admits a
//! player, becomes connected once the UDP handshake binds an endpoint, and is
//! dropped from both lookups together when the player leaves.

use crate::error::JoinError;
use shared::{PlayerTransform, Token};
use std::collections::HashMap;
use std::net::SocketAddr;

/// State the room keeps for one admitted player
#[derive(Debug, Clone)]
pub struct PlayerSession {
    /// Account id of the player, unique within the room
    pub id: i64,
    pub display_name: String,
    /// One-time secret the UDP handshake must present
    pub connect_token: Token,
    /// Bound endpoint; `None` while the session is pending
    pub remote: Option<SocketAddr>,
    /// Last time (room clock, ms) the player showed signs of life
    pub last_action_ms: i64,
    pub transform: PlayerTransform,
    /// When the last transform update was accepted
    pub last_transform_ms: Option<i64>,
}

impl PlayerSession {
    /// Creates a pending session stamped with the join time
    pub fn new(id: i64, display_name: String, connect_token: Token, now_ms: i64) -> Self {
        Self {
            id,
            display_name,
            connect_token,
            remote: None,
            last_action_ms: now_ms,
            transform: PlayerTransform::default(),
            last_transform_ms: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.remote.is_some()
    }

    /// True when the player has been silent for longer than `timeout_ms`
    pub fn is_timed_out(&self, now_ms: i64, timeout_ms: i64) -> bool {
        now_ms - self.last_action_ms > timeout_ms
    }
}

/// Outcome of a successful admission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A new pending session was created
    Inserted,
    /// An existing pending session was handed a fresh token
    Reused,
}

/// Sessions of one room, indexed by player id and by remote endpoint
///
/// Not synchronized on its own; the room wraps it in a single lock so both
/// lookups always change together.
#[derive(Debug)]
pub struct PlayerIndex {
    room_id: i64,
    max_players: usize,
    by_id: HashMap<i64, PlayerSession>,
    by_addr: HashMap<SocketAddr, i64>,
}

impl PlayerIndex {
    pub fn new(room_id: i64, max_players: usize) -> Self {
        Self {
            room_id,
            max_players,
            by_id: HashMap::new(),
            by_addr: HashMap::new(),
        }
    }

    /// Admits a player as a pending session holding `token`
    ///
    /// A player that is already pending gets the new token, which makes the
    /// previous one stale. A connected player is refused, as is a new player
    /// once pending and connected sessions together fill the room.
    pub fn admit(
        &mut self,
        id: i64,
        display_name: String,
        token: Token,
        now_ms: i64,
    ) -> Result<Admission, JoinError> {
        if let Some(session) = self.by_id.get_mut(&id) {
            if session.is_connected() {
                return Err(JoinError::AlreadyConnected(id));
            }
            session.display_name = display_name;
            session.connect_token = token;
            session.last_action_ms = now_ms;
            return Ok(Admission::Reused);
        }

        if self.by_id.len() >= self.max_players {
            return Err(JoinError::RoomFull(self.room_id));
        }

        self.by_id
            .insert(id, PlayerSession::new(id, display_name, token, now_ms));
        Ok(Admission::Inserted)
    }

    pub fn get(&self, id: i64) -> Option<&PlayerSession> {
        self.by_id.get(&id)
    }

    pub fn get_mut(&mut self, id: i64) -> Option<&mut PlayerSession> {
        self.by_id.get_mut(&id)
    }

    /// Finds the player bound to `addr`
    pub fn id_by_addr(&self, addr: SocketAddr) -> Option<i64> {
        self.by_addr.get(&addr).copied()
    }

    /// Binds a pending session to `addr`, making it connected
    ///
    /// Returns false when the session is missing, already connected, or the
    /// endpoint already belongs to another session.
    pub fn bind(&mut self, id: i64, addr: SocketAddr, now_ms: i64) -> bool {
        if self.by_addr.contains_key(&addr) {
            return false;
        }
        let Some(session) = self.by_id.get_mut(&id) else {
            return false;
        };
        if session.is_connected() {
            return false;
        }

        session.remote = Some(addr);
        session.last_action_ms = now_ms;
        self.by_addr.insert(addr, id);
        true
    }

    /// Removes a session from both lookups
    pub fn remove(&mut self, id: i64) -> Option<PlayerSession> {
        let session = self.by_id.remove(&id)?;
        if let Some(addr) = session.remote {
            self.by_addr.remove(&addr);
        }
        Some(session)
    }

    /// Removes the session only if it is still silent for longer than
    /// `timeout_ms` at `now_ms`
    pub fn remove_if_timed_out(
        &mut self,
        id: i64,
        now_ms: i64,
        timeout_ms: i64,
    ) -> Option<PlayerSession> {
        if !self.by_id.get(&id)?.is_timed_out(now_ms, timeout_ms) {
            return None;
        }
        self.remove(id)
    }

    /// Ids of sessions silent for longer than `timeout_ms`, in ascending order
    pub fn timed_out(&self, now_ms: i64, timeout_ms: i64) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .by_id
            .values()
            .filter(|session| session.is_timed_out(now_ms, timeout_ms))
            .map(|session| session.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Endpoints of every connected session other than `except`
    pub fn connected_addrs_except(&self, except: i64) -> Vec<SocketAddr> {
        self.by_addr
            .iter()
            .filter(|(_, id)| **id != except)
            .map(|(addr, _)| *addr)
            .collect()
    }

    pub fn ids(&self) -> Vec<i64> {
        self.by_id.keys().copied().collect()
    }

    /// Number of sessions, pending ones included
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn connected_count(&self) -> usize {
        self.by_addr.len()
    }

    pub fn max_players(&self) -> usize {
        self.max_players
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    #[test]
    fn test_session_creation() {
        let token = Token::generate();
        let session = PlayerSession::new(7, "alice".to_string(), token, 100);

        assert_eq!(session.id, 7);
        assert_eq!(session.connect_token, token);
        assert!(!session.is_connected());
        assert_eq!(session.last_action_ms, 100);
        assert!(session.last_transform_ms.is_none());
    }

    #[test]
    fn test_session_timeout() {
        let session = PlayerSession::new(1, "a".to_string(), Token::generate(), 1_000);

        assert!(!session.is_timed_out(1_500, 500));
        assert!(session.is_timed_out(1_501, 500));
    }

    #[test]
    fn test_admit_and_capacity() {
        let mut index = PlayerIndex::new(3, 2);

        assert_eq!(
            index.admit(1, "a".to_string(), Token::generate(), 0),
            Ok(Admission::Inserted)
        );
        assert_eq!(
            index.admit(2, "b".to_string(), Token::generate(), 0),
            Ok(Admission::Inserted)
        );
        assert_eq!(
            index.admit(3, "c".to_string(), Token::generate(), 0),
            Err(JoinError::RoomFull(3))
        );
        assert_eq!(index.len(), 2);
        assert_eq!(index.max_players(), 2);
    }

    #[test]
    fn test_readmit_pending_replaces_token() {
        let mut index = PlayerIndex::new(1, 1);
        let stale = Token::generate();
        let fresh = Token::generate();

        index.admit(5, "a".to_string(), stale, 0).unwrap();
        // Reuse never grows the room, so a full room still accepts it.
        assert_eq!(
            index.admit(5, "a2".to_string(), fresh, 40),
            Ok(Admission::Reused)
        );

        let session = index.get(5).unwrap();
        assert_eq!(session.connect_token, fresh);
        assert_ne!(session.connect_token, stale);
        assert_eq!(session.display_name, "a2");
        assert_eq!(session.last_action_ms, 40);
    }

    #[test]
    fn test_readmit_connected_is_refused() {
        let mut index = PlayerIndex::new(1, 4);
        index.admit(5, "a".to_string(), Token::generate(), 0).unwrap();
        assert!(index.bind(5, test_addr(), 10));

        assert_eq!(
            index.admit(5, "a".to_string(), Token::generate(), 20),
            Err(JoinError::AlreadyConnected(5))
        );
    }

    #[test]
    fn test_bind_updates_both_lookups() {
        let mut index = PlayerIndex::new(1, 4);
        index.admit(5, "a".to_string(), Token::generate(), 0).unwrap();

        assert!(index.bind(5, test_addr(), 25));
        assert_eq!(index.id_by_addr(test_addr()), Some(5));
        assert_eq!(index.get(5).unwrap().remote, Some(test_addr()));
        assert_eq!(index.get(5).unwrap().last_action_ms, 25);
        assert_eq!(index.connected_count(), 1);
    }

    #[test]
    fn test_bind_never_rebinds() {
        let mut index = PlayerIndex::new(1, 4);
        index.admit(5, "a".to_string(), Token::generate(), 0).unwrap();
        index.admit(6, "b".to_string(), Token::generate(), 0).unwrap();

        assert!(index.bind(5, test_addr(), 1));
        assert!(!index.bind(5, test_addr2(), 2));
        assert!(!index.bind(6, test_addr(), 3));
        assert!(!index.bind(99, test_addr2(), 4));

        assert_eq!(index.get(5).unwrap().remote, Some(test_addr()));
        assert_eq!(index.id_by_addr(test_addr2()), None);
    }

    #[test]
    fn test_remove_clears_both_lookups() {
        let mut index = PlayerIndex::new(1, 4);
        index.admit(5, "a".to_string(), Token::generate(), 0).unwrap();
        index.bind(5, test_addr(), 1);

        let removed = index.remove(5).unwrap();
        assert_eq!(removed.id, 5);
        assert!(index.is_empty());
        assert_eq!(index.id_by_addr(test_addr()), None);
        assert!(index.remove(5).is_none());
    }

    #[test]
    fn test_timed_out_includes_pending() {
        let mut index = PlayerIndex::new(1, 4);
        index.admit(1, "a".to_string(), Token::generate(), 0).unwrap();
        index.admit(2, "b".to_string(), Token::generate(), 0).unwrap();
        index.bind(2, test_addr(), 4_000);

        assert_eq!(index.timed_out(5_500, 5_000), vec![1]);
        assert_eq!(index.timed_out(10_000, 5_000), vec![1, 2]);
    }

    #[test]
    fn test_remove_if_timed_out_rechecks_liveness() {
        let mut index = PlayerIndex::new(1, 4);
        index.admit(1, "a".to_string(), Token::generate(), 0).unwrap();
        index.admit(2, "b".to_string(), Token::generate(), 0).unwrap();
        index.bind(2, test_addr(), 0);
        assert_eq!(index.timed_out(6_000, 5_000), vec![1, 2]);

        // Activity after selection keeps the session
        index.get_mut(2).unwrap().last_action_ms = 5_900;
        assert!(index.remove_if_timed_out(2, 6_000, 5_000).is_none());
        assert_eq!(index.id_by_addr(test_addr()), Some(2));

        // So does a fresh re-join under the same id
        index.remove(1);
        index.admit(1, "a".to_string(), Token::generate(), 5_950).unwrap();
        assert!(index.remove_if_timed_out(1, 6_000, 5_000).is_none());

        assert_eq!(index.remove_if_timed_out(2, 11_000, 5_000).unwrap().id, 2);
        assert!(index.remove_if_timed_out(2, 11_000, 5_000).is_none());
        assert_eq!(index.id_by_addr(test_addr()), None);
    }

    #[test]
    fn test_connected_addrs_except() {
        let mut index = PlayerIndex::new(1, 4);
        index.admit(1, "a".to_string(), Token::generate(), 0).unwrap();
        index.admit(2, "b".to_string(), Token::generate(), 0).unwrap();
        index.admit(3, "c".to_string(), Token::generate(), 0).unwrap();
        index.bind(1, test_addr(), 0);
        index.bind(2, test_addr2(), 0);

        assert_eq!(index.connected_addrs_except(1), vec![test_addr2()]);
        assert_eq!(index.connected_addrs_except(3).len(), 2);
        let mut ids = index.ids();
        ids.sort();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
