//! Account and room-ticketing service consumed by an outer transport.
//!
//! Every operation answers with a result code instead of an error, mirroring
//! what a transport puts on the wire. Joining a room yields the connect token
//! the player then presents to the room's UDP socket.

use crate::directory::RoomDirectory;
use crate::store::Database;
use log::{error, info, trace};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shared::{RoomInfo, Token};
use std::sync::Arc;

pub const MIN_USERNAME_LEN: usize = 3;
pub const MAX_USERNAME_LEN: usize = 32;

/// Counter key for account ids in the counters store.
const NEXT_ACCOUNT_ID: &str = "next_account_id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub passhash: String,
    pub email: String,
    /// Set by the latest sign-in. `None` before the first one.
    pub access_token: Option<Token>,
    pub is_blocked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SignUpResult {
    BadRequest = 0,
    Success = 1,
    UsernameBusy = 2,
    FailedToWrite = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SignInResult {
    BadRequest = 0,
    Success = 1,
    IncorrectUsername = 2,
    IncorrectPassword = 3,
    AccountIsBlocked = 4,
    FailedToWrite = 5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GetRoomInfosResult {
    BadRequest = 0,
    Success = 1,
    IncorrectUsername = 2,
    IncorrectAccessToken = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JoinRoomResult {
    BadRequest = 0,
    Success = 1,
    IncorrectUsername = 2,
    IncorrectAccessToken = 3,
    FailedToJoin = 4,
}

/// Why an access-token check failed.
enum AuthFailure {
    BadRequest,
    IncorrectUsername,
    IncorrectAccessToken,
}

pub fn is_valid_username(username: &str) -> bool {
    (MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&username.len())
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn is_valid_email(email: &str) -> bool {
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => !local.is_empty() && !domain.is_empty(),
        _ => false,
    }
}

pub struct ControlPlane {
    accounts: Arc<dyn Database<String, Account>>,
    counters: Arc<dyn Database<String, i64>>,
    directory: Arc<RoomDirectory>,
    // Held across read-modify-write sequences on accounts and counters.
    write_lock: Mutex<()>,
}

impl ControlPlane {
    pub fn new(
        accounts: Arc<dyn Database<String, Account>>,
        counters: Arc<dyn Database<String, i64>>,
        directory: Arc<RoomDirectory>,
    ) -> Self {
        Self {
            accounts,
            counters,
            directory,
            write_lock: Mutex::new(()),
        }
    }

    pub fn directory(&self) -> &Arc<RoomDirectory> {
        &self.directory
    }

    pub fn account(&self, username: &str) -> Option<Account> {
        self.accounts.read(&username.to_string())
    }

    pub fn sign_up(&self, username: &str, passhash: &str, email: &str) -> SignUpResult {
        if !is_valid_username(username) || passhash.is_empty() || !is_valid_email(email) {
            trace!("Bad sign up request (username: {:?})", username);
            return SignUpResult::BadRequest;
        }

        let _guard = self.write_lock.lock();
        let key = username.to_string();
        if self.accounts.contains(&key) {
            trace!("Sign up refused, username busy (username: {})", username);
            return SignUpResult::UsernameBusy;
        }

        let id = self.counters.read(&NEXT_ACCOUNT_ID.to_string()).unwrap_or(1);
        let account = Account {
            id,
            username: key.clone(),
            passhash: passhash.to_string(),
            email: email.to_string(),
            access_token: None,
            is_blocked: false,
        };
        if !self.accounts.write(key.clone(), account) {
            error!("Failed to write account on sign up (username: {})", username);
            return SignUpResult::FailedToWrite;
        }

        // The id is only consumed once the account exists
        if !self.counters.write(NEXT_ACCOUNT_ID.to_string(), id + 1) {
            error!("Failed to reserve account id {} (username: {})", id, username);
            if !self.accounts.remove(&key) {
                error!("Failed to roll back account (username: {})", username);
            }
            return SignUpResult::FailedToWrite;
        }

        info!("Signed up account {} (username: {})", id, username);
        SignUpResult::Success
    }

    /// On success returns a fresh access token; the previous one stops working.
    pub fn sign_in(&self, username: &str, passhash: &str) -> (SignInResult, Option<Token>) {
        if !is_valid_username(username) || passhash.is_empty() {
            trace!("Bad sign in request (username: {:?})", username);
            return (SignInResult::BadRequest, None);
        }

        let _guard = self.write_lock.lock();
        let Some(mut account) = self.accounts.read(&username.to_string()) else {
            trace!("Sign in refused, incorrect username (username: {})", username);
            return (SignInResult::IncorrectUsername, None);
        };
        if account.passhash != passhash {
            trace!("Sign in refused, incorrect password (username: {})", username);
            return (SignInResult::IncorrectPassword, None);
        }
        if account.is_blocked {
            trace!("Sign in refused, account is blocked (username: {})", username);
            return (SignInResult::AccountIsBlocked, None);
        }

        let access_token = Token::generate();
        account.access_token = Some(access_token);
        if !self.accounts.write(username.to_string(), account) {
            error!("Failed to write account on sign in (username: {})", username);
            return (SignInResult::FailedToWrite, None);
        }

        info!("Account signed in (username: {})", username);
        (SignInResult::Success, Some(access_token))
    }

    pub fn get_room_infos(
        &self,
        username: &str,
        access_token: &Token,
    ) -> (GetRoomInfosResult, Vec<RoomInfo>) {
        if let Err(failure) = self.authorize(username, access_token) {
            let result = match failure {
                AuthFailure::BadRequest => GetRoomInfosResult::BadRequest,
                AuthFailure::IncorrectUsername => GetRoomInfosResult::IncorrectUsername,
                AuthFailure::IncorrectAccessToken => GetRoomInfosResult::IncorrectAccessToken,
            };
            return (result, Vec::new());
        }

        let infos = self.directory.list_infos();
        info!(
            "Sent room infos (rooms: {}, username: {})",
            infos.len(),
            username
        );
        (GetRoomInfosResult::Success, infos)
    }

    /// Joins the account to a room under its account id and hands back the
    /// UDP connect token.
    pub fn join_room(
        &self,
        username: &str,
        access_token: &Token,
        room_id: i64,
    ) -> (JoinRoomResult, Option<(RoomInfo, Token)>) {
        let account = match self.authorize(username, access_token) {
            Ok(account) => account,
            Err(failure) => {
                let result = match failure {
                    AuthFailure::BadRequest => JoinRoomResult::BadRequest,
                    AuthFailure::IncorrectUsername => JoinRoomResult::IncorrectUsername,
                    AuthFailure::IncorrectAccessToken => JoinRoomResult::IncorrectAccessToken,
                };
                return (result, None);
            }
        };

        match self
            .directory
            .join_player(room_id, account.id, &account.username)
        {
            Ok(grant) => {
                info!("Account joined room {} (username: {})", room_id, username);
                (JoinRoomResult::Success, Some(grant))
            }
            Err(e) => {
                trace!(
                    "Join refused for room {} (username: {}): {}",
                    room_id,
                    username,
                    e
                );
                (JoinRoomResult::FailedToJoin, None)
            }
        }
    }

    /// Blocks or unblocks an account. Blocking also revokes its access token.
    pub fn block_account(&self, username: &str, blocked: bool) -> bool {
        let _guard = self.write_lock.lock();
        let Some(mut account) = self.accounts.read(&username.to_string()) else {
            return false;
        };

        account.is_blocked = blocked;
        if blocked {
            account.access_token = None;
        }
        let written = self.accounts.write(username.to_string(), account);
        if written {
            info!("Account {} (username: {})", if blocked { "blocked" } else { "unblocked" }, username);
        }
        written
    }

    fn authorize(&self, username: &str, access_token: &Token) -> Result<Account, AuthFailure> {
        if !is_valid_username(username) {
            return Err(AuthFailure::BadRequest);
        }
        let Some(account) = self.accounts.read(&username.to_string()) else {
            trace!("Incorrect username {:?}", username);
            return Err(AuthFailure::IncorrectUsername);
        };
        if account.access_token.as_ref() != Some(access_token) {
            trace!("Incorrect access token (username: {})", username);
            return Err(AuthFailure::IncorrectAccessToken);
        }
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::DispatchPolicy;
    use crate::game::TransformHandler;
    use crate::room::{Room, RoomConfig};
    use crate::store::{MemoryDatabase, PlayerSnapshot};

    fn control_plane(max_players: usize) -> ControlPlane {
        let directory = Arc::new(RoomDirectory::new());
        let room = Room::new(
            RoomConfig {
                id: 1,
                name: "Lobby".to_string(),
                max_players,
                policy: DispatchPolicy::default(),
            },
            Arc::new(MemoryDatabase::<i64, PlayerSnapshot>::new()),
            Arc::new(ManualClock::new(0)),
            Arc::new(TransformHandler::new()),
        )
        .unwrap();
        directory.register(room).unwrap();

        ControlPlane::new(
            Arc::new(MemoryDatabase::<String, Account>::new()),
            Arc::new(MemoryDatabase::<String, i64>::new()),
            directory,
        )
    }

    /// Database that refuses every write
    struct ReadOnly;

    impl<K: Send + Sync, V: Send + Sync> Database<K, V> for ReadOnly {
        fn read(&self, _key: &K) -> Option<V> {
            None
        }
        fn write(&self, _key: K, _value: V) -> bool {
            false
        }
        fn contains(&self, _key: &K) -> bool {
            false
        }
        fn remove(&self, _key: &K) -> bool {
            false
        }
    }

    #[test]
    fn test_username_and_email_rules() {
        assert!(is_valid_username("bob"));
        assert!(is_valid_username("Player_01"));
        assert!(!is_valid_username("ab"));
        assert!(!is_valid_username(&"a".repeat(33)));
        assert!(!is_valid_username("semi;colon"));
        assert!(!is_valid_username("space man"));

        assert!(is_valid_email("a@b"));
        assert!(!is_valid_email("ab"));
        assert!(!is_valid_email("@b"));
        assert!(!is_valid_email("a@"));
        assert!(!is_valid_email("a@b@c"));
    }

    #[test]
    fn test_sign_up() {
        let control = control_plane(4);

        assert_eq!(control.sign_up("alice", "h1", "a@x.io"), SignUpResult::Success);
        assert_eq!(control.sign_up("bob", "h2", "b@x.io"), SignUpResult::Success);
        assert_eq!(
            control.sign_up("alice", "h3", "c@x.io"),
            SignUpResult::UsernameBusy
        );
        assert_eq!(control.sign_up("al", "h", "a@x.io"), SignUpResult::BadRequest);
        assert_eq!(control.sign_up("carol", "", "a@x.io"), SignUpResult::BadRequest);
        assert_eq!(control.sign_up("carol", "h", "nope"), SignUpResult::BadRequest);

        assert_eq!(control.account("alice").unwrap().id, 1);
        assert_eq!(control.account("bob").unwrap().id, 2);
        assert!(control.account("alice").unwrap().access_token.is_none());
    }

    #[test]
    fn test_sign_up_write_failure() {
        let counters = Arc::new(MemoryDatabase::<String, i64>::new());
        let control = ControlPlane::new(
            Arc::new(ReadOnly),
            counters.clone(),
            Arc::new(RoomDirectory::new()),
        );
        assert_eq!(
            control.sign_up("alice", "h", "a@x.io"),
            SignUpResult::FailedToWrite
        );
        // No id was consumed
        assert!(counters.read(&NEXT_ACCOUNT_ID.to_string()).is_none());

        let accounts = Arc::new(MemoryDatabase::<String, Account>::new());
        let control = ControlPlane::new(
            accounts.clone(),
            Arc::new(ReadOnly),
            Arc::new(RoomDirectory::new()),
        );
        assert_eq!(
            control.sign_up("alice", "h", "a@x.io"),
            SignUpResult::FailedToWrite
        );
        // The account write is rolled back
        assert!(!accounts.contains(&"alice".to_string()));
    }

    #[test]
    fn test_sign_in() {
        let control = control_plane(4);
        control.sign_up("alice", "h1", "a@x.io");

        assert_eq!(control.sign_in("nobody", "h1").0, SignInResult::IncorrectUsername);
        assert_eq!(control.sign_in("alice", "bad").0, SignInResult::IncorrectPassword);
        assert_eq!(control.sign_in("alice", "").0, SignInResult::BadRequest);

        let (result, first) = control.sign_in("alice", "h1");
        assert_eq!(result, SignInResult::Success);
        let (_, second) = control.sign_in("alice", "h1");
        assert_ne!(first, second);
        assert_eq!(control.account("alice").unwrap().access_token, second);
    }

    #[test]
    fn test_blocked_account() {
        let control = control_plane(4);
        control.sign_up("alice", "h1", "a@x.io");
        let (_, token) = control.sign_in("alice", "h1");
        let token = token.unwrap();

        assert!(control.block_account("alice", true));
        assert!(!control.block_account("ghost", true));
        assert_eq!(control.sign_in("alice", "h1").0, SignInResult::AccountIsBlocked);
        assert_eq!(
            control.get_room_infos("alice", &token).0,
            GetRoomInfosResult::IncorrectAccessToken
        );

        assert!(control.block_account("alice", false));
        assert_eq!(control.sign_in("alice", "h1").0, SignInResult::Success);
    }

    #[test]
    fn test_room_infos_and_join() {
        let control = control_plane(1);
        control.sign_up("alice", "h1", "a@x.io");
        control.sign_up("bob", "h2", "b@x.io");
        let alice = control.sign_in("alice", "h1").1.unwrap();
        let bob = control.sign_in("bob", "h2").1.unwrap();

        let (result, infos) = control.get_room_infos("alice", &alice);
        assert_eq!(result, GetRoomInfosResult::Success);
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].name, "Lobby");

        assert_eq!(
            control.get_room_infos("alice", &bob).0,
            GetRoomInfosResult::IncorrectAccessToken
        );
        assert_eq!(
            control.get_room_infos("nobody", &alice).0,
            GetRoomInfosResult::IncorrectUsername
        );
        assert_eq!(
            control.get_room_infos("x", &alice).0,
            GetRoomInfosResult::BadRequest
        );

        let (result, grant) = control.join_room("alice", &alice, 1);
        assert_eq!(result, JoinRoomResult::Success);
        let (info, connect_token) = grant.unwrap();
        assert_eq!(info.player_count, 1);

        let room = control.directory().get(1).unwrap();
        let session = room.player(control.account("alice").unwrap().id).unwrap();
        assert_eq!(session.connect_token, connect_token);
        assert_eq!(session.display_name, "alice");

        assert_eq!(
            control.join_room("bob", &bob, 1).0,
            JoinRoomResult::FailedToJoin
        );
        assert_eq!(
            control.join_room("bob", &bob, 42).0,
            JoinRoomResult::FailedToJoin
        );
        assert_eq!(
            control.join_room("bob", &alice, 1).0,
            JoinRoomResult::IncorrectAccessToken
        );
    }
}
