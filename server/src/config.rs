//! Server configuration: TOML file values, overridden by CLI flags.

use crate::error::ConfigError;
use crate::room::RoomConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MAX_TASKS: usize = 64;
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_SESSION_TIMEOUT_MS: i64 = 5000;

/// How a room socket hands datagrams to the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchPolicy {
    /// One task per datagram, at most `max_tasks` at once; the rest are shed.
    Shed { max_tasks: usize },
    /// Bounded FIFO drained by a single consumer; overflow is dropped.
    Queue { capacity: usize },
}

impl DispatchPolicy {
    /// The task cap or queue capacity.
    pub fn limit(&self) -> usize {
        match self {
            Self::Shed { max_tasks } => *max_tasks,
            Self::Queue { capacity } => *capacity,
        }
    }
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self::Shed {
            max_tasks: DEFAULT_MAX_TASKS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSettings {
    pub id: i64,
    pub name: String,
    pub max_players: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    /// Port of the first room; room `i` listens on `port + i`.
    pub port: u16,
    pub policy: DispatchPolicy,
    pub sweep_interval_ms: u64,
    pub session_timeout_ms: i64,
    /// Where player snapshots and accounts are kept. In memory when unset.
    pub data_dir: Option<PathBuf>,
    pub rooms: Vec<RoomSettings>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            policy: DispatchPolicy::default(),
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            data_dir: None,
            rooms: vec![RoomSettings {
                id: 1,
                name: "Lobby".to_string(),
                max_players: 16,
            }],
        }
    }
}

impl ServerConfig {
    /// Reads and validates a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.host
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::Invalid(format!("host {:?} is not an IP address", self.host)))?;

        if self.rooms.is_empty() {
            return Err(ConfigError::Invalid("at least one room is required".to_string()));
        }
        if self.policy.limit() == 0 {
            return Err(ConfigError::Invalid(
                "dispatch policy limit must be positive".to_string(),
            ));
        }
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "sweep interval must be positive".to_string(),
            ));
        }
        if self.session_timeout_ms <= 0 {
            return Err(ConfigError::Invalid(
                "session timeout must be positive".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for room in &self.rooms {
            if !seen.insert(room.id) {
                return Err(ConfigError::Invalid(format!("duplicate room id {}", room.id)));
            }
            if room.max_players == 0 {
                return Err(ConfigError::Invalid(format!(
                    "room {} needs a positive max_players",
                    room.id
                )));
            }
        }

        if self.port != 0 && usize::from(self.port) + self.rooms.len() - 1 > usize::from(u16::MAX) {
            return Err(ConfigError::Invalid(format!(
                "{} rooms do not fit above port {}",
                self.rooms.len(),
                self.port
            )));
        }

        Ok(())
    }

    /// Bind address of the room at position `index`. A base port of 0 gives
    /// every room its own OS-assigned port.
    pub fn room_addr(&self, index: usize) -> Result<SocketAddr, ConfigError> {
        let ip = self
            .host
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::Invalid(format!("host {:?} is not an IP address", self.host)))?;
        if self.port == 0 {
            return Ok(SocketAddr::new(ip, 0));
        }
        let port = u16::try_from(index)
            .ok()
            .and_then(|offset| self.port.checked_add(offset))
            .ok_or_else(|| ConfigError::Invalid(format!("no port for room index {}", index)))?;
        Ok(SocketAddr::new(ip, port))
    }

    pub fn room_configs(&self) -> Vec<RoomConfig> {
        self.rooms
            .iter()
            .map(|room| RoomConfig {
                id: room.id,
                name: room.name.clone(),
                max_players: room.max_players,
                policy: self.policy,
            })
            .collect()
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert_ok!(config.validate());
        assert_eq!(config.rooms.len(), 1);
        assert_eq!(
            config.policy,
            DispatchPolicy::Shed {
                max_tasks: DEFAULT_MAX_TASKS
            }
        );
    }

    #[test]
    fn test_parse_full_file() {
        let text = r#"
            host = "0.0.0.0"
            port = 9000
            sweep_interval_ms = 250
            session_timeout_ms = 3000
            data_dir = "/var/lib/roomnet"

            [policy]
            kind = "queue"
            capacity = 128

            [[rooms]]
            id = 10
            name = "Arena"
            max_players = 8

            [[rooms]]
            id = 11
            name = "Dungeon"
            max_players = 4
        "#;

        let config = assert_ok!(ServerConfig::from_toml_str(text));
        assert_eq!(config.port, 9000);
        assert_eq!(config.policy, DispatchPolicy::Queue { capacity: 128 });
        assert_eq!(config.sweep_interval(), Duration::from_millis(250));
        assert_eq!(config.data_dir, Some(PathBuf::from("/var/lib/roomnet")));
        assert_eq!(config.rooms[1].name, "Dungeon");

        let addr = assert_ok!(config.room_addr(1));
        assert_eq!(addr, "0.0.0.0:9001".parse().unwrap());

        let rooms = config.room_configs();
        assert_eq!(rooms[0].id, 10);
        assert_eq!(rooms[0].policy, DispatchPolicy::Queue { capacity: 128 });
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = assert_ok!(ServerConfig::from_toml_str("port = 7000"));
        assert_eq!(config.port, 7000);
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.session_timeout_ms, DEFAULT_SESSION_TIMEOUT_MS);
        assert_eq!(config.rooms.len(), 1);
    }

    #[test]
    fn test_rejects_invalid_values() {
        let duplicate = r#"
            [[rooms]]
            id = 1
            name = "a"
            max_players = 2
            [[rooms]]
            id = 1
            name = "b"
            max_players = 2
        "#;
        assert!(matches!(
            ServerConfig::from_toml_str(duplicate),
            Err(ConfigError::Invalid(_))
        ));

        let empty_room = r#"
            [[rooms]]
            id = 1
            name = "a"
            max_players = 0
        "#;
        assert_err!(ServerConfig::from_toml_str(empty_room));

        let zero_tasks = r#"
            [policy]
            kind = "shed"
            max_tasks = 0
        "#;
        assert_err!(ServerConfig::from_toml_str(zero_tasks));

        assert_err!(ServerConfig::from_toml_str("host = \"not an ip\""));
        assert!(matches!(
            ServerConfig::from_toml_str("port = \"eighty\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_rooms_must_fit_in_port_range() {
        let mut config = ServerConfig {
            port: u16::MAX,
            ..ServerConfig::default()
        };
        assert_ok!(config.validate());

        config.rooms.push(RoomSettings {
            id: 2,
            name: "overflow".to_string(),
            max_players: 1,
        });
        assert_err!(config.validate());
        assert_err!(config.room_addr(1));
    }

    #[test]
    fn test_port_zero_is_ephemeral_for_every_room() {
        let mut config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        config.rooms.push(RoomSettings {
            id: 2,
            name: "second".to_string(),
            max_players: 1,
        });
        assert_ok!(config.validate());

        for index in 0..config.rooms.len() {
            assert_eq!(
                assert_ok!(config.room_addr(index)),
                "127.0.0.1:0".parse().unwrap()
            );
        }
    }
}
