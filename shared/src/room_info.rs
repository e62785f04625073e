//! Room discovery projection.

use serde::{Deserialize, Serialize};

/// Point-in-time view of a room as shown to room discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub id: i64,
    pub name: String,
    pub player_count: usize,
    pub max_player_count: usize,
}

impl RoomInfo {
    pub fn is_full(&self) -> bool {
        self.player_count >= self.max_player_count
    }
}
