//! Concurrent registry of rooms keyed by room id.

use crate::error::{JoinError, RoomError};
use crate::room::Room;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::info;
use shared::{DisconnectReason, RoomInfo, Token};
use std::sync::Arc;

#[derive(Default)]
pub struct RoomDirectory {
    rooms: DashMap<i64, Arc<Room>>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, room: Arc<Room>) -> Result<(), RoomError> {
        let id = room.id();
        match self.rooms.entry(id) {
            Entry::Occupied(_) => Err(RoomError::DuplicateRoom { id }),
            Entry::Vacant(slot) => {
                info!("Registered room {} ({})", id, room.name());
                slot.insert(room);
                Ok(())
            }
        }
    }

    pub fn get(&self, room_id: i64) -> Option<Arc<Room>> {
        self.rooms.get(&room_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Unregisters a room. The room itself keeps running until closed.
    pub fn remove(&self, room_id: i64) -> Option<Arc<Room>> {
        self.rooms.remove(&room_id).map(|(_, room)| room)
    }

    /// Registered rooms ordered by id.
    pub fn rooms(&self) -> Vec<Arc<Room>> {
        let mut rooms: Vec<Arc<Room>> = self
            .rooms
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        rooms.sort_by_key(|room| room.id());
        rooms
    }

    /// Each entry reflects its room at the moment it was read.
    pub fn list_infos(&self) -> Vec<RoomInfo> {
        self.rooms().iter().map(|room| room.info()).collect()
    }

    pub fn join_player(
        &self,
        room_id: i64,
        account_id: i64,
        display_name: &str,
    ) -> Result<(RoomInfo, Token), JoinError> {
        let room = self.get(room_id).ok_or(JoinError::UnknownRoom(room_id))?;
        room.join_player(account_id, display_name)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Disconnects every player with `RoomClosed`, then closes every room.
    pub async fn shutdown(&self) {
        for room in self.rooms() {
            let disconnected = room.disconnect_all(DisconnectReason::RoomClosed).await;
            info!(
                "Disconnected {} players from room {} for shutdown",
                disconnected,
                room.id()
            );
            room.close().await;
        }
    }
}
