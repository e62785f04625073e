//! Key-value persistence used for player snapshots and accounts.
//!
//! Storage failures never propagate into session logic: implementations log
//! them and report `None` / `false`.

use crate::error::StoreError;
use log::{debug, error};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shared::PlayerTransform;
use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::hash::Hash;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Generic key-value store.
pub trait Database<K, V>: Send + Sync {
    fn read(&self, key: &K) -> Option<V>;
    /// Inserts or replaces. Returns false if the value could not be stored.
    fn write(&self, key: K, value: V) -> bool;
    fn contains(&self, key: &K) -> bool;
    /// Returns false if nothing was stored under `key`.
    fn remove(&self, key: &K) -> bool;
}

/// What a room remembers about a player between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: i64,
    pub display_name: String,
    pub transform: PlayerTransform,
}

/// In-process store. Contents are lost on exit.
#[derive(Debug)]
pub struct MemoryDatabase<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> MemoryDatabase<K, V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for MemoryDatabase<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Database<K, V> for MemoryDatabase<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn read(&self, key: &K) -> Option<V> {
        self.entries.read().get(key).cloned()
    }

    fn write(&self, key: K, value: V) -> bool {
        self.entries.write().insert(key, value);
        true
    }

    fn contains(&self, key: &K) -> bool {
        self.entries.read().contains_key(key)
    }

    fn remove(&self, key: &K) -> bool {
        self.entries.write().remove(key).is_some()
    }
}

/// One bincode file per key under a directory.
///
/// Keys are rendered with `Display` to form file names, so they must not
/// contain path separators.
#[derive(Debug)]
pub struct FileDatabase<K, V> {
    directory: PathBuf,
    // Held across file writes and removals.
    write_lock: parking_lot::Mutex<()>,
    _marker: PhantomData<fn(K) -> V>,
}

impl<K, V> FileDatabase<K, V>
where
    K: Display,
    V: Serialize + DeserializeOwned,
{
    /// Opens (and creates if missing) a store rooted at `directory`.
    pub fn open(directory: impl AsRef<Path>) -> Result<Self, StoreError> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)?;
        debug!("Opened file database at {}", directory.display());

        Ok(Self {
            directory,
            write_lock: parking_lot::Mutex::new(()),
            _marker: PhantomData,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, key: &K) -> PathBuf {
        self.directory.join(format!("{}.bin", key))
    }

    fn try_read(&self, key: &K) -> Result<Option<V>, StoreError> {
        let bytes = match fs::read(self.path_for(key)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(bincode::deserialize(&bytes)?))
    }

    fn try_write(&self, key: &K, value: &V) -> Result<(), StoreError> {
        let bytes = bincode::serialize(value)?;
        let path = self.path_for(key);
        let staging = path.with_extension("tmp");

        let _guard = self.write_lock.lock();
        fs::write(&staging, bytes)?;
        fs::rename(&staging, &path)?;
        Ok(())
    }

    fn try_remove(&self, key: &K) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock();
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl<K, V> Database<K, V> for FileDatabase<K, V>
where
    K: Display + Send + Sync,
    V: Serialize + DeserializeOwned + Send + Sync,
{
    fn read(&self, key: &K) -> Option<V> {
        match self.try_read(key) {
            Ok(value) => value,
            Err(e) => {
                error!("Failed to read {} from file database: {}", key, e);
                None
            }
        }
    }

    fn write(&self, key: K, value: V) -> bool {
        match self.try_write(&key, &value) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to write {} to file database: {}", key, e);
                false
            }
        }
    }

    fn contains(&self, key: &K) -> bool {
        self.path_for(key).is_file()
    }

    fn remove(&self, key: &K) -> bool {
        match self.try_remove(key) {
            Ok(removed) => removed,
            Err(e) => {
                error!("Failed to remove {} from file database: {}", key, e);
                false
            }
        }
    }
}
