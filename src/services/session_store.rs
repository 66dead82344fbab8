// src/services/session_store.rs
//
// Durable string-keyed storage for crash recovery. Every mutation of the
// accepted ride, trip flag, or navigation stage is mirrored here so a cold
// start can rebuild the driver's view before any network call resolves.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::errors::{SwiftaidError, SwiftaidResult};

/// Fixed keys for the persisted session.
pub struct StoreKeys;

impl StoreKeys {
    pub const ACCEPTED_RIDE: &'static str = "session:accepted_ride";
    pub const TRIP_STARTED: &'static str = "session:trip_started";
    pub const NAV_STAGE: &'static str = "session:nav_stage";
    pub const NAV_DESTINATION: &'static str = "session:nav_destination";
    pub const DRIVER_PROFILE: &'static str = "cache:driver_profile";
    pub const DRIVER_STATS: &'static str = "cache:driver_stats";
    pub const ONLINE_STATUS: &'static str = "cache:online_status";
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> SwiftaidResult<Option<String>>;
    async fn put(&self, key: &str, value: String) -> SwiftaidResult<()>;
    async fn remove(&self, key: &str) -> SwiftaidResult<()>;
}

/// Write a JSON value under `key`, logging and swallowing failures.
///
/// In-memory state stays authoritative for the process lifetime even when
/// the durable mirror fails, so storage errors must never abort the
/// operation that triggered the write.
pub async fn write_json<T: Serialize>(store: &dyn SessionStore, key: &str, value: &T) {
    let json = match serde_json::to_string(value) {
        Ok(json) => json,
        Err(err) => {
            tracing::warn!("Failed to serialize value for key {}: {}", key, err);
            return;
        }
    };
    if let Err(err) = store.put(key, json).await {
        tracing::warn!("Failed to persist key {}: {}", key, err);
    }
}

/// Read and deserialize the value under `key`; absent or unreadable
/// entries both come back as `None`.
pub async fn read_json<T: DeserializeOwned>(store: &dyn SessionStore, key: &str) -> Option<T> {
    match store.get(key).await {
        Ok(Some(json)) => match serde_json::from_str(&json) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!("Discarding unreadable entry for key {}: {}", key, err);
                None
            }
        },
        Ok(None) => None,
        Err(err) => {
            tracing::warn!("Failed to read key {}: {}", key, err);
            None
        }
    }
}

/// Remove `key`, logging and swallowing failures.
pub async fn remove_entry(store: &dyn SessionStore, key: &str) {
    if let Err(err) = store.remove(key).await {
        tracing::warn!("Failed to remove key {}: {}", key, err);
    }
}

// ------------------------------
// In-memory store (tests, fallback)
// ------------------------------

#[derive(Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &str) -> SwiftaidResult<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> SwiftaidResult<()> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> SwiftaidResult<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

// ------------------------------
// File-backed store
// ------------------------------

/// JSON-file-backed store. Each mutation rewrites the whole file through a
/// temp-file rename, so individual writes are atomic; there are no
/// multi-key transactions.
pub struct FileSessionStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileSessionStore {
    /// Open the store at `path`, loading any existing entries. A missing
    /// or unreadable file yields an empty store rather than an error: a
    /// corrupt session mirror must not block app startup.
    pub async fn open(path: impl AsRef<Path>) -> SwiftaidResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(map) => map,
                Err(err) => {
                    tracing::warn!(
                        "Session file {} is unreadable, starting empty: {}",
                        path.display(),
                        err
                    );
                    HashMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                tracing::warn!(
                    "Could not read session file {}, starting empty: {}",
                    path.display(),
                    err
                );
                HashMap::new()
            }
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Default location under the platform data directory.
    pub fn default_path() -> SwiftaidResult<PathBuf> {
        let base = dirs::data_dir()
            .ok_or_else(|| SwiftaidError::configuration("no platform data directory"))?;
        Ok(base.join("swiftaid").join("session.json"))
    }

    async fn flush(&self, entries: &HashMap<String, String>) -> SwiftaidResult<()> {
        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json.as_bytes()).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get(&self, key: &str) -> SwiftaidResult<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> SwiftaidResult<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value);
        self.flush(&entries).await
    }

    async fn remove(&self, key: &str) -> SwiftaidResult<()> {
        let mut entries = self.entries.lock().await;
        if entries.remove(key).is_some() {
            self.flush(&entries).await?;
        }
        Ok(())
    }
}
