//! Key-value persistence adapter
//!
//! All engine state lives in one namespaced key-value store. Values are
//! JSON-encoded strings; reads report whether the key was absent so callers
//! can distinguish "never written" from "written empty", and a fallback hook
//! seeds a default on the first null read.
//!
//! Malformed stored JSON is treated the same as a missing key: the safe
//! default path, not an error.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Namespace prefix applied to every key before it reaches the backend.
pub const KEY_PREFIX: &str = "slopmute-";

/// Persisted key layout.
pub mod keys {
    pub const BLOCKLIST_PREFERENCES: &str = "blocklist-preferences";
    pub const BLOCKLISTS_MAP: &str = "blocklists-map";
    pub const UNIFIED_BLOCKLIST: &str = "unified-blocklist";
    pub const SCANNED_TWEET_COUNT: &str = "scanned-tweet-count";
    pub const REMOVED_TWEET_COUNT: &str = "removed-tweet-count";
    pub const CURRENT_SESSION_USERNAME: &str = "current-session-username";
    pub const IS_CURRENT_SESSION_USER_BLOCKED: &str = "is-current-session-user-blocked";

    /// Per-blocklist member list key.
    pub fn blocklist(id: &str) -> String {
        id.to_string()
    }

    /// Per-blocklist local content-hash key.
    pub fn blocklist_hash(id: &str) -> String {
        format!("{id}-hash")
    }
}

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("backend read for \"{key}\" failed: {reason}")]
    Read { key: String, reason: String },
    #[error("backend write for \"{key}\" failed: {reason}")]
    Write { key: String, reason: String },
    #[error("failed to encode value for \"{key}\": {source}")]
    Encode {
        key: String,
        source: serde_json::Error,
    },
}

/// Whether a key held a value at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Present,
    Missing,
}

/// A value read from storage together with its presence report.
#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub value: T,
    pub presence: Presence,
}

impl<T> Loaded<T> {
    pub fn was_null(&self) -> bool {
        self.presence == Presence::Missing
    }
}

/// The storage primitive: async get/set over namespaced string keys.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set_raw(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Read and JSON-decode a value. Absent keys and malformed payloads both
/// come back as `None`.
pub async fn get_json<T, S>(store: &S, key: &str) -> Result<Option<T>, StoreError>
where
    T: DeserializeOwned,
    S: KeyValueStore + ?Sized,
{
    let full_key = format!("{KEY_PREFIX}{key}");
    match store.get_raw(&full_key).await? {
        None => Ok(None),
        Some(raw) => match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(error) => {
                log::warn!("stored value for \"{key}\" is not valid JSON, treating as absent: {error}");
                Ok(None)
            }
        },
    }
}

/// JSON-encode and write a value.
pub async fn set_json<T, S>(store: &S, key: &str, value: &T) -> Result<(), StoreError>
where
    T: Serialize + ?Sized,
    S: KeyValueStore + ?Sized,
{
    let encoded = serde_json::to_string(value).map_err(|source| StoreError::Encode {
        key: key.to_string(),
        source,
    })?;
    let full_key = format!("{KEY_PREFIX}{key}");
    store.set_raw(&full_key, &encoded).await
}

/// Read a value, seeding `default` on the first null read (the fallback-on-
/// null hook). A failed seed write is logged and does not fail the read.
pub async fn get_or_seed<T, S>(store: &S, key: &str, default: T) -> Result<Loaded<T>, StoreError>
where
    T: DeserializeOwned + Serialize,
    S: KeyValueStore + ?Sized,
{
    match get_json(store, key).await? {
        Some(value) => Ok(Loaded {
            value,
            presence: Presence::Present,
        }),
        None => {
            if let Err(error) = set_json(store, key, &default).await {
                log::warn!("failed to seed default for \"{key}\": {error}");
            }
            Ok(Loaded {
                value: default,
                presence: Presence::Missing,
            })
        }
    }
}

// =============================================================================
// In-memory store
// =============================================================================

/// Volatile store backed by a map. The default test and wasm-session backend.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Read {
            key: key.to_string(),
            reason: "store mutex poisoned".to_string(),
        })?;
        Ok(entries.get(key).cloned())
    }

    async fn set_raw(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Write {
            key: key.to_string(),
            reason: "store mutex poisoned".to_string(),
        })?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// =============================================================================
// File-backed store
// =============================================================================

/// Store persisted as one JSON object on disk; the CLI backend.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open a store at `path`. A missing file starts empty; an unreadable or
    /// malformed file is treated as empty with a warning.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(entries) => entries,
                Err(error) => {
                    log::warn!("store file {} is not valid JSON, starting empty: {error}", path.display());
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    fn flush(&self, entries: &HashMap<String, String>) -> Result<(), String> {
        let encoded = serde_json::to_string_pretty(entries).map_err(|e| e.to_string())?;
        fs::write(&self.path, encoded).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Read {
            key: key.to_string(),
            reason: "store mutex poisoned".to_string(),
        })?;
        Ok(entries.get(key).cloned())
    }

    async fn set_raw(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Write {
            key: key.to_string(),
            reason: "store mutex poisoned".to_string(),
        })?;
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries).map_err(|reason| StoreError::Write {
            key: key.to_string(),
            reason,
        })
    }
}
