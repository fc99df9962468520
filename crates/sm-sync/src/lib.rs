//! SlopMute Sync Library
//!
//! Keeps the per-blocklist caches and the unified blocklist consistent with
//! their remote sources while minimizing network calls. Staleness is decided
//! by comparing the locally persisted content hash of each blocklist against
//! the remote's current hash token; only stale blocklists are re-fetched.
//!
//! # Modules
//!
//! - `storage`: async key-value store adapter with JSON encoding
//! - `remote`: remote blocklist fetcher over HTTPS
//! - `cache`: typed accessors for every persisted key
//! - `engine`: the synchronization engine

pub mod cache;
pub mod engine;
pub mod remote;
pub mod storage;

// Re-export commonly used types
pub use cache::{BlocklistCache, DEFAULT_BLOCKLIST_PREFERENCES};
pub use engine::{SyncEngine, SyncError, SyncOutcome};
pub use remote::{HttpRemote, RemoteBlocklists, RemoteError};
pub use storage::{FileStore, KeyValueStore, Loaded, MemoryStore, Presence, StoreError};
