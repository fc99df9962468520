//! Typed accessors over the key-value store
//!
//! One method pair per persisted key. The local content hash for a blocklist
//! is always recomputed here from the members being written; the remote's own
//! hash token is never persisted as the local hash.

use std::collections::{BTreeMap, HashMap};

use sm_core::hash::content_hash;
use sm_core::{BlocklistId, BlocklistMeta, UnifiedBlocklist};

use crate::storage::{self, keys, KeyValueStore, Loaded, Presence, StoreError};

/// Subscription set seeded on first run.
pub const DEFAULT_BLOCKLIST_PREFERENCES: &[&str] = &[
    "ai-maximalism",
    "aislop",
    "engagement-farming",
    "low-effort",
];

/// CRUD over every persisted engine key.
pub struct BlocklistCache<S> {
    store: S,
}

impl<S: KeyValueStore> BlocklistCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // =========================================================================
    // Preferences
    // =========================================================================

    /// Subscribed blocklist ids. Never-initialized preferences report
    /// `Missing` (the fresh-install signal) and seed the default set.
    pub async fn preferences(&self) -> Result<Loaded<Vec<BlocklistId>>, StoreError> {
        let default: Vec<BlocklistId> = DEFAULT_BLOCKLIST_PREFERENCES
            .iter()
            .map(|id| id.to_string())
            .collect();
        storage::get_or_seed(&self.store, keys::BLOCKLIST_PREFERENCES, default).await
    }

    /// Persist the whole preference list.
    pub async fn set_preferences(&self, ids: &[BlocklistId]) -> Result<(), StoreError> {
        storage::set_json(&self.store, keys::BLOCKLIST_PREFERENCES, ids).await
    }

    // =========================================================================
    // Per-blocklist members and hashes
    // =========================================================================

    /// Cached member list for one blocklist; absent means empty.
    pub async fn members(&self, id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.members_loaded(id).await?.value)
    }

    pub async fn members_loaded(&self, id: &str) -> Result<Loaded<Vec<String>>, StoreError> {
        storage::get_or_seed(&self.store, &keys::blocklist(id), Vec::new()).await
    }

    pub async fn set_members(&self, id: &str, members: &[String]) -> Result<(), StoreError> {
        storage::set_json(&self.store, &keys::blocklist(id), members).await
    }

    /// Locally persisted content hash for one blocklist, absent if it was
    /// never synced.
    pub async fn local_hash(&self, id: &str) -> Result<Option<String>, StoreError> {
        storage::get_json(&self.store, &keys::blocklist_hash(id)).await
    }

    /// Local hashes for a set of ids. Any backend error propagates so the
    /// caller can treat the whole set as unknown.
    pub async fn local_hashes(
        &self,
        ids: &[BlocklistId],
    ) -> Result<HashMap<BlocklistId, Option<String>>, StoreError> {
        let mut hashes = HashMap::with_capacity(ids.len());
        for id in ids {
            hashes.insert(id.clone(), self.local_hash(id).await?);
        }
        Ok(hashes)
    }

    /// Recompute and persist the local content hash from a member list.
    pub async fn set_hash_for_members(&self, id: &str, members: &[String]) -> Result<(), StoreError> {
        let hash = content_hash(members);
        storage::set_json(&self.store, &keys::blocklist_hash(id), &hash).await
    }

    // =========================================================================
    // Unified blocklist and metadata map
    // =========================================================================

    pub async fn unified(&self) -> Result<Loaded<UnifiedBlocklist>, StoreError> {
        storage::get_or_seed(&self.store, keys::UNIFIED_BLOCKLIST, UnifiedBlocklist::default()).await
    }

    pub async fn set_unified(&self, unified: &UnifiedBlocklist) -> Result<(), StoreError> {
        storage::set_json(&self.store, keys::UNIFIED_BLOCKLIST, unified).await
    }

    pub async fn blocklists_map(
        &self,
    ) -> Result<Loaded<BTreeMap<BlocklistId, BlocklistMeta>>, StoreError> {
        storage::get_or_seed(&self.store, keys::BLOCKLISTS_MAP, BTreeMap::new()).await
    }

    pub async fn set_blocklists_map(
        &self,
        map: &BTreeMap<BlocklistId, BlocklistMeta>,
    ) -> Result<(), StoreError> {
        storage::set_json(&self.store, keys::BLOCKLISTS_MAP, map).await
    }

    // =========================================================================
    // Telemetry counters
    // =========================================================================

    pub async fn scanned_count(&self) -> Result<u64, StoreError> {
        Ok(self.scanned_count_loaded().await?.value)
    }

    pub async fn removed_count(&self) -> Result<u64, StoreError> {
        Ok(self.removed_count_loaded().await?.value)
    }

    pub async fn scanned_count_loaded(&self) -> Result<Loaded<u64>, StoreError> {
        Ok(count_loaded(storage::get_json(&self.store, keys::SCANNED_TWEET_COUNT).await?))
    }

    pub async fn removed_count_loaded(&self) -> Result<Loaded<u64>, StoreError> {
        Ok(count_loaded(storage::get_json(&self.store, keys::REMOVED_TWEET_COUNT).await?))
    }

    /// Read-modify-write increment; an absent counter counts as 0. Returns
    /// the new value.
    pub async fn increment_scanned(&self, by: u64) -> Result<u64, StoreError> {
        let next = self.scanned_count().await?.saturating_add(by);
        storage::set_json(&self.store, keys::SCANNED_TWEET_COUNT, &next).await?;
        Ok(next)
    }

    pub async fn increment_removed(&self, by: u64) -> Result<u64, StoreError> {
        let next = self.removed_count().await?.saturating_add(by);
        storage::set_json(&self.store, keys::REMOVED_TWEET_COUNT, &next).await?;
        Ok(next)
    }

    // =========================================================================
    // Session identity
    // =========================================================================

    pub async fn session_username(&self) -> Result<Loaded<Option<String>>, StoreError> {
        match storage::get_json(&self.store, keys::CURRENT_SESSION_USERNAME).await? {
            Some(value) => Ok(Loaded { value, presence: Presence::Present }),
            None => Ok(Loaded { value: None, presence: Presence::Missing }),
        }
    }

    pub async fn set_session_username(&self, username: &Option<String>) -> Result<(), StoreError> {
        storage::set_json(&self.store, keys::CURRENT_SESSION_USERNAME, username).await
    }

    pub async fn session_blocked(&self) -> Result<bool, StoreError> {
        Ok(self.session_blocked_loaded().await?.value)
    }

    pub async fn session_blocked_loaded(&self) -> Result<Loaded<bool>, StoreError> {
        match storage::get_json(&self.store, keys::IS_CURRENT_SESSION_USER_BLOCKED).await? {
            Some(value) => Ok(Loaded { value, presence: Presence::Present }),
            None => Ok(Loaded { value: false, presence: Presence::Missing }),
        }
    }

    pub async fn set_session_blocked(&self, is_blocked: bool) -> Result<(), StoreError> {
        storage::set_json(&self.store, keys::IS_CURRENT_SESSION_USER_BLOCKED, &is_blocked).await
    }
}

fn count_loaded(stored: Option<u64>) -> Loaded<u64> {
    match stored {
        Some(value) => Loaded { value, presence: Presence::Present },
        None => Loaded { value: 0, presence: Presence::Missing },
    }
}
