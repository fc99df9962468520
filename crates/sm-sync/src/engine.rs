//! The synchronization engine
//!
//! Keeps per-blocklist caches and the unified blocklist consistent with the
//! remote sources while minimizing network calls: only blocklists whose
//! locally persisted content hash no longer matches the remote's hash token
//! are re-fetched; everything else is served from cache.

use futures::future::join_all;

use sm_core::{BlocklistId, UnifiedBlocklist};

use crate::cache::{BlocklistCache, DEFAULT_BLOCKLIST_PREFERENCES};
use crate::remote::RemoteBlocklists;
use crate::storage::{KeyValueStore, StoreError};

/// Error type for synchronization. Fetch failures are not errors (they
/// degrade per-id); only failures to persist surface here.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("storage failure during sync: {0}")]
    Store(#[from] StoreError),
}

/// What a `synchronize` pass did.
#[derive(Debug)]
pub struct SyncOutcome {
    /// The freshly persisted unified blocklist.
    pub unified: UnifiedBlocklist,
    /// Ids that were classified stale and re-fetched.
    pub refetched: Vec<BlocklistId>,
    /// Ids served from cache without a network call.
    pub from_cache: Vec<BlocklistId>,
    /// Ids that contributed an empty list this pass because their fetch or
    /// cache read failed. Their persisted state is untouched.
    pub degraded: Vec<BlocklistId>,
    /// Whether this pass seeded preferences for the first time.
    pub fresh_install: bool,
}

pub struct SyncEngine<S, R> {
    cache: BlocklistCache<S>,
    remote: R,
}

impl<S: KeyValueStore, R: RemoteBlocklists> SyncEngine<S, R> {
    pub fn new(cache: BlocklistCache<S>, remote: R) -> Self {
        Self { cache, remote }
    }

    pub fn cache(&self) -> &BlocklistCache<S> {
        &self.cache
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Partition `ids` into stale and fresh by comparing persisted local
    /// hashes against freshly fetched remote hash tokens.
    ///
    /// All remote hash fetches run concurrently; a failed fetch marks only
    /// its own id stale. If the local hashes cannot be read at all, the
    /// whole set is stale.
    pub async fn determine_stale(&self, ids: &[BlocklistId]) -> Vec<BlocklistId> {
        let local = match self.cache.local_hashes(ids).await {
            Ok(hashes) => hashes,
            Err(error) => {
                log::warn!(
                    "cannot read local blocklist hashes, treating all {} blocklists as stale: {error}",
                    ids.len()
                );
                return ids.to_vec();
            }
        };

        let fetches = ids.iter().map(|id| self.remote.fetch_hash(id));
        let remote_hashes = join_all(fetches).await;

        ids.iter()
            .zip(remote_hashes)
            .filter_map(|(id, fetched)| {
                let stored = local.get(id).cloned().flatten();
                let stale = match (stored, fetched) {
                    (None, _) => true,
                    (_, None) => true,
                    (Some(local), Some(remote)) => local != remote,
                };
                stale.then(|| id.clone())
            })
            .collect()
    }

    /// Re-fetch every stale subscribed blocklist, merge with the cached
    /// fresh ones, and persist the result as the unified blocklist.
    pub async fn synchronize(&self) -> Result<SyncOutcome, SyncError> {
        let (ids, fresh_install) = match self.cache.preferences().await {
            Ok(loaded) => {
                let fresh_install = loaded.was_null();
                (loaded.value, fresh_install)
            }
            Err(error) => {
                log::warn!("cannot read blocklist preferences, falling back to defaults: {error}");
                let defaults = DEFAULT_BLOCKLIST_PREFERENCES.iter().map(|id| id.to_string()).collect();
                (defaults, true)
            }
        };

        // On a fresh install there is no hash to compare against: fetch all.
        let refetched = if fresh_install {
            ids.clone()
        } else {
            self.determine_stale(&ids).await
        };
        let from_cache: Vec<BlocklistId> = ids
            .iter()
            .filter(|id| !refetched.contains(id))
            .cloned()
            .collect();

        // Fan-out/fan-in: the merge below never sees a partial fetch set.
        let fetches = refetched.iter().map(|id| self.remote.fetch_members(id));
        let fetched = join_all(fetches).await;

        let mut union: Vec<String> = Vec::new();
        let mut degraded: Vec<BlocklistId> = Vec::new();

        for (id, members) in refetched.iter().zip(fetched) {
            match members {
                Some(mut members) => {
                    members.sort_unstable();
                    members.dedup();
                    self.cache.set_members(id, &members).await?;
                    self.cache.set_hash_for_members(id, &members).await?;
                    union.extend(members);
                }
                None => {
                    log::warn!("blocklist \"{id}\" could not be fetched; it contributes nothing this pass");
                    degraded.push(id.clone());
                }
            }
        }

        for id in &from_cache {
            match self.cache.members(id).await {
                Ok(members) => union.extend(members),
                Err(error) => {
                    log::warn!("cached blocklist \"{id}\" unreadable; it contributes nothing this pass: {error}");
                    degraded.push(id.clone());
                }
            }
        }

        let unified = UnifiedBlocklist::from_members(union);
        self.cache.set_unified(&unified).await?;

        Ok(SyncOutcome {
            unified,
            refetched,
            from_cache,
            degraded,
            fresh_install,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use sm_core::hash::content_hash;
    use sm_core::BlocklistMeta;

    use super::*;
    use crate::remote::RemoteError;
    use crate::storage::MemoryStore;

    /// Scripted remote with fetch-call counters.
    #[derive(Default)]
    struct FakeRemote {
        members: Mutex<std::collections::HashMap<String, Option<Vec<String>>>>,
        hashes: Mutex<std::collections::HashMap<String, Option<String>>>,
        member_calls: AtomicUsize,
        hash_calls: AtomicUsize,
    }

    impl FakeRemote {
        fn set_list(&self, id: &str, members: &[&str]) {
            let members: Vec<String> = members.iter().map(|m| m.to_string()).collect();
            self.hashes.lock().unwrap().insert(id.to_string(), Some(content_hash(&members)));
            self.members.lock().unwrap().insert(id.to_string(), Some(members));
        }

        fn fail_list(&self, id: &str) {
            self.members.lock().unwrap().insert(id.to_string(), None);
            self.hashes.lock().unwrap().insert(id.to_string(), None);
        }
    }

    #[async_trait]
    impl RemoteBlocklists for &FakeRemote {
        async fn fetch_members(&self, id: &str) -> Option<Vec<String>> {
            self.member_calls.fetch_add(1, Ordering::SeqCst);
            self.members.lock().unwrap().get(id).cloned().flatten()
        }

        async fn fetch_hash(&self, id: &str) -> Option<String> {
            self.hash_calls.fetch_add(1, Ordering::SeqCst);
            self.hashes.lock().unwrap().get(id).cloned().flatten()
        }

        async fn fetch_blocklists_map(&self) -> Result<BTreeMap<String, BlocklistMeta>, RemoteError> {
            Ok(BTreeMap::new())
        }
    }

    fn engine(remote: &FakeRemote) -> SyncEngine<MemoryStore, &FakeRemote> {
        SyncEngine::new(BlocklistCache::new(MemoryStore::new()), remote)
    }

    fn seed_default_lists(remote: &FakeRemote) {
        remote.set_list("ai-maximalism", &["alice"]);
        remote.set_list("aislop", &["bob", "alice"]);
        remote.set_list("engagement-farming", &["carol"]);
        remote.set_list("low-effort", &["dave"]);
    }

    #[tokio::test]
    async fn test_fresh_install_fetches_all_without_hash_comparison() {
        let remote = FakeRemote::default();
        seed_default_lists(&remote);
        let engine = engine(&remote);

        let outcome = engine.synchronize().await.unwrap();

        assert!(outcome.fresh_install);
        assert_eq!(outcome.refetched.len(), DEFAULT_BLOCKLIST_PREFERENCES.len());
        assert!(outcome.from_cache.is_empty());
        // The hash comparison is bypassed entirely on first run.
        assert_eq!(remote.hash_calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            outcome.unified.members(),
            ["alice", "bob", "carol", "dave"]
        );
    }

    #[tokio::test]
    async fn test_second_sync_is_idempotent_and_fetch_free() {
        let remote = FakeRemote::default();
        seed_default_lists(&remote);
        let engine = engine(&remote);

        let first = engine.synchronize().await.unwrap();
        let fetches_after_first = remote.member_calls.load(Ordering::SeqCst);

        let second = engine.synchronize().await.unwrap();

        assert_eq!(second.unified, first.unified);
        assert!(second.refetched.is_empty());
        assert_eq!(second.from_cache.len(), DEFAULT_BLOCKLIST_PREFERENCES.len());
        // No additional member-list fetches for hash-matching ids.
        assert_eq!(remote.member_calls.load(Ordering::SeqCst), fetches_after_first);
    }

    #[tokio::test]
    async fn test_hash_mismatch_refetches_only_that_id() {
        let remote = FakeRemote::default();
        seed_default_lists(&remote);
        let engine = engine(&remote);
        engine.synchronize().await.unwrap();

        // One list changes upstream.
        remote.set_list("aislop", &["bob", "alice", "eve"]);
        let outcome = engine.synchronize().await.unwrap();

        assert_eq!(outcome.refetched, ["aislop"]);
        assert_eq!(outcome.from_cache.len(), 3);
        assert!(outcome.unified.contains("eve"));
    }

    #[tokio::test]
    async fn test_determine_stale_when_local_hash_absent() {
        let remote = FakeRemote::default();
        remote.set_list("aislop", &["bob"]);
        let engine = engine(&remote);

        let stale = engine.determine_stale(&["aislop".to_string()]).await;
        assert_eq!(stale, ["aislop"]);
    }

    #[tokio::test]
    async fn test_determine_stale_when_remote_hash_unavailable() {
        let remote = FakeRemote::default();
        remote.set_list("aislop", &["bob"]);
        let engine = engine(&remote);
        engine.cache().set_preferences(&["aislop".to_string()]).await.unwrap();
        engine.synchronize().await.unwrap();

        // Remote hash endpoint starts failing: conservatively stale.
        remote.hashes.lock().unwrap().insert("aislop".to_string(), None);
        let stale = engine.determine_stale(&["aislop".to_string()]).await;
        assert_eq!(stale, ["aislop"]);
    }

    #[tokio::test]
    async fn test_partial_fetch_failure_degrades_one_id_only() {
        let remote = FakeRemote::default();
        remote.set_list("one", &["alice"]);
        remote.set_list("two", &["bob"]);
        remote.fail_list("three");
        let engine = engine(&remote);
        engine
            .cache()
            .set_preferences(&["one".to_string(), "two".to_string(), "three".to_string()])
            .await
            .unwrap();

        let outcome = engine.synchronize().await.unwrap();

        assert_eq!(outcome.degraded, ["three"]);
        assert_eq!(outcome.unified.members(), ["alice", "bob"]);
        // The two successful fetches are cached.
        assert_eq!(engine.cache().members("one").await.unwrap(), ["alice"]);
        assert_eq!(engine.cache().members("two").await.unwrap(), ["bob"]);
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_previous_cache_for_retry() {
        let remote = FakeRemote::default();
        remote.set_list("aislop", &["bob"]);
        let engine = engine(&remote);
        engine.cache().set_preferences(&["aislop".to_string()]).await.unwrap();
        engine.synchronize().await.unwrap();
        let old_hash = engine.cache().local_hash("aislop").await.unwrap();

        // The list changes upstream but the member fetch fails.
        remote.hashes.lock().unwrap().insert("aislop".to_string(), Some("different".to_string()));
        remote.members.lock().unwrap().insert("aislop".to_string(), None);
        let outcome = engine.synchronize().await.unwrap();

        // This pass the id contributes nothing...
        assert!(outcome.unified.is_empty());
        assert_eq!(outcome.degraded, ["aislop"]);
        // ...but cache and hash survive on disk, so the next sync retries.
        assert_eq!(engine.cache().members("aislop").await.unwrap(), ["bob"]);
        assert_eq!(engine.cache().local_hash("aislop").await.unwrap(), old_hash);
    }

    #[tokio::test]
    async fn test_unified_is_sorted_unique_union() {
        let remote = FakeRemote::default();
        remote.set_list("one", &["b", "a"]);
        remote.set_list("two", &["a", "c"]);
        let engine = engine(&remote);
        engine
            .cache()
            .set_preferences(&["one".to_string(), "two".to_string()])
            .await
            .unwrap();

        let outcome = engine.synchronize().await.unwrap();
        assert_eq!(outcome.unified.members(), ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_unified_persisted_after_sync() {
        let remote = FakeRemote::default();
        remote.set_list("one", &["alice"]);
        let engine = engine(&remote);
        engine.cache().set_preferences(&["one".to_string()]).await.unwrap();

        let outcome = engine.synchronize().await.unwrap();
        let persisted = engine.cache().unified().await.unwrap();
        assert!(!persisted.was_null());
        assert_eq!(persisted.value, outcome.unified);
    }

    // Store whose hash reads always fail, for the fail-open path.
    struct FailingStore;

    #[async_trait]
    impl KeyValueStore for FailingStore {
        async fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Read {
                key: key.to_string(),
                reason: "backend unavailable".to_string(),
            })
        }

        async fn set_raw(&self, key: &str, value: &str) -> Result<(), StoreError> {
            let _ = value;
            Err(StoreError::Write {
                key: key.to_string(),
                reason: "backend unavailable".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_total_local_read_failure_treats_all_ids_stale() {
        let remote = FakeRemote::default();
        remote.set_list("one", &["alice"]);
        remote.set_list("two", &["bob"]);
        let engine = SyncEngine::new(BlocklistCache::new(FailingStore), &remote);

        let stale = engine.determine_stale(&["one".to_string(), "two".to_string()]).await;
        assert_eq!(stale, ["one", "two"]);
        // No remote hash calls were needed to reach that verdict.
        assert_eq!(remote.hash_calls.load(Ordering::SeqCst), 0);
    }
}
