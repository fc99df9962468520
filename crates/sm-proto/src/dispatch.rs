//! Background dispatcher
//!
//! Binds each protocol action to its engine operation. The match is
//! exhaustive over [`Request`], so an action added to the protocol without a
//! handler fails to compile. Errors never escape [`Dispatcher::handle`]: they
//! come back as failure envelopes and a logged warning.

use serde::Serialize;
use serde_json::Value;

use sm_core::UnifiedBlocklist;
use sm_sync::engine::{SyncEngine, SyncError};
use sm_sync::remote::{RemoteBlocklists, RemoteError};
use sm_sync::storage::{KeyValueStore, Loaded, StoreError};

use crate::protocol::{Envelope, Event, EventBroadcaster, Recalled, Request};

/// Error type for dispatch; converted into a failure envelope at the edge.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("failed to encode response payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The background engine's message handler.
pub struct Dispatcher<S, R, B> {
    engine: SyncEngine<S, R>,
    broadcaster: B,
}

impl<S, R, B> Dispatcher<S, R, B>
where
    S: KeyValueStore,
    R: RemoteBlocklists,
    B: EventBroadcaster,
{
    pub fn new(engine: SyncEngine<S, R>, broadcaster: B) -> Self {
        Self { engine, broadcaster }
    }

    pub fn engine(&self) -> &SyncEngine<S, R> {
        &self.engine
    }

    /// Handle one request, always producing an envelope.
    pub async fn handle(&self, request: Request) -> Envelope {
        match self.dispatch(request).await {
            Ok(payload) => Envelope { status: true, payload },
            Err(error) => {
                log::warn!("request failed: {error}");
                Envelope::err(error)
            }
        }
    }

    async fn dispatch(&self, request: Request) -> Result<Value, DispatchError> {
        let cache = self.engine.cache();
        match request {
            Request::FetchBlocklistsMapFromRemote => {
                let map = self.engine.remote().fetch_blocklists_map().await?;
                cache.set_blocklists_map(&map).await?;
                encode(&map)
            }
            Request::GenerateAndUpdateUnifiedBlocklist => {
                let outcome = self.engine.synchronize().await?;
                self.broadcaster.broadcast(&Event::UnifiedBlocklistRefreshed);
                encode(outcome.unified.members())
            }
            Request::GetBlocklistPreferences => recalled(cache.preferences().await?),
            Request::SetBlocklistPreferences { blocklist_ids } => {
                cache.set_preferences(&blocklist_ids).await?;
                Ok(Value::Null)
            }
            Request::GetBlocklistHashes { blocklist_ids } => {
                encode(&cache.local_hashes(&blocklist_ids).await?)
            }
            Request::SetBlocklistHash { blocklist_id, blocklist } => {
                cache.set_hash_for_members(&blocklist_id, &blocklist).await?;
                Ok(Value::Null)
            }
            Request::GetBlocklist { blocklist_id } => {
                recalled(cache.members_loaded(&blocklist_id).await?)
            }
            Request::SetBlocklist { blocklist_id, blocklist } => {
                cache.set_members(&blocklist_id, &blocklist).await?;
                Ok(Value::Null)
            }
            Request::GetBlocklistsMap => recalled(cache.blocklists_map().await?),
            Request::SetBlocklistsMap { blocklists_map } => {
                cache.set_blocklists_map(&blocklists_map).await?;
                Ok(Value::Null)
            }
            Request::GetUnifiedBlocklist => recalled(cache.unified().await?),
            Request::SetUnifiedBlocklist { blocklist } => {
                cache.set_unified(&UnifiedBlocklist::from_members(blocklist)).await?;
                Ok(Value::Null)
            }
            Request::RefreshUnifiedBlocklist => {
                self.broadcaster.broadcast(&Event::UnifiedBlocklistRefreshed);
                Ok(Value::Null)
            }
            Request::GetScannedTweetCount => recalled(cache.scanned_count_loaded().await?),
            Request::IncrementScannedTweetCount { by } => {
                let value = cache.increment_scanned(by).await?;
                self.broadcaster.broadcast(&Event::ScannedTweetCountChanged { value });
                Ok(Value::Null)
            }
            Request::GetRemovedTweetCount => recalled(cache.removed_count_loaded().await?),
            Request::IncrementRemovedTweetCount { by } => {
                let value = cache.increment_removed(by).await?;
                self.broadcaster.broadcast(&Event::RemovedTweetCountChanged { value });
                Ok(Value::Null)
            }
            Request::GetCurrentSessionUsername => recalled(cache.session_username().await?),
            Request::SetCurrentSessionUsername { username } => {
                cache.set_session_username(&username).await?;
                Ok(Value::Null)
            }
            Request::GetIsCurrentSessionUserBlocked => {
                recalled(cache.session_blocked_loaded().await?)
            }
            Request::SetIsCurrentSessionUserBlocked { is_blocked } => {
                cache.set_session_blocked(is_blocked).await?;
                Ok(Value::Null)
            }
        }
    }
}

fn encode<T: Serialize + ?Sized>(payload: &T) -> Result<Value, DispatchError> {
    Ok(serde_json::to_value(payload)?)
}

fn recalled<T: Serialize>(loaded: Loaded<T>) -> Result<Value, DispatchError> {
    encode(&Recalled::from(loaded))
}
