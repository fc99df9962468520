//! Remote blocklist fetcher
//!
//! Blocklists are served as static files from a read-only origin: a
//! comma-joined plaintext member list and a plaintext hash token per
//! blocklist, plus one shared JSON resource with display metadata.
//!
//! Member and hash fetches never surface errors to the sync engine: a
//! transport failure or non-200 status degrades to `None`, which the engine
//! treats conservatively (stale / empty for the pass).

use std::collections::BTreeMap;

use async_trait::async_trait;

use sm_core::{BlocklistId, BlocklistMeta};

/// Error type for remote operations that do surface failures (metadata map).
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("request for {url} failed: {reason}")]
    Request { url: String, reason: String },
    #[error("unexpected status {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("failed to decode blocklists map: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The remote source of truth for blocklists. Pure I/O, no state.
#[async_trait]
pub trait RemoteBlocklists: Send + Sync {
    /// Fetch a blocklist's member list. `None` means the fetch failed; the
    /// caller decides what that degrades to.
    async fn fetch_members(&self, id: &str) -> Option<Vec<String>>;

    /// Fetch a blocklist's current hash token. `None` means the fetch
    /// failed. The token is opaque: only equality against a previously
    /// persisted token is meaningful.
    async fn fetch_hash(&self, id: &str) -> Option<String>;

    /// Fetch the blocklist metadata map.
    async fn fetch_blocklists_map(&self) -> Result<BTreeMap<BlocklistId, BlocklistMeta>, RemoteError>;
}

/// Parse a comma-joined plaintext member list, dropping empty entries.
pub fn parse_members(body: &str) -> Vec<String> {
    body.split(',')
        .map(str::trim)
        .filter(|member| !member.is_empty())
        .map(String::from)
        .collect()
}

// =============================================================================
// HTTP implementation
// =============================================================================

/// `reqwest`-backed fetcher against a static remote origin.
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemote {
    /// `base_url` is the API root, e.g. `https://example.dev/api`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn members_url(&self, id: &str) -> String {
        format!("{}/blocklists/{id}", self.base_url)
    }

    fn hash_url(&self, id: &str) -> String {
        format!("{}/blocklist-hashes/{id}", self.base_url)
    }

    fn map_url(&self) -> String {
        format!("{}/blocklists-map", self.base_url)
    }

    async fn get_text(&self, url: &str) -> Result<String, RemoteError> {
        let response = self.client.get(url).send().await.map_err(|e| RemoteError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(|e| RemoteError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl RemoteBlocklists for HttpRemote {
    async fn fetch_members(&self, id: &str) -> Option<Vec<String>> {
        match self.get_text(&self.members_url(id)).await {
            Ok(body) => Some(parse_members(&body)),
            Err(error) => {
                log::warn!("failed to fetch blocklist \"{id}\" from remote: {error}");
                None
            }
        }
    }

    async fn fetch_hash(&self, id: &str) -> Option<String> {
        match self.get_text(&self.hash_url(id)).await {
            Ok(body) => Some(body.trim().to_string()),
            Err(error) => {
                log::warn!("failed to fetch blocklist hash for \"{id}\" from remote: {error}");
                None
            }
        }
    }

    async fn fetch_blocklists_map(&self) -> Result<BTreeMap<BlocklistId, BlocklistMeta>, RemoteError> {
        let body = self.get_text(&self.map_url()).await?;
        Ok(serde_json::from_str(&body)?)
    }
}
