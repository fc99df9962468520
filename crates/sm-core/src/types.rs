//! Core type definitions for SlopMute
//!
//! These types are shared between the classification engine, the sync
//! engine, and the message protocol.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::dom::NodeId;

/// Identifier for one named, independently maintained blocklist.
/// Opaque and stable across sessions (e.g. `"aislop"`).
pub type BlocklistId = String;

/// Display metadata for a blocklist, served as one shared JSON map resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlocklistMeta {
    pub name: String,
    pub description: String,
}

// =============================================================================
// Unified Blocklist
// =============================================================================

/// Deduplicated, lexicographically sorted union of all subscribed blocklists'
/// members.
///
/// Equals the sorted-unique union of the current per-id caches after a
/// successful sync; may be transiently stale between a preference change and
/// the next sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnifiedBlocklist {
    members: Vec<String>,
}

impl UnifiedBlocklist {
    /// Build from any collection of usernames; sorts and deduplicates.
    pub fn from_members<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut members: Vec<String> = members.into_iter().map(Into::into).collect();
        members.sort_unstable();
        members.dedup();
        Self { members }
    }

    /// Membership test. The sorted invariant makes this a binary search.
    pub fn contains(&self, username: &str) -> bool {
        self.members.binary_search_by(|m| m.as_str().cmp(username)).is_ok()
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Hash-set view for hot-path membership checks.
    pub fn to_set(&self) -> HashSet<String> {
        self.members.iter().cloned().collect()
    }
}

// =============================================================================
// Scanned Posts
// =============================================================================

/// A feed post classified from the DOM.
///
/// Created fresh on every scan pass and discarded after the mute decision is
/// applied; never persisted. The referenced nodes are owned by the
/// [`FeedDom`](crate::dom::FeedDom) the post was scanned from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScannedPost {
    /// A plain post authored by `username`.
    Tweet { username: String, element: NodeId },
    /// A repost; `username` is the original author shown in the post body.
    Repost { username: String, element: NodeId },
    /// A post that embeds another post. `username` is the inner (quoted)
    /// author, `parent_username` the outer author; `element` is the quoted
    /// subtree, `parent_element` the outer post container.
    QuoteTweet {
        username: String,
        parent_username: String,
        element: NodeId,
        parent_element: NodeId,
    },
}

impl ScannedPost {
    /// The post container node the classifier matched.
    pub fn container(&self) -> NodeId {
        match self {
            Self::Tweet { element, .. } | Self::Repost { element, .. } => *element,
            Self::QuoteTweet { parent_element, .. } => *parent_element,
        }
    }
}

// =============================================================================
// Session Identity
// =============================================================================

/// The page viewer, refreshed opportunistically from the DOM and persisted
/// for UI display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub username: Option<String>,
    pub is_blocked: bool,
}
