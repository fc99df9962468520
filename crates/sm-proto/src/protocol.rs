//! Protocol types
//!
//! Requests are tagged `{ type, payload }` objects; every response is an
//! envelope distinguishing `{status: true, payload}` from
//! `{status: false, payload: error}`. Events travel one-way over the
//! persistent port.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use sm_core::{BlocklistId, BlocklistMeta};
use sm_sync::storage::Loaded;

/// A request from the UI or scanning context to the background engine.
///
/// The action set is closed: adding a variant forces every dispatcher to
/// handle it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase", rename_all_fields = "camelCase")]
#[ts(export)]
pub enum Request {
    FetchBlocklistsMapFromRemote,
    GenerateAndUpdateUnifiedBlocklist,
    GetBlocklistPreferences,
    SetBlocklistPreferences {
        blocklist_ids: Vec<BlocklistId>,
    },
    GetBlocklistHashes {
        blocklist_ids: Vec<BlocklistId>,
    },
    SetBlocklistHash {
        blocklist_id: BlocklistId,
        blocklist: Vec<String>,
    },
    GetBlocklist {
        blocklist_id: BlocklistId,
    },
    SetBlocklist {
        blocklist_id: BlocklistId,
        blocklist: Vec<String>,
    },
    GetBlocklistsMap,
    SetBlocklistsMap {
        #[ts(type = "Record<string, { name: string; description: string }>")]
        blocklists_map: BTreeMap<BlocklistId, BlocklistMeta>,
    },
    GetUnifiedBlocklist,
    SetUnifiedBlocklist {
        blocklist: Vec<String>,
    },
    RefreshUnifiedBlocklist,
    GetScannedTweetCount,
    IncrementScannedTweetCount {
        by: u64,
    },
    GetRemovedTweetCount,
    IncrementRemovedTweetCount {
        by: u64,
    },
    GetCurrentSessionUsername,
    SetCurrentSessionUsername {
        username: Option<String>,
    },
    GetIsCurrentSessionUserBlocked,
    SetIsCurrentSessionUserBlocked {
        is_blocked: bool,
    },
}

/// The response envelope. `status: false` carries the error text.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Envelope {
    pub status: bool,
    #[ts(type = "unknown")]
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn ok<T: Serialize>(payload: T) -> Self {
        match serde_json::to_value(payload) {
            Ok(payload) => Self { status: true, payload },
            Err(error) => Self::err(error),
        }
    }

    pub fn err(error: impl std::fmt::Display) -> Self {
        Self {
            status: false,
            payload: serde_json::Value::String(error.to_string()),
        }
    }
}

/// Presence report carried by `get*` responses, mirroring the storage
/// adapter's null-vs-present distinction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum WasNull {
    Yes,
    No,
    Indeterminate,
}

/// A stored value together with whether the key was absent.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Recalled<T> {
    pub value: T,
    pub was_null: WasNull,
}

impl<T> From<Loaded<T>> for Recalled<T> {
    fn from(loaded: Loaded<T>) -> Self {
        let was_null = if loaded.was_null() { WasNull::Yes } else { WasNull::No };
        Self {
            value: loaded.value,
            was_null,
        }
    }
}

/// Change notification broadcast over the persistent port after the engine
/// mutates observable state, so observers refresh without polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase", rename_all_fields = "camelCase")]
#[ts(export)]
pub enum Event {
    UnifiedBlocklistRefreshed,
    ScannedTweetCountChanged { value: u64 },
    RemovedTweetCountChanged { value: u64 },
}

/// The persistent-port transport seam. Broadcast is fire-and-forget.
pub trait EventBroadcaster: Send + Sync {
    fn broadcast(&self, event: &Event);
}

/// Broadcaster for hosts with no port attached.
pub struct NullBroadcaster;

impl EventBroadcaster for NullBroadcaster {
    fn broadcast(&self, _event: &Event) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_names_on_the_wire() {
        let json = serde_json::to_value(&Request::GenerateAndUpdateUnifiedBlocklist).unwrap();
        assert_eq!(json["type"], "generateAndUpdateUnifiedBlocklist");

        let json = serde_json::to_value(&Request::GetIsCurrentSessionUserBlocked).unwrap();
        assert_eq!(json["type"], "getIsCurrentSessionUserBlocked");
    }

    #[test]
    fn test_payload_fields_are_camel_case() {
        let request = Request::SetBlocklistHash {
            blocklist_id: "aislop".to_string(),
            blocklist: vec!["alice".to_string()],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["payload"]["blocklistId"], "aislop");

        let request = Request::SetIsCurrentSessionUserBlocked { is_blocked: true };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["payload"]["isBlocked"], true);
    }

    #[test]
    fn test_request_parses_from_wire_form() {
        let request: Request = serde_json::from_str(
            r#"{"type":"incrementScannedTweetCount","payload":{"by":3}}"#,
        )
        .unwrap();
        assert_eq!(request, Request::IncrementScannedTweetCount { by: 3 });

        let request: Request = serde_json::from_str(r#"{"type":"refreshUnifiedBlocklist"}"#).unwrap();
        assert_eq!(request, Request::RefreshUnifiedBlocklist);
    }

    #[test]
    fn test_envelope_shapes() {
        let ok = Envelope::ok(vec!["a", "b"]);
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], true);
        assert_eq!(json["payload"][0], "a");

        let err = Envelope::err("it broke");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["status"], false);
        assert_eq!(json["payload"], "it broke");
    }

    #[test]
    fn test_was_null_wire_form() {
        assert_eq!(serde_json::to_string(&WasNull::Yes).unwrap(), r#""yes""#);
        assert_eq!(serde_json::to_string(&WasNull::Indeterminate).unwrap(), r#""indeterminate""#);
    }
}
