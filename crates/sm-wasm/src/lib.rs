//! WebAssembly bindings for SlopMute
//!
//! The scanning context initializes the engine once with the unified
//! blocklist it received from the background context, then feeds it feed
//! snapshots. Snapshots cross the boundary as JSON strings; scan results
//! come back as plain objects with the mutated snapshot attached, so the
//! content script can mirror the engine's mutations onto the live DOM.
//!
//! Host elements are correlated through the optional `data-sm-ref`
//! attribute: the content script stamps each materialized element with a
//! ref before building the snapshot, and every reported action carries the
//! ref of the node it was applied to.

use std::sync::Mutex;

use wasm_bindgen::prelude::*;

use sm_core::mute::CollectingSink;
use sm_core::{
    extract_session_username, scan_feed, FeedDom, MuteEngine, SnapshotNode, SuppressionStyle,
    UnifiedBlocklist,
};

/// Attribute correlating snapshot nodes with live DOM elements.
const REF_ATTR: &str = "data-sm-ref";

static ENGINE: Mutex<Option<MuteEngine>> = Mutex::new(None);

fn parse_style(style: &str) -> Result<SuppressionStyle, JsValue> {
    match style {
        "remove" => Ok(SuppressionStyle::Remove),
        "notice" => Ok(SuppressionStyle::Notice),
        other => Err(JsValue::from_str(&format!(
            "Unknown suppression style \"{other}\" (expected \"remove\" or \"notice\")"
        ))),
    }
}

fn parse_unified(unified_json: &str) -> Result<UnifiedBlocklist, JsValue> {
    let members: Vec<String> = serde_json::from_str(unified_json)
        .map_err(|e| JsValue::from_str(&format!("Invalid unified blocklist: {e}")))?;
    Ok(UnifiedBlocklist::from_members(members))
}

/// Initialize the engine with the unified blocklist (a JSON string array)
/// and the configured suppression style.
#[wasm_bindgen]
pub fn init(unified_json: &str, style: &str) -> Result<(), JsValue> {
    let style = parse_style(style)?;
    let unified = parse_unified(unified_json)?;

    let mut engine = MuteEngine::new(style);
    engine.refresh(&unified);

    let mut state = ENGINE.lock().map_err(|_| JsValue::from_str("Engine state poisoned"))?;
    *state = Some(engine);
    Ok(())
}

#[wasm_bindgen]
pub fn is_initialized() -> bool {
    ENGINE.lock().map(|state| state.is_some()).unwrap_or(false)
}

/// Replace the engine's session copy of the unified blocklist, e.g. after a
/// `refreshUnifiedBlocklist` broadcast.
#[wasm_bindgen]
pub fn refresh_unified(unified_json: &str) -> Result<(), JsValue> {
    let unified = parse_unified(unified_json)?;

    let mut state = ENGINE.lock().map_err(|_| JsValue::from_str("Engine state poisoned"))?;
    match state.as_mut() {
        Some(engine) => {
            engine.refresh(&unified);
            Ok(())
        }
        None => Err(JsValue::from_str("Engine not initialized")),
    }
}

#[wasm_bindgen]
pub fn blocklist_size() -> u32 {
    ENGINE
        .lock()
        .ok()
        .and_then(|state| state.as_ref().map(|engine| engine.blocklist_len() as u32))
        .unwrap_or(0)
}

/// Scan a feed snapshot, apply mute actions, and report what happened.
///
/// Returns `{ scanned, failed, muted, actions, sessionUsername,
/// sessionBlocked, snapshot }` where `actions` is an array of
/// `{ decision, username, ref }` and `snapshot` is the mutated tree as a
/// JSON string.
#[wasm_bindgen]
pub fn scan_feed_snapshot(snapshot_json: &str) -> Result<JsValue, JsValue> {
    let snapshot: SnapshotNode = serde_json::from_str(snapshot_json)
        .map_err(|e| JsValue::from_str(&format!("Invalid feed snapshot: {e}")))?;
    let mut dom = FeedDom::from_snapshot(&snapshot);

    let state = ENGINE.lock().map_err(|_| JsValue::from_str("Engine state poisoned"))?;
    let engine = state.as_ref().ok_or_else(|| JsValue::from_str("Engine not initialized"))?;

    let scan = scan_feed(&mut dom);
    let mut sink = CollectingSink::default();
    let batch = engine.apply_batch(&mut dom, &scan.posts, &mut sink);
    if scan.failed > 0 {
        web_sys::console::warn_1(&JsValue::from_str(&format!(
            "slopmute: {} post containers could not be classified",
            scan.failed
        )));
    }

    let actions = js_sys::Array::new();
    for action in &batch.actions {
        let entry = js_sys::Object::new();
        let decision = serde_json::to_string(&action.decision)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        let _ = js_sys::Reflect::set(
            &entry,
            &"decision".into(),
            &JsValue::from_str(decision.trim_matches('"')),
        );
        let _ = js_sys::Reflect::set(&entry, &"username".into(), &JsValue::from_str(&action.username));
        match dom.attr(action.node, REF_ATTR) {
            Some(node_ref) => {
                let _ = js_sys::Reflect::set(&entry, &"ref".into(), &JsValue::from_str(node_ref));
            }
            None => {
                let _ = js_sys::Reflect::set(&entry, &"ref".into(), &JsValue::NULL);
            }
        }
        actions.push(&entry);
    }

    let result = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&result, &"scanned".into(), &JsValue::from(batch.scanned as u32));
    let _ = js_sys::Reflect::set(&result, &"failed".into(), &JsValue::from(scan.failed as u32));
    let _ = js_sys::Reflect::set(&result, &"muted".into(), &JsValue::from(batch.muted() as u32));
    let _ = js_sys::Reflect::set(&result, &"actions".into(), &actions);

    match extract_session_username(&dom) {
        Some(username) => {
            let _ = js_sys::Reflect::set(
                &result,
                &"sessionBlocked".into(),
                &JsValue::from_bool(engine.is_blocked(&username)),
            );
            let _ = js_sys::Reflect::set(&result, &"sessionUsername".into(), &JsValue::from_str(&username));
        }
        None => {
            let _ = js_sys::Reflect::set(&result, &"sessionUsername".into(), &JsValue::NULL);
            let _ = js_sys::Reflect::set(&result, &"sessionBlocked".into(), &JsValue::from_bool(false));
        }
    }

    let mutated = dom.to_snapshot(dom.root());
    let encoded = serde_json::to_string(&mutated).map_err(|e| JsValue::from_str(&e.to_string()))?;
    let _ = js_sys::Reflect::set(&result, &"snapshot".into(), &JsValue::from_str(&encoded));

    Ok(result.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::wasm_bindgen_test;

    #[wasm_bindgen_test]
    fn test_parse_style() {
        assert!(parse_style("remove").is_ok());
        assert!(parse_style("notice").is_ok());
        assert!(parse_style("whatever").is_err());
    }

    #[wasm_bindgen_test]
    fn test_parse_unified_sorts_and_dedupes() {
        let unified = parse_unified(r#"["b","a","a"]"#).unwrap();
        assert_eq!(unified.members(), ["a", "b"]);
    }

    #[wasm_bindgen_test]
    fn test_parse_unified_rejects_bad_json() {
        assert!(parse_unified("not json").is_err());
    }
}
