//! SlopMute Core Library
//!
//! This crate provides the classification and muting engine for the SlopMute
//! feed blocker. It performs no I/O: the host (extension glue, CLI, wasm
//! bindings) materializes feed markup into a [`dom::FeedDom`], and the engine
//! reads attributes and applies mutations on that tree.
//!
//! # Architecture
//!
//! A scan pass runs in three steps: the classifier walks unprocessed post
//! containers and turns each into a typed [`ScannedPost`], the mute engine
//! cross-references the posts against its session copy of the unified
//! blocklist, and matching posts are removed or annotated in place.
//!
//! # Modules
//!
//! - `hash`: content-hash function for blocklist staleness tokens
//! - `dom`: arena-backed mutable element tree standing in for page DOM
//! - `classifier`: feed scanning and post classification
//! - `mute`: mute decisions, DOM suppression, telemetry counters
//! - `types`: shared type definitions

pub mod classifier;
pub mod dom;
pub mod hash;
pub mod mute;
pub mod types;

// Re-export commonly used types
pub use classifier::{extract_session_username, scan_feed, ScanOutcome};
pub use dom::{FeedDom, NodeId, Rect, SnapshotNode};
pub use hash::content_hash;
pub use mute::{BatchOutcome, MuteDecision, MuteEngine, SuppressionStyle, TelemetrySink};
pub use types::{BlocklistId, BlocklistMeta, ScannedPost, SessionIdentity, UnifiedBlocklist};
