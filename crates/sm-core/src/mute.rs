//! Mute decisions and DOM suppression
//!
//! Applies the unified blocklist against freshly classified posts. The engine
//! owns its session copy of the blocklist as an explicit field, refreshed on
//! demand via [`MuteEngine::refresh`]; it is not re-read from storage on every
//! scan pass.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::dom::{FeedDom, NodeId, Rect};
use crate::types::{ScannedPost, UnifiedBlocklist};

/// Height of the placeholder notice left behind by an annotation.
pub const NOTICE_HEIGHT_PX: f32 = 64.0;

/// Notice shown where a whole post was suppressed in `Notice` style.
pub const POST_NOTICE_TEXT: &str = "Post from a blocked account";
/// Notice shown where a quoted subtree was cleared.
pub const QUOTE_NOTICE_TEXT: &str = "Quoted post from a blocked account";

/// Marker attribute on inserted placeholder notices.
pub const NOTICE_ATTR: &str = "data-sm-notice";

/// How whole-post suppression is performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuppressionStyle {
    /// Detach the post's wrapper from the tree.
    Remove,
    /// Keep the wrapper, replace the post content with a notice.
    Notice,
}

/// Outcome of the decision rule for one post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MuteDecision {
    Keep,
    /// Suppress the whole post.
    RemovePost,
    /// Preserve the outer post, clear only the quoted subtree.
    AnnotateQuoted,
}

/// Receives counter deltas from the engine. Implementations persist them
/// fire-and-forget; a failed write is theirs to log, never to retry inline.
pub trait TelemetrySink {
    fn posts_scanned(&mut self, by: u64);
    fn posts_removed(&mut self, by: u64);
}

/// Sink that tallies deltas in memory, for hosts that persist after the
/// batch completes.
#[derive(Debug, Default, Clone, Copy)]
pub struct CollectingSink {
    pub scanned: u64,
    pub removed: u64,
}

impl TelemetrySink for CollectingSink {
    fn posts_scanned(&mut self, by: u64) {
        self.scanned = self.scanned.saturating_add(by);
    }

    fn posts_removed(&mut self, by: u64) {
        self.removed = self.removed.saturating_add(by);
    }
}

/// One applied suppression, for host-side mirroring and logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMute {
    pub decision: MuteDecision,
    /// The blocked author that triggered the decision.
    pub username: String,
    /// Node the mutation was applied to: the detached wrapper for
    /// `RemovePost`, the cleared quoted subtree for `AnnotateQuoted`.
    pub node: NodeId,
}

/// Outcome of applying one scan batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub scanned: usize,
    pub actions: Vec<AppliedMute>,
}

impl BatchOutcome {
    pub fn muted(&self) -> usize {
        self.actions.len()
    }
}

/// The mute engine: a session copy of the unified blocklist plus the
/// configured suppression style.
pub struct MuteEngine {
    blocklist: HashSet<String>,
    style: SuppressionStyle,
}

impl MuteEngine {
    pub fn new(style: SuppressionStyle) -> Self {
        Self {
            blocklist: HashSet::new(),
            style,
        }
    }

    /// Replace the session copy of the unified blocklist.
    pub fn refresh(&mut self, unified: &UnifiedBlocklist) {
        self.blocklist = unified.to_set();
    }

    pub fn blocklist_len(&self) -> usize {
        self.blocklist.len()
    }

    pub fn is_blocked(&self, username: &str) -> bool {
        self.blocklist.contains(username)
    }

    /// Decision rule. A plain post or repost is muted when its author is
    /// blocked; a quote-tweet when either author is blocked, with the
    /// annotate action reserved for the inner-author-only case.
    pub fn decide(&self, post: &ScannedPost) -> MuteDecision {
        match post {
            ScannedPost::Tweet { username, .. } | ScannedPost::Repost { username, .. } => {
                if self.is_blocked(username) {
                    MuteDecision::RemovePost
                } else {
                    MuteDecision::Keep
                }
            }
            ScannedPost::QuoteTweet { username, parent_username, .. } => {
                let inner = self.is_blocked(username);
                let outer = self.is_blocked(parent_username);
                if inner && !outer {
                    MuteDecision::AnnotateQuoted
                } else if inner || outer {
                    MuteDecision::RemovePost
                } else {
                    MuteDecision::Keep
                }
            }
        }
    }

    /// Apply the decision rule to a classified batch, mutating the tree.
    ///
    /// The whole batch runs to completion synchronously. The sink receives
    /// `scanned += batch size` once and `removed += 1` per mute action.
    pub fn apply_batch(
        &self,
        dom: &mut FeedDom,
        posts: &[ScannedPost],
        sink: &mut dyn TelemetrySink,
    ) -> BatchOutcome {
        sink.posts_scanned(posts.len() as u64);

        let mut outcome = BatchOutcome {
            scanned: posts.len(),
            actions: Vec::new(),
        };

        for post in posts {
            let decision = self.decide(post);
            let applied = match decision {
                MuteDecision::Keep => continue,
                MuteDecision::RemovePost => self.remove_post(dom, post),
                MuteDecision::AnnotateQuoted => annotate_quoted(dom, post),
            };
            let Some(node) = applied else { continue };

            sink.posts_removed(1);
            outcome.actions.push(AppliedMute {
                decision,
                username: muted_author(self, post).to_string(),
                node,
            });
        }

        outcome
    }

    fn remove_post(&self, dom: &mut FeedDom, post: &ScannedPost) -> Option<NodeId> {
        let container = post.container();
        match self.style {
            SuppressionStyle::Remove => {
                // The platform nests each post two wrappers deep; detach the
                // outermost one.
                let target = removal_target(dom, container);
                dom.detach(target);
                Some(target)
            }
            SuppressionStyle::Notice => {
                insert_notice(dom, container, POST_NOTICE_TEXT);
                Some(container)
            }
        }
    }
}

fn muted_author<'a>(engine: &MuteEngine, post: &'a ScannedPost) -> &'a str {
    match post {
        ScannedPost::Tweet { username, .. } | ScannedPost::Repost { username, .. } => username,
        ScannedPost::QuoteTweet { username, parent_username, .. } => {
            if engine.is_blocked(parent_username) {
                parent_username
            } else {
                username
            }
        }
    }
}

fn annotate_quoted(dom: &mut FeedDom, post: &ScannedPost) -> Option<NodeId> {
    let ScannedPost::QuoteTweet { element, .. } = post else {
        return None;
    };
    insert_notice(dom, *element, QUOTE_NOTICE_TEXT);
    Some(*element)
}

fn removal_target(dom: &FeedDom, container: NodeId) -> NodeId {
    dom.ancestor(container, 2)
        .filter(|&t| t != dom.root())
        .unwrap_or(container)
}

fn insert_notice(dom: &mut FeedDom, element: NodeId, text: &str) {
    dom.clear_children(element);
    dom.set_text(element, "");
    let notice = dom.append_child(element, "div");
    dom.set_attr(notice, NOTICE_ATTR, "1");
    dom.set_text(notice, text);
    dom.set_rect(notice, Rect { width: 0.0, height: NOTICE_HEIGHT_PX });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{markers, scan_feed};
    use crate::types::UnifiedBlocklist;

    fn engine_with(style: SuppressionStyle, blocked: &[&str]) -> MuteEngine {
        let mut engine = MuteEngine::new(style);
        engine.refresh(&UnifiedBlocklist::from_members(blocked.iter().copied()));
        engine
    }

    /// root > cell > wrapper > container(tweet) with author anchors.
    fn build_post(dom: &mut FeedDom, author: &str) -> (NodeId, NodeId) {
        let cell = dom.append_child(dom.root(), "div");
        let wrapper = dom.append_child(cell, "div");
        let container = dom.append_child(wrapper, "article");
        dom.set_attr(container, markers::TEST_ID, markers::POST_CONTAINER);

        let name = dom.append_child(container, "div");
        dom.set_attr(name, markers::TEST_ID, markers::AUTHOR_NAME);
        let handle = dom.append_child(name, "a");
        dom.set_text(handle, &format!("@{author}"));

        let avatar = dom.append_child(container, "div");
        dom.set_attr(avatar, markers::TEST_ID, markers::AVATAR);
        (cell, container)
    }

    fn add_quote(dom: &mut FeedDom, container: NodeId, quoted: &str) -> NodeId {
        let quote_block = dom.append_child(container, "div");
        let row = dom.append_child(quote_block, "div");
        let avatar = dom.append_child(row, "div");
        dom.set_attr(avatar, markers::TEST_ID, markers::AVATAR);
        let author = dom.append_child(row, "div");
        dom.set_attr(author, "role", "link");
        dom.set_text(author, &format!("@{quoted}"));
        quote_block
    }

    #[test]
    fn test_plain_post_removed_two_levels_up() {
        let mut dom = FeedDom::new();
        let (cell, container) = build_post(&mut dom, "alice");

        let engine = engine_with(SuppressionStyle::Remove, &["alice"]);
        let posts = scan_feed(&mut dom).posts;
        let mut sink = CollectingSink::default();
        let outcome = engine.apply_batch(&mut dom, &posts, &mut sink);

        assert_eq!(outcome.actions.len(), 1);
        assert_eq!(outcome.actions[0].node, cell);
        assert!(!dom.is_attached(container));
        assert_eq!(sink.scanned, 1);
        assert_eq!(sink.removed, 1);
    }

    #[test]
    fn test_unblocked_post_kept() {
        let mut dom = FeedDom::new();
        let (_, container) = build_post(&mut dom, "alice");

        let engine = engine_with(SuppressionStyle::Remove, &["someone-else"]);
        let posts = scan_feed(&mut dom).posts;
        let mut sink = CollectingSink::default();
        let outcome = engine.apply_batch(&mut dom, &posts, &mut sink);

        assert!(outcome.actions.is_empty());
        assert!(dom.is_attached(container));
        assert_eq!(sink.scanned, 1);
        assert_eq!(sink.removed, 0);
    }

    #[test]
    fn test_quote_inner_only_annotates_quoted_subtree() {
        let mut dom = FeedDom::new();
        let (_, container) = build_post(&mut dom, "outer");
        let quote_block = add_quote(&mut dom, container, "inner");

        let engine = engine_with(SuppressionStyle::Remove, &["inner"]);
        let posts = scan_feed(&mut dom).posts;
        let mut sink = CollectingSink::default();
        let outcome = engine.apply_batch(&mut dom, &posts, &mut sink);

        assert_eq!(outcome.actions.len(), 1);
        assert_eq!(outcome.actions[0].decision, MuteDecision::AnnotateQuoted);
        assert_eq!(outcome.actions[0].username, "inner");

        // Outer post survives; quoted subtree replaced with a notice.
        assert!(dom.is_attached(container));
        assert!(dom.is_attached(quote_block));
        let children = dom.children(quote_block);
        assert_eq!(children.len(), 1);
        let notice = children[0];
        assert_eq!(dom.attr(notice, NOTICE_ATTR), Some("1"));
        assert_eq!(dom.text(notice), QUOTE_NOTICE_TEXT);
        assert_eq!(dom.rect(notice).unwrap().height, NOTICE_HEIGHT_PX);
        assert_eq!(sink.removed, 1);
    }

    #[test]
    fn test_quote_both_blocked_removes_whole_post() {
        let mut dom = FeedDom::new();
        let (cell, container) = build_post(&mut dom, "outer");
        add_quote(&mut dom, container, "inner");

        let engine = engine_with(SuppressionStyle::Remove, &["inner", "outer"]);
        let posts = scan_feed(&mut dom).posts;
        let mut sink = CollectingSink::default();
        let outcome = engine.apply_batch(&mut dom, &posts, &mut sink);

        assert_eq!(outcome.actions.len(), 1);
        assert_eq!(outcome.actions[0].decision, MuteDecision::RemovePost);
        assert_eq!(outcome.actions[0].username, "outer");
        assert_eq!(outcome.actions[0].node, cell);
        assert!(!dom.is_attached(container));
    }

    #[test]
    fn test_quote_outer_only_removes_whole_post() {
        let mut dom = FeedDom::new();
        let (_, container) = build_post(&mut dom, "outer");
        add_quote(&mut dom, container, "inner");

        let engine = engine_with(SuppressionStyle::Remove, &["outer"]);
        let posts = scan_feed(&mut dom).posts;
        let decision = engine.decide(&posts[0]);
        assert_eq!(decision, MuteDecision::RemovePost);
    }

    #[test]
    fn test_notice_style_keeps_wrapper() {
        let mut dom = FeedDom::new();
        let (cell, container) = build_post(&mut dom, "alice");

        let engine = engine_with(SuppressionStyle::Notice, &["alice"]);
        let posts = scan_feed(&mut dom).posts;
        let mut sink = CollectingSink::default();
        let outcome = engine.apply_batch(&mut dom, &posts, &mut sink);

        assert!(dom.is_attached(cell));
        assert!(dom.is_attached(container));
        assert_eq!(outcome.actions[0].node, container);
        let children = dom.children(container);
        assert_eq!(children.len(), 1);
        assert_eq!(dom.text(children[0]), POST_NOTICE_TEXT);
    }

    #[test]
    fn test_refresh_replaces_session_copy() {
        let mut engine = engine_with(SuppressionStyle::Remove, &["alice"]);
        assert!(engine.is_blocked("alice"));

        engine.refresh(&UnifiedBlocklist::from_members(["bob"]));
        assert!(!engine.is_blocked("alice"));
        assert!(engine.is_blocked("bob"));
    }

    #[test]
    fn test_batch_counts_every_classified_post() {
        let mut dom = FeedDom::new();
        build_post(&mut dom, "alice");
        build_post(&mut dom, "bob");
        build_post(&mut dom, "carol");

        let engine = engine_with(SuppressionStyle::Remove, &["bob"]);
        let posts = scan_feed(&mut dom).posts;
        let mut sink = CollectingSink::default();
        let outcome = engine.apply_batch(&mut dom, &posts, &mut sink);

        assert_eq!(outcome.scanned, 3);
        assert_eq!(outcome.muted(), 1);
        assert_eq!(sink.scanned, 3);
        assert_eq!(sink.removed, 1);
    }
}
