//! Feed scanning and post classification
//!
//! Converts raw feed DOM into typed [`ScannedPost`] records. The platform
//! ships several structural variants for reposts, quote-tweets, and
//! badge-decorated authors, so extraction is tolerant of partial or irregular
//! markup: a container that cannot be classified is marked and skipped, never
//! aborts the scan.

use thiserror::Error;

use crate::dom::{FeedDom, NodeId};
use crate::types::ScannedPost;

/// Platform marker attributes and the engine's own scan markers.
pub mod markers {
    /// Attribute the platform uses to tag structural roles.
    pub const TEST_ID: &str = "data-testid";
    pub const POST_CONTAINER: &str = "tweet";
    pub const AUTHOR_NAME: &str = "User-Name";
    pub const SOCIAL_CONTEXT: &str = "socialContext";
    pub const AVATAR: &str = "Tweet-User-Avatar";
    pub const VIDEO_COMPONENT: &str = "videoComponent";
    pub const PROFILE_LINK: &str = "AppTabBar_Profile_Link";

    /// Generic processed marker; the container query skips nodes carrying it.
    pub const PROCESSED_ATTR: &str = "data-sm-processed";
    /// Secondary status attribute carrying the success/failure distinction.
    pub const STATUS_ATTR: &str = "data-sm-scan";
    pub const STATUS_SCANNED: &str = "scanned";
    pub const STATUS_FAILED: &str = "failed";
}

/// Upper bound, in CSS pixels, below which an element is considered a
/// verified-badge icon rather than content. Visually coupled; tune here.
pub const BADGE_MAX_PX: f32 = 24.0;

/// Why a single container failed to classify.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("author name container not found")]
    AuthorNodeMissing,
    #[error("no @-handle anchor inside the author container")]
    HandleMissing,
    #[error("username empty after stripping the @ prefix")]
    EmptyUsername,
    #[error("quoted author container not found")]
    QuotedAuthorNotFound,
}

/// Result of one scan pass.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Successfully classified posts, in document order.
    pub posts: Vec<ScannedPost>,
    /// Containers that were marked `failed` this pass.
    pub failed: usize,
}

/// Scan the tree for unprocessed post containers and classify each one.
///
/// Every visited container is marked processed so the next pass will not
/// re-select it; the success/failure distinction goes on a secondary
/// attribute. Stateless and idempotent for identical DOM input.
pub fn scan_feed(dom: &mut FeedDom) -> ScanOutcome {
    let containers: Vec<NodeId> = dom
        .find_by_test_id(dom.root(), markers::POST_CONTAINER)
        .into_iter()
        .filter(|&c| dom.attr(c, markers::PROCESSED_ATTR).is_none())
        .collect();

    let mut outcome = ScanOutcome::default();
    for container in containers {
        dom.set_attr(container, markers::PROCESSED_ATTR, "1");
        match classify_container(dom, container) {
            Ok(post) => {
                dom.set_attr(container, markers::STATUS_ATTR, markers::STATUS_SCANNED);
                outcome.posts.push(post);
            }
            Err(error) => {
                log::warn!("failed to classify post container: {error}");
                dom.set_attr(container, markers::STATUS_ATTR, markers::STATUS_FAILED);
                outcome.failed += 1;
            }
        }
    }
    outcome
}

/// Classify one post container.
pub fn classify_container(dom: &FeedDom, container: NodeId) -> Result<ScannedPost, ClassifyError> {
    // A non-empty social-context label reclassifies the post as a repost but
    // does not change username extraction.
    let is_repost = dom
        .find_by_test_id(container, markers::SOCIAL_CONTEXT)
        .first()
        .map(|&n| !dom.visible_text(n).trim().is_empty())
        .unwrap_or(false);

    // More than one avatar marker implies an embedded quoted post.
    let avatars = dom.find_by_test_id(container, markers::AVATAR);
    if avatars.len() > 1 {
        return classify_quote(dom, container, avatars[1]);
    }

    let username = author_username(dom, container)?;
    if is_repost {
        Ok(ScannedPost::Repost { username, element: container })
    } else {
        Ok(ScannedPost::Tweet { username, element: container })
    }
}

fn classify_quote(
    dom: &FeedDom,
    container: NodeId,
    inner_avatar: NodeId,
) -> Result<ScannedPost, ClassifyError> {
    let parent_username = author_username(dom, container)?;

    let row = dom.parent(inner_avatar).ok_or(ClassifyError::QuotedAuthorNotFound)?;
    let author_node = quoted_author_node(dom, row, inner_avatar)?;
    let username = handle_in_text(&dom.visible_text(author_node))?;

    // The quoted subtree is the block enclosing the inner author row.
    let element = dom.parent(row).unwrap_or(row);

    Ok(ScannedPost::QuoteTweet {
        username,
        parent_username,
        element,
        parent_element: container,
    })
}

/// Locate the quoted post's author container among the inner avatar's
/// siblings. A candidate qualifies when it has visible text, is not part of
/// a video component, is a link-role element, and is not immediately
/// preceded by a badge-sized icon.
fn quoted_author_node(
    dom: &FeedDom,
    row: NodeId,
    avatar: NodeId,
) -> Result<NodeId, ClassifyError> {
    for &sibling in dom.children(row) {
        if sibling == avatar {
            continue;
        }
        if dom.visible_text(sibling).trim().is_empty() {
            continue;
        }
        if is_video_component(dom, sibling) {
            continue;
        }
        if dom.attr(sibling, "role") != Some("link") {
            continue;
        }
        if preceded_by_badge(dom, sibling) {
            continue;
        }
        return Ok(sibling);
    }
    Err(ClassifyError::QuotedAuthorNotFound)
}

fn is_video_component(dom: &FeedDom, node: NodeId) -> bool {
    dom.attr(node, markers::TEST_ID) == Some(markers::VIDEO_COMPONENT)
        || !dom.find_by_test_id(node, markers::VIDEO_COMPONENT).is_empty()
}

fn preceded_by_badge(dom: &FeedDom, node: NodeId) -> bool {
    dom.preceding_sibling(node)
        .map(|p| is_badge_sized(dom, p))
        .unwrap_or(false)
}

/// Visual badge heuristic: a rendered box no larger than [`BADGE_MAX_PX`]
/// on either axis.
pub fn is_badge_sized(dom: &FeedDom, node: NodeId) -> bool {
    dom.rect(node)
        .map(|r| r.width <= BADGE_MAX_PX && r.height <= BADGE_MAX_PX)
        .unwrap_or(false)
}

/// Username from the standard author-name container: the first anchor whose
/// text is an @-handle.
fn author_username(dom: &FeedDom, container: NodeId) -> Result<String, ClassifyError> {
    let name_node = *dom
        .find_by_test_id(container, markers::AUTHOR_NAME)
        .first()
        .ok_or(ClassifyError::AuthorNodeMissing)?;

    let anchor = dom
        .descendants(name_node)
        .into_iter()
        .find(|&n| dom.tag(n) == "a" && dom.visible_text(n).trim().starts_with('@'))
        .ok_or(ClassifyError::HandleMissing)?;

    let text = dom.visible_text(anchor);
    let handle = text.trim().trim_start_matches('@');
    if handle.is_empty() {
        return Err(ClassifyError::EmptyUsername);
    }
    Ok(handle.to_string())
}

/// First @-token in free-form text, e.g. `"Quoted Name @inner"` -> `inner`.
fn handle_in_text(text: &str) -> Result<String, ClassifyError> {
    text.split_whitespace()
        .find_map(|token| {
            let handle = token.strip_prefix('@')?;
            (!handle.is_empty()).then(|| handle.to_string())
        })
        .ok_or(ClassifyError::HandleMissing)
}

/// Opportunistic viewer identity from the profile-link node, if present.
pub fn extract_session_username(dom: &FeedDom) -> Option<String> {
    let link = *dom.find_by_test_id(dom.root(), markers::PROFILE_LINK).first()?;
    let href = dom.attr(link, "href")?;
    let handle = href.trim_start_matches('/');
    (!handle.is_empty()).then(|| handle.to_string())
}
