//! Lightweight element tree
//!
//! The engine does not talk to a live browser DOM. The host materializes the
//! feed subtrees it wants scanned into a [`FeedDom`] (an arena of element
//! nodes), and the engine reads attributes, text, and geometry from it and
//! applies mutations (detach, clear, annotate) to it. Detached nodes stay in
//! the arena so host-side references remain valid.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Index of a node in the arena. Valid for the lifetime of its `FeedDom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Rendered bounding box of an element, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone)]
struct NodeData {
    tag: String,
    attrs: Vec<(String, String)>,
    text: String,
    rect: Option<Rect>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed mutable element tree.
pub struct FeedDom {
    nodes: Vec<NodeData>,
    root: NodeId,
}

impl Default for FeedDom {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedDom {
    /// Create an empty tree with a `div` root.
    pub fn new() -> Self {
        let root = NodeData {
            tag: "div".to_string(),
            attrs: Vec::new(),
            text: String::new(),
            rect: None,
            parent: None,
            children: Vec::new(),
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Append a new element under `parent` and return its id.
    pub fn append_child(&mut self, parent: NodeId, tag: &str) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeData {
            tag: tag.to_string(),
            attrs: Vec::new(),
            text: String::new(),
            rect: None,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.index()].children.push(id);
        id
    }

    pub fn tag(&self, id: NodeId) -> &str {
        &self.nodes[id.index()].tag
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes[id.index()]
            .attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set (or replace) an attribute.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        let node = &mut self.nodes[id.index()];
        if let Some(entry) = node.attrs.iter_mut().find(|(n, _)| n == name) {
            entry.1 = value.to_string();
        } else {
            node.attrs.push((name.to_string(), value.to_string()));
        }
    }

    /// Own text of the element, not including descendants.
    pub fn text(&self, id: NodeId) -> &str {
        &self.nodes[id.index()].text
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) {
        self.nodes[id.index()].text = text.to_string();
    }

    pub fn rect(&self, id: NodeId) -> Option<Rect> {
        self.nodes[id.index()].rect
    }

    pub fn set_rect(&mut self, id: NodeId, rect: Rect) {
        self.nodes[id.index()].rect = Some(rect);
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    /// Ancestor `levels` steps up, or `None` if the tree is shallower.
    pub fn ancestor(&self, id: NodeId, levels: usize) -> Option<NodeId> {
        let mut current = id;
        for _ in 0..levels {
            current = self.parent(current)?;
        }
        Some(current)
    }

    /// The sibling immediately before `id` in its parent's child order.
    pub fn preceding_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|&c| c == id)?;
        if pos == 0 {
            None
        } else {
            Some(siblings[pos - 1])
        }
    }

    /// All nodes in the subtree under `id` (excluding `id`), document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    /// Descendants of `id` carrying `data-testid="{value}"`, document order.
    pub fn find_by_test_id(&self, id: NodeId, value: &str) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|&n| self.attr(n, "data-testid") == Some(value))
            .collect()
    }

    /// Concatenated visible text of the subtree rooted at `id`.
    pub fn visible_text(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let own = self.text(id);
        if !own.is_empty() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(own);
        }
        for &child in self.children(id) {
            self.collect_text(child, out);
        }
    }

    /// Whether `id` is still reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.root {
                return true;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Remove `id` from its parent's children. The subtree stays in the
    /// arena but is no longer reachable from the root.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.parent(id) {
            self.nodes[parent.index()].children.retain(|&c| c != id);
        }
        self.nodes[id.index()].parent = None;
    }

    /// Detach every child of `id`, leaving the element itself in place.
    pub fn clear_children(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.nodes[id.index()].children);
        for child in children {
            self.nodes[child.index()].parent = None;
        }
    }

    // =========================================================================
    // Snapshot conversion
    // =========================================================================

    /// Build a tree from a host-provided snapshot, returning the node created
    /// for the snapshot root (a child of the tree root).
    pub fn from_snapshot(snapshot: &SnapshotNode) -> Self {
        let mut dom = Self::new();
        let root = dom.root();
        dom.graft(root, snapshot);
        dom
    }

    /// Materialize `snapshot` as a subtree under `parent`.
    pub fn graft(&mut self, parent: NodeId, snapshot: &SnapshotNode) -> NodeId {
        let id = self.append_child(parent, &snapshot.tag);
        for (name, value) in &snapshot.attrs {
            self.set_attr(id, name, value);
        }
        if !snapshot.text.is_empty() {
            self.set_text(id, &snapshot.text);
        }
        if let Some(rect) = snapshot.rect {
            self.set_rect(id, rect);
        }
        for child in &snapshot.children {
            self.graft(id, child);
        }
        id
    }

    /// Serialize the attached tree under `id` back into snapshot form.
    pub fn to_snapshot(&self, id: NodeId) -> SnapshotNode {
        let node = &self.nodes[id.index()];
        SnapshotNode {
            tag: node.tag.clone(),
            attrs: node.attrs.iter().cloned().collect(),
            text: node.text.clone(),
            rect: node.rect,
            children: node.children.iter().map(|&c| self.to_snapshot(c)).collect(),
        }
    }
}

/// Serde-friendly nested element snapshot, the wire form of a feed subtree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub tag: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub rect: Option<Rect>,
    #[serde(default)]
    pub children: Vec<SnapshotNode>,
}
