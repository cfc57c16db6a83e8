#![forbid(unsafe_code)]

//! In-memory document tree.
//!
//! A [`Document`] is a shared handle over an arena of nodes: elements with
//! attributes, text, comments and fragments. Inserting a fragment moves all
//! of its children in one call and leaves it empty, which is what list
//! reconciliation relies on to batch DOM work.
//!
//! Detaching a node keeps it (and its subtree) alive so it can be
//! re-inserted; [`Document::dispose`] frees a subtree for good.
//!
//! # Invariants
//!
//! 1. A node has at most one parent and appears once in that parent's
//!    children.
//! 2. Only elements and fragments have children.
//! 3. No node is its own ancestor.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::trace;
use weave_core::arena::{Arena, RawHandle};

/// Handle to a node in a [`Document`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomId(RawHandle);

impl fmt::Debug for DomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dom({:?})", self.0)
    }
}

/// Errors from tree mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    /// Handle was never issued or has been disposed.
    #[error("{node:?} does not exist in this document")]
    UnknownNode {
        /// The stale handle.
        node: DomId,
    },
    /// Insertion would break the tree shape.
    #[error("cannot insert {child:?} into {parent:?}: {reason}")]
    HierarchyRequest {
        /// Intended parent.
        parent: DomId,
        /// Node being inserted.
        child: DomId,
        /// What is wrong.
        reason: &'static str,
    },
    /// Reference node is not a child of the parent.
    #[error("{node:?} is not a child of {parent:?}")]
    NotAChild {
        /// The parent.
        parent: DomId,
        /// The reference node.
        node: DomId,
    },
    /// Attribute access on a non-element.
    #[error("{node:?} is not an element")]
    NotAnElement {
        /// The node.
        node: DomId,
    },
}

/// Node payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// `<tag attr="..">`.
    Element {
        /// Tag name.
        tag: Rc<str>,
        /// Attributes in insertion order.
        attrs: IndexMap<Rc<str>, String, ahash::RandomState>,
    },
    /// Text node.
    Text(String),
    /// Comment node, used as a placeholder.
    Comment(String),
    /// Fragment; emptied when inserted.
    Fragment,
}

impl NodeKind {
    fn can_have_children(&self) -> bool {
        matches!(self, Self::Element { .. } | Self::Fragment)
    }
}

struct DomNode {
    kind: NodeKind,
    parent: Option<DomId>,
    children: Vec<DomId>,
}

/// Mutation counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DomStats {
    /// Nodes created.
    pub created: u64,
    /// `insert_before` / `append_child` calls that moved at least one node.
    pub inserts: u64,
    /// Nodes moved by those calls.
    pub moved: u64,
    /// Attached nodes detached.
    pub detaches: u64,
    /// Text or comment data writes.
    pub text_writes: u64,
    /// Attribute writes and removals.
    pub attr_writes: u64,
}

#[derive(Default)]
struct DocumentInner {
    nodes: Arena<DomNode>,
    stats: DomStats,
}

/// Shared handle to a document. Clones refer to the same tree.
#[derive(Clone, Default)]
pub struct Document {
    inner: Rc<RefCell<DocumentInner>>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Document")
            .field("live_nodes", &inner.nodes.len())
            .field("stats", &inner.stats)
            .finish()
    }
}

impl Document {
    /// Create an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Ref<'_, DocumentInner> {
        self.inner.borrow()
    }

    fn write(&self) -> RefMut<'_, DocumentInner> {
        self.inner.borrow_mut()
    }

    fn create(&self, kind: NodeKind) -> DomId {
        let mut inner = self.write();
        inner.stats.created += 1;
        DomId(inner.nodes.insert(DomNode {
            kind,
            parent: None,
            children: Vec::new(),
        }))
    }

    /// Create a detached element.
    pub fn create_element(&self, tag: &str) -> DomId {
        self.create(NodeKind::Element {
            tag: Rc::from(tag),
            attrs: IndexMap::default(),
        })
    }

    /// Create a detached text node.
    pub fn create_text(&self, text: impl Into<String>) -> DomId {
        self.create(NodeKind::Text(text.into()))
    }

    /// Create a detached comment.
    pub fn create_comment(&self, text: impl Into<String>) -> DomId {
        self.create(NodeKind::Comment(text.into()))
    }

    /// Create an empty fragment.
    pub fn create_fragment(&self) -> DomId {
        self.create(NodeKind::Fragment)
    }

    // -----------------------------------------------------------------------
    // Tree mutation
    // -----------------------------------------------------------------------

    /// Append `child` (or a fragment's children) to `parent`.
    pub fn append_child(&self, parent: DomId, child: DomId) -> Result<(), DomError> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` before `reference`, or at the end when `reference` is
    /// `None`. A fragment moves all of its children and is left empty.
    pub fn insert_before(
        &self,
        parent: DomId,
        child: DomId,
        reference: Option<DomId>,
    ) -> Result<(), DomError> {
        let mut guard = self.write();
        let inner = &mut *guard;
        let nodes = &mut inner.nodes;
        let parent_node = nodes
            .get(parent.0)
            .ok_or(DomError::UnknownNode { node: parent })?;
        if !parent_node.kind.can_have_children() {
            return Err(DomError::HierarchyRequest {
                parent,
                child,
                reason: "parent cannot have children",
            });
        }
        let child_node = nodes
            .get(child.0)
            .ok_or(DomError::UnknownNode { node: child })?;
        if let Some(reference) = reference {
            let reference_node = nodes
                .get(reference.0)
                .ok_or(DomError::UnknownNode { node: reference })?;
            if reference_node.parent != Some(parent) {
                return Err(DomError::NotAChild {
                    parent,
                    node: reference,
                });
            }
        }
        if is_inclusive_ancestor(nodes, child, parent) {
            return Err(DomError::HierarchyRequest {
                parent,
                child,
                reason: "node would become its own ancestor",
            });
        }

        let moving: Vec<DomId> = if matches!(child_node.kind, NodeKind::Fragment) {
            nodes
                .get_mut(child.0)
                .map(|n| std::mem::take(&mut n.children))
                .unwrap_or_default()
        } else {
            vec![child]
        };
        if moving.is_empty() {
            return Ok(());
        }
        // Inserting a node before itself means before its next sibling.
        let mut reference = reference;
        if reference == Some(child) {
            reference = next_sibling_in(nodes, child);
        }
        for &node in &moving {
            unlink_from_parent(nodes, node);
        }
        let Some(parent_node) = nodes.get_mut(parent.0) else {
            return Err(DomError::UnknownNode { node: parent });
        };
        let at = reference
            .and_then(|r| parent_node.children.iter().position(|&c| c == r))
            .unwrap_or(parent_node.children.len());
        parent_node.children.splice(at..at, moving.iter().copied());
        for &node in &moving {
            if let Some(n) = nodes.get_mut(node.0) {
                n.parent = Some(parent);
            }
        }
        inner.stats.inserts += 1;
        inner.stats.moved += moving.len() as u64;
        trace!(?parent, ?child, count = moving.len(), "insert");
        Ok(())
    }

    /// Remove `node` from its parent. Detaching a parentless node is a no-op.
    pub fn detach(&self, node: DomId) -> Result<(), DomError> {
        let mut inner = self.write();
        if !inner.nodes.contains(node.0) {
            return Err(DomError::UnknownNode { node });
        }
        if unlink_from_parent(&mut inner.nodes, node) {
            inner.stats.detaches += 1;
        }
        Ok(())
    }

    /// Remove `child` from `parent`.
    pub fn remove_child(&self, parent: DomId, child: DomId) -> Result<(), DomError> {
        if self.parent(child) != Some(parent) {
            return Err(DomError::NotAChild {
                parent,
                node: child,
            });
        }
        self.detach(child)
    }

    /// Detach `node` and free it with its whole subtree.
    pub fn dispose(&self, node: DomId) {
        let mut inner = self.write();
        if unlink_from_parent(&mut inner.nodes, node) {
            inner.stats.detaches += 1;
        }
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if let Some(removed) = inner.nodes.remove(id.0) {
                stack.extend(removed.children);
            }
        }
    }

    /// Set text or comment data. On an element this replaces the children
    /// with a single text node.
    pub fn set_text(&self, node: DomId, text: &str) -> Result<(), DomError> {
        let is_element = {
            let mut inner = self.write();
            let entry = inner
                .nodes
                .get_mut(node.0)
                .ok_or(DomError::UnknownNode { node })?;
            match &mut entry.kind {
                NodeKind::Text(data) | NodeKind::Comment(data) => {
                    if data != text {
                        text.clone_into(data);
                        inner.stats.text_writes += 1;
                    }
                    false
                }
                NodeKind::Element { .. } => true,
                NodeKind::Fragment => {
                    return Err(DomError::NotAnElement { node });
                }
            }
        };
        if is_element {
            for child in self.children(node) {
                self.detach(child)?;
            }
            let text_node = self.create_text(text);
            self.append_child(node, text_node)?;
        }
        Ok(())
    }

    /// Set an attribute on an element.
    pub fn set_attribute(&self, node: DomId, name: &str, value: &str) -> Result<(), DomError> {
        let mut inner = self.write();
        let entry = inner
            .nodes
            .get_mut(node.0)
            .ok_or(DomError::UnknownNode { node })?;
        let NodeKind::Element { attrs, .. } = &mut entry.kind else {
            return Err(DomError::NotAnElement { node });
        };
        if attrs.get(name).is_some_and(|v| v == value) {
            return Ok(());
        }
        attrs.insert(Rc::from(name), value.to_owned());
        inner.stats.attr_writes += 1;
        Ok(())
    }

    /// Remove an attribute. Returns the old value.
    pub fn remove_attribute(&self, node: DomId, name: &str) -> Result<Option<String>, DomError> {
        let mut inner = self.write();
        let entry = inner
            .nodes
            .get_mut(node.0)
            .ok_or(DomError::UnknownNode { node })?;
        let NodeKind::Element { attrs, .. } = &mut entry.kind else {
            return Err(DomError::NotAnElement { node });
        };
        let old = attrs.shift_remove(name);
        if old.is_some() {
            inner.stats.attr_writes += 1;
        }
        Ok(old)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Whether `node` is live.
    #[must_use]
    pub fn contains(&self, node: DomId) -> bool {
        self.read().nodes.contains(node.0)
    }

    /// Node payload.
    #[must_use]
    pub fn kind(&self, node: DomId) -> Option<NodeKind> {
        self.read().nodes.get(node.0).map(|n| n.kind.clone())
    }

    /// Whether `node` is a comment.
    #[must_use]
    pub fn is_comment(&self, node: DomId) -> bool {
        matches!(
            self.read().nodes.get(node.0).map(|n| &n.kind),
            Some(NodeKind::Comment(_))
        )
    }

    /// Attribute value.
    #[must_use]
    pub fn attribute(&self, node: DomId, name: &str) -> Option<String> {
        match self.read().nodes.get(node.0).map(|n| &n.kind) {
            Some(NodeKind::Element { attrs, .. }) => attrs.get(name).cloned(),
            _ => None,
        }
    }

    /// Text or comment data.
    #[must_use]
    pub fn text(&self, node: DomId) -> Option<String> {
        match self.read().nodes.get(node.0).map(|n| &n.kind) {
            Some(NodeKind::Text(data) | NodeKind::Comment(data)) => Some(data.clone()),
            _ => None,
        }
    }

    /// Parent of `node`.
    #[must_use]
    pub fn parent(&self, node: DomId) -> Option<DomId> {
        self.read().nodes.get(node.0).and_then(|n| n.parent)
    }

    /// Children of `node`.
    #[must_use]
    pub fn children(&self, node: DomId) -> Vec<DomId> {
        self.read()
            .nodes
            .get(node.0)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Sibling after `node`.
    #[must_use]
    pub fn next_sibling(&self, node: DomId) -> Option<DomId> {
        next_sibling_in(&self.read().nodes, node)
    }

    /// Serialized markup of `node` and its subtree.
    #[must_use]
    pub fn outer_html(&self, node: DomId) -> String {
        let mut out = String::new();
        write_html(&self.read().nodes, node, &mut out);
        out
    }

    /// Markup of the children of `node`.
    #[must_use]
    pub fn inner_html(&self, node: DomId) -> String {
        let inner = self.read();
        let mut out = String::new();
        if let Some(n) = inner.nodes.get(node.0) {
            for &child in &n.children {
                write_html(&inner.nodes, child, &mut out);
            }
        }
        out
    }

    /// Concatenated text of all text descendants.
    #[must_use]
    pub fn text_content(&self, node: DomId) -> String {
        let inner = self.read();
        let mut out = String::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            let Some(n) = inner.nodes.get(id.0) else { continue };
            if let NodeKind::Text(data) = &n.kind {
                out.push_str(data);
            }
            stack.extend(n.children.iter().rev());
        }
        out
    }

    /// Number of live nodes.
    #[must_use]
    pub fn live_nodes(&self) -> usize {
        self.read().nodes.len()
    }

    /// Mutation counters.
    #[must_use]
    pub fn stats(&self) -> DomStats {
        self.read().stats
    }

    /// Zero the mutation counters.
    pub fn reset_stats(&self) {
        self.write().stats = DomStats::default();
    }
}

fn is_inclusive_ancestor(nodes: &Arena<DomNode>, candidate: DomId, mut node: DomId) -> bool {
    loop {
        if node == candidate {
            return true;
        }
        match nodes.get(node.0).and_then(|n| n.parent) {
            Some(parent) => node = parent,
            None => return false,
        }
    }
}

fn next_sibling_in(nodes: &Arena<DomNode>, node: DomId) -> Option<DomId> {
    let parent = nodes.get(node.0)?.parent?;
    let siblings = &nodes.get(parent.0)?.children;
    let pos = siblings.iter().position(|&c| c == node)?;
    siblings.get(pos + 1).copied()
}

fn unlink_from_parent(nodes: &mut Arena<DomNode>, node: DomId) -> bool {
    let Some(parent) = nodes.get_mut(node.0).and_then(|n| n.parent.take()) else {
        return false;
    };
    if let Some(p) = nodes.get_mut(parent.0) {
        p.children.retain(|&c| c != node);
    }
    true
}

fn write_html(nodes: &Arena<DomNode>, node: DomId, out: &mut String) {
    let Some(n) = nodes.get(node.0) else { return };
    match &n.kind {
        NodeKind::Element { tag, attrs } => {
            out.push('<');
            out.push_str(tag);
            for (name, value) in attrs {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                escape_into(value, true, out);
                out.push('"');
            }
            out.push('>');
            for &child in &n.children {
                write_html(nodes, child, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        NodeKind::Text(data) => escape_into(data, false, out),
        NodeKind::Comment(data) => {
            out.push_str("<!--");
            out.push_str(data);
            out.push_str("-->");
        }
        NodeKind::Fragment => {
            for &child in &n.children {
                write_html(nodes, child, out);
            }
        }
    }
}

fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}
