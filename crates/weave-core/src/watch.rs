#![forbid(unsafe_code)]

//! Path-indexed watcher trees.
//!
//! Every view-model node owns one [`WatchTree`]. A watcher registered for
//! `"a.b.c"` lives three levels down; intermediate levels are created lazily
//! and pruned as soon as they hold neither handlers nor children.
//!
//! # Matching
//!
//! For a notification path `p0.p1..pn` the tree is walked from the root. At
//! each level three children may match, independently:
//!
//! 1. the exact segment `pi`,
//! 2. `*`, which consumes `pi` like an exact key would,
//! 3. `**`, which fires unconditionally with the full path.
//!
//! When the path runs out at some tree node, that node's handlers fire and so
//! do all handlers below it: replacing `a` changes the value seen at `a.b.c`.
//! Handlers above the changed path do not fire unless they use `**`.
//!
//! # Invariants
//!
//! 1. No node without handlers and without children survives a removal.
//! 2. `collect` only reads; callers invoke the collected handlers after the
//!    tree borrow is released, so handlers may mutate the tree.

use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::key::{DEEP_WILDCARD, Key, WILDCARD, WatchPath};

/// Callback invoked with the notification path relative to the watched node.
pub type Handler = Rc<dyn Fn(&[Key])>;

/// Unique watcher registration id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatcherId(pub(crate) u64);

impl WatcherId {
    /// Raw id value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// How a watcher's handler is dispatched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DispatchMode {
    /// Invoke synchronously inside the write that caused the change.
    Immediate,
    /// Defer to the next scheduler tick, coalescing repeated notifications.
    #[default]
    Batched,
}

/// One registered handler.
#[derive(Clone)]
pub struct HandlerEntry {
    /// Registration id.
    pub id: WatcherId,
    /// Dispatch mode chosen at registration.
    pub mode: DispatchMode,
    /// The callback.
    pub handler: Handler,
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// A handler matched by a notification, with the path it should receive.
#[derive(Clone)]
pub struct Matched {
    /// The matched registration.
    pub entry: HandlerEntry,
    /// Full notification path relative to the watched node.
    pub path: Rc<[Key]>,
}

#[derive(Default)]
struct WatchNode {
    handlers: SmallVec<[HandlerEntry; 1]>,
    children: AHashMap<Rc<str>, WatchNode>,
}

impl WatchNode {
    fn is_empty(&self) -> bool {
        self.handlers.is_empty() && self.children.is_empty()
    }

    fn count(&self) -> usize {
        self.handlers.len() + self.children.values().map(Self::count).sum::<usize>()
    }

    fn drain_all(&mut self, removed: &mut Vec<WatcherId>) {
        removed.extend(self.handlers.drain(..).map(|e| e.id));
        for (_, mut child) in self.children.drain() {
            child.drain_all(removed);
        }
    }

    fn collect_all(&self, path: &Rc<[Key]>, out: &mut Vec<Matched>) {
        out.extend(self.handlers.iter().map(|entry| Matched {
            entry: entry.clone(),
            path: Rc::clone(path),
        }));
        for child in self.children.values() {
            child.collect_all(path, out);
        }
    }

    fn collect(&self, rest: &[Cow<'_, str>], path: &Rc<[Key]>, out: &mut Vec<Matched>) {
        let Some((head, tail)) = rest.split_first() else {
            self.collect_all(path, out);
            return;
        };
        if let Some(exact) = self.children.get(head.as_ref()) {
            exact.collect(tail, path, out);
        }
        if head.as_ref() != WILDCARD {
            if let Some(any) = self.children.get(WILDCARD) {
                any.collect(tail, path, out);
            }
        }
        if head.as_ref() != DEEP_WILDCARD {
            if let Some(deep) = self.children.get(DEEP_WILDCARD) {
                deep.collect_all(path, out);
            }
        }
    }

    /// Returns true when this node became empty and should be pruned.
    fn remove(
        &mut self,
        segments: &[Rc<str>],
        id: Option<WatcherId>,
        removed: &mut Vec<WatcherId>,
    ) -> bool {
        match segments.split_first() {
            None => match id {
                Some(id) => {
                    if let Some(pos) = self.handlers.iter().position(|e| e.id == id) {
                        self.handlers.remove(pos);
                        removed.push(id);
                    }
                }
                None => removed.extend(self.handlers.drain(..).map(|e| e.id)),
            },
            Some((head, tail)) => {
                let prune = match self.children.get_mut(head) {
                    Some(child) => child.remove(tail, id, removed),
                    None => false,
                };
                if prune {
                    self.children.remove(head);
                }
            }
        }
        self.is_empty()
    }

    fn remove_id(&mut self, id: WatcherId) -> bool {
        if let Some(pos) = self.handlers.iter().position(|e| e.id == id) {
            self.handlers.remove(pos);
            return true;
        }
        let mut found = None;
        for (segment, child) in &mut self.children {
            if child.remove_id(id) {
                found = Some((Rc::clone(segment), child.is_empty()));
                break;
            }
        }
        match found {
            Some((segment, empty)) => {
                if empty {
                    self.children.remove(&segment);
                }
                true
            }
            None => false,
        }
    }
}

/// Tree of path watchers rooted at one view-model node.
#[derive(Default)]
pub struct WatchTree {
    root: WatchNode,
}

impl fmt::Debug for WatchTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchTree")
            .field("handlers", &self.len())
            .finish()
    }
}

impl WatchTree {
    /// Create an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `entry` at `path`, creating intermediate levels as needed.
    pub fn add(&mut self, path: &WatchPath, entry: HandlerEntry) {
        let mut node = &mut self.root;
        for segment in path.segments() {
            node = node.children.entry(Rc::clone(segment)).or_default();
        }
        node.handlers.push(entry);
    }

    /// Remove handlers and return the ids that were removed.
    ///
    /// - `path = None`: remove everything.
    /// - `path = Some(p), id = None`: remove every handler registered at `p`.
    /// - `path = Some(p), id = Some(i)`: remove one handler.
    pub fn remove(&mut self, path: Option<&WatchPath>, id: Option<WatcherId>) -> Vec<WatcherId> {
        let mut removed = Vec::new();
        match (path, id) {
            (None, None) => self.root.drain_all(&mut removed),
            (None, Some(id)) => {
                if self.root.remove_id(id) {
                    removed.push(id);
                }
            }
            (Some(path), id) => {
                self.root.remove(path.segments(), id, &mut removed);
            }
        }
        removed
    }

    /// Remove everything, returning the removed ids.
    pub fn clear(&mut self) -> Vec<WatcherId> {
        self.remove(None, None)
    }

    /// Collect the handlers a notification for `path` reaches.
    pub fn collect(&self, path: &Rc<[Key]>, out: &mut Vec<Matched>) {
        if self.root.children.is_empty() {
            return;
        }
        let segments: SmallVec<[Cow<'_, str>; 8]> = path.iter().map(Key::segment).collect();
        self.root.collect(&segments, path, out);
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.root.count()
    }

    /// Whether no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Number of tree levels currently allocated below the root.
    #[must_use]
    pub fn node_count(&self) -> usize {
        fn walk(node: &WatchNode) -> usize {
            node.children.values().map(|c| 1 + walk(c)).sum()
        }
        walk(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn entry(id: u64, log: &Rc<RefCell<Vec<u64>>>) -> HandlerEntry {
        let log = Rc::clone(log);
        HandlerEntry {
            id: WatcherId(id),
            mode: DispatchMode::Immediate,
            handler: Rc::new(move |_: &[Key]| log.borrow_mut().push(id)),
        }
    }

    fn path(keys: &[&str]) -> Rc<[Key]> {
        keys.iter().map(|k| Key::from(*k)).collect()
    }

    fn fired(tree: &WatchTree, keys: &[&str]) -> Vec<u64> {
        let mut out = Vec::new();
        tree.collect(&path(keys), &mut out);
        let mut ids: Vec<u64> = out.iter().map(|m| m.entry.id.get()).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn exact_path_matches() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut tree = WatchTree::new();
        tree.add(&WatchPath::parse("a.b").unwrap(), entry(1, &log));
        assert_eq!(fired(&tree, &["a", "b"]), vec![1]);
        assert!(fired(&tree, &["a", "c"]).is_empty());
    }

    #[test]
    fn shorter_path_fires_descendants() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut tree = WatchTree::new();
        tree.add(&WatchPath::parse("a.b.c").unwrap(), entry(1, &log));
        tree.add(&WatchPath::parse("a.*").unwrap(), entry(2, &log));
        assert_eq!(fired(&tree, &["a"]), vec![1, 2]);
    }

    #[test]
    fn longer_path_does_not_fire_ancestor_without_wildcard() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut tree = WatchTree::new();
        tree.add(&WatchPath::parse("a").unwrap(), entry(1, &log));
        assert!(fired(&tree, &["a", "b"]).is_empty());
    }

    #[test]
    fn single_wildcard_matches_one_segment() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut tree = WatchTree::new();
        tree.add(&WatchPath::parse("a.*").unwrap(), entry(1, &log));
        assert_eq!(fired(&tree, &["a", "anything"]), vec![1]);
        assert!(fired(&tree, &["b", "x"]).is_empty());
        assert!(fired(&tree, &["a", "x", "y"]).is_empty());
    }

    #[test]
    fn wildcard_recurses() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut tree = WatchTree::new();
        tree.add(&WatchPath::parse("rows.*.name").unwrap(), entry(1, &log));
        assert_eq!(fired(&tree, &["rows", "3", "name"]), vec![1]);
        assert!(fired(&tree, &["rows", "3", "age"]).is_empty());
    }

    #[test]
    fn deep_wildcard_matches_any_depth() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut tree = WatchTree::new();
        tree.add(&WatchPath::parse("a.**").unwrap(), entry(1, &log));
        assert_eq!(fired(&tree, &["a", "b"]), vec![1]);
        assert_eq!(fired(&tree, &["a", "b", "c", "d"]), vec![1]);
        assert_eq!(fired(&tree, &["a"]), vec![1]);
        assert!(fired(&tree, &["b", "c"]).is_empty());
    }

    #[test]
    fn exact_star_and_deep_fire_together() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut tree = WatchTree::new();
        tree.add(&WatchPath::parse("a.b").unwrap(), entry(1, &log));
        tree.add(&WatchPath::parse("a.*").unwrap(), entry(2, &log));
        tree.add(&WatchPath::parse("a.**").unwrap(), entry(3, &log));
        assert_eq!(fired(&tree, &["a", "b"]), vec![1, 2, 3]);
    }

    #[test]
    fn matched_path_is_full_path() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut tree = WatchTree::new();
        tree.add(&WatchPath::parse("a.**").unwrap(), entry(1, &log));
        let mut out = Vec::new();
        tree.collect(&path(&["a", "b", "c"]), &mut out);
        assert_eq!(crate::key::path_string(&out[0].path), "a.b.c");
    }

    #[test]
    fn removing_last_handler_prunes_ancestors() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut tree = WatchTree::new();
        let p = WatchPath::parse("a.b.c").unwrap();
        tree.add(&p, entry(1, &log));
        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.remove(Some(&p), Some(WatcherId(1))), vec![WatcherId(1)]);
        assert_eq!(tree.node_count(), 0);
        assert!(tree.is_empty());
    }

    #[test]
    fn pruning_keeps_shared_prefix() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut tree = WatchTree::new();
        let abc = WatchPath::parse("a.b.c").unwrap();
        tree.add(&abc, entry(1, &log));
        tree.add(&WatchPath::parse("a.x").unwrap(), entry(2, &log));
        tree.remove(Some(&abc), None);
        assert_eq!(tree.node_count(), 2);
        assert_eq!(fired(&tree, &["a", "x"]), vec![2]);
    }

    #[test]
    fn remove_by_id_without_path() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut tree = WatchTree::new();
        tree.add(&WatchPath::parse("a.b").unwrap(), entry(1, &log));
        tree.add(&WatchPath::parse("a.b").unwrap(), entry(2, &log));
        assert_eq!(tree.remove(None, Some(WatcherId(1))), vec![WatcherId(1)]);
        assert_eq!(tree.len(), 1);
        assert!(tree.remove(None, Some(WatcherId(1))).is_empty());
    }

    #[test]
    fn clear_returns_every_id() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut tree = WatchTree::new();
        tree.add(&WatchPath::parse("a").unwrap(), entry(1, &log));
        tree.add(&WatchPath::parse("b.**").unwrap(), entry(2, &log));
        let mut removed = tree.clear();
        removed.sort();
        assert_eq!(removed, vec![WatcherId(1), WatcherId(2)]);
        assert_eq!(tree.node_count(), 0);
    }
}
