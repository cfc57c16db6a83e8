#![forbid(unsafe_code)]

//! The view-model graph.
//!
//! Objects and arrays live in a generational arena and are addressed by
//! [`NodeId`]. A node starts *raw*: writes to it are plain stores. Wrapping
//! it (directly with [`Graph::wrap`], or by assigning it into a tracked node)
//! turns it and everything reachable from it into view-models. The handle
//! does not change when a node is wrapped, so wrapping is idempotent and
//! identity-stable.
//!
//! Every tracked child keeps a list of `(parent, key)` edges. A change at
//! `node.path` is matched against `node`'s own watch tree and then re-emitted
//! on each parent as `parent.[key, ..path]`, which is how a write five levels
//! down reaches a watcher registered on the root for `"a.b.c.d.e"`.
//!
//! # Invariants
//!
//! 1. Every node reachable from a tracked node is tracked, except ignored
//!    nodes (never wrapped, never linked) and opaque values.
//! 2. A tracked child has exactly one `(parent, key)` edge per slot of a
//!    tracked parent holding it.
//! 3. A write whose new value is [`Value::same`] as the old one emits nothing.
//! 4. No `RefCell` borrow is held while a handler runs; handler lists are
//!    snapshotted before dispatch.
//! 5. A propagation never visits a node already on its own parent chain.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Write through a destroyed handle | Late callback after teardown | Ignored (`Ok`) |
//! | Read through a destroyed handle | Same | `Value::Undefined` |
//! | Untracked object into strict node | Attrs contract broken | `GraphError::NotViewModel` |
//! | Non-integer `length` | Caller bug | `GraphError::InvalidLength` |
//! | Watch on raw/destroyed node | Caller bug | `Untracked` / `Detached` |

use std::cell::{Cell, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashSet;
use bitflags::bitflags;
use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::arena::{Arena, RawHandle};
use crate::config::GraphConfig;
use crate::error::GraphError;
use crate::key::{Key, WatchPath, path_string};
use crate::scheduler::Scheduler;
use crate::value::Value;
use crate::watch::{DispatchMode, Handler, HandlerEntry, Matched, WatchTree, WatcherId};

/// Handle to an object or array in a [`Graph`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) RawHandle);

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({:?})", self.0)
    }
}

bitflags! {
    /// Per-node state bits.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct NodeFlags: u8 {
        /// The node is a view-model.
        const TRACKED = 1;
        /// Emissions from this node are delivered.
        const NOTIFIABLE = 1 << 1;
        /// The node is never wrapped or linked.
        const IGNORED = 1 << 2;
        /// Public properties must hold view-models (attrs contract).
        const STRICT = 1 << 3;
    }
}

pub(crate) type Props = IndexMap<Rc<str>, Value, ahash::RandomState>;

pub(crate) enum Shape {
    Object(Props),
    Array(Vec<Value>),
}

impl Shape {
    fn child_nodes(&self) -> Vec<(Key, NodeId)> {
        match self {
            Self::Object(props) => props
                .iter()
                .filter_map(|(k, v)| v.as_node().map(|id| (Key::Name(Rc::clone(k)), id)))
                .collect(),
            Self::Array(items) => items
                .iter()
                .enumerate()
                .filter_map(|(i, v)| v.as_node().map(|id| (Key::Index(i), id)))
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ParentLink {
    pub(crate) parent: NodeId,
    pub(crate) key: Key,
}

pub(crate) struct NodeEntry {
    pub(crate) shape: Shape,
    pub(crate) flags: NodeFlags,
    pub(crate) parents: SmallVec<[ParentLink; 2]>,
    pub(crate) watchers: WatchTree,
}

impl NodeEntry {
    fn new(shape: Shape) -> Self {
        Self {
            shape,
            flags: NodeFlags::empty(),
            parents: SmallVec::new(),
            watchers: WatchTree::new(),
        }
    }

    pub(crate) fn is_tracked(&self) -> bool {
        self.flags.contains(NodeFlags::TRACKED)
    }
}

pub(crate) type NodeArena = Arena<NodeEntry>;

pub(crate) struct GraphInner {
    pub(crate) arena: RefCell<NodeArena>,
    scheduler: Scheduler,
    live_watchers: RefCell<AHashSet<WatcherId>>,
    next_watcher: Cell<u64>,
    config: GraphConfig,
}

/// Shared handle to a view-model graph.
///
/// Cloning a `Graph` creates a new handle to the **same** graph. Handlers
/// stored inside the graph should capture a [`WeakGraph`] to avoid cycles.
#[derive(Clone)]
pub struct Graph {
    pub(crate) inner: Rc<GraphInner>,
}

/// Non-owning graph handle.
#[derive(Clone)]
pub struct WeakGraph {
    inner: Weak<GraphInner>,
}

impl WeakGraph {
    /// Upgrade to a strong handle if the graph is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Graph> {
        self.inner.upgrade().map(|inner| Graph { inner })
    }
}

impl fmt::Debug for WeakGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakGraph").finish_non_exhaustive()
    }
}

/// A registered watcher: where it lives and how to remove it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WatchHandle {
    node: NodeId,
    path: WatchPath,
    id: WatcherId,
}

impl WatchHandle {
    /// Watched node.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Watched path.
    #[must_use]
    pub fn path(&self) -> &WatchPath {
        &self.path
    }

    /// Registration id.
    #[must_use]
    pub fn id(&self) -> WatcherId {
        self.id
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("live_nodes", &self.live_nodes())
            .field("scheduler", &self.inner.scheduler)
            .finish()
    }
}

impl Graph {
    /// Create an empty graph with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    /// Create an empty graph.
    #[must_use]
    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            inner: Rc::new(GraphInner {
                arena: RefCell::new(Arena::new()),
                scheduler: Scheduler::new(),
                live_watchers: RefCell::new(AHashSet::new()),
                next_watcher: Cell::new(1),
                config,
            }),
        }
    }

    /// Configuration in effect.
    #[must_use]
    pub fn config(&self) -> &GraphConfig {
        &self.inner.config
    }

    /// Weak handle for use inside handlers.
    #[must_use]
    pub fn downgrade(&self) -> WeakGraph {
        WeakGraph {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Whether two handles refer to the same graph.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The notification scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub(crate) fn arena_mut(&self) -> RefMut<'_, NodeArena> {
        self.inner.arena.borrow_mut()
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    pub(crate) fn alloc(&self, shape: Shape) -> NodeId {
        NodeId(self.arena_mut().insert(NodeEntry::new(shape)))
    }

    /// Create a raw (untracked) object.
    pub fn object<I, K, V>(&self, entries: I) -> NodeId
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Rc<str>>,
        V: Into<Value>,
    {
        let props: Props = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.alloc(Shape::Object(props))
    }

    /// Create a raw (untracked) array.
    pub fn array<I, V>(&self, values: I) -> NodeId
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.alloc(Shape::Array(values.into_iter().map(Into::into).collect()))
    }

    /// Create an object and wrap it.
    pub fn vm_object<I, K, V>(&self, entries: I) -> NodeId
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Rc<str>>,
        V: Into<Value>,
    {
        let id = self.object(entries);
        self.wrap(id);
        id
    }

    /// Create an array and wrap it.
    pub fn vm_array<I, V>(&self, values: I) -> NodeId
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let id = self.array(values);
        self.wrap(id);
        id
    }

    /// Create a strict attrs view-model.
    ///
    /// Public (non `_`-prefixed) properties holding objects must already be
    /// view-models; this is checked here and on every later write.
    pub fn attrs<I, K, V>(&self, entries: I) -> Result<NodeId, GraphError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Rc<str>>,
        V: Into<Value>,
    {
        let id = self.object(entries);
        {
            let mut arena = self.arena_mut();
            let children = match arena.get(id.0) {
                Some(entry) => entry.shape.child_nodes(),
                None => Vec::new(),
            };
            for (key, child) in children {
                if !key.is_private()
                    && !is_view_model_in(&arena, child)
                    && !is_ignored_in(&arena, child)
                {
                    arena.remove(id.0);
                    return Err(GraphError::NotViewModel { node: id, key });
                }
            }
            track(&mut arena, id);
            if let Some(entry) = arena.get_mut(id.0) {
                entry.flags.insert(NodeFlags::STRICT);
            }
        }
        Ok(id)
    }

    /// Wrap a value into a view-model.
    ///
    /// Primitives, opaque values, ignored and destroyed nodes pass through.
    /// Wrapping a node twice returns the same handle.
    pub fn wrap(&self, value: impl Into<Value>) -> Value {
        let value = value.into();
        if let Value::Node(id) = value {
            track(&mut self.arena_mut(), id);
        }
        value
    }

    /// Exclude a raw node from wrapping. Returns false if it is already tracked.
    pub fn mark_ignored(&self, node: NodeId) -> bool {
        let mut arena = self.arena_mut();
        match arena.get_mut(node.0) {
            Some(entry) if !entry.is_tracked() => {
                entry.flags.insert(NodeFlags::IGNORED);
                true
            }
            _ => false,
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Whether `node` is still live.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.inner.arena.borrow().contains(node.0)
    }

    /// Whether `value` is a live, tracked node.
    #[must_use]
    pub fn is_view_model(&self, value: &Value) -> bool {
        match value {
            Value::Node(id) => self
                .inner
                .arena
                .borrow()
                .get(id.0)
                .is_some_and(NodeEntry::is_tracked),
            _ => false,
        }
    }

    /// Flags of a live node.
    #[must_use]
    pub fn flags(&self, node: NodeId) -> Option<NodeFlags> {
        self.inner.arena.borrow().get(node.0).map(|e| e.flags)
    }

    /// Whether `node` is an array.
    #[must_use]
    pub fn is_array(&self, node: NodeId) -> bool {
        matches!(
            self.inner.arena.borrow().get(node.0).map(|e| &e.shape),
            Some(Shape::Array(_))
        )
    }

    /// Read one property. Missing properties and destroyed nodes read as
    /// `Undefined`; arrays expose `length`.
    #[must_use]
    pub fn get(&self, node: NodeId, key: impl Into<Key>) -> Value {
        let key = key.into();
        let arena = self.inner.arena.borrow();
        let Some(entry) = arena.get(node.0) else {
            return Value::Undefined;
        };
        read(&entry.shape, &key)
    }

    /// Read a dotted path (`"a.b.0.c"`) starting at `node`.
    #[must_use]
    pub fn get_path(&self, node: NodeId, path: &str) -> Value {
        let mut current = Value::Node(node);
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            current = match current {
                Value::Node(id) => self.get(id, segment),
                _ => return Value::Undefined,
            };
        }
        current
    }

    /// Keys of an object (insertion order) or indices of an array.
    #[must_use]
    pub fn keys(&self, node: NodeId) -> Vec<Key> {
        let arena = self.inner.arena.borrow();
        match arena.get(node.0).map(|e| &e.shape) {
            Some(Shape::Object(props)) => props.keys().map(|k| Key::Name(Rc::clone(k))).collect(),
            Some(Shape::Array(items)) => (0..items.len()).map(Key::Index).collect(),
            None => Vec::new(),
        }
    }

    /// Property values of an object or elements of an array.
    #[must_use]
    pub fn values(&self, node: NodeId) -> Vec<Value> {
        let arena = self.inner.arena.borrow();
        match arena.get(node.0).map(|e| &e.shape) {
            Some(Shape::Object(props)) => props.values().cloned().collect(),
            Some(Shape::Array(items)) => items.clone(),
            None => Vec::new(),
        }
    }

    /// Number of properties or elements.
    #[must_use]
    pub fn len(&self, node: NodeId) -> usize {
        let arena = self.inner.arena.borrow();
        match arena.get(node.0).map(|e| &e.shape) {
            Some(Shape::Object(props)) => props.len(),
            Some(Shape::Array(items)) => items.len(),
            None => 0,
        }
    }

    /// Whether `node` has no properties or elements.
    #[must_use]
    pub fn is_empty(&self, node: NodeId) -> bool {
        self.len(node) == 0
    }

    /// `(parent, key)` edges of a node.
    #[must_use]
    pub fn parents(&self, node: NodeId) -> Vec<(NodeId, Key)> {
        let arena = self.inner.arena.borrow();
        arena
            .get(node.0)
            .map(|e| {
                e.parents
                    .iter()
                    .map(|l| (l.parent, l.key.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether emissions from `node` are delivered.
    #[must_use]
    pub fn is_notifiable(&self, node: NodeId) -> bool {
        self.flags(node)
            .is_some_and(|f| f.contains(NodeFlags::TRACKED | NodeFlags::NOTIFIABLE))
    }

    /// Number of live nodes.
    #[must_use]
    pub fn live_nodes(&self) -> usize {
        self.inner.arena.borrow().len()
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Write one property and emit a change for it.
    ///
    /// Writing `length` on an array delegates to [`Graph::set_len`]. Writing
    /// past the end of an array extends it with `Undefined` and also emits
    /// `length`; an index that would grow the array beyond
    /// [`GraphConfig::max_array_len`] is rejected with
    /// [`GraphError::InvalidIndex`].
    pub fn set(
        &self,
        node: NodeId,
        key: impl Into<Key>,
        value: impl Into<Value>,
    ) -> Result<(), GraphError> {
        let key = key.into();
        let value = value.into();
        let max_len = self.inner.config.max_array_len;
        let paths = {
            let mut arena = self.arena_mut();
            let Some(entry) = arena.get(node.0) else {
                trace!(?node, %key, "write to destroyed node ignored");
                return Ok(());
            };
            if matches!(entry.shape, Shape::Array(_)) && key.is_length() {
                drop(arena);
                return self.set_len(node, value);
            }
            let key = normalize_key(node, &entry.shape, key)?;
            let old = read(&entry.shape, &key);
            if old.same(&value) {
                return Ok(());
            }
            let tracked = entry.is_tracked();
            if tracked && entry.flags.contains(NodeFlags::STRICT) && !key.is_private() {
                if let Value::Node(child) = &value {
                    if !is_view_model_in(&arena, *child) && !is_ignored_in(&arena, *child) {
                        return Err(GraphError::NotViewModel { node, key });
                    }
                }
            }
            let (old_len, new_len) = match arena.get_mut(node.0).map(|e| &mut e.shape) {
                Some(Shape::Object(props)) => {
                    let len = props.len();
                    if let Key::Name(name) = &key {
                        props.insert(Rc::clone(name), value.clone());
                    }
                    (len, len)
                }
                Some(Shape::Array(items)) => {
                    let len = items.len();
                    let index = key.as_index().unwrap_or(len);
                    if index >= len {
                        let Some(grown) = index.checked_add(1).filter(|n| *n <= max_len) else {
                            return Err(GraphError::InvalidIndex { key });
                        };
                        items.resize(grown, Value::Undefined);
                    }
                    items[index] = value.clone();
                    (len, items.len())
                }
                None => return Ok(()),
            };
            if !tracked {
                return Ok(());
            }
            release(&mut arena, node, &key, &old);
            adopt(&mut arena, node, key.clone(), &value);
            let mut paths = vec![vec![key]];
            if old_len != new_len {
                paths.push(vec![Key::length()]);
            }
            paths
        };
        self.emit(node, paths);
        Ok(())
    }

    /// Remove an object property, emitting a change for it.
    pub fn delete(&self, node: NodeId, key: impl Into<Key>) -> Result<Value, GraphError> {
        let key = key.into();
        let (old, tracked, key) = {
            let mut arena = self.arena_mut();
            let Some(entry) = arena.get_mut(node.0) else {
                return Ok(Value::Undefined);
            };
            let tracked = entry.is_tracked();
            let Shape::Object(props) = &mut entry.shape else {
                return Err(GraphError::WrongShape {
                    node,
                    expected: "an object",
                });
            };
            let name: Rc<str> = Rc::from(key.segment().as_ref());
            let Some(old) = props.shift_remove(&name) else {
                return Ok(Value::Undefined);
            };
            let key = Key::Name(name);
            if tracked {
                release(&mut arena, node, &key, &old);
            }
            (old, tracked, key)
        };
        if tracked {
            self.emit(node, vec![vec![key]]);
        }
        Ok(old)
    }

    /// Enable or disable emissions from `node`.
    pub fn set_notifiable(&self, node: NodeId, notifiable: bool) {
        if let Some(entry) = self.arena_mut().get_mut(node.0) {
            entry.flags.set(NodeFlags::NOTIFIABLE, notifiable);
        }
    }

    /// Destroy a node: clear its watchers (cancelling pending dispatches),
    /// remove the edges its children hold to it, and free its slot.
    ///
    /// Children are not destroyed; they may be shared. Destroying twice is a
    /// no-op.
    pub fn destroy(&self, node: NodeId) {
        let removed = {
            let mut arena = self.arena_mut();
            let Some(mut entry) = arena.remove(node.0) else {
                return;
            };
            let removed = entry.watchers.clear();
            for (key, child) in entry.shape.child_nodes() {
                unlink(&mut arena, child, node, &key);
            }
            removed
        };
        self.forget_watchers(&removed);
        debug!(?node, watchers = removed.len(), "view-model destroyed");
    }

    // -----------------------------------------------------------------------
    // Watching
    // -----------------------------------------------------------------------

    /// Register `handler` for the dotted `path` under `node`.
    pub fn watch(
        &self,
        node: NodeId,
        path: &str,
        mode: DispatchMode,
        handler: impl Fn(&[Key]) + 'static,
    ) -> Result<WatchHandle, GraphError> {
        let path = WatchPath::parse(path)?;
        self.watch_path(node, path, mode, Rc::new(handler))
    }

    /// Register a handler for an already parsed path.
    pub fn watch_path(
        &self,
        node: NodeId,
        path: WatchPath,
        mode: DispatchMode,
        handler: Handler,
    ) -> Result<WatchHandle, GraphError> {
        let id = WatcherId(self.inner.next_watcher.get());
        {
            let mut arena = self.arena_mut();
            let entry = arena
                .get_mut(node.0)
                .ok_or(GraphError::Detached { node })?;
            if !entry.is_tracked() {
                return Err(GraphError::Untracked { node });
            }
            entry.watchers.add(&path, HandlerEntry { id, mode, handler });
        }
        self.inner.next_watcher.set(id.0 + 1);
        self.inner.live_watchers.borrow_mut().insert(id);
        trace!(?node, %path, watcher = id.0, "watch");
        Ok(WatchHandle { node, path, id })
    }

    /// Remove watchers from `node`.
    ///
    /// With no path every watcher is removed; with a path but no id every
    /// watcher at that path; with both, one watcher. Returns how many were
    /// removed. Pending batched dispatches of removed watchers are cancelled.
    pub fn unwatch(
        &self,
        node: NodeId,
        path: Option<&str>,
        id: Option<WatcherId>,
    ) -> Result<usize, GraphError> {
        let path = path.map(WatchPath::parse).transpose()?;
        Ok(self.unwatch_path(node, path.as_ref(), id))
    }

    /// [`Graph::unwatch`] with an already parsed path.
    pub fn unwatch_path(&self, node: NodeId, path: Option<&WatchPath>, id: Option<WatcherId>) -> usize {
        let removed = {
            let mut arena = self.arena_mut();
            match arena.get_mut(node.0) {
                Some(entry) => entry.watchers.remove(path, id),
                None => Vec::new(),
            }
        };
        self.forget_watchers(&removed);
        removed.len()
    }

    /// Remove the watcher behind `handle`. Returns whether it was registered.
    pub fn unwatch_handle(&self, handle: &WatchHandle) -> bool {
        let removed = self.unwatch_path(handle.node, Some(&handle.path), Some(handle.id)) > 0;
        // A destroyed node already dropped its tree; still make sure nothing is queued.
        self.inner.scheduler.cancel(handle.id);
        removed
    }

    /// Number of watchers registered on `node`.
    #[must_use]
    pub fn watcher_count(&self, node: NodeId) -> usize {
        self.inner
            .arena
            .borrow()
            .get(node.0)
            .map_or(0, |e| e.watchers.len())
    }

    fn forget_watchers(&self, ids: &[WatcherId]) {
        let mut live = self.inner.live_watchers.borrow_mut();
        for id in ids {
            live.remove(id);
            self.inner.scheduler.cancel(*id);
        }
    }

    // -----------------------------------------------------------------------
    // Emission
    // -----------------------------------------------------------------------

    /// Emit a change at `path` under `node`, propagating to every parent.
    pub fn notify(&self, node: NodeId, path: &[Key]) {
        self.emit(node, vec![path.to_vec()]);
    }

    pub(crate) fn emit(&self, node: NodeId, paths: Vec<Vec<Key>>) {
        if paths.is_empty() {
            return;
        }
        let mut matched = Vec::new();
        {
            let arena = self.inner.arena.borrow();
            let mut chain: SmallVec<[NodeId; 8]> = SmallVec::new();
            for path in paths {
                trace!(?node, path = %path_string(&path), "emit");
                collect(&arena, node, path, &mut chain, &mut matched);
            }
        }
        for Matched { entry, path } in matched {
            // A handler that ran earlier in this batch may have unwatched this one.
            if !self.inner.live_watchers.borrow().contains(&entry.id) {
                continue;
            }
            self.inner
                .scheduler
                .dispatch(entry.id, entry.handler, path, entry.mode);
        }
    }

    // -----------------------------------------------------------------------
    // Ticks
    // -----------------------------------------------------------------------

    /// Run one scheduler tick.
    pub fn flush(&self) -> usize {
        self.inner.scheduler.flush()
    }

    /// Run ticks until idle or the configured round limit.
    pub fn run_until_idle(&self) -> usize {
        self.inner
            .scheduler
            .run_until_idle(self.inner.config.max_flush_rounds)
    }

    /// Number of pending batched dispatches.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.scheduler.pending_len()
    }
}

// ---------------------------------------------------------------------------
// Arena helpers
// ---------------------------------------------------------------------------

fn collect(
    arena: &NodeArena,
    node: NodeId,
    path: Vec<Key>,
    chain: &mut SmallVec<[NodeId; 8]>,
    out: &mut Vec<Matched>,
) {
    if chain.contains(&node) {
        return;
    }
    let Some(entry) = arena.get(node.0) else {
        return;
    };
    if !entry
        .flags
        .contains(NodeFlags::TRACKED | NodeFlags::NOTIFIABLE)
    {
        return;
    }
    let shared: Rc<[Key]> = Rc::from(path.as_slice());
    entry.watchers.collect(&shared, out);
    if entry.parents.is_empty() {
        return;
    }
    chain.push(node);
    for link in &entry.parents {
        let mut parent_path = Vec::with_capacity(path.len() + 1);
        parent_path.push(link.key.clone());
        parent_path.extend_from_slice(&path);
        collect(arena, link.parent, parent_path, chain, out);
    }
    chain.pop();
}

pub(crate) fn read(shape: &Shape, key: &Key) -> Value {
    match shape {
        Shape::Object(props) => props
            .get(key.segment().as_ref())
            .cloned()
            .unwrap_or_default(),
        Shape::Array(items) => {
            if key.is_length() {
                return Value::from(items.len());
            }
            key.as_index()
                .and_then(|i| items.get(i).cloned())
                .unwrap_or_default()
        }
    }
}

fn normalize_key(node: NodeId, shape: &Shape, key: Key) -> Result<Key, GraphError> {
    match shape {
        Shape::Object(_) => Ok(match key {
            Key::Index(i) => Key::Name(Rc::from(i.to_string())),
            named => named,
        }),
        Shape::Array(_) => key
            .as_index()
            .map(Key::Index)
            .ok_or(GraphError::InvalidIndex { key })
            .inspect_err(|_| trace!(?node, "non-index key on array")),
    }
}

fn is_view_model_in(arena: &NodeArena, node: NodeId) -> bool {
    arena.get(node.0).is_some_and(NodeEntry::is_tracked)
}

fn is_ignored_in(arena: &NodeArena, node: NodeId) -> bool {
    arena
        .get(node.0)
        .is_some_and(|e| e.flags.contains(NodeFlags::IGNORED))
}

/// Deep-wrap `root` and everything reachable from it, linking each newly
/// discovered edge exactly once.
pub(crate) fn track(arena: &mut NodeArena, root: NodeId) {
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let children = match arena.get_mut(id.0) {
            Some(entry) if !entry.flags.intersects(NodeFlags::TRACKED | NodeFlags::IGNORED) => {
                entry.flags.insert(NodeFlags::TRACKED | NodeFlags::NOTIFIABLE);
                entry.shape.child_nodes()
            }
            _ => continue,
        };
        for (key, child) in children {
            if link(arena, child, id, key) {
                stack.push(child);
            }
        }
    }
}

/// Add a `(parent, key)` edge to `child` unless it is ignored or gone.
fn link(arena: &mut NodeArena, child: NodeId, parent: NodeId, key: Key) -> bool {
    match arena.get_mut(child.0) {
        Some(entry) if !entry.flags.contains(NodeFlags::IGNORED) => {
            entry.parents.push(ParentLink { parent, key });
            true
        }
        _ => false,
    }
}

fn unlink(arena: &mut NodeArena, child: NodeId, parent: NodeId, key: &Key) {
    if let Some(entry) = arena.get_mut(child.0) {
        if let Some(pos) = entry
            .parents
            .iter()
            .position(|l| l.parent == parent && &l.key == key)
        {
            entry.parents.remove(pos);
        }
    }
}

/// Track `value` (if it is a node) and link it under `parent.key`.
pub(crate) fn adopt(arena: &mut NodeArena, parent: NodeId, key: Key, value: &Value) {
    if let Value::Node(child) = value {
        track(arena, *child);
        if is_view_model_in(arena, *child) {
            link(arena, *child, parent, key);
        }
    }
}

/// Drop the `parent.key` edge of `value` (if it is a node).
pub(crate) fn release(arena: &mut NodeArena, parent: NodeId, key: &Key, value: &Value) {
    if let Value::Node(child) = value {
        unlink(arena, *child, parent, key);
    }
}

/// Rename the `parent.[from]` edge of `value` to `parent.[to]`.
pub(crate) fn relabel(arena: &mut NodeArena, parent: NodeId, value: &Value, from: usize, to: usize) {
    let Value::Node(child) = value else { return };
    if let Some(entry) = arena.get_mut(child.0) {
        if let Some(link) = entry
            .parents
            .iter_mut()
            .find(|l| l.parent == parent && l.key == Key::Index(from))
        {
            link.key = Key::Index(to);
        }
    }
}
