#![forbid(unsafe_code)]

//! The component runtime.
//!
//! [`Runtime`] owns the view-model [`Graph`], the [`Document`], the host
//! arena and the [`RelatedLedger`]. Components run inside hooks that borrow
//! the runtime mutably through a [`Cx`]; the component is taken out of its
//! slot for the duration of the hook, so a hook can mount, update or destroy
//! other hosts freely.
//!
//! Observed changes do not call `update` directly. Watchers post
//! `(host, path)` into an update mailbox (one entry per host, last path
//! wins) and [`Runtime::tick`] alternates scheduler flushes with mailbox
//! drains until both are idle.
//!
//! # Invariants
//!
//! 1. `render` runs at most once per host.
//! 2. A host's `after_render` hook runs after every child host it mounted
//!    has finished its own cascade.
//! 3. `update` runs only on hosts in `Rendered`.
//! 4. After `destroy` returns, nothing the host owned or held can fire:
//!    owned watchers are unwatched, related links released, its attrs and
//!    owned nodes destroyed, and its mailbox entry dropped.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Update for destroyed host | Late mailbox entry | Skipped, `trace!` |
//! | Destroy twice | Teardown races | Second call is a no-op |
//! | Render fails while mounting a child | Component bug | Child destroyed, error returned |
//! | Update keeps requesting updates | Feedback loop | `tick` stops after `max_tick_rounds`, `warn!` |

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, debug_span, trace, warn};
use weave_core::arena::Arena;
use weave_core::{Graph, GraphError, Key, NodeId, Value};
use weave_dom::{Document, DomId};

use crate::config::RuntimeConfig;
use crate::context::{Context, Insert};
use crate::cx::Cx;
use crate::diagnostics::Diagnostics;
use crate::error::RuntimeError;
use crate::host::{Child, Component, HostEntry, HostId, HostState, Mount, Slot};
use crate::ledger::{Link, RelatedLedger};

pub(crate) type Mailbox = IndexMap<HostId, Rc<[Key]>, ahash::RandomState>;

/// Owner of every host, the graph and the document.
pub struct Runtime {
    pub(crate) graph: Graph,
    pub(crate) doc: Document,
    pub(crate) hosts: Arena<HostEntry>,
    pub(crate) ledger: RelatedLedger,
    pub(crate) mailbox: Rc<RefCell<Mailbox>>,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) config: RuntimeConfig,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("hosts", &self.hosts.len())
            .field("graph", &self.graph)
            .field("doc", &self.doc)
            .field("ledger", &self.ledger.len())
            .field("pending_updates", &self.pending_updates())
            .finish()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Runtime with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Runtime with `config`.
    #[must_use]
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            graph: Graph::with_config(config.graph.clone()),
            doc: Document::new(),
            hosts: Arena::with_limit(config.max_hosts),
            ledger: RelatedLedger::new(),
            mailbox: Rc::new(RefCell::new(Mailbox::default())),
            diagnostics: Diagnostics::new(),
            config,
        }
    }

    /// The view-model graph.
    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The document.
    #[must_use]
    pub fn doc(&self) -> &Document {
        &self.doc
    }

    /// Configuration in effect.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Diagnostics reported while rendering.
    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Related listener and ref links.
    #[must_use]
    pub fn ledger(&self) -> &RelatedLedger {
        &self.ledger
    }

    // -----------------------------------------------------------------------
    // Creation and rendering
    // -----------------------------------------------------------------------

    pub(crate) fn create_host(
        &mut self,
        mount: Mount,
        parent: Option<HostId>,
        slot_owner: Option<HostId>,
        context: Context,
    ) -> Result<HostId, RuntimeError> {
        let Mount {
            component,
            attrs,
            slots,
        } = mount;
        let mount_attrs_owned = attrs.is_none();
        let attrs = match attrs {
            Some(node) if self.graph.is_view_model(&Value::Node(node)) => node,
            Some(node) => return Err(GraphError::Untracked { node }.into()),
            None => self.graph.attrs(std::iter::empty::<(&str, Value)>())?,
        };
        let id = match self
            .hosts
            .try_insert(HostEntry::new(component, parent, attrs, context))
        {
            Ok(handle) => HostId(handle),
            Err(full) => {
                if mount_attrs_owned {
                    self.graph.destroy(attrs);
                }
                return Err(full.into());
            }
        };
        let owner = slot_owner.unwrap_or(id);
        if let Some(entry) = self.hosts.get_mut(id.0) {
            entry.slots = slots
                .into_iter()
                .map(|(name, render)| (name, Slot { render, owner }))
                .collect();
            debug!(host = ?id, component = entry.name, ?parent, "host created");
        }
        Ok(id)
    }

    /// Create a parentless host without rendering it.
    pub fn create_root(&mut self, mount: Mount) -> Result<HostId, RuntimeError> {
        self.create_host(mount, None, None, Context::new())
    }

    /// Create, render and append a root host to `container`, then run the
    /// after-render cascade. On failure the host is destroyed.
    pub fn mount_root(&mut self, mount: Mount, container: DomId) -> Result<HostId, RuntimeError> {
        let host = self.create_root(mount)?;
        if let Err(err) = self.attach(host, container) {
            self.destroy(host, true);
            return Err(err);
        }
        Ok(host)
    }

    fn attach(&mut self, host: HostId, container: DomId) -> Result<(), RuntimeError> {
        self.render(host)?;
        for node in self.dom_nodes(Child::Host(host)) {
            self.doc.append_child(container, node)?;
        }
        self.after_render(host);
        Ok(())
    }

    /// Run the host's render function once and record its root children.
    pub fn render(&mut self, host: HostId) -> Result<Vec<Child>, RuntimeError> {
        let entry = self
            .hosts
            .get_mut(host.0)
            .ok_or(RuntimeError::HostNotFound { host })?;
        if entry.rendered {
            return Err(RuntimeError::AlreadyRendered { host });
        }
        entry.rendered = true;
        let children = self
            .with_component(host, |component, cx| component.render(cx))
            .unwrap_or_else(|| Ok(Vec::new()))?;
        if children.is_empty() {
            return Err(RuntimeError::EmptyRender { host });
        }
        let entry = self
            .hosts
            .get_mut(host.0)
            .ok_or(RuntimeError::HostNotFound { host })?;
        entry.root_nodes.clone_from(&children);
        self.classify_pending(host);
        trace!(?host, roots = children.len(), "render returned");
        Ok(children)
    }

    /// Finish the render cascade: children first (non-root, then root
    /// hosts), then this host's `after_render` hook, then `Rendered`.
    pub fn after_render(&mut self, host: HostId) {
        let children: Vec<HostId> = match self.hosts.get(host.0) {
            Some(entry) if entry.rendered && entry.state == HostState::Initializing => entry
                .non_root
                .iter()
                .copied()
                .chain(entry.child_hosts())
                .collect(),
            _ => return,
        };
        for child in children {
            self.after_render(child);
        }
        self.with_component(host, |component, cx| component.after_render(cx));
        if let Some(entry) = self.hosts.get_mut(host.0) {
            if entry.state == HostState::Initializing {
                entry.state = HostState::Rendered;
                debug!(?host, component = entry.name, "host rendered");
            }
        }
        self.finalize_pending(host);
    }

    fn classify_pending(&mut self, host: HostId) -> Vec<HostId> {
        let Some(entry) = self.hosts.get_mut(host.0) else {
            return Vec::new();
        };
        let pending = std::mem::take(&mut entry.pending);
        let alive: Vec<HostId> = pending
            .into_iter()
            .filter(|child| self.hosts.contains(child.0))
            .collect();
        let Some(entry) = self.hosts.get_mut(host.0) else {
            return Vec::new();
        };
        for child in &alive {
            if !entry.root_nodes.contains(&Child::Host(*child)) && !entry.non_root.contains(child) {
                entry.non_root.push(*child);
            }
        }
        alive
    }

    fn finalize_pending(&mut self, host: HostId) {
        for child in self.classify_pending(host) {
            self.after_render(child);
        }
    }

    pub(crate) fn with_component<R>(
        &mut self,
        host: HostId,
        f: impl FnOnce(&mut dyn Component, &mut Cx<'_>) -> R,
    ) -> Option<R> {
        let entry = self.hosts.get_mut(host.0)?;
        let attrs = entry.attrs;
        let mut component = entry.component.take()?;
        let result = {
            let mut cx = Cx::new(self, host, host, attrs);
            f(component.as_mut(), &mut cx)
        };
        if let Some(entry) = self.hosts.get_mut(host.0) {
            entry.component = Some(component);
        }
        Some(result)
    }

    // -----------------------------------------------------------------------
    // Updates
    // -----------------------------------------------------------------------

    /// Run `update` on a rendered host. Hosts it mounts are classified and
    /// finish their render cascade when it returns.
    pub fn update(&mut self, host: HostId, path: &[Key]) -> Result<(), RuntimeError> {
        match self.hosts.get(host.0).map(|e| e.state) {
            Some(HostState::Rendered) => {}
            state => {
                trace!(?host, ?state, "update skipped");
                return Ok(());
            }
        }
        let result = self
            .with_component(host, |component, cx| component.update(cx, path))
            .unwrap_or(Ok(()));
        self.finalize_pending(host);
        result
    }

    /// Queue an update for `host`, replacing any queued path.
    pub fn request_update(&mut self, host: HostId, path: &[Key]) {
        self.mailbox.borrow_mut().insert(host, Rc::from(path));
    }

    /// Number of hosts with a queued update.
    #[must_use]
    pub fn pending_updates(&self) -> usize {
        self.mailbox.borrow().len()
    }

    /// Alternate scheduler flushes and update drains until idle or
    /// `max_tick_rounds`. Returns how many handlers and updates ran.
    ///
    /// A failing update does not stop the others; the first error is
    /// returned once the tick settles.
    pub fn tick(&mut self) -> Result<usize, RuntimeError> {
        let mut total = 0;
        let mut first_error = None;
        for _ in 0..self.config.max_tick_rounds {
            let flushed = self.graph.flush();
            let updated = self.drain_updates(&mut first_error);
            total += flushed + updated;
            if self.is_idle() {
                break;
            }
        }
        if !self.is_idle() {
            warn!(
                pending_handlers = self.graph.pending(),
                pending_updates = self.pending_updates(),
                max_tick_rounds = self.config.max_tick_rounds,
                "runtime still busy after round limit"
            );
        }
        first_error.map_or(Ok(total), Err)
    }

    fn is_idle(&self) -> bool {
        self.graph.pending() == 0 && self.mailbox.borrow().is_empty()
    }

    fn drain_updates(&mut self, first_error: &mut Option<RuntimeError>) -> usize {
        let batch = std::mem::take(&mut *self.mailbox.borrow_mut());
        let count = batch.len();
        for (host, path) in batch {
            if let Err(err) = self.update(host, &path) {
                warn!(?host, %err, "update failed");
                first_error.get_or_insert(err);
            }
        }
        count
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Tear a host down. Idempotent.
    ///
    /// Order: mark `WillDestroy` and silence the attrs; run `before_destroy`;
    /// destroy non-root then root child hosts (without DOM removal); unwatch
    /// owned watchers; release related links; dispose DOM if `remove_dom`;
    /// destroy attrs and owned nodes; free the slot.
    pub fn destroy(&mut self, host: HostId, remove_dom: bool) {
        let Some(entry) = self.hosts.get_mut(host.0) else {
            trace!(?host, "destroy of missing host ignored");
            return;
        };
        if entry.state >= HostState::WillDestroy {
            return;
        }
        let span = debug_span!("destroy", ?host, component = entry.name);
        let _enter = span.enter();
        entry.state = HostState::WillDestroy;
        self.graph.set_notifiable(entry.attrs, false);
        let dom = if remove_dom {
            self.subtree_dom(host)
        } else {
            Vec::new()
        };

        self.with_component(host, |component, cx| component.before_destroy(cx));

        let Some(entry) = self.hosts.get_mut(host.0) else {
            return;
        };
        let children: Vec<HostId> = std::mem::take(&mut entry.non_root)
            .into_iter()
            .chain(std::mem::take(&mut entry.pending))
            .chain(entry.child_hosts().collect::<Vec<_>>())
            .collect();
        for child in children {
            self.destroy(child, false);
        }

        let Some(entry) = self.hosts.get_mut(host.0) else {
            return;
        };
        for handle in std::mem::take(&mut entry.watchers) {
            self.graph.unwatch_handle(&handle);
        }

        let links = self.ledger.take_for_host(host);
        self.release_links(links);

        // Child hosts kept their DOM; it lives inside these subtrees.
        for node in dom {
            if self.doc.contains(node) {
                self.doc.dispose(node);
            } else {
                trace!(?node, "dom node already gone");
            }
        }

        let Some(entry) = self.hosts.remove(host.0) else {
            return;
        };
        self.graph.destroy(entry.attrs);
        for node in entry.owned_nodes {
            self.graph.destroy(node);
        }
        self.mailbox.borrow_mut().shift_remove(&host);
        if let Some(parent) = entry.parent.and_then(|p| self.hosts.get_mut(p.0)) {
            parent.root_nodes.retain(|c| *c != Child::Host(host));
            parent.non_root.retain(|c| *c != host);
            parent.pending.retain(|c| *c != host);
        }
        debug!(?host, "host destroyed");
    }

    /// Release the related links `holder` holds (branch teardown).
    pub fn release_related(&mut self, holder: HostId) {
        let links = self.ledger.take_held_by(holder);
        self.release_links(links);
    }

    fn release_links(&mut self, links: Vec<Link>) {
        for link in links {
            match link {
                Link::Listener { handle, .. } => {
                    self.graph.unwatch_handle(&handle);
                }
                Link::Ref {
                    owner, name, child, ..
                } => {
                    let Some(entry) = self.hosts.get_mut(owner.0) else {
                        continue;
                    };
                    if let Some(list) = entry.refs.get_mut(&name) {
                        list.retain(|c| *c != child);
                        if list.is_empty() {
                            entry.refs.shift_remove(&name);
                        }
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Context
    // -----------------------------------------------------------------------

    /// Set a context value on a host that has not finished rendering.
    pub fn set_context<T: Any>(
        &mut self,
        host: HostId,
        key: &str,
        value: T,
        allow_override: bool,
    ) -> Result<(), RuntimeError> {
        let entry = self
            .hosts
            .get_mut(host.0)
            .ok_or(RuntimeError::HostNotFound { host })?;
        if entry.state != HostState::Initializing {
            return Err(RuntimeError::ContextFrozen {
                host,
                key: key.to_owned(),
            });
        }
        match entry.context.insert(Rc::from(key), Rc::new(value), allow_override) {
            Insert::Refused => Err(RuntimeError::ContextKeyExists {
                host,
                key: key.to_owned(),
            }),
            Insert::Added | Insert::Replaced => Ok(()),
        }
    }

    /// Read a context value visible to `host`.
    #[must_use]
    pub fn context<T: Any>(&self, host: HostId, key: &str) -> Option<Rc<T>> {
        self.hosts.get(host.0)?.context.get(key)
    }

    /// The host's context map.
    #[must_use]
    pub fn context_map(&self, host: HostId) -> Option<Context> {
        self.hosts.get(host.0).map(|e| e.context.clone())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Lifecycle state. Freed hosts read as `Destroyed`.
    #[must_use]
    pub fn state(&self, host: HostId) -> HostState {
        self.hosts
            .get(host.0)
            .map_or(HostState::Destroyed, |e| e.state)
    }

    /// Whether `host` is live.
    #[must_use]
    pub fn contains(&self, host: HostId) -> bool {
        self.hosts.contains(host.0)
    }

    /// Parent host.
    #[must_use]
    pub fn parent(&self, host: HostId) -> Option<HostId> {
        self.hosts.get(host.0)?.parent
    }

    /// Attrs view-model of `host`.
    #[must_use]
    pub fn attrs(&self, host: HostId) -> Option<NodeId> {
        self.hosts.get(host.0).map(|e| e.attrs)
    }

    /// Root children.
    #[must_use]
    pub fn root_nodes(&self, host: HostId) -> Vec<Child> {
        self.hosts
            .get(host.0)
            .map(|e| e.root_nodes.clone())
            .unwrap_or_default()
    }

    /// Hosts mounted during render that are not root children.
    #[must_use]
    pub fn non_root_hosts(&self, host: HostId) -> Vec<HostId> {
        self.hosts
            .get(host.0)
            .map(|e| e.non_root.clone())
            .unwrap_or_default()
    }

    /// Children tagged `name` on `host`.
    #[must_use]
    pub fn refs(&self, host: HostId, name: &str) -> Vec<Child> {
        self.hosts
            .get(host.0)
            .and_then(|e| e.refs.get(name))
            .map(|list| list.to_vec())
            .unwrap_or_default()
    }

    /// Number of watchers `host` owns directly.
    #[must_use]
    pub fn owned_watchers(&self, host: HostId) -> usize {
        self.hosts.get(host.0).map_or(0, |e| e.watchers.len())
    }

    /// DOM nodes of a child, flattening nested hosts.
    #[must_use]
    pub fn dom_nodes(&self, child: Child) -> Vec<DomId> {
        let mut out = Vec::new();
        self.collect_dom(child, &mut out);
        out
    }

    fn collect_dom(&self, child: Child, out: &mut Vec<DomId>) {
        match child {
            Child::Dom(node) => out.push(node),
            Child::Host(host) => {
                if let Some(entry) = self.hosts.get(host.0) {
                    for root in &entry.root_nodes {
                        self.collect_dom(*root, out);
                    }
                }
            }
        }
    }

    /// DOM roots of `host` and of every host below it, including non-root
    /// hosts whose DOM may sit outside the parent's nodes.
    fn subtree_dom(&self, host: HostId) -> Vec<DomId> {
        let mut out = Vec::new();
        let mut stack = vec![host];
        while let Some(current) = stack.pop() {
            let Some(entry) = self.hosts.get(current.0) else {
                continue;
            };
            out.extend(entry.root_nodes.iter().filter_map(|c| match c {
                Child::Dom(node) => Some(*node),
                Child::Host(_) => None,
            }));
            stack.extend(entry.child_hosts());
            stack.extend(entry.non_root.iter().copied());
            stack.extend(entry.pending.iter().copied());
        }
        out
    }

    /// Number of live hosts.
    #[must_use]
    pub fn live_hosts(&self) -> usize {
        self.hosts.len()
    }
}
