#![forbid(unsafe_code)]

//! The context handed to component hooks.
//!
//! A [`Cx`] borrows the [`Runtime`] mutably for the duration of one hook and
//! knows two hosts: the *host* whose hook is running (or which is rendering
//! slot content) and the *owner* whose template declared the content. They
//! differ only while slot content is rendered; watchers and refs created
//! then are recorded in the related ledger so they die with either side.

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::warn;
use weave_core::{DispatchMode, Graph, Key, NodeId, Value, WatchHandle};
use weave_dom::{Document, DomId};

use crate::config::RuntimeConfig;
use crate::diagnostics::Diagnostics;
use crate::error::RuntimeError;
use crate::host::{Child, HostId, HostState, Mount, Slot};
use crate::runtime::{Mailbox, Runtime};

/// Hook context.
pub struct Cx<'rt> {
    rt: &'rt mut Runtime,
    host: HostId,
    owner: HostId,
    attrs: NodeId,
}

impl std::fmt::Debug for Cx<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cx")
            .field("host", &self.host)
            .field("owner", &self.owner)
            .field("attrs", &self.attrs)
            .finish()
    }
}

impl<'rt> Cx<'rt> {
    pub(crate) fn new(rt: &'rt mut Runtime, host: HostId, owner: HostId, attrs: NodeId) -> Self {
        Self {
            rt,
            host,
            owner,
            attrs,
        }
    }

    /// Host whose hook is running.
    #[must_use]
    pub fn host(&self) -> HostId {
        self.host
    }

    /// Host whose template declared the content being rendered.
    #[must_use]
    pub fn owner(&self) -> HostId {
        self.owner
    }

    /// The view-model graph.
    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.rt.graph
    }

    /// The document.
    #[must_use]
    pub fn doc(&self) -> &Document {
        &self.rt.doc
    }

    /// The whole runtime.
    pub fn runtime(&mut self) -> &mut Runtime {
        self.rt
    }

    /// Runtime configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.rt.config
    }

    /// Shared diagnostics buffer.
    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.rt.diagnostics
    }

    /// Lifecycle state of the host.
    #[must_use]
    pub fn state(&self) -> HostState {
        self.rt.state(self.host)
    }

    /// The host's attrs view-model.
    #[must_use]
    pub fn attrs(&self) -> NodeId {
        self.attrs
    }

    /// Read one attribute.
    #[must_use]
    pub fn attr(&self, key: &str) -> Value {
        self.rt.graph.get(self.attrs, key)
    }

    // -----------------------------------------------------------------------
    // DOM
    // -----------------------------------------------------------------------

    /// New element.
    pub fn element(&self, tag: &str) -> DomId {
        self.rt.doc.create_element(tag)
    }

    /// New text node.
    pub fn text(&self, text: impl Into<String>) -> DomId {
        self.rt.doc.create_text(text)
    }

    /// New comment node.
    pub fn comment(&self, text: impl Into<String>) -> DomId {
        self.rt.doc.create_comment(text)
    }

    /// New fragment.
    pub fn fragment(&self) -> DomId {
        self.rt.doc.create_fragment()
    }

    /// Append a child's DOM nodes to `parent`.
    pub fn append(&self, parent: DomId, child: impl Into<Child>) -> Result<(), RuntimeError> {
        for node in self.rt.dom_nodes(child.into()) {
            self.rt.doc.append_child(parent, node)?;
        }
        Ok(())
    }

    /// DOM nodes of a child, flattening nested hosts.
    #[must_use]
    pub fn dom_nodes(&self, child: impl Into<Child>) -> Vec<DomId> {
        self.rt.dom_nodes(child.into())
    }

    // -----------------------------------------------------------------------
    // Children
    // -----------------------------------------------------------------------

    /// Create and render a child host.
    ///
    /// Its slots belong to this context's owner and it inherits the host's
    /// context. It finishes its render cascade once the current hook
    /// returns. If rendering fails the child is destroyed.
    pub fn mount(&mut self, mount: Mount) -> Result<HostId, RuntimeError> {
        let context = self
            .rt
            .hosts
            .get(self.host.0)
            .map(|e| e.context.clone())
            .unwrap_or_default();
        let child = self
            .rt
            .create_host(mount, Some(self.host), Some(self.owner), context)?;
        if let Some(entry) = self.rt.hosts.get_mut(self.host.0) {
            entry.pending.push(child);
        }
        if let Err(err) = self.rt.render(child) {
            self.rt.destroy(child, true);
            return Err(err);
        }
        Ok(child)
    }

    /// Destroy a child host.
    pub fn destroy_child(&mut self, child: HostId, remove_dom: bool) {
        self.rt.destroy(child, remove_dom);
    }

    /// Slot passed to this host.
    #[must_use]
    pub fn slot(&self, name: &str) -> Option<Slot> {
        self.rt.hosts.get(self.host.0)?.slots.get(name).cloned()
    }

    /// Whether a slot was passed.
    #[must_use]
    pub fn has_slot(&self, name: &str) -> bool {
        self.rt
            .hosts
            .get(self.host.0)
            .is_some_and(|e| e.slots.contains_key(name))
    }

    /// Render a named slot. A missing slot renders nothing.
    pub fn render_slot(&mut self, name: &str) -> Result<Vec<Child>, RuntimeError> {
        match self.slot(name) {
            Some(slot) => self.render_with(&slot),
            None => Ok(Vec::new()),
        }
    }

    /// Render slot content on behalf of its owner.
    pub fn render_with(&mut self, slot: &Slot) -> Result<Vec<Child>, RuntimeError> {
        let mut inner = Cx::new(&mut *self.rt, self.host, slot.owner, self.attrs);
        (slot.render)(&mut inner)
    }

    /// Root children recorded for this host.
    #[must_use]
    pub fn root_nodes(&self) -> Vec<Child> {
        self.rt.root_nodes(self.host)
    }

    /// Replace the recorded root children (after a structural update).
    pub fn set_root_nodes(&mut self, roots: Vec<Child>) {
        if let Some(entry) = self.rt.hosts.get_mut(self.host.0) {
            entry.root_nodes = roots;
        }
    }

    /// Child hosts that are not root children.
    #[must_use]
    pub fn non_root_hosts(&self) -> Vec<HostId> {
        self.rt.non_root_hosts(self.host)
    }

    /// Release the related links this host holds.
    pub fn release_related(&mut self) {
        self.rt.release_related(self.host);
    }

    // -----------------------------------------------------------------------
    // Reactivity
    // -----------------------------------------------------------------------

    /// Watch `path` under `node`.
    ///
    /// The watcher belongs to the host, or is recorded as a related listener
    /// when rendering slot content for another owner.
    pub fn watch(
        &mut self,
        node: NodeId,
        path: &str,
        mode: DispatchMode,
        handler: impl Fn(&[Key]) + 'static,
    ) -> Result<WatchHandle, RuntimeError> {
        let handle = self.rt.graph.watch(node, path, mode, handler)?;
        if self.owner == self.host {
            if let Some(entry) = self.rt.hosts.get_mut(self.host.0) {
                entry.watchers.push(handle.clone());
            }
        } else {
            self.rt
                .ledger
                .add_listener(self.owner, self.host, handle.clone());
        }
        Ok(handle)
    }

    /// Handle that queues updates for this host.
    #[must_use]
    pub fn update_trigger(&self) -> UpdateTrigger {
        UpdateTrigger {
            mailbox: Rc::downgrade(&self.rt.mailbox),
            host: self.host,
        }
    }

    /// Queue an update for this host whenever `path` under `node` changes.
    pub fn observe(&mut self, node: NodeId, path: &str) -> Result<WatchHandle, RuntimeError> {
        let trigger = self.update_trigger();
        self.watch(node, path, DispatchMode::Batched, move |changed: &[Key]| {
            trigger.request(changed);
        })
    }

    /// Keep a text node in sync with the value at `path`.
    pub fn bind_text(
        &mut self,
        target: DomId,
        node: NodeId,
        path: &str,
    ) -> Result<WatchHandle, RuntimeError> {
        let value = self.rt.graph.get_path(node, path);
        self.rt.doc.set_text(target, &value.to_text())?;
        let graph = self.rt.graph.downgrade();
        let doc = self.rt.doc.clone();
        let source: Rc<str> = Rc::from(path);
        self.watch(node, path, DispatchMode::Batched, move |_: &[Key]| {
            let Some(graph) = graph.upgrade() else {
                return;
            };
            let value = graph.get_path(node, &source);
            if let Err(err) = doc.set_text(target, &value.to_text()) {
                warn!(?target, %err, "text binding target is gone");
            }
        })
    }

    /// Create a text node bound to `path`.
    pub fn bound_text(&mut self, node: NodeId, path: &str) -> Result<DomId, RuntimeError> {
        let target = self.text("");
        self.bind_text(target, node, path)?;
        Ok(target)
    }

    /// Keep an element attribute in sync with the value at `path`.
    /// `Undefined` and `Null` remove the attribute.
    pub fn bind_dom_attr(
        &mut self,
        element: DomId,
        name: &str,
        node: NodeId,
        path: &str,
    ) -> Result<WatchHandle, RuntimeError> {
        let value = self.rt.graph.get_path(node, path);
        write_dom_attr(&self.rt.doc, element, name, &value)?;
        let graph = self.rt.graph.downgrade();
        let doc = self.rt.doc.clone();
        let source: Rc<str> = Rc::from(path);
        let name: Rc<str> = Rc::from(name);
        self.watch(node, path, DispatchMode::Batched, move |_: &[Key]| {
            let Some(graph) = graph.upgrade() else {
                return;
            };
            let value = graph.get_path(node, &source);
            if let Err(err) = write_dom_attr(&doc, element, &name, &value) {
                warn!(?element, %err, "attribute binding target is gone");
            }
        })
    }

    /// Forward the value at `path` under `node` into `target[key]`,
    /// typically a child's attrs. Forwarding is immediate so the child sees
    /// the change in the same tick.
    pub fn bind_attr(
        &mut self,
        node: NodeId,
        path: &str,
        target: NodeId,
        key: &str,
    ) -> Result<WatchHandle, RuntimeError> {
        let graph = &self.rt.graph;
        graph.set(target, key, graph.get_path(node, path))?;
        let weak = graph.downgrade();
        let source: Rc<str> = Rc::from(path);
        let key: Rc<str> = Rc::from(key);
        self.watch(node, path, DispatchMode::Immediate, move |_: &[Key]| {
            let Some(graph) = weak.upgrade() else {
                return;
            };
            let value = graph.get_path(node, &source);
            if let Err(err) = graph.set(target, Rc::clone(&key), value) {
                warn!(?target, %err, "attribute forwarding failed");
            }
        })
    }

    // -----------------------------------------------------------------------
    // Refs, context, ownership
    // -----------------------------------------------------------------------

    /// Tag a child under `name` on the owner's ref table.
    pub fn set_ref(&mut self, name: &str, child: impl Into<Child>) {
        let child = child.into();
        let name: Rc<str> = Rc::from(name);
        if let Some(entry) = self.rt.hosts.get_mut(self.owner.0) {
            entry.refs.entry(Rc::clone(&name)).or_default().push(child);
        }
        if self.owner != self.host {
            self.rt.ledger.add_ref(self.owner, self.host, name, child);
        }
    }

    /// Children tagged `name` on this host.
    #[must_use]
    pub fn refs(&self, name: &str) -> Vec<Child> {
        self.rt.refs(self.host, name)
    }

    /// Set a context value for this host and hosts it mounts afterwards.
    pub fn set_context<T: Any>(
        &mut self,
        key: &str,
        value: T,
        allow_override: bool,
    ) -> Result<(), RuntimeError> {
        self.rt.set_context(self.host, key, value, allow_override)
    }

    /// Read a context value.
    #[must_use]
    pub fn context<T: Any>(&self, key: &str) -> Option<Rc<T>> {
        self.rt.context(self.host, key)
    }

    /// Destroy `node` together with this host.
    pub fn own_node(&mut self, node: NodeId) {
        if let Some(entry) = self.rt.hosts.get_mut(self.host.0) {
            entry.owned_nodes.push(node);
        }
    }
}

fn write_dom_attr(
    doc: &Document,
    element: DomId,
    name: &str,
    value: &Value,
) -> Result<(), weave_dom::DomError> {
    match value {
        Value::Undefined | Value::Null => doc.remove_attribute(element, name).map(|_| ()),
        other => doc.set_attribute(element, name, &other.to_text()),
    }
}

/// Queues updates for one host. Holds the mailbox weakly, so a trigger
/// captured by a watcher outliving the runtime is inert.
#[derive(Clone, Debug)]
pub struct UpdateTrigger {
    mailbox: Weak<RefCell<Mailbox>>,
    host: HostId,
}

impl UpdateTrigger {
    /// Queue an update at `path`. The last queued path wins.
    pub fn request(&self, path: &[Key]) {
        if let Some(mailbox) = self.mailbox.upgrade() {
            mailbox.borrow_mut().insert(self.host, Rc::from(path));
        }
    }

    /// Target host.
    #[must_use]
    pub fn host(&self) -> HostId {
        self.host
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_binding_follows_batched_writes() {
        let mut rt = Runtime::new();
        let body = rt.doc().create_element("body");
        let model = rt.graph().vm_object([("name", "ann")]);
        rt.mount_root(
            Mount::from_fn(move |cx: &mut Cx<'_>| {
                let p = cx.element("p");
                let t = cx.bound_text(model, "name")?;
                cx.append(p, t)?;
                Ok(vec![Child::Dom(p)])
            }),
            body,
        )
        .unwrap();
        assert_eq!(rt.doc().inner_html(body), "<p>ann</p>");
        rt.graph().set(model, "name", "bo").unwrap();
        assert_eq!(rt.doc().inner_html(body), "<p>ann</p>");
        rt.tick().unwrap();
        assert_eq!(rt.doc().inner_html(body), "<p>bo</p>");
    }

    #[test]
    fn dom_attr_binding_removes_on_null() {
        let mut rt = Runtime::new();
        let body = rt.doc().create_element("body");
        let model = rt.graph().vm_object([("cls", Value::from("on"))]);
        let host = rt
            .mount_root(
                Mount::from_fn(move |cx: &mut Cx<'_>| {
                    let el = cx.element("i");
                    cx.bind_dom_attr(el, "class", model, "cls")?;
                    cx.set_ref("icon", el);
                    Ok(vec![Child::Dom(el)])
                }),
                body,
            )
            .unwrap();
        let Some(Child::Dom(el)) = rt.refs(host, "icon").first().copied() else {
            panic!("ref missing");
        };
        assert_eq!(rt.doc().attribute(el, "class").as_deref(), Some("on"));
        rt.graph().set(model, "cls", Value::Null).unwrap();
        rt.tick().unwrap();
        assert_eq!(rt.doc().attribute(el, "class"), None);
    }

    #[test]
    fn observe_posts_one_update_per_host() {
        let mut rt = Runtime::new();
        let body = rt.doc().create_element("body");
        let model = rt.graph().vm_object([("a", 0), ("b", 0)]);
        rt.mount_root(
            Mount::from_fn(move |cx: &mut Cx<'_>| {
                cx.observe(model, "a")?;
                cx.observe(model, "b")?;
                Ok(vec![Child::Dom(cx.comment(""))])
            }),
            body,
        )
        .unwrap();
        rt.graph().set(model, "a", 1).unwrap();
        rt.graph().set(model, "b", 1).unwrap();
        rt.graph().flush();
        assert_eq!(rt.pending_updates(), 1);
    }

    #[test]
    fn trigger_outliving_runtime_is_inert() {
        let trigger = {
            let mut rt = Runtime::new();
            let host = rt
                .create_root(Mount::from_fn(|cx: &mut Cx<'_>| {
                    Ok(vec![Child::Dom(cx.comment(""))])
                }))
                .unwrap();
            let attrs = rt.attrs(host).unwrap();
            let cx = Cx::new(&mut rt, host, host, attrs);
            cx.update_trigger()
        };
        trigger.request(&[Key::from("x")]);
    }
}
