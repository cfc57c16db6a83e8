#![forbid(unsafe_code)]

//! Component hosts: the per-instance record the runtime keeps for every
//! mounted component.
//!
//! # State machine
//!
//! ```text
//! Initializing --render()--> Rendered --update()*--> Rendered
//!     --destroy()--> WillDestroy --(teardown)--> Destroyed
//! ```
//!
//! Transitions are monotonic. A freed host slot reads as `Destroyed`.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;
use weave_core::arena::RawHandle;
use weave_core::{Key, NodeId, WatchHandle};
use weave_dom::DomId;

use crate::context::Context;
use crate::cx::Cx;
use crate::error::RuntimeError;

/// Handle to a component host.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(pub(crate) RawHandle);

impl fmt::Debug for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Host({:?})", self.0)
    }
}

/// Lifecycle state of a host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HostState {
    /// Created, not yet rendered (or rendered, children still settling).
    Initializing,
    /// Mounted; accepts updates.
    Rendered,
    /// Teardown in progress.
    WillDestroy,
    /// Gone.
    Destroyed,
}

/// A rendered child: a DOM node or a nested host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Child {
    /// Platform node.
    Dom(DomId),
    /// Nested component.
    Host(HostId),
}

impl From<DomId> for Child {
    fn from(id: DomId) -> Self {
        Self::Dom(id)
    }
}

impl From<HostId> for Child {
    fn from(id: HostId) -> Self {
        Self::Host(id)
    }
}

/// Render function handed over by the template layer.
pub type RenderFn = Rc<dyn Fn(&mut Cx<'_>) -> Result<Vec<Child>, RuntimeError>>;

/// Content passed into a component, with the host whose template declared
/// it. Watchers and refs created while rendering it belong to `owner`.
#[derive(Clone)]
pub struct Slot {
    /// Renders the content.
    pub render: RenderFn,
    /// Logical template owner.
    pub owner: HostId,
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

/// Component behavior. Only `render` is required.
pub trait Component: 'static {
    /// Produce the root children. Must return at least one.
    fn render(&mut self, cx: &mut Cx<'_>) -> Result<Vec<Child>, RuntimeError>;

    /// Runs once, after every child host has rendered.
    fn after_render(&mut self, _cx: &mut Cx<'_>) {}

    /// Re-render in response to an observed change at `path`. May be called
    /// when nothing relevant changed.
    fn update(&mut self, _cx: &mut Cx<'_>, _path: &[Key]) -> Result<(), RuntimeError> {
        Ok(())
    }

    /// Runs at the start of teardown, before children are destroyed.
    fn before_destroy(&mut self, _cx: &mut Cx<'_>) {}

    /// Name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

struct FnComponent<F>(F);

impl<F> Component for FnComponent<F>
where
    F: FnMut(&mut Cx<'_>) -> Result<Vec<Child>, RuntimeError> + 'static,
{
    fn render(&mut self, cx: &mut Cx<'_>) -> Result<Vec<Child>, RuntimeError> {
        (self.0)(cx)
    }

    fn name(&self) -> &'static str {
        "fn"
    }
}

/// Everything needed to instantiate a host.
pub struct Mount {
    pub(crate) component: Box<dyn Component>,
    pub(crate) attrs: Option<NodeId>,
    pub(crate) slots: Vec<(Rc<str>, RenderFn)>,
}

impl fmt::Debug for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mount")
            .field("component", &self.component.name())
            .field("attrs", &self.attrs)
            .field("slots", &self.slots.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .finish()
    }
}

impl Mount {
    /// Mount a component.
    pub fn new(component: impl Component) -> Self {
        Self {
            component: Box::new(component),
            attrs: None,
            slots: Vec::new(),
        }
    }

    /// Mount a render-only component.
    pub fn from_fn<F>(render: F) -> Self
    where
        F: FnMut(&mut Cx<'_>) -> Result<Vec<Child>, RuntimeError> + 'static,
    {
        Self::new(FnComponent(render))
    }

    /// Attrs view-model. It must be tracked; the host destroys it on teardown.
    /// Without one the host gets an empty attrs object.
    #[must_use]
    pub fn attrs(mut self, attrs: NodeId) -> Self {
        self.attrs = Some(attrs);
        self
    }

    /// Pass slot content.
    #[must_use]
    pub fn slot<F>(mut self, name: &str, render: F) -> Self
    where
        F: Fn(&mut Cx<'_>) -> Result<Vec<Child>, RuntimeError> + 'static,
    {
        self.slots.push((Rc::from(name), Rc::new(render)));
        self
    }

    /// Pass already shared slot content.
    #[must_use]
    pub fn slot_fn(mut self, name: &str, render: RenderFn) -> Self {
        self.slots.push((Rc::from(name), render));
        self
    }
}

pub(crate) struct HostEntry {
    pub(crate) component: Option<Box<dyn Component>>,
    pub(crate) name: &'static str,
    pub(crate) state: HostState,
    pub(crate) rendered: bool,
    pub(crate) parent: Option<HostId>,
    pub(crate) attrs: NodeId,
    pub(crate) context: Context,
    pub(crate) slots: IndexMap<Rc<str>, Slot, ahash::RandomState>,
    pub(crate) root_nodes: Vec<Child>,
    pub(crate) non_root: Vec<HostId>,
    /// Hosts mounted during the current render or update, not yet classified.
    pub(crate) pending: Vec<HostId>,
    pub(crate) refs: IndexMap<Rc<str>, SmallVec<[Child; 1]>, ahash::RandomState>,
    pub(crate) watchers: Vec<WatchHandle>,
    pub(crate) owned_nodes: Vec<NodeId>,
}

impl HostEntry {
    pub(crate) fn new(
        component: Box<dyn Component>,
        parent: Option<HostId>,
        attrs: NodeId,
        context: Context,
    ) -> Self {
        let name = component.name();
        Self {
            component: Some(component),
            name,
            state: HostState::Initializing,
            rendered: false,
            parent,
            attrs,
            context,
            slots: IndexMap::default(),
            root_nodes: Vec::new(),
            non_root: Vec::new(),
            pending: Vec::new(),
            refs: IndexMap::default(),
            watchers: Vec::new(),
            owned_nodes: Vec::new(),
        }
    }

    pub(crate) fn child_hosts(&self) -> impl Iterator<Item = HostId> + '_ {
        self.root_nodes.iter().filter_map(|c| match c {
            Child::Host(h) => Some(*h),
            Child::Dom(_) => None,
        })
    }
}
