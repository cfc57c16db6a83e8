#![forbid(unsafe_code)]

//! Keyed list rendering.
//!
//! # Invariants
//!
//! 1. After an update the item hosts appear in the DOM in data order.
//! 2. An item whose key survives keeps its host (and its DOM nodes).
//! 3. Every item's attrs hold the current `each`, `index`, `isFirst` and
//!    `isLast`.
//! 4. An empty list leaves exactly one placeholder comment.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Duplicate key | Data repeats a key | Later occurrence recreated, diagnostic reported |
//! | Loop is not an array | Bad attrs | Treated as empty |
//! | List not attached | Update before insertion | `RuntimeError::Unmounted` |

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, debug_span};
use weave_core::{DispatchMode, Graph, Identity, Key, NodeId, Value};
use weave_dom::DomId;

use super::placeholder;
use crate::cx::Cx;
use crate::diagnostics::Diagnostic;
use crate::error::RuntimeError;
use crate::host::{Child, Component, HostId, Mount, Slot};
use crate::reconcile::{self, Edit, EditScript, InsertAt, Placement, Side};

/// Derives an item key from the graph and the item value.
pub type KeyFn = Rc<dyn Fn(&Graph, &Value) -> Identity>;

/// How list items are identified across updates.
#[derive(Clone, Default)]
pub enum KeyMode {
    /// Position is identity; hosts are reused in place.
    #[default]
    Index,
    /// The item value itself (node handle or primitive).
    Each,
    /// A key derived from the item.
    Derived(KeyFn),
}

impl fmt::Debug for KeyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index => f.write_str("Index"),
            Self::Each => f.write_str("Each"),
            Self::Derived(_) => f.write_str("Derived(..)"),
        }
    }
}

impl KeyMode {
    /// Key by a property of each item, e.g. `id`.
    pub fn property(name: &str) -> Self {
        let name: Rc<str> = Rc::from(name);
        Self::Derived(Rc::new(move |graph: &Graph, value: &Value| match value {
            Value::Node(node) => graph.get(*node, Rc::clone(&name)).identity(),
            other => other.identity(),
        }))
    }
}

/// What the loop watcher saw since the last update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum ListChange {
    #[default]
    None,
    /// One item slot was assigned.
    Replaced(usize),
    /// Something inside one item changed.
    Inner(usize),
    /// Anything else.
    Full,
}

impl ListChange {
    /// Classify a path relative to the attrs (`loop`, index, ...).
    fn from_path(path: &[Key]) -> Self {
        match path {
            [_, key] => key.as_index().map_or(Self::Full, Self::Replaced),
            [_, key, _, ..] => key.as_index().map_or(Self::Full, Self::Inner),
            _ => Self::Full,
        }
    }

    fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Self::None, next) => next,
            (current, Self::None) => current,
            (a, b) if a == b => a,
            _ => Self::Full,
        }
    }
}

struct Item {
    host: HostId,
    attrs: NodeId,
    key: Identity,
}

/// Renders the `default` slot once per entry of the `loop` attribute.
///
/// Each item host gets its own attrs with `each`, `index`, `isFirst` and
/// `isLast`.
pub struct For {
    mode: KeyMode,
    slot: Option<Slot>,
    items: Vec<Item>,
    placeholder: Option<DomId>,
    change: Rc<Cell<ListChange>>,
}

impl fmt::Debug for For {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("For")
            .field("mode", &self.mode)
            .field("items", &self.items.len())
            .field("placeholder", &self.placeholder)
            .finish_non_exhaustive()
    }
}

impl Default for For {
    fn default() -> Self {
        Self::new(KeyMode::Index)
    }
}

impl For {
    /// Attribute holding the array.
    pub const LOOP: &'static str = "loop";
    /// Slot rendered per item.
    pub const DEFAULT: &'static str = "default";
    /// Item attribute: the value.
    pub const EACH: &'static str = "each";
    /// Item attribute: position.
    pub const INDEX: &'static str = "index";
    /// Item attribute: first position.
    pub const IS_FIRST: &'static str = "isFirst";
    /// Item attribute: last position.
    pub const IS_LAST: &'static str = "isLast";

    /// List keyed by `mode`.
    #[must_use]
    pub fn new(mode: KeyMode) -> Self {
        Self {
            mode,
            slot: None,
            items: Vec::new(),
            placeholder: None,
            change: Rc::new(Cell::new(ListChange::None)),
        }
    }

    fn values(cx: &Cx<'_>) -> Vec<Value> {
        match cx.attr(Self::LOOP) {
            Value::Node(arr) if cx.graph().is_array(arr) => cx.graph().values(arr),
            _ => Vec::new(),
        }
    }

    fn key_of(&self, graph: &Graph, index: usize, value: &Value) -> Identity {
        match &self.mode {
            KeyMode::Index => Value::from(index).identity(),
            KeyMode::Each => value.identity(),
            KeyMode::Derived(key) => key(graph, value),
        }
    }

    fn keys(&self, graph: &Graph, values: &[Value]) -> Vec<Identity> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| self.key_of(graph, i, v))
            .collect()
    }

    fn create_item(
        &self,
        cx: &mut Cx<'_>,
        index: usize,
        value: &Value,
        len: usize,
        key: Identity,
    ) -> Result<Item, RuntimeError> {
        let attrs = cx.graph().attrs([
            (Self::EACH, value.clone()),
            (Self::INDEX, Value::from(index)),
            (Self::IS_FIRST, Value::from(index == 0)),
            (Self::IS_LAST, Value::from(index + 1 == len)),
        ])?;
        let host = cx.mount(
            Mount::new(ForItem {
                slot: self.slot.clone(),
            })
            .attrs(attrs),
        )?;
        Ok(Item { host, attrs, key })
    }

    fn report_duplicates(
        cx: &Cx<'_>,
        script: &EditScript,
        old_keys: &[Identity],
        new_keys: &[Identity],
    ) {
        if !cx.config().report_duplicate_keys {
            return;
        }
        for dup in &script.duplicates {
            let keys = match dup.side {
                Side::Old => old_keys,
                Side::New => new_keys,
            };
            cx.diagnostics().report(Diagnostic::DuplicateKey {
                host: cx.host(),
                key: format!("{:?}", keys[dup.first]),
                first: dup.first,
                duplicate: dup.duplicate,
            });
        }
    }

    fn first_dom(cx: &Cx<'_>, item: &Item) -> Option<DomId> {
        cx.dom_nodes(item.host).first().copied()
    }

    fn roots(&mut self, cx: &Cx<'_>) -> Vec<Child> {
        if self.items.is_empty() {
            let marker = *self.placeholder.get_or_insert_with(|| placeholder(cx));
            vec![Child::Dom(marker)]
        } else {
            self.items.iter().map(|item| Child::Host(item.host)).collect()
        }
    }

    fn reconcile(&mut self, cx: &mut Cx<'_>) -> Result<(), RuntimeError> {
        let span = debug_span!("reconcile", host = ?cx.host());
        let _enter = span.enter();

        let values = Self::values(cx);
        let new_keys = self.keys(cx.graph(), &values);
        let old_keys: Vec<Identity> = self.items.iter().map(|item| item.key.clone()).collect();
        let script = match self.mode {
            KeyMode::Index => reconcile::plan_by_index(old_keys.len(), new_keys.len()),
            _ => reconcile::plan(&old_keys, &new_keys),
        };
        Self::report_duplicates(cx, &script, &old_keys, &new_keys);

        match (self.items.is_empty(), values.is_empty()) {
            (true, true) => return Ok(()),
            (true, false) => self.fill_from_empty(cx, &values, &new_keys)?,
            (false, true) => self.clear(cx)?,
            (false, false) => self.apply(cx, &script, &values, &new_keys)?,
        }

        for (index, (item, value)) in self.items.iter_mut().zip(&values).enumerate() {
            let graph = cx.graph();
            graph.set(item.attrs, Self::EACH, value.clone())?;
            graph.set(item.attrs, Self::INDEX, index)?;
            graph.set(item.attrs, Self::IS_FIRST, index == 0)?;
            graph.set(item.attrs, Self::IS_LAST, index + 1 == values.len())?;
            item.key = new_keys[index].clone();
        }
        let roots = self.roots(cx);
        cx.set_root_nodes(roots);
        debug!(
            items = self.items.len(),
            creates = script.creates(),
            moves = script.moves(),
            destroys = script.destroys(),
            keeps = script.keeps(),
            "list reconciled"
        );
        Ok(())
    }

    fn fill_from_empty(
        &mut self,
        cx: &mut Cx<'_>,
        values: &[Value],
        keys: &[Identity],
    ) -> Result<(), RuntimeError> {
        let Some(anchor) = self.placeholder else {
            return Err(RuntimeError::Unmounted { host: cx.host() });
        };
        let Some(parent) = cx.doc().parent(anchor) else {
            return Err(RuntimeError::Unmounted { host: cx.host() });
        };
        let fragment = cx.fragment();
        for (index, value) in values.iter().enumerate() {
            let item = self.create_item(cx, index, value, values.len(), keys[index].clone())?;
            cx.append(fragment, item.host)?;
            self.items.push(item);
        }
        cx.doc().insert_before(parent, fragment, Some(anchor))?;
        cx.doc().dispose(fragment);
        cx.doc().dispose(anchor);
        self.placeholder = None;
        Ok(())
    }

    fn clear(&mut self, cx: &mut Cx<'_>) -> Result<(), RuntimeError> {
        let first = self.items.first().and_then(|item| Self::first_dom(cx, item));
        let Some((first, parent)) = first.and_then(|f| cx.doc().parent(f).map(|p| (f, p))) else {
            return Err(RuntimeError::Unmounted { host: cx.host() });
        };
        let marker = placeholder(cx);
        cx.doc().insert_before(parent, marker, Some(first))?;
        for item in std::mem::take(&mut self.items) {
            cx.destroy_child(item.host, true);
        }
        self.placeholder = Some(marker);
        Ok(())
    }

    fn apply(
        &mut self,
        cx: &mut Cx<'_>,
        script: &EditScript,
        values: &[Value],
        keys: &[Identity],
    ) -> Result<(), RuntimeError> {
        let first = self.items.first().and_then(|item| Self::first_dom(cx, item));
        let Some(parent) = first.and_then(|f| cx.doc().parent(f)) else {
            return Err(RuntimeError::Unmounted { host: cx.host() });
        };
        let trailing = self
            .items
            .last()
            .and_then(|item| cx.dom_nodes(item.host).last().copied())
            .and_then(|last| cx.doc().next_sibling(last));
        let old_hosts: Vec<HostId> = self.items.iter().map(|item| item.host).collect();
        let mut old: Vec<Option<Item>> = std::mem::take(&mut self.items).into_iter().map(Some).collect();
        let mut placed: Vec<Option<Item>> = (0..values.len()).map(|_| None).collect();

        for edit in &script.edits {
            match edit {
                Edit::Destroy { old: index } => {
                    if let Some(item) = old.get_mut(*index).and_then(Option::take) {
                        cx.destroy_child(item.host, true);
                    }
                }
                Edit::Keep { old: from, new: to } => {
                    placed[*to] = old.get_mut(*from).and_then(Option::take);
                }
                Edit::Insert { items, at } => {
                    let fragment = cx.fragment();
                    for placement in items {
                        let item = match *placement {
                            Placement::Move { old: from, .. } => old.get_mut(from).and_then(Option::take),
                            Placement::Create { new } => Some(self.create_item(
                                cx,
                                new,
                                &values[new],
                                values.len(),
                                keys[new].clone(),
                            )?),
                        };
                        if let Some(item) = item {
                            cx.append(fragment, item.host)?;
                            placed[placement.new_index()] = Some(item);
                        }
                    }
                    let reference = match *at {
                        InsertAt::Before(index) => cx.dom_nodes(old_hosts[index]).first().copied(),
                        InsertAt::End => trailing,
                    };
                    cx.doc().insert_before(parent, fragment, reference)?;
                    cx.doc().dispose(fragment);
                }
            }
        }
        // Anything the script left behind is unreachable from the new order.
        for item in old.into_iter().flatten() {
            cx.destroy_child(item.host, true);
        }
        self.items = placed.into_iter().flatten().collect();
        Ok(())
    }
}

impl Component for For {
    fn render(&mut self, cx: &mut Cx<'_>) -> Result<Vec<Child>, RuntimeError> {
        self.slot = cx.slot(Self::DEFAULT);
        let change = Rc::clone(&self.change);
        let trigger = cx.update_trigger();
        let attrs = cx.attrs();
        cx.watch(attrs, "loop.**", DispatchMode::Immediate, move |path: &[Key]| {
            change.set(change.get().merge(ListChange::from_path(path)));
            trigger.request(path);
        })?;

        let values = Self::values(cx);
        let keys = self.keys(cx.graph(), &values);
        if !matches!(self.mode, KeyMode::Index) {
            let script = reconcile::plan::<Identity>(&[], &keys);
            Self::report_duplicates(cx, &script, &[], &keys);
        }
        for (index, value) in values.iter().enumerate() {
            let item = self.create_item(cx, index, value, values.len(), keys[index].clone())?;
            self.items.push(item);
        }
        Ok(self.roots(cx))
    }

    fn update(&mut self, cx: &mut Cx<'_>, _path: &[Key]) -> Result<(), RuntimeError> {
        match self.change.replace(ListChange::None) {
            ListChange::None => Ok(()),
            ListChange::Replaced(index) if matches!(self.mode, KeyMode::Index) && index < self.items.len() => {
                let value = Self::values(cx).get(index).cloned().unwrap_or(Value::Undefined);
                cx.graph().set(self.items[index].attrs, Self::EACH, value)?;
                Ok(())
            }
            ListChange::Inner(index) => {
                // Only a derived key can change without the slot being assigned.
                let KeyMode::Derived(_) = self.mode else {
                    return Ok(());
                };
                let current = Self::values(cx)
                    .get(index)
                    .map(|value| self.key_of(cx.graph(), index, value));
                let unchanged = matches!(
                    (current, self.items.get(index)),
                    (Some(key), Some(item)) if key == item.key
                );
                if unchanged { Ok(()) } else { self.reconcile(cx) }
            }
            _ => self.reconcile(cx),
        }
    }

    fn name(&self) -> &'static str {
        "For"
    }
}

/// Host for one list entry; renders the list's default slot.
struct ForItem {
    slot: Option<Slot>,
}

impl Component for ForItem {
    fn render(&mut self, cx: &mut Cx<'_>) -> Result<Vec<Child>, RuntimeError> {
        let children = match &self.slot {
            Some(slot) => cx.render_with(slot)?,
            None => Vec::new(),
        };
        if children.is_empty() {
            Ok(vec![Child::Dom(placeholder(cx))])
        } else {
            Ok(children)
        }
    }

    fn name(&self) -> &'static str {
        "ForItem"
    }
}
