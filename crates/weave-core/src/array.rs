#![forbid(unsafe_code)]

//! Array mutators.
//!
//! Every mutator keeps the `(parent, index)` edges of node elements in step
//! with their new positions and emits one change per index whose content
//! changed, plus `length` when the length changed. Mutating a raw array is a
//! plain store.
//!
//! Callbacks (`sort_by`, `filter`, `map`) run against a snapshot with no
//! borrow held, so they may read the graph freely.
//!
//! Derived arrays (`slice`, `filter`, `map`, `concat`) are tracked when the
//! source is tracked. Elements that already are view-models are reused, not
//! re-wrapped.

use std::cmp::Ordering;
use std::ops::{Bound, Range, RangeBounds};

use crate::error::GraphError;
use crate::graph::{Graph, NodeArena, NodeId, Shape, adopt, relabel, release, track};
use crate::key::Key;
use crate::value::Value;

type Paths = Vec<Vec<Key>>;

impl Graph {
    fn mutate<R>(
        &self,
        arr: NodeId,
        f: impl FnOnce(&mut NodeArena, &mut Vec<Value>, bool) -> (R, Paths),
    ) -> Result<Option<R>, GraphError> {
        let (result, paths, tracked) = {
            let mut arena = self.arena_mut();
            let Some((mut items, tracked)) = take_items(&mut arena, arr)? else {
                return Ok(None);
            };
            let old_len = items.len();
            let (result, mut paths) = f(&mut arena, &mut items, tracked);
            if items.len() != old_len {
                paths.push(vec![Key::length()]);
            }
            put_items(&mut arena, arr, items);
            (result, paths, tracked)
        };
        if tracked {
            self.emit(arr, paths);
        }
        Ok(Some(result))
    }

    fn snapshot(&self, arr: NodeId) -> Result<(Vec<Value>, bool), GraphError> {
        let arena = self.inner.arena.borrow();
        match arena.get(arr.0) {
            None => Ok((Vec::new(), false)),
            Some(entry) => match &entry.shape {
                Shape::Array(items) => Ok((items.clone(), entry.is_tracked())),
                Shape::Object(_) => Err(GraphError::WrongShape {
                    node: arr,
                    expected: "an array",
                }),
            },
        }
    }

    fn derive_array(&self, items: Vec<Value>, tracked: bool) -> NodeId {
        let id = self.alloc(Shape::Array(items));
        if tracked {
            track(&mut self.arena_mut(), id);
        }
        id
    }

    /// Append values. Returns the new length.
    pub fn push<I, V>(&self, arr: NodeId, values: I) -> Result<usize, GraphError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.mutate(arr, |arena, items, tracked| {
            let start = items.len();
            for value in values {
                if tracked {
                    adopt(arena, arr, Key::Index(items.len()), &value);
                }
                items.push(value);
            }
            (items.len(), index_paths(start..items.len()))
        })
        .map(Option::unwrap_or_default)
    }

    /// Remove and return the last element.
    pub fn pop(&self, arr: NodeId) -> Result<Value, GraphError> {
        self.mutate(arr, |arena, items, tracked| match items.pop() {
            Some(value) => {
                let index = items.len();
                if tracked {
                    release(arena, arr, &Key::Index(index), &value);
                }
                (value, index_paths(index..index + 1))
            }
            None => (Value::Undefined, Vec::new()),
        })
        .map(Option::unwrap_or_default)
    }

    /// Remove and return the first element.
    pub fn shift(&self, arr: NodeId) -> Result<Value, GraphError> {
        self.mutate(arr, |arena, items, tracked| {
            if items.is_empty() {
                return (Value::Undefined, Vec::new());
            }
            let old_len = items.len();
            let value = items.remove(0);
            if tracked {
                release(arena, arr, &Key::Index(0), &value);
                reindex(arena, arr, items, 0..items.len(), -1);
            }
            (value, index_paths(0..old_len))
        })
        .map(Option::unwrap_or_default)
    }

    /// Prepend values. Returns the new length.
    pub fn unshift<I, V>(&self, arr: NodeId, values: I) -> Result<usize, GraphError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.mutate(arr, |arena, items, tracked| {
            let count = values.len();
            if count == 0 {
                return (items.len(), Vec::new());
            }
            items.splice(0..0, values);
            if tracked {
                reindex(arena, arr, items, count..items.len(), isize_of(count));
                for (index, value) in items.iter().enumerate().take(count) {
                    adopt(arena, arr, Key::Index(index), value);
                }
            }
            (items.len(), index_paths(0..items.len()))
        })
        .map(Option::unwrap_or_default)
    }

    /// Remove `delete_count` elements at `start` and insert `values` there.
    /// Returns the removed elements. `start` is clamped to the length.
    pub fn splice<I, V>(
        &self,
        arr: NodeId,
        start: usize,
        delete_count: usize,
        values: I,
    ) -> Result<Vec<Value>, GraphError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.mutate(arr, |arena, items, tracked| {
            let len = items.len();
            let start = start.min(len);
            let deleted = delete_count.min(len - start);
            let inserted = values.len();
            let removed: Vec<Value> = items.splice(start..start + deleted, values).collect();
            if tracked {
                for (offset, value) in removed.iter().enumerate() {
                    release(arena, arr, &Key::Index(start + offset), value);
                }
                let delta = isize_of(inserted) - isize_of(deleted);
                reindex(arena, arr, items, start + inserted..items.len(), delta);
                for (index, value) in items.iter().enumerate().skip(start).take(inserted) {
                    adopt(arena, arr, Key::Index(index), value);
                }
            }
            let end = if inserted == deleted {
                start + inserted
            } else {
                len.max(items.len())
            };
            (removed, index_paths(start..end))
        })
        .map(Option::unwrap_or_default)
    }

    /// Stable sort with a comparator. The comparator sees a snapshot.
    pub fn sort_by<F>(&self, arr: NodeId, mut compare: F) -> Result<(), GraphError>
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        let (items, _) = self.snapshot(arr)?;
        let mut order: Vec<usize> = (0..items.len()).collect();
        order.sort_by(|&a, &b| compare(&items[a], &items[b]));
        self.mutate(arr, |arena, items, tracked| {
            // The comparator changed the length under us; leave the array alone.
            if items.len() != order.len() {
                return ((), Vec::new());
            }
            ((), permute(arena, arr, items, tracked, &order))
        })
        .map(drop)
    }

    /// Reverse in place.
    pub fn reverse(&self, arr: NodeId) -> Result<(), GraphError> {
        self.mutate(arr, |arena, items, tracked| {
            let order: Vec<usize> = (0..items.len()).rev().collect();
            ((), permute(arena, arr, items, tracked, &order))
        })
        .map(drop)
    }

    /// Overwrite `range` (clamped to the length) with `value`.
    pub fn fill<R>(&self, arr: NodeId, value: impl Into<Value>, range: R) -> Result<(), GraphError>
    where
        R: RangeBounds<usize>,
    {
        let value = value.into();
        self.mutate(arr, |arena, items, tracked| {
            let mut paths = Vec::new();
            for index in clamp(&range, items.len()) {
                if items[index].same(&value) {
                    continue;
                }
                let old = std::mem::replace(&mut items[index], value.clone());
                if tracked {
                    release(arena, arr, &Key::Index(index), &old);
                    adopt(arena, arr, Key::Index(index), &value);
                }
                paths.push(vec![Key::Index(index)]);
            }
            ((), paths)
        })
        .map(drop)
    }

    /// Set the length, truncating or padding with `Undefined`.
    ///
    /// `length` must be a non-negative integral number no larger than
    /// [`GraphConfig::max_array_len`](crate::GraphConfig::max_array_len).
    pub fn set_len(&self, arr: NodeId, length: impl Into<Value>) -> Result<(), GraphError> {
        let length = length.into();
        let new_len = match length {
            Value::Number(n) if n >= 0.0 && n.fract() == 0.0 && n <= f64::from(u32::MAX) => {
                n as usize
            }
            other => {
                return Err(GraphError::InvalidLength {
                    found: format!("{other:?}"),
                });
            }
        };
        if new_len > self.config().max_array_len {
            return Err(GraphError::InvalidLength {
                found: format!("{new_len} (limit {})", self.config().max_array_len),
            });
        }
        self.mutate(arr, |arena, items, tracked| {
            let old_len = items.len();
            if new_len >= old_len {
                items.resize(new_len, Value::Undefined);
                return ((), Vec::new());
            }
            let removed = items.split_off(new_len);
            if tracked {
                for (offset, value) in removed.iter().enumerate() {
                    release(arena, arr, &Key::Index(new_len + offset), value);
                }
            }
            ((), index_paths(new_len..old_len))
        })
        .map(drop)
    }

    /// Copy `range` (clamped) into a new array.
    pub fn slice<R>(&self, arr: NodeId, range: R) -> Result<NodeId, GraphError>
    where
        R: RangeBounds<usize>,
    {
        let (items, tracked) = self.snapshot(arr)?;
        let range = clamp(&range, items.len());
        Ok(self.derive_array(items[range].to_vec(), tracked))
    }

    /// New array with the elements for which `keep` returns true.
    pub fn filter<F>(&self, arr: NodeId, mut keep: F) -> Result<NodeId, GraphError>
    where
        F: FnMut(&Value, usize) -> bool,
    {
        let (items, tracked) = self.snapshot(arr)?;
        let kept = items
            .into_iter()
            .enumerate()
            .filter(|(index, value)| keep(value, *index))
            .map(|(_, value)| value)
            .collect();
        Ok(self.derive_array(kept, tracked))
    }

    /// New array of `f(element, index)`.
    pub fn map<F>(&self, arr: NodeId, mut f: F) -> Result<NodeId, GraphError>
    where
        F: FnMut(&Value, usize) -> Value,
    {
        let (items, tracked) = self.snapshot(arr)?;
        let mapped = items
            .iter()
            .enumerate()
            .map(|(index, value)| f(value, index))
            .collect();
        Ok(self.derive_array(mapped, tracked))
    }

    /// New array of this array's elements followed by `others`. Array
    /// arguments are flattened one level.
    pub fn concat<I, V>(&self, arr: NodeId, others: I) -> Result<NodeId, GraphError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let (mut items, tracked) = self.snapshot(arr)?;
        for other in others {
            match other.into() {
                Value::Node(id) if self.is_array(id) => items.extend(self.snapshot(id)?.0),
                value => items.push(value),
            }
        }
        Ok(self.derive_array(items, tracked))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn take_items(arena: &mut NodeArena, node: NodeId) -> Result<Option<(Vec<Value>, bool)>, GraphError> {
    let Some(entry) = arena.get_mut(node.0) else {
        return Ok(None);
    };
    let tracked = entry.is_tracked();
    match &mut entry.shape {
        Shape::Array(items) => Ok(Some((std::mem::take(items), tracked))),
        Shape::Object(_) => Err(GraphError::WrongShape {
            node,
            expected: "an array",
        }),
    }
}

fn put_items(arena: &mut NodeArena, node: NodeId, items: Vec<Value>) {
    if let Some(entry) = arena.get_mut(node.0) {
        if let Shape::Array(slot) = &mut entry.shape {
            *slot = items;
        }
    }
}

fn index_paths(range: Range<usize>) -> Paths {
    range.map(|index| vec![Key::Index(index)]).collect()
}

fn isize_of(n: usize) -> isize {
    isize::try_from(n).unwrap_or(isize::MAX)
}

fn clamp(range: &impl RangeBounds<usize>, len: usize) -> Range<usize> {
    let start = match range.start_bound() {
        Bound::Included(&s) => s,
        Bound::Excluded(&s) => s.saturating_add(1),
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(&e) => e.saturating_add(1),
        Bound::Excluded(&e) => e,
        Bound::Unbounded => len,
    };
    let end = end.min(len);
    start.min(end)..end
}

/// Move the edges of elements now at `range` from `index - delta` to `index`.
///
/// Walks away from the side the elements moved toward so that no label is
/// reused before its previous holder has moved.
fn reindex(arena: &mut NodeArena, arr: NodeId, items: &[Value], range: Range<usize>, delta: isize) {
    if delta == 0 {
        return;
    }
    let mut shift = |index: usize| {
        if let Some(from) = index.checked_add_signed(-delta) {
            relabel(arena, arr, &items[index], from, index);
        }
    };
    if delta > 0 {
        range.rev().for_each(&mut shift);
    } else {
        range.for_each(&mut shift);
    }
}

/// Rearrange `items` so that position `j` holds the old element `order[j]`.
fn permute(
    arena: &mut NodeArena,
    arr: NodeId,
    items: &mut Vec<Value>,
    tracked: bool,
    order: &[usize],
) -> Paths {
    let old = std::mem::take(items);
    *items = order.iter().map(|&from| old[from].clone()).collect();
    let mut paths = Vec::new();
    for (to, &from) in order.iter().enumerate() {
        if from == to {
            continue;
        }
        if tracked {
            relabel(arena, arr, &items[to], from, to);
        }
        if !items[to].same(&old[to]) {
            paths.push(vec![Key::Index(to)]);
        }
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphConfig;
    use crate::key::path_string;
    use crate::watch::DispatchMode;
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn watch_all(graph: &Graph, arr: NodeId) -> Rc<RefCell<Vec<String>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        graph
            .watch(arr, "*", DispatchMode::Immediate, move |path: &[Key]| {
                sink.borrow_mut().push(path_string(path));
            })
            .unwrap();
        log
    }

    fn numbers(graph: &Graph, arr: NodeId) -> Vec<f64> {
        graph
            .values(arr)
            .iter()
            .filter_map(Value::as_f64)
            .collect()
    }

    fn edge_indices(graph: &Graph, child: NodeId, arr: NodeId) -> Vec<usize> {
        let mut indices: Vec<usize> = graph
            .parents(child)
            .into_iter()
            .filter(|(parent, _)| *parent == arr)
            .filter_map(|(_, key)| key.as_index())
            .collect();
        indices.sort_unstable();
        indices
    }

    fn positions(graph: &Graph, child: NodeId, arr: NodeId) -> Vec<usize> {
        graph
            .values(arr)
            .iter()
            .enumerate()
            .filter(|(_, v)| v.as_node() == Some(child))
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn push_emits_new_indices_and_length() {
        let graph = Graph::new();
        let arr = graph.vm_array([1, 2]);
        let log = watch_all(&graph, arr);
        assert_eq!(graph.push(arr, [3, 4]).unwrap(), 4);
        assert_eq!(*log.borrow(), vec!["2", "3", "length"]);
    }

    #[test]
    fn pop_and_shift_on_empty_emit_nothing() {
        let graph = Graph::new();
        let arr = graph.vm_array(Vec::<Value>::new());
        let log = watch_all(&graph, arr);
        assert!(graph.pop(arr).unwrap().is_undefined());
        assert!(graph.shift(arr).unwrap().is_undefined());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn shift_moves_child_edges_down() {
        let graph = Graph::new();
        let a = graph.object([("n", 0)]);
        let b = graph.object([("n", 1)]);
        let arr = graph.vm_array([Value::from(0), Value::Node(a), Value::Node(b)]);
        graph.shift(arr).unwrap();
        assert_eq!(edge_indices(&graph, a, arr), vec![0]);
        assert_eq!(edge_indices(&graph, b, arr), vec![1]);

        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        graph
            .watch(arr, "1.n", DispatchMode::Immediate, move |path: &[Key]| {
                sink.borrow_mut().push(path_string(path));
            })
            .unwrap();
        graph.set(b, "n", 5).unwrap();
        assert_eq!(*log.borrow(), vec!["1.n"]);
    }

    #[test]
    fn unshift_moves_child_edges_up() {
        let graph = Graph::new();
        let a = graph.object([("n", 0)]);
        let arr = graph.vm_array([Value::Node(a)]);
        let fresh = graph.object([("n", 1)]);
        assert_eq!(graph.unshift(arr, [Value::Node(fresh), Value::from(9)]).unwrap(), 3);
        assert_eq!(edge_indices(&graph, a, arr), vec![2]);
        assert_eq!(edge_indices(&graph, fresh, arr), vec![0]);
        assert!(graph.is_view_model(&Value::Node(fresh)));
    }

    #[test]
    fn splice_replaces_and_shifts() {
        let graph = Graph::new();
        let tail = graph.object([("n", 0)]);
        let arr = graph.vm_array([Value::from(0), Value::from(1), Value::from(2), Value::Node(tail)]);
        let log = watch_all(&graph, arr);
        let removed = graph.splice(arr, 1, 2, [7]).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(graph.len(arr), 3);
        assert_eq!(edge_indices(&graph, tail, arr), vec![2]);
        assert_eq!(*log.borrow(), vec!["1", "2", "3", "length"]);
    }

    #[test]
    fn splice_same_size_emits_only_replaced() {
        let graph = Graph::new();
        let arr = graph.vm_array([0, 1, 2, 3]);
        let log = watch_all(&graph, arr);
        graph.splice(arr, 1, 1, [10]).unwrap();
        assert_eq!(*log.borrow(), vec!["1"]);
    }

    #[test]
    fn splice_clamps_start() {
        let graph = Graph::new();
        let arr = graph.vm_array([0, 1]);
        let removed = graph.splice(arr, 10, 5, [2]).unwrap();
        assert!(removed.is_empty());
        assert_eq!(numbers(&graph, arr), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn sort_emits_changed_positions_only() {
        let graph = Graph::new();
        let arr = graph.vm_array([1, 3, 2]);
        let log = watch_all(&graph, arr);
        graph
            .sort_by(arr, |a, b| {
                a.as_f64()
                    .partial_cmp(&b.as_f64())
                    .unwrap_or(Ordering::Equal)
            })
            .unwrap();
        assert_eq!(numbers(&graph, arr), vec![1.0, 2.0, 3.0]);
        assert_eq!(*log.borrow(), vec!["1", "2"]);
    }

    #[test]
    fn sort_comparator_may_read_graph() {
        let graph = Graph::new();
        let a = graph.object([("rank", 2)]);
        let b = graph.object([("rank", 1)]);
        let arr = graph.vm_array([Value::Node(a), Value::Node(b)]);
        let reader = graph.clone();
        graph
            .sort_by(arr, |x, y| {
                let rank = |v: &Value| v.as_node().and_then(|n| reader.get(n, "rank").as_f64());
                rank(x).partial_cmp(&rank(y)).unwrap_or(Ordering::Equal)
            })
            .unwrap();
        assert_eq!(edge_indices(&graph, b, arr), vec![0]);
        assert_eq!(edge_indices(&graph, a, arr), vec![1]);
    }

    #[test]
    fn reverse_relabels_duplicates() {
        let graph = Graph::new();
        let x = graph.object([("n", 0)]);
        let arr = graph.vm_array([Value::Node(x), Value::from(1), Value::Node(x)]);
        graph.reverse(arr).unwrap();
        assert_eq!(edge_indices(&graph, x, arr), vec![0, 2]);
    }

    #[test]
    fn fill_links_every_slot() {
        let graph = Graph::new();
        let x = graph.object([("n", 0)]);
        let arr = graph.vm_array([0, 0, 0]);
        graph.fill(arr, x, 1..).unwrap();
        assert_eq!(edge_indices(&graph, x, arr), vec![1, 2]);
    }

    #[test]
    fn set_len_truncates_and_validates() {
        let graph = Graph::new();
        let x = graph.object([("n", 0)]);
        let arr = graph.vm_array([Value::from(0), Value::Node(x)]);
        let log = watch_all(&graph, arr);
        graph.set(arr, "length", 1).unwrap();
        assert_eq!(graph.len(arr), 1);
        assert!(graph.parents(x).is_empty());
        assert_eq!(*log.borrow(), vec!["1", "length"]);
        assert!(matches!(
            graph.set_len(arr, 1.5),
            Err(GraphError::InvalidLength { .. })
        ));
        assert!(matches!(
            graph.set_len(arr, "3"),
            Err(GraphError::InvalidLength { .. })
        ));
    }

    #[test]
    fn write_past_end_extends() {
        let graph = Graph::new();
        let arr = graph.vm_array([0]);
        let log = watch_all(&graph, arr);
        graph.set(arr, 3usize, 1).unwrap();
        assert_eq!(graph.len(arr), 4);
        assert!(graph.get(arr, 2usize).is_undefined());
        assert_eq!(*log.borrow(), vec!["3", "length"]);
    }

    #[test]
    fn huge_index_is_rejected_without_growing() {
        let graph = Graph::new();
        let arr = graph.vm_array([1]);
        let log = watch_all(&graph, arr);
        for index in [usize::MAX, 1_000_000_000_000, 1 << 24] {
            assert!(matches!(
                graph.set(arr, index, 2),
                Err(GraphError::InvalidIndex { .. })
            ));
        }
        assert_eq!(graph.len(arr), 1);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn length_limit_is_configurable() {
        let graph = Graph::with_config(GraphConfig::default().with_max_array_len(4));
        let arr = graph.vm_array([0]);
        graph.set(arr, 3usize, 1).unwrap();
        assert!(matches!(
            graph.set(arr, 4usize, 1),
            Err(GraphError::InvalidIndex { .. })
        ));
        assert!(matches!(
            graph.set_len(arr, 5),
            Err(GraphError::InvalidLength { .. })
        ));
        assert_eq!(graph.len(arr), 4);
        graph.set_len(arr, 2).unwrap();
        assert_eq!(graph.len(arr), 2);
    }

    #[test]
    fn default_limit_caps_set_len() {
        let graph = Graph::new();
        let arr = graph.vm_array([0]);
        assert!(matches!(
            graph.set_len(arr, f64::from(u32::MAX)),
            Err(GraphError::InvalidLength { .. })
        ));
        assert_eq!(graph.len(arr), 1);
    }

    #[test]
    fn non_index_key_is_rejected() {
        let graph = Graph::new();
        let arr = graph.vm_array([0]);
        assert!(matches!(
            graph.set(arr, "foo", 1),
            Err(GraphError::InvalidIndex { .. })
        ));
    }

    #[test]
    fn derived_arrays_inherit_tracking() {
        let graph = Graph::new();
        let x = graph.object([("n", 0)]);
        let tracked = graph.vm_array([Value::Node(x), Value::from(1)]);
        let raw = graph.array([1, 2, 3]);

        let sliced = graph.slice(tracked, ..1).unwrap();
        assert!(graph.is_view_model(&Value::Node(sliced)));
        assert_eq!(edge_indices(&graph, x, sliced), vec![0]);

        let filtered = graph.filter(raw, |v, _| v.as_f64() != Some(2.0)).unwrap();
        assert!(!graph.is_view_model(&Value::Node(filtered)));
        assert_eq!(numbers(&graph, filtered), vec![1.0, 3.0]);

        let fresh = graph.object([("m", 1)]);
        let mapped = graph.map(tracked, |_, _| Value::Node(fresh)).unwrap();
        assert!(graph.is_view_model(&Value::Node(fresh)));
        assert_eq!(edge_indices(&graph, fresh, mapped), vec![0, 1]);

        let joined = graph.concat(raw, [Value::Node(raw), Value::from(4)]).unwrap();
        assert_eq!(numbers(&graph, joined), vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn array_ops_on_object_fail() {
        let graph = Graph::new();
        let obj = graph.vm_object([("a", 1)]);
        assert!(matches!(
            graph.push(obj, [1]),
            Err(GraphError::WrongShape { .. })
        ));
    }

    #[test]
    fn raw_array_mutations_are_silent() {
        let graph = Graph::new();
        let x = graph.object([("n", 0)]);
        let arr = graph.array([Value::Node(x)]);
        graph.unshift(arr, [1]).unwrap();
        assert!(graph.parents(x).is_empty());
        assert!(!graph.is_view_model(&Value::Node(x)));
    }

    #[derive(Clone, Debug)]
    enum Op {
        Push(usize),
        Pop,
        Shift,
        Unshift(usize),
        Splice(usize, usize, Vec<usize>),
        Reverse,
        Sort,
        Fill(usize, usize),
        SetLen(usize),
        Set(usize, usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..4usize).prop_map(Op::Push),
            Just(Op::Pop),
            Just(Op::Shift),
            (0..4usize).prop_map(Op::Unshift),
            (0..8usize, 0..4usize, prop::collection::vec(0..4usize, 0..3))
                .prop_map(|(s, d, v)| Op::Splice(s, d, v)),
            Just(Op::Reverse),
            Just(Op::Sort),
            (0..4usize, 0..8usize).prop_map(|(v, s)| Op::Fill(v, s)),
            (0..10usize).prop_map(Op::SetLen),
            (0..8usize, 0..4usize).prop_map(|(i, v)| Op::Set(i, v)),
        ]
    }

    proptest! {
        #[test]
        fn edges_track_positions(ops in prop::collection::vec(op(), 0..40)) {
            let graph = Graph::new();
            let pool: Vec<NodeId> = (0..4).map(|i| graph.vm_object([("tag", i)])).collect();
            let arr = graph.vm_array([Value::Node(pool[0]), Value::Node(pool[1])]);
            let node = |i: usize| Value::Node(pool[i]);
            let tag = |v: &Value| v.as_node().map(|n| graph.get(n, "tag").as_f64().unwrap_or(-1.0));

            for op in ops {
                match op {
                    Op::Push(v) => { graph.push(arr, [node(v)]).unwrap(); }
                    Op::Pop => { graph.pop(arr).unwrap(); }
                    Op::Shift => { graph.shift(arr).unwrap(); }
                    Op::Unshift(v) => { graph.unshift(arr, [node(v)]).unwrap(); }
                    Op::Splice(s, d, v) => {
                        graph.splice(arr, s, d, v.into_iter().map(node)).unwrap();
                    }
                    Op::Reverse => graph.reverse(arr).unwrap(),
                    Op::Sort => graph
                        .sort_by(arr, |a, b| tag(a).partial_cmp(&tag(b)).unwrap_or(Ordering::Equal))
                        .unwrap(),
                    Op::Fill(v, s) => graph.fill(arr, node(v), s..).unwrap(),
                    Op::SetLen(n) => graph.set_len(arr, n).unwrap(),
                    Op::Set(i, v) => graph.set(arr, i, node(v)).unwrap(),
                }
                for &child in &pool {
                    prop_assert_eq!(edge_indices(&graph, child, arr), positions(&graph, child, arr));
                }
            }
        }
    }
}
