#![forbid(unsafe_code)]

//! Inherited, copy-on-write context maps.
//!
//! A child host starts with a clone of its parent's [`Context`], which is a
//! pointer copy. The map itself is copied the first time the child writes a
//! key, so hosts that only inherit never allocate.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;

type Entries = AHashMap<Rc<str>, Rc<dyn Any>>;

/// Outcome of [`Context::insert`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Insert {
    Added,
    Replaced,
    Refused,
}

/// Typed values visible to a host and everything it mounts.
#[derive(Clone, Default)]
pub struct Context {
    entries: Option<Rc<Entries>>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self
            .entries
            .iter()
            .flat_map(|e| e.keys().map(|k| &**k))
            .collect();
        keys.sort_unstable();
        f.debug_struct("Context").field("keys", &keys).finish()
    }
}

impl Context {
    /// Empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `key` as a `T`.
    #[must_use]
    pub fn get<T: Any>(&self, key: &str) -> Option<Rc<T>> {
        let value = self.entries.as_ref()?.get(key)?;
        Rc::clone(value).downcast::<T>().ok()
    }

    /// Whether `key` is set.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.as_ref().is_some_and(|e| e.contains_key(key))
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |e| e.len())
    }

    /// Whether no key is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether both contexts share one map allocation.
    #[must_use]
    pub fn shares_storage(&self, other: &Self) -> bool {
        match (&self.entries, &other.entries) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    pub(crate) fn insert(&mut self, key: Rc<str>, value: Rc<dyn Any>, allow_override: bool) -> Insert {
        let exists = self.contains(&key);
        if exists && !allow_override {
            return Insert::Refused;
        }
        let entries = self.entries.get_or_insert_with(Rc::default);
        Rc::make_mut(entries).insert(key, value);
        if exists { Insert::Replaced } else { Insert::Added }
    }
}
