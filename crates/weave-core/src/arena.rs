#![forbid(unsafe_code)]

//! Generational slot arena.
//!
//! Graph nodes and component hosts are stored in arenas and referred to by
//! copyable handles instead of pointers. A handle carries the slot index and
//! the generation the slot had when the value was inserted, so a handle that
//! outlives its value never aliases whatever reuses the slot later.
//!
//! # Invariants
//!
//! 1. `get(h)` returns `Some` only while the value inserted for `h` is live.
//! 2. Freed slots are reused LIFO; their generation is bumped on removal.
//! 3. `len()` counts live values only.
//! 4. Slot index `u32::MAX` is never handed out, so
//!    [`RawHandle::DANGLING`] never resolves.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Arena full | Slot limit reached with no free slot | `try_insert` returns `ArenaFull`; `insert` logs and returns a dangling handle |

use std::fmt;

use thiserror::Error;
use tracing::warn;

/// No slot is free and the arena reached its slot limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("arena is full ({limit} slots)")]
pub struct ArenaFull {
    /// The slot limit.
    pub limit: u32,
}

/// Index + generation pair identifying one arena slot occupancy.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawHandle {
    index: u32,
    generation: u32,
}

impl RawHandle {
    /// Handle that never resolves to a value.
    pub const DANGLING: Self = Self {
        index: u32::MAX,
        generation: u32::MAX,
    };

    /// Slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot at insertion time.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// A vector of generational slots with a free list.
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
    limit: u32,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Arena<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("slots", &self.slots.len())
            .field("live", &self.live)
            .finish()
    }
}

impl<T> Arena<T> {
    /// Create an empty arena.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_limit(u32::MAX)
    }

    /// Create an empty arena that allocates at most `limit` slots.
    #[must_use]
    pub const fn with_limit(limit: u32) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            limit,
        }
    }

    /// Store `value`, returning its handle, or [`ArenaFull`] when no slot is
    /// free and the limit is reached.
    pub fn try_insert(&mut self, value: T) -> Result<RawHandle, ArenaFull> {
        if let Some(index) = self.free.pop() {
            if let Some(slot) = self.slots.get_mut(index as usize) {
                slot.value = Some(value);
                self.live += 1;
                return Ok(RawHandle {
                    index,
                    generation: slot.generation,
                });
            }
        }
        let index = u32::try_from(self.slots.len())
            .ok()
            .filter(|index| *index < self.limit)
            .ok_or(ArenaFull { limit: self.limit })?;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        self.live += 1;
        Ok(RawHandle {
            index,
            generation: 0,
        })
    }

    /// Store `value`, returning its handle.
    ///
    /// When the arena is full the value is dropped and
    /// [`RawHandle::DANGLING`] is returned; it behaves like the handle of a
    /// value that was already removed.
    pub fn insert(&mut self, value: T) -> RawHandle {
        self.try_insert(value).unwrap_or_else(|full| {
            warn!(limit = full.limit, "arena full; returning a dangling handle");
            RawHandle::DANGLING
        })
    }

    /// Borrow the value behind `handle`, if it is still live.
    #[must_use]
    pub fn get(&self, handle: RawHandle) -> Option<&T> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    /// Mutably borrow the value behind `handle`, if it is still live.
    #[must_use]
    pub fn get_mut(&mut self, handle: RawHandle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    /// Whether `handle` still refers to a live value.
    #[must_use]
    pub fn contains(&self, handle: RawHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Remove and return the value behind `handle`.
    pub fn remove(&mut self, handle: RawHandle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
        Some(value)
    }

    /// Number of live values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether the arena holds no live values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Iterate live values with their handles.
    pub fn iter(&self) -> impl Iterator<Item = (RawHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    RawHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }
}
