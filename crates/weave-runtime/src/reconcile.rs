#![forbid(unsafe_code)]

//! Keyed list reconciliation, as a pure edit script.
//!
//! [`plan`] compares the keys of the rendered items with the keys of the new
//! data and produces an [`EditScript`] that the list component applies to
//! the DOM. Keeping the plan pure means it can be property-tested and fuzzed
//! without a document.
//!
//! # Algorithm
//!
//! Two cursors, `oi` over old items and `ni` over new items:
//!
//! 1. Skip old items already reused; destroy old items whose key does not
//!    occur at or after `ni` in the new keys (or that are a later duplicate).
//! 2. If the old items are exhausted, create every remaining new item at the
//!    end of the region.
//! 3. Otherwise the old item at `oi` is the anchor. Walk `ni` forward until
//!    the anchor's key, reusing available old items with the same key or
//!    creating fresh ones, collecting them into one insertion.
//! 4. That insertion goes before the anchor in one batch; the anchor stays in
//!    place. Advance both cursors.
//!
//! # Invariants
//!
//! 1. Replaying the script over the old items yields exactly the new order.
//! 2. Every old item is kept, moved, or destroyed exactly once.
//! 3. Only the first old occurrence of a key is reusable.

use std::collections::hash_map::Entry;
use std::hash::Hash;

use ahash::AHashMap;

/// Where an inserted item comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Render a fresh item for new index `new`.
    Create {
        /// New index.
        new: usize,
    },
    /// Move old item `old` to new index `new`.
    Move {
        /// Old index.
        old: usize,
        /// New index.
        new: usize,
    },
}

impl Placement {
    /// New index of the placed item.
    #[must_use]
    pub fn new_index(self) -> usize {
        match self {
            Self::Create { new } | Self::Move { new, .. } => new,
        }
    }
}

/// Insertion point of a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertAt {
    /// Before the first DOM node of old item `n`.
    Before(usize),
    /// At the end of the list region.
    End,
}

/// One step of an edit script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Edit {
    /// Destroy old item `old`.
    Destroy {
        /// Old index.
        old: usize,
    },
    /// Insert a batch of items, in order, at `at`.
    Insert {
        /// Items in their new relative order.
        items: Vec<Placement>,
        /// Insertion point.
        at: InsertAt,
    },
    /// Old item `old` stays where it is and becomes new index `new`.
    Keep {
        /// Old index.
        old: usize,
        /// New index.
        new: usize,
    },
}

/// Which side of the comparison a duplicate key was found on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    /// Among the rendered items.
    Old,
    /// Among the new data.
    New,
}

/// A repeated key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Duplicate {
    /// Side the repeat was found on.
    pub side: Side,
    /// Index of the first occurrence.
    pub first: usize,
    /// Index of the repeat.
    pub duplicate: usize,
}

/// Output of [`plan`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EditScript {
    /// Steps, in application order.
    pub edits: Vec<Edit>,
    /// Repeated keys found on either side.
    pub duplicates: Vec<Duplicate>,
}

/// Origin of one item after replay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    /// Old item reused.
    Reused(usize),
    /// Freshly created for this new index.
    Created(usize),
}

impl EditScript {
    /// Number of fresh items.
    #[must_use]
    pub fn creates(&self) -> usize {
        self.placements()
            .filter(|p| matches!(p, Placement::Create { .. }))
            .count()
    }

    /// Number of moved items.
    #[must_use]
    pub fn moves(&self) -> usize {
        self.placements()
            .filter(|p| matches!(p, Placement::Move { .. }))
            .count()
    }

    /// Number of destroyed items.
    #[must_use]
    pub fn destroys(&self) -> usize {
        self.edits
            .iter()
            .filter(|e| matches!(e, Edit::Destroy { .. }))
            .count()
    }

    /// Number of items kept in place.
    #[must_use]
    pub fn keeps(&self) -> usize {
        self.edits
            .iter()
            .filter(|e| matches!(e, Edit::Keep { .. }))
            .count()
    }

    /// Number of batched insertions (DOM insert calls).
    #[must_use]
    pub fn inserts(&self) -> usize {
        self.edits
            .iter()
            .filter(|e| matches!(e, Edit::Insert { .. }))
            .count()
    }

    fn placements(&self) -> impl Iterator<Item = Placement> + '_ {
        self.edits.iter().flat_map(|e| match e {
            Edit::Insert { items, .. } => items.as_slice(),
            _ => &[],
        })
        .copied()
    }

    /// Apply the script to `old_len` items and return the resulting order.
    ///
    /// Returns `None` if the script references an item that is not present,
    /// which would indicate a planner bug.
    #[must_use]
    pub fn replay(&self, old_len: usize) -> Option<Vec<Origin>> {
        let mut region: Vec<Origin> = (0..old_len).map(Origin::Reused).collect();
        let position = |region: &[Origin], old: usize| {
            region.iter().position(|o| *o == Origin::Reused(old))
        };
        for edit in &self.edits {
            match edit {
                Edit::Destroy { old } => {
                    let at = position(&region, *old)?;
                    region.remove(at);
                }
                Edit::Insert { items, at } => {
                    let mut batch = Vec::with_capacity(items.len());
                    for placement in items {
                        match *placement {
                            Placement::Create { new } => batch.push(Origin::Created(new)),
                            Placement::Move { old, .. } => {
                                let at = position(&region, old)?;
                                batch.push(region.remove(at));
                            }
                        }
                    }
                    let index = match at {
                        InsertAt::Before(anchor) => position(&region, *anchor)?,
                        InsertAt::End => region.len(),
                    };
                    region.splice(index..index, batch);
                }
                Edit::Keep { old, .. } => {
                    position(&region, *old)?;
                }
            }
        }
        Some(region)
    }

    /// New index of every item in replayed order, or `None` on a bad script.
    #[must_use]
    pub fn replay_new_indices(&self, old_len: usize) -> Option<Vec<usize>> {
        let mut new_of_old = vec![None; old_len];
        for edit in &self.edits {
            match edit {
                Edit::Keep { old, new } => *new_of_old.get_mut(*old)? = Some(*new),
                Edit::Insert { items, .. } => {
                    for placement in items {
                        if let Placement::Move { old, new } = *placement {
                            *new_of_old.get_mut(old)? = Some(new);
                        }
                    }
                }
                Edit::Destroy { .. } => {}
            }
        }
        self.replay(old_len)?
            .into_iter()
            .map(|origin| match origin {
                Origin::Created(new) => Some(new),
                Origin::Reused(old) => new_of_old.get(old).copied().flatten(),
            })
            .collect()
    }
}

fn find_duplicates<'a, K: Eq + Hash>(
    keys: &'a [K],
    side: Side,
    out: &mut Vec<Duplicate>,
) -> AHashMap<&'a K, usize> {
    let mut first: AHashMap<&'a K, usize> = AHashMap::with_capacity(keys.len());
    for (index, key) in keys.iter().enumerate() {
        match first.entry(key) {
            Entry::Occupied(seen) => out.push(Duplicate {
                side,
                first: *seen.get(),
                duplicate: index,
            }),
            Entry::Vacant(slot) => {
                slot.insert(index);
            }
        }
    }
    first
}

/// Plan the edits turning items keyed `old` into items keyed `new`.
pub fn plan<K: Eq + Hash>(old: &[K], new: &[K]) -> EditScript {
    let mut duplicates = Vec::new();
    let old_first = find_duplicates(old, Side::Old, &mut duplicates);
    let mut new_last: AHashMap<&K, usize> = AHashMap::with_capacity(new.len());
    for (index, key) in new.iter().enumerate() {
        new_last.insert(key, index);
    }
    find_duplicates(new, Side::New, &mut duplicates);

    let mut edits = Vec::new();
    if old.is_empty() {
        if !new.is_empty() {
            edits.push(Edit::Insert {
                items: (0..new.len()).map(|new| Placement::Create { new }).collect(),
                at: InsertAt::End,
            });
        }
        return EditScript { edits, duplicates };
    }
    if new.is_empty() {
        edits.extend((0..old.len()).map(|old| Edit::Destroy { old }));
        return EditScript { edits, duplicates };
    }

    let reusable = |oi: usize| old_first.get(&old[oi]) == Some(&oi);
    let mut consumed = vec![false; old.len()];
    let (mut oi, mut ni) = (0, 0);
    loop {
        while oi < old.len() {
            if consumed[oi] {
                oi += 1;
                continue;
            }
            let wanted = new_last.get(&old[oi]).is_some_and(|&last| last >= ni);
            if reusable(oi) && wanted {
                break;
            }
            edits.push(Edit::Destroy { old: oi });
            consumed[oi] = true;
            oi += 1;
        }

        if oi == old.len() {
            if ni < new.len() {
                let items = (ni..new.len())
                    .map(|n| match old_first.get(&new[n]) {
                        Some(&o) if !consumed[o] => {
                            consumed[o] = true;
                            Placement::Move { old: o, new: n }
                        }
                        _ => Placement::Create { new: n },
                    })
                    .collect();
                edits.push(Edit::Insert {
                    items,
                    at: InsertAt::End,
                });
            }
            break;
        }

        let anchor = oi;
        let mut items = Vec::new();
        while ni < new.len() && new[ni] != old[anchor] {
            match old_first.get(&new[ni]) {
                Some(&o) if !consumed[o] && o != anchor => {
                    consumed[o] = true;
                    items.push(Placement::Move { old: o, new: ni });
                }
                _ => items.push(Placement::Create { new: ni }),
            }
            ni += 1;
        }
        if !items.is_empty() {
            edits.push(Edit::Insert {
                items,
                at: InsertAt::Before(anchor),
            });
        }
        // The anchor's key occurs at or after `ni`, so the walk stopped on it.
        edits.push(Edit::Keep {
            old: anchor,
            new: ni,
        });
        consumed[anchor] = true;
        oi += 1;
        ni += 1;
    }
    EditScript { edits, duplicates }
}

/// Plan for index keying: position is identity, so common positions are
/// kept, surplus old items destroyed and surplus new items appended.
#[must_use]
pub fn plan_by_index(old_len: usize, new_len: usize) -> EditScript {
    let common = old_len.min(new_len);
    let mut edits: Vec<Edit> = (0..common).map(|i| Edit::Keep { old: i, new: i }).collect();
    edits.extend((common..old_len).map(|old| Edit::Destroy { old }));
    if new_len > common {
        edits.push(Edit::Insert {
            items: (common..new_len).map(|new| Placement::Create { new }).collect(),
            at: InsertAt::End,
        });
    }
    EditScript {
        edits,
        duplicates: Vec::new(),
    }
}
