#![forbid(unsafe_code)]

//! Cross-boundary listener and ref bookkeeping.
//!
//! Slot content is rendered by one host (the *holder*, e.g. an `If`) on
//! behalf of another (the *owner*, whose template declared it). Watchers and
//! refs created inside that content must die with whichever side goes first.
//! Each such link is recorded once here and indexed under both hosts.
//!
//! # Invariants
//!
//! 1. A link is indexed under its owner and under its holder, and nowhere else.
//! 2. Taking a link removes it from both indexes, so it is released exactly once.

use std::rc::Rc;

use ahash::AHashMap;
use indexmap::IndexMap;
use smallvec::SmallVec;
use weave_core::WatchHandle;

use crate::host::{Child, HostId};

/// Identifier of one recorded link.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(u64);

/// A cross-boundary link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Link {
    /// A watcher declared by `owner` inside content rendered by `holder`.
    Listener {
        /// Host whose template declared the watcher.
        owner: HostId,
        /// Host that rendered the content.
        holder: HostId,
        /// The registration.
        handle: WatchHandle,
    },
    /// A ref entry stored on `owner` for content rendered by `holder`.
    Ref {
        /// Host holding the ref table.
        owner: HostId,
        /// Host that rendered the tagged child.
        holder: HostId,
        /// Ref name.
        name: Rc<str>,
        /// Tagged child.
        child: Child,
    },
}

impl Link {
    fn hosts(&self) -> (HostId, HostId) {
        match self {
            Self::Listener { owner, holder, .. } | Self::Ref { owner, holder, .. } => {
                (*owner, *holder)
            }
        }
    }

    fn holder(&self) -> HostId {
        self.hosts().1
    }
}

/// Registry of related listeners and refs.
#[derive(Debug, Default)]
pub struct RelatedLedger {
    links: IndexMap<LinkId, Link, ahash::RandomState>,
    by_host: AHashMap<HostId, SmallVec<[LinkId; 4]>>,
    next: u64,
}

impl RelatedLedger {
    /// Empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a related listener.
    pub fn add_listener(&mut self, owner: HostId, holder: HostId, handle: WatchHandle) -> LinkId {
        self.add(Link::Listener {
            owner,
            holder,
            handle,
        })
    }

    /// Record a related ref.
    pub fn add_ref(&mut self, owner: HostId, holder: HostId, name: Rc<str>, child: Child) -> LinkId {
        self.add(Link::Ref {
            owner,
            holder,
            name,
            child,
        })
    }

    fn add(&mut self, link: Link) -> LinkId {
        let id = LinkId(self.next);
        self.next += 1;
        let (owner, holder) = link.hosts();
        self.by_host.entry(owner).or_default().push(id);
        if holder != owner {
            self.by_host.entry(holder).or_default().push(id);
        }
        self.links.insert(id, link);
        id
    }

    /// Remove and return every link `host` participates in, either side.
    pub fn take_for_host(&mut self, host: HostId) -> Vec<Link> {
        let ids = self.by_host.remove(&host).unwrap_or_default();
        ids.into_iter().filter_map(|id| self.take(id)).collect()
    }

    /// Remove and return only the links `holder` holds.
    pub fn take_held_by(&mut self, holder: HostId) -> Vec<Link> {
        let ids: Vec<LinkId> = self
            .by_host
            .get(&holder)
            .map(|ids| {
                ids.iter()
                    .copied()
                    .filter(|id| self.links.get(id).is_some_and(|l| l.holder() == holder))
                    .collect()
            })
            .unwrap_or_default();
        ids.into_iter().filter_map(|id| self.take(id)).collect()
    }

    fn take(&mut self, id: LinkId) -> Option<Link> {
        let link = self.links.shift_remove(&id)?;
        let (owner, holder) = link.hosts();
        for host in [owner, holder] {
            if let Some(ids) = self.by_host.get_mut(&host) {
                ids.retain(|other| *other != id);
                if ids.is_empty() {
                    self.by_host.remove(&host);
                }
            }
        }
        Some(link)
    }

    /// Number of live links.
    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether no link is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Number of links `host` participates in.
    #[must_use]
    pub fn links_of(&self, host: HostId) -> usize {
        self.by_host.get(&host).map_or(0, SmallVec::len)
    }
}
