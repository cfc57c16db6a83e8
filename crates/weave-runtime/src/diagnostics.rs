#![forbid(unsafe_code)]

//! Non-fatal authoring problems found while rendering.
//!
//! Diagnostics never interrupt rendering. Each one is logged with `warn!`
//! and kept in a shared buffer tests (or dev tooling) can drain.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::warn;

use crate::host::HostId;

/// A reported problem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Diagnostic {
    /// Two list items share a key; the later one is recreated instead of
    /// reused.
    DuplicateKey {
        /// The list host.
        host: HostId,
        /// Rendered key.
        key: String,
        /// Index of the first occurrence.
        first: usize,
        /// Index of the duplicate.
        duplicate: usize,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateKey {
                host,
                key,
                first,
                duplicate,
            } => write!(
                f,
                "{host:?}: duplicate list key {key} at {duplicate} (first at {first})"
            ),
        }
    }
}

/// Shared diagnostic buffer.
#[derive(Clone, Default)]
pub struct Diagnostics {
    records: Rc<RefCell<Vec<Diagnostic>>>,
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("len", &self.len())
            .finish()
    }
}

impl Diagnostics {
    /// Empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Log and record a diagnostic.
    pub fn report(&self, diagnostic: Diagnostic) {
        warn!(%diagnostic, "render diagnostic");
        self.records.borrow_mut().push(diagnostic);
    }

    /// Drain recorded diagnostics.
    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.records.borrow_mut())
    }

    /// Copy of recorded diagnostics.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.records.borrow().clone()
    }

    /// Number of recorded diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
