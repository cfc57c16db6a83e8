#![forbid(unsafe_code)]

//! In-memory DOM backend for weave.
//!
//! The runtime mutates real nodes directly (no virtual tree); [`Document`]
//! is the node store it mutates, with [`DomStats`] counters so tests can
//! assert how much DOM work an update performed.

pub mod document;

pub use document::{DomError, DomId, DomStats, Document, NodeKind};
