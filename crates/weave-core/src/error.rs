#![forbid(unsafe_code)]

//! Error types for the view-model graph.
//!
//! Every variant here is a contract violation: a bug in the code driving the
//! graph rather than a data condition. Late operations on destroyed nodes are
//! not errors; they are ignored (see [`crate::graph`]).

use thiserror::Error;

use crate::graph::NodeId;
use crate::key::Key;

/// Invalid watch path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchError {
    /// A path with no segments.
    #[error("watch path is empty")]
    EmptyPath,
    /// A path like `a..b`.
    #[error("watch path `{path}` contains an empty segment")]
    EmptySegment {
        /// The offending path.
        path: String,
    },
    /// `**` used anywhere but the last segment.
    #[error("`**` must be the last segment of a watch path, got `{path}`")]
    DeepWildcardNotLast {
        /// The offending path.
        path: String,
    },
}

/// Errors raised by [`Graph`](crate::Graph) operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    /// A plain (untracked) object was assigned to a public property of a node
    /// that requires view-model values.
    #[error("property `{key}` of {node:?} requires a view-model, got an untracked object")]
    NotViewModel {
        /// The strict node.
        node: NodeId,
        /// The property being written.
        key: Key,
    },
    /// `length` set to something other than a non-negative integer.
    #[error("array length must be a non-negative integer, got {found}")]
    InvalidLength {
        /// Description of the rejected value.
        found: String,
    },
    /// A non-index key used on an array.
    #[error("`{key}` is not a valid array index")]
    InvalidIndex {
        /// The rejected key.
        key: Key,
    },
    /// Object operation on an array or vice versa.
    #[error("{node:?} is not {expected}")]
    WrongShape {
        /// The node.
        node: NodeId,
        /// "an object" or "an array".
        expected: &'static str,
    },
    /// Watching a node that has not been wrapped.
    #[error("{node:?} is not a view-model; wrap it before watching")]
    Untracked {
        /// The raw node.
        node: NodeId,
    },
    /// Watching a node that was destroyed.
    #[error("{node:?} has been destroyed")]
    Detached {
        /// The stale handle.
        node: NodeId,
    },
    /// Invalid watch path.
    #[error(transparent)]
    Watch(#[from] WatchError),
}
