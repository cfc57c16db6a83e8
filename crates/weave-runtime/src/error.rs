#![forbid(unsafe_code)]

//! Runtime errors.
//!
//! Everything here is a contract violation surfaced at the call site.
//! Late operations against destroyed hosts are not errors; they are skipped
//! and logged at `trace` level.

use thiserror::Error;
use weave_core::{ArenaFull, GraphError, WatchError};
use weave_dom::DomError;

use crate::host::HostId;

/// Errors raised by [`Runtime`](crate::Runtime) and [`Cx`](crate::Cx).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// A render function returned no nodes.
    #[error("render of {host:?} returned no nodes; render at least a placeholder")]
    EmptyRender {
        /// The host being rendered.
        host: HostId,
    },
    /// `render` called twice on one host.
    #[error("{host:?} has already rendered")]
    AlreadyRendered {
        /// The host.
        host: HostId,
    },
    /// `set_context` after the host reached `Rendered`.
    #[error("context of {host:?} is frozen after render (setting `{key}`)")]
    ContextFrozen {
        /// The host.
        host: HostId,
        /// The key being set.
        key: String,
    },
    /// Re-setting a context key without the override flag.
    #[error("context key `{key}` is already set on {host:?}; pass override to replace it")]
    ContextKeyExists {
        /// The host.
        host: HostId,
        /// The existing key.
        key: String,
    },
    /// Handle does not refer to a live host.
    #[error("{host:?} does not exist")]
    HostNotFound {
        /// The stale handle.
        host: HostId,
    },
    /// A structural component was asked to move DOM it cannot locate.
    #[error("{host:?} has no attached DOM to update")]
    Unmounted {
        /// The host.
        host: HostId,
    },
    /// No more hosts can be allocated.
    #[error("cannot create host: {0}")]
    Capacity(#[from] ArenaFull),
    /// Graph contract violation.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// DOM hierarchy violation.
    #[error(transparent)]
    Dom(#[from] DomError),
    /// Invalid watch path.
    #[error(transparent)]
    Watch(#[from] WatchError),
}
