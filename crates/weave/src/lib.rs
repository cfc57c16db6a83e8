#![forbid(unsafe_code)]

//! weave: a component runtime over a reactive view-model graph.
//!
//! This crate re-exports the workspace crates under one roof:
//! - [`core`]: the view-model [`Graph`], path watchers and the batching scheduler
//! - [`dom`]: the in-memory [`Document`] components render into
//! - [`runtime`]: component hosts, the related-listener ledger and the
//!   built-in [`If`] and [`For`] components
//!
//! Most programs only need the [`prelude`].

pub use weave_core as core;
pub use weave_dom as dom;
pub use weave_runtime as runtime;

pub use weave_core::{DispatchMode, Graph, GraphError, Key, NodeId, Value};
pub use weave_dom::{Document, DomId};
pub use weave_runtime::{
    Child, Component, Cx, For, HostId, HostState, If, KeyMode, Mount, Runtime, RuntimeConfig,
    RuntimeError,
};

/// Everything a component author typically imports.
pub mod prelude {
    pub use weave_core::{
        DispatchMode, Graph, GraphError, Identity, Key, NodeId, Value, WatchHandle, path_string,
    };
    pub use weave_dom::{Document, DomId};
    pub use weave_runtime::{
        Child, Component, Cx, Diagnostic, For, HostId, HostState, If, KeyMode, Mount, Runtime,
        RuntimeConfig, RuntimeError, Slot,
    };
}
