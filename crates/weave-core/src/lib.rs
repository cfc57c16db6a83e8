#![forbid(unsafe_code)]

//! Reactive view-model graph for weave.
//!
//! This crate provides:
//! - [`Graph`] holding objects and arrays as deep-tracked view-models
//! - [`WatchTree`] matching change paths against `a.b`, `*` and `**` watchers
//! - [`Scheduler`] coalescing batched notifications into explicit ticks
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use weave_core::{DispatchMode, Graph, Key, Value, path_string};
//!
//! let graph = Graph::new();
//! let profile = graph.object([("name", Value::from("ada"))]);
//! let root = graph.vm_object([("profile", Value::Node(profile))]);
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&seen);
//! graph
//!     .watch(root, "profile.name", DispatchMode::Batched, move |path: &[Key]| {
//!         sink.borrow_mut().push(path_string(path));
//!     })
//!     .unwrap();
//!
//! graph.set(profile, "name", "grace").unwrap();
//! graph.set(profile, "name", "hopper").unwrap();
//! graph.flush();
//! assert_eq!(*seen.borrow(), vec!["profile.name"]);
//! ```

pub mod arena;
pub mod array;
pub mod config;
pub mod error;
pub mod graph;
#[cfg(feature = "json")]
pub mod json;
pub mod key;
pub mod scheduler;
pub mod value;
pub mod watch;

pub use arena::{Arena, ArenaFull, RawHandle};
pub use config::GraphConfig;
pub use error::{GraphError, WatchError};
pub use graph::{Graph, NodeFlags, NodeId, WatchHandle, WeakGraph};
pub use key::{DEEP_WILDCARD, Key, WILDCARD, WatchPath, path_string};
pub use scheduler::Scheduler;
pub use value::{Identity, Opaque, Value};
pub use watch::{DispatchMode, Handler, HandlerEntry, Matched, WatchTree, WatcherId};
