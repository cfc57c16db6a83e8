#![forbid(unsafe_code)]

//! Component runtime for weave.
//!
//! This crate provides:
//! - [`Runtime`] owning component hosts, their lifecycle and the update mailbox
//! - [`Cx`], the hook context components render, bind and mount through
//! - [`RelatedLedger`] tying slot-content listeners and refs to both the
//!   template owner and the host that rendered them
//! - [`reconcile::plan`], the keyed two-cursor list diff, and the built-in
//!   [`If`] and [`For`] components
//!
//! # Example
//!
//! ```
//! use weave_runtime::{Child, Cx, Mount, Runtime};
//!
//! let mut rt = Runtime::new();
//! let body = rt.doc().create_element("body");
//! let model = rt.graph().vm_object([("greeting", "hello")]);
//!
//! rt.mount_root(
//!     Mount::from_fn(move |cx: &mut Cx<'_>| {
//!         let p = cx.element("p");
//!         let text = cx.bound_text(model, "greeting")?;
//!         cx.append(p, text)?;
//!         Ok(vec![Child::Dom(p)])
//!     }),
//!     body,
//! )
//! .unwrap();
//!
//! rt.graph().set(model, "greeting", "goodbye").unwrap();
//! rt.tick().unwrap();
//! assert_eq!(rt.doc().inner_html(body), "<p>goodbye</p>");
//! ```

pub mod components;
pub mod config;
pub mod context;
pub mod cx;
pub mod diagnostics;
pub mod error;
pub mod host;
pub mod ledger;
pub mod reconcile;
pub mod runtime;

pub use components::{For, If, KeyFn, KeyMode};
pub use config::{ConfigError, RuntimeConfig};
pub use context::Context;
pub use cx::{Cx, UpdateTrigger};
pub use diagnostics::{Diagnostic, Diagnostics};
pub use error::RuntimeError;
pub use host::{Child, Component, HostId, HostState, Mount, RenderFn, Slot};
pub use ledger::{Link, LinkId, RelatedLedger};
pub use reconcile::{EditScript, plan, plan_by_index};
pub use runtime::Runtime;
