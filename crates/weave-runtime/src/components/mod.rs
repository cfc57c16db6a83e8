#![forbid(unsafe_code)]

//! Built-in structural components.
//!
//! - [`If`]: renders one of two slots depending on a truthy attribute.
//! - [`For`]: renders the default slot once per array item, reconciling
//!   keyed items on change.

mod for_each;
mod if_block;

pub use for_each::{For, KeyFn, KeyMode};
pub use if_block::If;

use weave_dom::DomId;

use crate::cx::Cx;

/// Comment left in place of empty structural content, so later content has
/// an insertion point.
fn placeholder(cx: &Cx<'_>) -> DomId {
    cx.comment(cx.config().placeholder_text.clone())
}
