#![forbid(unsafe_code)]

use tracing::debug;
use weave_core::Key;

use super::placeholder;
use crate::cx::Cx;
use crate::error::RuntimeError;
use crate::host::{Child, Component};

/// Conditional block.
///
/// Reads the `expect` attribute. While it is truthy the `then` slot is
/// rendered, otherwise the `else` slot; a missing slot leaves a placeholder
/// comment. Switching branches renders the new one before the old, then
/// tears the old branch down, including listeners its content registered
/// for the template owner.
#[derive(Debug, Default)]
pub struct If {
    shown: Option<bool>,
}

impl If {
    /// Attribute holding the condition.
    pub const EXPECT: &'static str = "expect";
    /// Slot rendered while the condition holds.
    pub const THEN: &'static str = "then";
    /// Slot rendered otherwise.
    pub const ELSE: &'static str = "else";

    /// New conditional.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn branch(cx: &mut Cx<'_>, truthy: bool) -> Result<Vec<Child>, RuntimeError> {
        let children = cx.render_slot(if truthy { Self::THEN } else { Self::ELSE })?;
        if children.is_empty() {
            Ok(vec![Child::Dom(placeholder(cx))])
        } else {
            Ok(children)
        }
    }
}

impl Component for If {
    fn render(&mut self, cx: &mut Cx<'_>) -> Result<Vec<Child>, RuntimeError> {
        let attrs = cx.attrs();
        cx.observe(attrs, Self::EXPECT)?;
        let truthy = cx.attr(Self::EXPECT).is_truthy();
        self.shown = Some(truthy);
        Self::branch(cx, truthy)
    }

    fn update(&mut self, cx: &mut Cx<'_>, _path: &[Key]) -> Result<(), RuntimeError> {
        let truthy = cx.attr(Self::EXPECT).is_truthy();
        if self.shown == Some(truthy) {
            return Ok(());
        }
        let old_roots = cx.root_nodes();
        let old_non_root = cx.non_root_hosts();
        let anchor = old_roots
            .iter()
            .find_map(|child| cx.dom_nodes(*child).first().copied());
        let Some((anchor, parent)) = anchor.and_then(|a| cx.doc().parent(a).map(|p| (a, p))) else {
            return Err(RuntimeError::Unmounted { host: cx.host() });
        };
        self.shown = Some(truthy);

        cx.release_related();
        let fresh = Self::branch(cx, truthy)?;
        let fragment = cx.fragment();
        for child in &fresh {
            cx.append(fragment, *child)?;
        }
        cx.doc().insert_before(parent, fragment, Some(anchor))?;
        cx.doc().dispose(fragment);

        for host in old_non_root {
            cx.destroy_child(host, false);
        }
        for child in old_roots {
            match child {
                Child::Host(host) => cx.destroy_child(host, true),
                Child::Dom(node) => cx.doc().dispose(node),
            }
        }
        cx.set_root_nodes(fresh);
        debug!(host = ?cx.host(), truthy, "if branch switched");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "If"
    }
}
