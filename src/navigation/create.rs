//! Children of a node that enters the tree with the navigation.
//!
//! A new subtree has no previous route to be diffed against, so its
//! children can't cause a full page load. Cached nodes stored under the same
//! keys from an earlier visit are still reused while fresh enough, see
//! `Walker::may_reuse`.

use std::sync::Arc;

use crate::route::RouteTree;

use super::walk::{Mode, Planned, Step, Walker};

impl Walker<'_, '_> {
    pub(super) fn plan_create<'t>(&self, route: &Arc<RouteTree>) -> Planned<'t> {
        Planned {
            mode: Mode::Create,
            route: route.clone(),
        }
    }

    /// Records the leaves of a new subtree, they get scrolled into view once
    /// rendered. Nodes shared with the previous route keep their scroll
    /// position and are never recorded.
    pub(super) fn entered(&mut self, step: &Step<'_>) {
        if step.route.is_leaf() {
            tracing::trace!(path = %step.path, "new page segment");
            self.accumulation
                .scrollable_segments
                .push(step.path.clone());
        }
    }
}
