//! Children of a node shared with the previous route.

use std::sync::Arc;

use crate::route::{Marker, RouteTree};
use crate::segment::{ArcStr, matches};

use super::walk::{Mode, Planned, Walker};

impl Walker<'_, '_> {
    /// Decides how the child in `slot` of a shared node is visited. Returns
    /// `None` when the page has to be loaded from scratch instead.
    pub(super) fn plan_update<'t>(
        &self,
        old_route: &'t RouteTree,
        slot: &ArcStr,
        route: &Arc<RouteTree>,
        found_root_layout: bool,
    ) -> Option<Planned<'t>> {
        let Some(old_child) = old_route.children.get(slot) else {
            tracing::warn!(
                slot = &**slot,
                segment = %route.segment,
                "slot missing from the previous route"
            );
            return None;
        };

        if route.segment.is_default() {
            return Some(Planned {
                mode: Mode::Update {
                    old_route: old_child,
                },
                route: self.reuse_default_slot(old_child),
            });
        }

        if matches(&route.segment, &old_child.segment) {
            return Some(Planned {
                mode: Mode::Update {
                    old_route: old_child,
                },
                route: route.clone(),
            });
        }

        if !found_root_layout {
            tracing::debug!(
                old = %old_child.segment,
                new = %route.segment,
                "root layout changed"
            );
            return None;
        }

        if route.segment.is_not_found() {
            tracing::debug!("navigating to the global not-found page");
            return None;
        }

        Some(Planned {
            mode: Mode::Create,
            route: route.clone(),
        })
    }

    /// The server never renders a default slot on a soft navigation, the
    /// slot keeps showing what it showed before. Should it ever need fresh
    /// content, that has to come from the page that rendered it, so the
    /// previous URL is recorded on it.
    fn reuse_default_slot(&self, old_route: &Arc<RouteTree>) -> Arc<RouteTree> {
        if old_route.marker() == Some(Marker::Refresh) {
            return old_route.clone();
        }

        let reused = old_route
            .patch_children(old_route.children.clone())
            .with_url(Some(self.navigation.old_url.into()))
            .with_marker(Some(Marker::Refresh));

        Arc::new(reused)
    }
}
