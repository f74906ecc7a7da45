use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::{Built, CacheNode, ParallelRoutes, SegmentMap};
use crate::route::{Marker, RouteTree, SegmentPath, Slots};
use crate::seed::SeedData;
use crate::segment::{ArcStr, SegmentKey};

use super::{Accumulation, Freshness, Navigation, NavigationTask};

/// How a node relates to the route being navigated away from.
#[derive(Clone, Copy)]
pub(super) enum Mode<'t> {
    /// The node is at the same place as `old_route` and is diffed against it.
    Update { old_route: &'t RouteTree },
    /// The node enters the tree with this navigation.
    Create,
}

/// A node to visit, along with what its ancestors passed down.
pub(super) struct Step<'t> {
    pub mode: Mode<'t>,
    pub route: &'t Arc<RouteTree>,
    /// Cached node stored under the same key in the old tree.
    pub old_node: Option<&'t Arc<CacheNode>>,
    /// Whether `old_node` is what's displayed right now.
    pub is_active: bool,
    pub seed: Option<&'t SeedData>,
    pub prefetch: Option<&'t SeedData>,
    pub path: SegmentPath,
    pub refresh_url: Option<ArcStr>,
    /// Whether the root layout is at or above the parent.
    pub found_root_layout: bool,
    /// Whether some ancestor is fetched from the server, in which case this
    /// node comes along with it.
    pub inside_request: bool,
}

/// Where the content of a node comes from.
enum Content<'t> {
    Reused(&'t Arc<CacheNode>),
    Built(CacheNode),
}

/// The route a child is visited with.
pub(super) struct Planned<'t> {
    pub mode: Mode<'t>,
    pub route: Arc<RouteTree>,
}

pub(super) struct Walker<'n, 'a> {
    pub navigation: &'n Navigation<'a>,
    pub stale_time_ms: u64,
    pub accumulation: &'n mut Accumulation,
}

impl Walker<'_, '_> {
    /// Reconciles one node and, recursively, all of its children.
    pub fn visit(&mut self, step: Step<'_>) -> Option<NavigationTask> {
        let route = step.route;
        let found_root_layout = step.found_root_layout || route.is_root_layout();
        let refresh_url = route.refresh_url().or(step.refresh_url.as_ref()).cloned();

        // A subtree that has to come from another page is requested on its
        // own, whatever its ancestors do.
        let starts_refresh = route.refresh_url().is_some_and(|url| {
            **url != *self.navigation.url && step.refresh_url.as_ref() != Some(url)
        });
        let ancestor_request = step.inside_request && !starts_refresh;

        // Clicking a link to the page that is already displayed refreshes its
        // dynamic content.
        let is_same_page_leaf = matches!(step.mode, Mode::Update { .. })
            && route.is_leaf()
            && self.navigation.is_same_page;

        let reused = step.old_node.filter(|old| {
            !is_same_page_leaf && !ancestor_request && self.may_reuse(old, step.is_active)
        });

        let (content, needs_request) = match reused {
            Some(old) => (Content::Reused(old), false),
            None => {
                let Built {
                    node,
                    needs_request,
                } = self.build(route, step.seed, step.prefetch);
                (Content::Built(node), needs_request)
            }
        };

        tracing::trace!(
            path = %step.path,
            segment = %route.segment,
            reused = reused.is_some(),
            needs_request,
            "visited segment"
        );

        if let Mode::Create = step.mode {
            self.entered(&step);
        }

        let inside_request = ancestor_request || needs_request;

        let mut parallel_routes = match (self.navigation.freshness, step.old_node) {
            (Freshness::RefreshAll, _) | (_, None) => ParallelRoutes::new(),
            (_, Some(old)) => old.parallel_routes.clone(),
        };
        let mut tasks = BTreeMap::new();
        let mut route_children = Slots::new();
        let mut request_children = Slots::new();
        let mut children_changed = false;
        let mut child_requests = false;

        for (slot, child_route) in &route.children {
            let planned = match step.mode {
                Mode::Update { old_route } => {
                    self.plan_update(old_route, slot, child_route, found_root_layout)?
                }
                Mode::Create => self.plan_create(child_route),
            };

            let key = planned.route.segment.key();
            let is_active = match planned.mode {
                Mode::Update { old_route } => old_route.segment.key() == key,
                Mode::Create => false,
            };

            let child = self.visit(Step {
                mode: planned.mode,
                route: &planned.route,
                old_node: step.old_node.and_then(|old| old.child(slot, &key)),
                is_active,
                seed: step.seed.and_then(|seed| seed.child(slot)),
                prefetch: step.prefetch.and_then(|prefetch| prefetch.child(slot)),
                path: step.path.join(slot, &planned.route.segment),
                refresh_url: refresh_url.clone(),
                found_root_layout,
                inside_request,
            })?;

            attach(&mut parallel_routes, slot, key, &child.node);

            children_changed |= !Arc::ptr_eq(&child.route, child_route);
            route_children.insert(slot.clone(), child.route.clone());

            match &child.dynamic_request_tree {
                Some(request) => {
                    child_requests = true;
                    request_children.insert(slot.clone(), request.clone());
                }
                None => {
                    request_children.insert(slot.clone(), child.route.clone());
                }
            }

            tasks.insert(slot.clone(), child);
        }

        let node = match content {
            Content::Built(mut node) => {
                node.parallel_routes = parallel_routes;
                Arc::new(node)
            }
            Content::Reused(old) => CacheNode::reuse(old, parallel_routes, self.drop_prefetch(old)),
        };

        let patched = match children_changed {
            true => Arc::new(route.patch_children(route_children)),
            false => route.clone(),
        };

        let dynamic_request_tree = match needs_request || child_requests {
            true => {
                let request = route.patch_children(request_children);
                let request = match needs_request && !ancestor_request {
                    true => self.stamp(request, refresh_url.as_ref()),
                    false => request,
                };
                Some(Arc::new(request))
            }
            false => None,
        };

        Some(NavigationTask {
            route: patched,
            node,
            dynamic_request_tree,
            refresh_url,
            children: (!inside_request).then_some(tasks),
        })
    }

    fn may_reuse(&self, old: &CacheNode, is_active: bool) -> bool {
        match self.navigation.freshness {
            Freshness::RefreshAll => false,
            Freshness::HistoryTraversal => true,
            Freshness::Default => {
                is_active || !old.is_stale(self.navigation.now, self.stale_time_ms)
            }
        }
    }

    /// Going back in history shows settled content instead of the prefetched
    /// stand-in. Otherwise the node is kept untouched.
    fn drop_prefetch(&self, old: &CacheNode) -> bool {
        self.navigation.freshness == Freshness::HistoryTraversal && !old.rsc.is_pending()
    }

    /// Content for a node that can't be reused, from the best source at hand.
    fn build(
        &self,
        route: &RouteTree,
        seed: Option<&SeedData>,
        prefetch: Option<&SeedData>,
    ) -> Built {
        let navigation = self.navigation;
        let debug_info = &navigation.debug_info;

        match (seed, prefetch) {
            (Some(seed), _) => {
                CacheNode::from_seed(route, seed, navigation.seed_head, navigation.now, debug_info)
            }
            (None, Some(prefetch)) => CacheNode::from_prefetch(
                route,
                prefetch,
                navigation.prefetch_head,
                navigation.now,
                debug_info,
            ),
            (None, None) => CacheNode::spawn(route, navigation.now, debug_info),
        }
    }

    /// Marks the topmost node of a subtree the server has to render.
    fn stamp(&mut self, request: RouteTree, refresh_url: Option<&ArcStr>) -> RouteTree {
        match refresh_url {
            Some(url) if **url != *self.navigation.url => {
                self.accumulation.separate_refresh_urls.insert(url.clone());
                request
                    .with_url(Some(url.clone()))
                    .with_marker(Some(Marker::Refresh))
            }
            _ => request.with_marker(Some(Marker::Refetch)),
        }
    }
}

/// Puts `child` into its slot, copying the slot map only if it changes.
fn attach(routes: &mut ParallelRoutes, slot: &ArcStr, key: SegmentKey, child: &Arc<CacheNode>) {
    let existing = routes.get(slot);
    if existing
        .and_then(|map| map.get(&key))
        .is_some_and(|node| Arc::ptr_eq(node, child))
    {
        return;
    }

    let mut map = existing.map(|map| SegmentMap::clone(map)).unwrap_or_default();
    map.insert(key, child.clone());
    routes.insert(slot.clone(), Arc::new(map));
}
