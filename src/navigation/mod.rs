//! Client-side navigation.
//!
//! A navigation walks the current render tree and the route tree of the
//! target page together and, without waiting for the server, produces:
//!
//! * a new render tree that can be rendered right away, with pending
//!   [`Deferred`](crate::Deferred) placeholders wherever content is missing,
//! * a *dynamic request tree* telling the server which segments it still has
//!   to render,
//! * a [`NavigationTask`] that knows where the placeholders are, so that the
//!   server response can be written into them once it streams in.
//!
//! When the two trees can't be reconciled, for example because the root
//! layout changed, [`Reconciler::reconcile`] returns `None` and the caller
//! should load the target URL from scratch.

mod create;
mod diff;
mod walk;
mod writer;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::cache::CacheNode;
use crate::config::RouterConfig;
use crate::deferred::DebugInfo;
use crate::route::{RouteTree, SegmentPath};
use crate::seed::{Head, SeedData};
use crate::segment::{ArcStr, matches};

use self::walk::{Mode, Step, Walker};

/// How much of the existing render tree a navigation may keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Freshness {
    /// Shared layouts keep their content. Cached segments that are not on
    /// screen are reused until they go stale.
    #[default]
    Default,
    /// Back/forward navigation. Everything cached is reused no matter its
    /// age. Stand-ins are dropped from nodes whose content has settled, so
    /// the page doesn't flash back to a loading state.
    HistoryTraversal,
    /// Nothing is reused and inactive slots are dropped, the whole page is
    /// fetched again.
    RefreshAll,
}

/// Everything a single navigation knows up front.
#[derive(Debug, Clone)]
pub struct Navigation<'a> {
    /// Current time in milliseconds, stamped on every node created.
    pub now: u64,
    /// URL of the page being navigated away from.
    pub old_url: &'a str,
    /// URL of the page being navigated to.
    pub url: &'a str,
    pub freshness: Freshness,
    /// Content that came along with the navigation itself.
    pub seed: Option<&'a SeedData>,
    pub seed_head: Option<&'a Head>,
    /// Content of an earlier prefetch of the target URL.
    pub prefetch: Option<&'a SeedData>,
    pub prefetch_head: Option<&'a Head>,
    /// Set when the target URL is the URL currently displayed.
    pub is_same_page: bool,
    /// Attached to every placeholder this navigation creates.
    pub debug_info: DebugInfo,
}

impl<'a> Navigation<'a> {
    pub fn new(old_url: &'a str, url: &'a str, now: u64) -> Self {
        Self {
            now,
            old_url,
            url,
            freshness: Freshness::Default,
            seed: None,
            seed_head: None,
            prefetch: None,
            prefetch_head: None,
            is_same_page: false,
            debug_info: DebugInfo::default(),
        }
    }

    pub fn freshness(mut self, freshness: Freshness) -> Self {
        self.freshness = freshness;
        self
    }

    pub fn seed(mut self, seed: &'a SeedData, head: Option<&'a Head>) -> Self {
        self.seed = Some(seed);
        self.seed_head = head;
        self
    }

    pub fn prefetch(mut self, prefetch: &'a SeedData, head: Option<&'a Head>) -> Self {
        self.prefetch = Some(prefetch);
        self.prefetch_head = head;
        self
    }

    pub fn same_page(mut self, is_same_page: bool) -> Self {
        self.is_same_page = is_same_page;
        self
    }
}

/// Facts collected over the whole tree during a navigation.
#[derive(Debug, Default)]
pub struct Accumulation {
    /// Leaves of newly entered subtrees, to be scrolled into view once the
    /// navigation is rendered.
    pub scrollable_segments: Vec<SegmentPath>,
    /// URLs other than the target URL that some segments have to be fetched
    /// from. Each gets a request of its own.
    pub separate_refresh_urls: BTreeSet<ArcStr>,
}

/// Pending work of one navigation, mirroring the part of the new tree that
/// still waits for the server.
#[derive(Debug)]
pub struct NavigationTask {
    /// Route of this node, with children as they were reconciled.
    pub route: Arc<RouteTree>,
    pub node: Arc<CacheNode>,
    /// What still has to be requested for this subtree, `None` once nothing
    /// does.
    pub dynamic_request_tree: Option<Arc<RouteTree>>,
    /// URL this subtree is fetched from when it isn't the target URL.
    pub refresh_url: Option<ArcStr>,
    /// Only tracked until the first node that needs a request. Below it the
    /// whole subtree is filled from the cache nodes.
    pub children: Option<BTreeMap<ArcStr, NavigationTask>>,
}

impl NavigationTask {
    /// Whether some part of this subtree still waits for the server.
    pub fn is_pending(&self) -> bool {
        self.dynamic_request_tree.is_some()
    }
}

/// Reconciles render trees on navigation.
#[derive(Debug, Clone)]
pub struct Reconciler {
    stale_time_ms: u64,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(&RouterConfig::default())
    }
}

impl Reconciler {
    pub fn new(config: &RouterConfig) -> Self {
        Self {
            stale_time_ms: config.dynamic_stale_time_ms,
        }
    }

    /// Builds the render tree for `route` out of the render tree `node` that
    /// is displayed for `old_route`.
    ///
    /// Returns `None` when the trees are structurally incompatible and the
    /// page has to be loaded from scratch.
    pub fn reconcile(
        &self,
        navigation: &Navigation<'_>,
        node: &Arc<CacheNode>,
        old_route: &RouteTree,
        route: &Arc<RouteTree>,
        accumulation: &mut Accumulation,
    ) -> Option<NavigationTask> {
        let span = tracing::debug_span!(
            "reconcile",
            url = navigation.url,
            freshness = ?navigation.freshness,
            same_page = navigation.is_same_page,
        );
        let _enter = span.enter();

        if route.segment.is_not_found() || !matches(&route.segment, &old_route.segment) {
            tracing::debug!(
                old = %old_route.segment,
                new = %route.segment,
                "root segment changed, falling back to a full page load"
            );
            return None;
        }

        let mut walker = Walker {
            navigation,
            stale_time_ms: self.stale_time_ms,
            accumulation,
        };

        let task = walker.visit(Step {
            mode: Mode::Update { old_route },
            route,
            old_node: Some(node),
            is_active: true,
            seed: navigation.seed,
            prefetch: navigation.prefetch,
            path: SegmentPath::root(),
            refresh_url: None,
            found_root_layout: false,
            inside_request: false,
        });

        match &task {
            Some(task) => tracing::debug!(
                pending = task.is_pending(),
                separate_requests = walker.accumulation.separate_refresh_urls.len(),
                "navigation reconciled"
            ),
            None => tracing::debug!("navigation can't be reconciled"),
        }

        task
    }
}
