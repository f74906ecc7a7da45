//! The render tree kept by the router.
//!
//! Every [`CacheNode`] holds the rendered content of one segment and the
//! cached nodes of its slots. Nodes are shared between successive router
//! states through `Arc`, so they are never modified after construction. The
//! only thing that changes is the state of a [`Deferred`] placeholder inside
//! them, which goes from pending to settled exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::deferred::{DebugInfo, Deferred};
use crate::route::RouteTree;
use crate::seed::{Head, SeedData};
use crate::segment::{ArcStr, SegmentKey};

/// Rendered content, shared between every tree generation that shows it.
pub type Payload = Arc<Value>;

/// Cached children of a single slot.
pub type SegmentMap = HashMap<SegmentKey, Arc<CacheNode>>;

/// Cached children of a node, by slot name. The per-slot maps are shared too,
/// a slot that did not change keeps pointing at the same map.
pub type ParallelRoutes = HashMap<ArcStr, Arc<SegmentMap>>;

/// A content field of a [`CacheNode`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "Value")]
pub enum Resource {
    /// No content. The renderer falls back to fetching it lazily.
    #[default]
    Empty,
    Ready(Payload),
    /// Content that is still streaming in. The placeholder is told apart from
    /// ordinary content by this variant, never by the shape of the payload.
    Deferred(Deferred<Resource>),
}

impl Resource {
    /// Wraps a payload, treating `null` as no content.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => Resource::Empty,
            value => Resource::Ready(Arc::new(value)),
        }
    }

    /// A fresh pending placeholder.
    pub fn deferred() -> Self {
        Resource::Deferred(Deferred::new())
    }

    pub fn as_deferred(&self) -> Option<&Deferred<Resource>> {
        match self {
            Resource::Deferred(deferred) => Some(deferred),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Resource::Empty)
    }

    /// Whether this is a placeholder that has not settled yet.
    pub fn is_pending(&self) -> bool {
        self.as_deferred().is_some_and(Deferred::is_pending)
    }

    /// The content, following settled placeholders to whatever they resolved
    /// to.
    pub fn payload(&self) -> Option<Payload> {
        match self {
            Resource::Empty => None,
            Resource::Ready(payload) => Some(payload.clone()),
            Resource::Deferred(deferred) => match deferred.value() {
                Some(Ok(resource)) => resource.payload(),
                _ => None,
            },
        }
    }
}

impl From<Value> for Resource {
    fn from(value: Value) -> Self {
        Resource::from_value(value)
    }
}

/// Rendered content of one segment.
#[derive(Debug, Clone, Default)]
pub struct CacheNode {
    pub rsc: Resource,
    /// Prefetched stand-in for `rsc`, displayed while `rsc` is pending.
    pub prefetch_rsc: Resource,
    /// Head of the page, only present on leaves.
    pub head: Resource,
    pub prefetch_head: Resource,
    pub loading: Resource,
    pub parallel_routes: ParallelRoutes,
    /// Timestamp in milliseconds of the navigation that created the content.
    pub navigated_at: u64,
}

/// A node built for one segment, before its children are attached.
#[derive(Debug)]
pub(crate) struct Built {
    pub node: CacheNode,
    /// Whether some of the node's content has to come from the server.
    pub needs_request: bool,
}

impl CacheNode {
    pub fn child(&self, slot: &str, key: &SegmentKey) -> Option<&Arc<CacheNode>> {
        self.parallel_routes.get(slot).and_then(|map| map.get(key))
    }

    /// Whether the dynamic content is older than `stale_time_ms` at `now`.
    pub fn is_stale(&self, now: u64, stale_time_ms: u64) -> bool {
        now.saturating_sub(self.navigated_at) >= stale_time_ms
    }

    fn has_prefetch(&self) -> bool {
        !self.prefetch_rsc.is_empty() || !self.prefetch_head.is_empty()
    }

    /// Reuses an existing node with new children.
    ///
    /// When neither the children nor the prefetch fields change, the existing
    /// node is returned as is.
    pub fn reuse(
        existing: &Arc<CacheNode>,
        parallel_routes: ParallelRoutes,
        drop_prefetch: bool,
    ) -> Arc<CacheNode> {
        let drop_prefetch = drop_prefetch && existing.has_prefetch();
        if !drop_prefetch && same_routes(&existing.parallel_routes, &parallel_routes) {
            return existing.clone();
        }

        let (prefetch_rsc, prefetch_head) = match drop_prefetch {
            true => (Resource::Empty, Resource::Empty),
            false => (existing.prefetch_rsc.clone(), existing.prefetch_head.clone()),
        };

        Arc::new(CacheNode {
            rsc: existing.rsc.clone(),
            prefetch_rsc,
            head: existing.head.clone(),
            prefetch_head,
            loading: existing.loading.clone(),
            parallel_routes,
            navigated_at: existing.navigated_at,
        })
    }

    /// Builds a node from content the server already sent along with the
    /// navigation.
    pub(crate) fn from_seed(
        route: &RouteTree,
        seed: &SeedData,
        head: Option<&Head>,
        now: u64,
        debug_info: &DebugInfo,
    ) -> Built {
        Self::from_data(route, seed, head, now, debug_info)
    }

    /// Builds a node from prefetched content.
    pub(crate) fn from_prefetch(
        route: &RouteTree,
        prefetch: &SeedData,
        head: Option<&Head>,
        now: u64,
        debug_info: &DebugInfo,
    ) -> Built {
        Self::from_data(route, prefetch, head, now, debug_info)
    }

    /// Complete content is used directly. Partial content becomes a pending
    /// placeholder, keeping what is known as the prefetch stand-in.
    fn from_data(
        route: &RouteTree,
        data: &SeedData,
        head: Option<&Head>,
        now: u64,
        debug_info: &DebugInfo,
    ) -> Built {
        let mut needs_request = data.is_partial;

        let (rsc, prefetch_rsc) = match data.is_partial {
            true => (pending(debug_info), data.rsc.clone()),
            false => (data.rsc.clone(), Resource::Empty),
        };

        let loading = match (&data.loading, data.is_partial) {
            (Resource::Empty, true) => pending(debug_info),
            (loading, _) => loading.clone(),
        };

        let (head, prefetch_head) = match (route.is_leaf(), head) {
            (false, _) => (Resource::Empty, Resource::Empty),
            (true, Some(head)) if !head.is_partial => (head.content.clone(), Resource::Empty),
            (true, Some(head)) => {
                needs_request = true;
                (pending(debug_info), head.content.clone())
            }
            (true, None) => {
                needs_request = true;
                (pending(debug_info), Resource::Empty)
            }
        };

        Built {
            node: CacheNode {
                rsc,
                prefetch_rsc,
                head,
                prefetch_head,
                loading,
                parallel_routes: ParallelRoutes::new(),
                navigated_at: now,
            },
            needs_request,
        }
    }

    /// Builds a node without any content. Everything is pending.
    pub(crate) fn spawn(route: &RouteTree, now: u64, debug_info: &DebugInfo) -> Built {
        let head = match route.is_leaf() {
            true => pending(debug_info),
            false => Resource::Empty,
        };

        Built {
            node: CacheNode {
                rsc: pending(debug_info),
                prefetch_rsc: Resource::Empty,
                head,
                prefetch_head: Resource::Empty,
                loading: pending(debug_info),
                parallel_routes: ParallelRoutes::new(),
                navigated_at: now,
            },
            needs_request: true,
        }
    }

    /// Visits every placeholder in this subtree that is still pending.
    pub fn pending(&self) -> Vec<Deferred<Resource>> {
        let mut acc = Vec::new();
        self.collect_pending(&mut acc);
        acc
    }

    fn collect_pending(&self, acc: &mut Vec<Deferred<Resource>>) {
        for resource in [&self.rsc, &self.head, &self.loading] {
            if let Some(deferred) = resource.as_deferred()
                && deferred.is_pending()
                && !acc.iter().any(|known| known.ptr_eq(deferred))
            {
                acc.push(deferred.clone());
            }
        }
        for map in self.parallel_routes.values() {
            for child in map.values() {
                child.collect_pending(acc);
            }
        }
    }
}

fn pending(debug_info: &DebugInfo) -> Resource {
    Resource::Deferred(Deferred::with_debug_info(debug_info.clone()))
}

/// Whether both maps hold the very same slot maps.
pub(crate) fn same_routes(a: &ParallelRoutes, b: &ParallelRoutes) -> bool {
    a.len() == b.len()
        && a.iter().all(|(slot, map)| {
            b.get(slot)
                .is_some_and(|other| Arc::ptr_eq(map, other))
        })
}
