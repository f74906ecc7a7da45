//! Writing server responses into the placeholders of a navigation.
//!
//! Responses never replace content, they only settle placeholders that are
//! still pending. Whatever settled first stays, which makes duplicate or
//! overlapping responses harmless.

use crate::cache::{CacheNode, Resource};
use crate::deferred::DebugInfo;
use crate::error::FetchError;
use crate::route::{Marker, RouteTree, SegmentPath};
use crate::seed::SeedData;
use crate::segment::{ArcStr, Segment, matches};

use super::NavigationTask;

impl NavigationTask {
    /// Writes a response covering the whole tree.
    pub fn write(
        &mut self,
        tree: &RouteTree,
        data: &SeedData,
        head: Option<&Resource>,
        debug_info: Option<&DebugInfo>,
    ) {
        self.write_at(&SegmentPath::root(), tree, data, head, debug_info);
    }

    /// Writes a response for the subtree at `path`. The root of `tree` is
    /// the segment at the end of `path`.
    ///
    /// Responses for parts of the tree that are no longer pending, or that
    /// don't match the task, are dropped.
    pub fn write_at(
        &mut self,
        path: &SegmentPath,
        tree: &RouteTree,
        data: &SeedData,
        head: Option<&Resource>,
        debug_info: Option<&DebugInfo>,
    ) {
        self.write_steps(path.steps(), tree, data, head, debug_info);
    }

    fn write_steps(
        &mut self,
        steps: &[(ArcStr, Segment)],
        tree: &RouteTree,
        data: &SeedData,
        head: Option<&Resource>,
        debug_info: Option<&DebugInfo>,
    ) {
        let Some(((slot, segment), rest)) = steps.split_first() else {
            return self.finish(tree, data, head, debug_info);
        };

        let Some(children) = self.children.as_mut() else {
            // Below the first requested node only the cache nodes know where
            // the placeholders are. This is where responses for separately
            // refreshed slots land.
            if let Some((node, route)) = locate(&self.node, &self.route, steps) {
                finish_node(node, route, tree, data, head, debug_info);
                if self.node.pending().is_empty() {
                    self.dynamic_request_tree = None;
                }
            }
            return;
        };

        let Some(child) = children.get_mut(&**slot) else {
            tracing::trace!(slot = &**slot, "no pending task at response path");
            return;
        };

        if !matches(segment, &child.route.segment) {
            tracing::trace!(slot = &**slot, %segment, "response path doesn't match the task");
            return;
        }

        child.write_steps(rest, tree, data, head, debug_info);

        if children.values().all(|child| !child.is_pending()) {
            self.dynamic_request_tree = None;
        }
    }

    fn finish(
        &mut self,
        tree: &RouteTree,
        data: &SeedData,
        head: Option<&Resource>,
        debug_info: Option<&DebugInfo>,
    ) {
        let Some(request) = self.dynamic_request_tree.clone() else {
            return;
        };

        let Some(children) = &mut self.children else {
            // Slots refreshed from another URL keep the task pending until
            // their own response or the final abort.
            if finish_node(&self.node, &request, tree, data, head, debug_info) {
                self.dynamic_request_tree = None;
            }
            return;
        };

        for (slot, server_child) in &tree.children {
            let (Some(task_child), Some(data_child)) = (children.get_mut(slot), data.child(slot))
            else {
                continue;
            };
            if matches(&server_child.segment, &task_child.route.segment) {
                task_child.finish(server_child, data_child, head, debug_info);
            }
        }

        if children.values().all(|child| !child.is_pending()) {
            self.dynamic_request_tree = None;
        }
    }

    /// Settles every placeholder that is still pending in this task, with
    /// `error` if given and with no content otherwise. Placeholders left
    /// without content get fetched lazily when rendered.
    pub fn abort(&mut self, error: Option<&FetchError>, debug_info: Option<&DebugInfo>) {
        match &mut self.children {
            None => abort_node(&self.node, &self.route, error, debug_info),
            Some(children) => {
                for child in children.values_mut() {
                    child.abort(error, debug_info);
                }
            }
        }

        self.dynamic_request_tree = None;
    }
}

/// Follows `steps` down from a task leaf.
fn locate<'r>(
    node: &'r CacheNode,
    route: &'r RouteTree,
    steps: &[(ArcStr, Segment)],
) -> Option<(&'r CacheNode, &'r RouteTree)> {
    let mut node = node;
    let mut route = route;
    for (slot, segment) in steps {
        let child = route.children.get(slot)?;
        if !matches(segment, &child.segment) {
            return None;
        }
        node = node.child(slot, &child.segment.key())?;
        route = child;
    }
    Some((node, route))
}

/// Fills the placeholders of `node` and its descendants. Returns whether the
/// whole subtree was covered.
///
/// The walk follows the tree the node was requested with, extra depth in the
/// response is ignored. Slots marked for a refresh from another URL are left
/// alone, their own response fills them.
fn finish_node(
    node: &CacheNode,
    request: &RouteTree,
    tree: &RouteTree,
    data: &SeedData,
    head: Option<&Resource>,
    debug_info: Option<&DebugInfo>,
) -> bool {
    let mut complete = true;

    for (slot, request_child) in &request.children {
        let Some(node_child) = node.child(slot, &request_child.segment.key()) else {
            continue;
        };

        if request_child.marker() == Some(Marker::Refresh) {
            complete &= node_child.pending().is_empty();
            continue;
        }

        match (tree.children.get(slot), data.child(slot)) {
            (Some(tree_child), Some(data_child))
                if matches(&request_child.segment, &tree_child.segment) =>
            {
                complete &= finish_node(
                    node_child,
                    request_child,
                    tree_child,
                    data_child,
                    head,
                    debug_info,
                );
            }
            // The response doesn't cover this child.
            _ => abort_node(node_child, request_child, None, debug_info),
        }
    }

    settle(&node.rsc, &data.rsc, debug_info);
    settle(&node.loading, &data.loading, debug_info);
    if request.is_leaf() {
        settle(&node.head, head.unwrap_or(&Resource::Empty), debug_info);
    }

    complete
}

fn settle(target: &Resource, value: &Resource, debug_info: Option<&DebugInfo>) {
    if let Some(deferred) = target.as_deferred() {
        deferred.resolve(value.clone(), debug_info);
    }
}

fn abort_node(
    node: &CacheNode,
    route: &RouteTree,
    error: Option<&FetchError>,
    debug_info: Option<&DebugInfo>,
) {
    for (slot, route_child) in &route.children {
        if let Some(node_child) = node.child(slot, &route_child.segment.key()) {
            abort_node(node_child, route_child, error, debug_info);
        }
    }

    if let Some(rsc) = node.rsc.as_deferred() {
        match error {
            Some(error) => rsc.reject(error.clone(), debug_info),
            None => rsc.resolve(Resource::Empty, debug_info),
        };
    }
    for resource in [&node.loading, &node.head] {
        if let Some(deferred) = resource.as_deferred() {
            deferred.resolve(Resource::Empty, debug_info);
        }
    }
}
