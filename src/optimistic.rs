//! Guessing the route tree of a URL that was never prefetched.
//!
//! The guess starts from the route tree currently displayed. Segments shared
//! with the target path are kept, a dynamic parameter takes the value found
//! in the new path, and the remaining path components become static
//! segments ending in a page. The server corrects whatever was guessed
//! wrong, the guess only needs to let shared layouts stay on screen.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::route::{CHILDREN_SLOT, RouteTree};
use crate::segment::{PAGE_SEGMENT, ParamKind, Segment};

/// A plausible route tree for `url`, derived from `old_route`.
pub fn route_tree(old_route: &Arc<RouteTree>, url: &str) -> Arc<RouteTree> {
    let (path, query) = split_url(url);
    let parts: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
    let page = page_segment(query);

    let route = rebuild(old_route, &parts, &page);
    tracing::trace!(url, shared = Arc::ptr_eq(&route, old_route), "guessed route tree");
    route
}

fn split_url(url: &str) -> (&str, Option<&str>) {
    let url = url.split('#').next().unwrap_or_default();
    match url.split_once('?') {
        Some((path, query)) => (path, Some(query).filter(|query| !query.is_empty())),
        None => (url, None),
    }
}

/// `__PAGE__`, with search params appended as a JSON object when present.
fn page_segment(query: Option<&str>) -> Segment {
    let Some(query) = query else {
        return Segment::page();
    };

    let params: BTreeMap<&str, &str> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .collect();

    match serde_json::to_string(&params) {
        Ok(params) => Segment::new(format!("{PAGE_SEGMENT}?{params}")),
        Err(_) => Segment::page(),
    }
}

/// Route groups and the root don't show up in the URL.
fn is_transparent(name: &str) -> bool {
    name.is_empty() || (name.starts_with('(') && name.ends_with(')'))
}

fn rebuild(node: &Arc<RouteTree>, parts: &[&str], page: &Segment) -> Arc<RouteTree> {
    match &node.segment {
        segment if segment.is_page() || segment.is_default() => match parts.is_empty() {
            true if segment == page => node.clone(),
            true => Arc::new(RouteTree::new(page.clone())),
            false => chain(parts, page),
        },
        Segment::Static(name) if is_transparent(name) => {
            descend(node, node.segment.clone(), parts, page)
        }
        Segment::Static(name) => match parts.split_first() {
            Some((first, rest)) if **name == **first => {
                descend(node, node.segment.clone(), rest, page)
            }
            _ => chain(parts, page),
        },
        Segment::Param { name, kind, .. } => match kind {
            ParamKind::Dynamic | ParamKind::DynamicIntercepted => match parts.split_first() {
                Some((first, rest)) => {
                    let segment = Segment::param(name.clone(), *first, *kind);
                    descend(node, segment, rest, page)
                }
                None => chain(parts, page),
            },
            // Catch-all parameters swallow the rest of the path.
            _ => Arc::new(
                RouteTree::new(Segment::param(name.clone(), parts.join("/"), *kind))
                    .with_child(CHILDREN_SLOT, RouteTree::new(page.clone())),
            ),
        },
    }
}

/// Keeps `node` as `segment` and rebuilds its main slot for `parts`. Other
/// slots are kept as they are.
fn descend(
    node: &Arc<RouteTree>,
    segment: Segment,
    parts: &[&str],
    page: &Segment,
) -> Arc<RouteTree> {
    let child = match node.children.get(CHILDREN_SLOT) {
        Some(child) => rebuild(child, parts, page),
        None => chain(parts, page),
    };

    let unchanged = node
        .children
        .get(CHILDREN_SLOT)
        .is_some_and(|old| Arc::ptr_eq(old, &child));
    if unchanged && segment == node.segment {
        return node.clone();
    }

    let mut children = node.children.clone();
    children.insert(CHILDREN_SLOT.into(), child);

    let mut tree = node.patch_children(children);
    tree.segment = segment;
    Arc::new(tree)
}

/// Static segments for `parts`, ending in the page.
fn chain(parts: &[&str], page: &Segment) -> Arc<RouteTree> {
    parts
        .iter()
        .rev()
        .fold(Arc::new(RouteTree::new(page.clone())), |child, part| {
            Arc::new(RouteTree::new(Segment::new(*part)).with_child(CHILDREN_SLOT, child))
        })
}
