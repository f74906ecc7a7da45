//! Requests for the content a navigation is still missing.
//!
//! Most navigations need a single request to the target URL. Slots that keep
//! showing content of an earlier page are refreshed from that page instead,
//! each such URL gets a request of its own. All requests run concurrently and
//! every response is written into the navigation as soon as it arrives.

use std::future::Future;
use std::iter;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde::Deserialize;
use tracing::Instrument;

use crate::cache::Resource;
use crate::config::RouterConfig;
use crate::deferred::DebugInfo;
use crate::error::{FetchError, WireError};
use crate::navigation::{Accumulation, NavigationTask};
use crate::route::{RouteTree, SegmentPath};
use crate::seed::SeedData;

/// What the server is asked to render.
#[derive(Debug, Clone, Copy)]
pub struct RouteRequest<'a> {
    /// The dynamic request tree of the navigation.
    pub tree: &'a RouteTree,
    /// URL the navigation originates from, lets the server resolve
    /// intercepted routes.
    pub next_url: Option<&'a str>,
}

/// Answer of the server to a [`RouteRequest`].
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RouteResponse {
    /// The target can't be navigated to softly, load this URL instead.
    Reload(String),
    Flight(Vec<FlightData>),
}

impl RouteResponse {
    pub fn from_json(json: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Content for the subtree at `segment_path`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightData {
    pub segment_path: SegmentPath,
    pub tree: RouteTree,
    pub seed: Option<SeedData>,
    pub head: Option<Resource>,
    #[serde(default)]
    pub debug_info: DebugInfo,
}

/// Transport for route data, supplied by the host.
pub trait RouteFetcher {
    fn fetch_route_data(
        &self,
        url: &str,
        request: RouteRequest<'_>,
    ) -> impl Future<Output = Result<RouteResponse, FetchError>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Every placeholder of the navigation has settled.
    Complete,
    /// The server asked for a full page load of this URL.
    Reload(String),
}

/// Fetches everything `task` still waits for and writes it in.
///
/// Whatever the responses leave pending is settled once all requests are
/// done. Failed requests leave their placeholders empty, or reject them when
/// `config.reject_on_fetch_error` is set.
pub async fn dispatch<F: RouteFetcher>(
    fetcher: &F,
    task: &mut NavigationTask,
    url: &str,
    next_url: Option<&str>,
    accumulation: &Accumulation,
    config: &RouterConfig,
) -> DispatchOutcome {
    let Some(tree) = task.dynamic_request_tree.clone() else {
        return DispatchOutcome::Complete;
    };

    let span = tracing::debug_span!("dispatch", url);

    async move {
        let urls: Vec<&str> = iter::once(url)
            .chain(accumulation.separate_refresh_urls.iter().map(|url| &**url))
            .collect();

        tracing::debug!(requests = urls.len(), "dispatching route data requests");

        let mut requests: FuturesUnordered<_> = urls
            .iter()
            .map(|&target| {
                let request = RouteRequest {
                    tree: &tree,
                    next_url,
                };
                async move { (target, fetcher.fetch_route_data(target, request).await) }
            })
            .collect();

        let mut outcome = DispatchOutcome::Complete;
        let mut error = None;

        while let Some((target, response)) = requests.next().await {
            match response {
                Ok(RouteResponse::Flight(flight)) => {
                    tracing::debug!(url = target, patches = flight.len(), "route data received");
                    write_flight(task, &flight);
                }
                Ok(RouteResponse::Reload(location)) => {
                    tracing::debug!(url = target, %location, "server asked for a full page load");
                    if target == url {
                        outcome = DispatchOutcome::Reload(location);
                    }
                }
                Err(err) => {
                    tracing::warn!(url = target, "{err}");
                    error.get_or_insert(err);
                }
            }
        }

        let error = error.filter(|_| config.reject_on_fetch_error);
        task.abort(error.as_ref(), None);

        outcome
    }
    .instrument(span)
    .await
}

fn write_flight(task: &mut NavigationTask, flight: &[FlightData]) {
    for data in flight {
        let Some(seed) = &data.seed else {
            tracing::trace!(path = %data.segment_path, "patch carries no content");
            continue;
        };

        task.write_at(
            &data.segment_path,
            &data.tree,
            seed,
            data.head.as_ref(),
            Some(&data.debug_info),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;
    use crate::cache::CacheNode;
    use crate::deferred::Status;
    use crate::navigation::{Navigation, Reconciler};
    use crate::seed::Head;
    use crate::segment::{ParamKind, Segment};

    /// Answers from a fixed table and records what was asked.
    #[derive(Default)]
    struct MockFetcher {
        responses: HashMap<String, Result<RouteResponse, FetchError>>,
        requests: Mutex<Vec<(String, Option<String>)>>,
    }

    impl MockFetcher {
        fn respond(mut self, url: &str, response: Result<RouteResponse, FetchError>) -> Self {
            self.responses.insert(url.to_owned(), response);
            self
        }

        fn requested(&self) -> Vec<(String, Option<String>)> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl RouteFetcher for MockFetcher {
        async fn fetch_route_data(
            &self,
            url: &str,
            request: RouteRequest<'_>,
        ) -> Result<RouteResponse, FetchError> {
            self.requests.lock().unwrap().push((
                url.to_owned(),
                request.tree.marker().map(|marker| format!("{marker:?}")),
            ));
            match self.responses.get(url) {
                Some(response) => response.clone(),
                None => Err(FetchError::new(anyhow::anyhow!("no route at {url}"))),
            }
        }
    }

    fn block_on<F: Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    fn blog(slug: &str) -> Arc<RouteTree> {
        let page = RouteTree::new(Segment::page());
        let post =
            RouteTree::new(Segment::param("slug", slug, ParamKind::Dynamic)).with_child("children", page);
        let blog = RouteTree::new(Segment::new("blog")).with_child("children", post);
        Arc::new(
            RouteTree::new(Segment::new(""))
                .root_layout()
                .with_child("children", blog),
        )
    }

    fn rendered() -> Arc<CacheNode> {
        let route = blog("a");
        let seed = SeedData::new(Resource::from_value(json!("root"))).with_child(
            "children",
            SeedData::new(Resource::from_value(json!("blog"))).with_child(
                "children",
                SeedData::new(Resource::from_value(json!("post a"))).with_child(
                    "children",
                    SeedData::new(Resource::from_value(json!("page a"))),
                ),
            ),
        );
        let head = Head::new(Resource::from_value(json!("title a")));
        let empty = Arc::new(CacheNode::default());
        let navigation = Navigation::new("/", "/blog/a", 0).seed(&seed, Some(&head));
        let mut acc = Accumulation::default();
        Reconciler::default()
            .reconcile(&navigation, &empty, &route, &route, &mut acc)
            .unwrap()
            .node
    }

    fn navigate(node: &Arc<CacheNode>) -> (NavigationTask, Accumulation) {
        let navigation = Navigation::new("/blog/a", "/blog/b", 1);
        let mut acc = Accumulation::default();
        let task = Reconciler::default()
            .reconcile(&navigation, node, &blog("a"), &blog("b"), &mut acc)
            .unwrap();
        (task, acc)
    }

    fn post_node(task: &NavigationTask) -> Arc<CacheNode> {
        let blog = task.node.parallel_routes["children"]
            .values()
            .next()
            .unwrap()
            .clone();
        blog.parallel_routes["children"]
            .get(&Segment::param("slug", "b", ParamKind::Dynamic).key())
            .unwrap()
            .clone()
    }

    #[test]
    fn parses_flight_response() {
        let response = RouteResponse::from_json(
            r#"[{
                "segmentPath": ["children", "blog", "children", ["slug", "b", "d"]],
                "tree": [["slug", "b", "d"], {"children": ["__PAGE__", {}]}],
                "seed": ["post b", {"children": ["page b", {}, null, false, true]}, null, false],
                "head": "title"
            }]"#,
        )
        .unwrap();

        let RouteResponse::Flight(flight) = response else {
            panic!("expected flight data");
        };
        assert_eq!(flight.len(), 1);
        assert_eq!(flight[0].segment_path.steps().len(), 2);
        assert!(flight[0].debug_info.is_empty());
        assert_eq!(*flight[0].head.as_ref().unwrap().payload().unwrap(), json!("title"));
    }

    #[test]
    fn parses_reload_response() {
        let response = RouteResponse::from_json(r#""/login""#).unwrap();
        assert!(matches!(response, RouteResponse::Reload(url) if url == "/login"));
    }

    #[test]
    fn writes_response_into_navigation() {
        let (mut task, acc) = navigate(&rendered());
        let post = post_node(&task);
        assert!(post.rsc.is_pending());

        let flight = RouteResponse::from_json(
            r#"[{
                "segmentPath": ["children", "blog", "children", ["slug", "b", "d"]],
                "tree": [["slug", "b", "d"], {"children": ["__PAGE__", {}]}],
                "seed": ["post b", {"children": ["page b", {}, null, false, true]}, null, false],
                "head": "title b"
            }]"#,
        )
        .unwrap();
        let fetcher = MockFetcher::default().respond("/blog/b", Ok(flight));

        let outcome = block_on(dispatch(
            &fetcher,
            &mut task,
            "/blog/b",
            None,
            &acc,
            &RouterConfig::default(),
        ));

        assert_eq!(outcome, DispatchOutcome::Complete);
        assert_eq!(fetcher.requested(), vec![("/blog/b".to_owned(), None)]);
        assert_eq!(*post.rsc.payload().unwrap(), json!("post b"));
        assert!(task.node.pending().is_empty());
        assert!(!task.is_pending());
    }

    #[test]
    fn failed_request_leaves_content_empty() {
        let (mut task, acc) = navigate(&rendered());
        let post = post_node(&task);
        let fetcher = MockFetcher::default();

        let outcome = block_on(dispatch(
            &fetcher,
            &mut task,
            "/blog/b",
            None,
            &acc,
            &RouterConfig::default(),
        ));

        assert_eq!(outcome, DispatchOutcome::Complete);
        let deferred = post.rsc.as_deferred().unwrap();
        assert_eq!(deferred.status(), Status::Fulfilled);
        assert!(post.rsc.payload().is_none());
    }

    #[test]
    fn failed_request_can_reject() {
        let (mut task, acc) = navigate(&rendered());
        let post = post_node(&task);
        let fetcher = MockFetcher::default();
        let config = RouterConfig {
            reject_on_fetch_error: true,
            ..Default::default()
        };

        block_on(dispatch(&fetcher, &mut task, "/blog/b", None, &acc, &config));

        assert_eq!(post.rsc.as_deferred().unwrap().status(), Status::Rejected);
        assert!(post.loading.as_deferred().unwrap().value().unwrap().is_ok());
    }

    #[test]
    fn reload_is_reported() {
        let (mut task, acc) = navigate(&rendered());
        let fetcher = MockFetcher::default()
            .respond("/blog/b", Ok(RouteResponse::Reload("/blog/b".to_owned())));

        let outcome = block_on(dispatch(
            &fetcher,
            &mut task,
            "/blog/b",
            None,
            &acc,
            &RouterConfig::default(),
        ));

        assert_eq!(outcome, DispatchOutcome::Reload("/blog/b".to_owned()));
        assert!(task.node.pending().is_empty());
    }

    #[test]
    fn nothing_to_fetch_sends_nothing() {
        let node = rendered();
        let navigation = Navigation::new("/blog/a", "/blog/a", 1)
            .freshness(crate::navigation::Freshness::HistoryTraversal);
        let mut acc = Accumulation::default();
        let mut task = Reconciler::default()
            .reconcile(&navigation, &node, &blog("a"), &blog("a"), &mut acc)
            .unwrap();
        let fetcher = MockFetcher::default();

        let outcome = block_on(dispatch(
            &fetcher,
            &mut task,
            "/blog/a",
            None,
            &acc,
            &RouterConfig::default(),
        ));

        assert_eq!(outcome, DispatchOutcome::Complete);
        assert!(fetcher.requested().is_empty());
    }
}
