//! The state a client-side router keeps between navigations.

use std::sync::Arc;

use crate::cache::CacheNode;
use crate::config::RouterConfig;
use crate::dispatch::{DispatchOutcome, RouteFetcher, dispatch};
use crate::navigation::{Accumulation, Freshness, Navigation, NavigationTask, Reconciler};
use crate::optimistic;
use crate::route::{RouteTree, SegmentPath};
use crate::seed::{Head, SeedData};
use crate::segment::ArcStr;

/// What is on screen right now.
#[derive(Debug, Clone)]
pub struct RouterState {
    pub url: ArcStr,
    pub route: Arc<RouteTree>,
    pub cache: Arc<CacheNode>,
}

impl RouterState {
    pub fn new(url: impl Into<ArcStr>, route: Arc<RouteTree>, cache: Arc<CacheNode>) -> Self {
        Self {
            url: url.into(),
            route,
            cache,
        }
    }
}

/// A navigation requested by the host.
#[derive(Debug, Clone)]
pub struct NavigationRequest<'a> {
    url: &'a str,
    now: u64,
    freshness: Freshness,
    route: Option<Arc<RouteTree>>,
    seed: Option<(&'a SeedData, Option<&'a Head>)>,
    prefetch: Option<(&'a SeedData, Option<&'a Head>)>,
    next_url: Option<&'a str>,
}

impl<'a> NavigationRequest<'a> {
    /// Navigation to `url` at time `now`, in milliseconds.
    pub fn new(url: &'a str, now: u64) -> Self {
        Self {
            url,
            now,
            freshness: Freshness::Default,
            route: None,
            seed: None,
            prefetch: None,
            next_url: None,
        }
    }

    pub fn freshness(mut self, freshness: Freshness) -> Self {
        self.freshness = freshness;
        self
    }

    /// Route tree of the target. Without one the route tree is guessed from
    /// the URL.
    pub fn route(mut self, route: Arc<RouteTree>) -> Self {
        self.route = Some(route);
        self
    }

    pub fn seed(mut self, seed: &'a SeedData, head: Option<&'a Head>) -> Self {
        self.seed = Some((seed, head));
        self
    }

    pub fn prefetch(mut self, prefetch: &'a SeedData, head: Option<&'a Head>) -> Self {
        self.prefetch = Some((prefetch, head));
        self
    }

    pub fn next_url(mut self, next_url: &'a str) -> Self {
        self.next_url = Some(next_url);
        self
    }
}

/// Result of [`Router::navigate`].
#[derive(Debug)]
pub enum Navigated {
    /// The page has to be loaded from scratch. The router state is unchanged.
    Reload(String),
    /// The new tree is committed and can be rendered. It may still wait for
    /// the server.
    Soft(PendingNavigation),
}

/// A committed navigation whose placeholders may still be pending.
#[derive(Debug)]
pub struct PendingNavigation {
    task: NavigationTask,
    url: ArcStr,
    next_url: Option<ArcStr>,
    accumulation: Accumulation,
    config: RouterConfig,
}

impl PendingNavigation {
    /// Leaves of newly entered subtrees, to be scrolled into view.
    pub fn scrollable_segments(&self) -> &[SegmentPath] {
        &self.accumulation.scrollable_segments
    }

    pub fn is_pending(&self) -> bool {
        self.task.is_pending()
    }

    pub fn task(&self) -> &NavigationTask {
        &self.task
    }

    /// Fetches whatever the navigation is missing. Every placeholder has
    /// settled once this returns.
    pub async fn fulfill<F: RouteFetcher>(mut self, fetcher: &F) -> DispatchOutcome {
        dispatch(
            fetcher,
            &mut self.task,
            &self.url,
            self.next_url.as_deref(),
            &self.accumulation,
            &self.config,
        )
        .await
    }
}

#[derive(Debug)]
pub struct Router {
    config: RouterConfig,
    reconciler: Reconciler,
    state: RouterState,
}

impl Router {
    pub fn new(config: RouterConfig, state: RouterState) -> Self {
        Self {
            reconciler: Reconciler::new(&config),
            config,
            state,
        }
    }

    pub fn state(&self) -> &RouterState {
        &self.state
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Reconciles the current tree with the target of `request` and commits
    /// the result. Nothing is fetched yet, see [`PendingNavigation::fulfill`].
    pub fn navigate(&mut self, request: NavigationRequest<'_>) -> Navigated {
        let old_url = self.state.url.clone();
        let route = match request.route {
            Some(route) => route,
            None => optimistic::route_tree(&self.state.route, request.url),
        };

        let mut navigation = Navigation::new(&old_url, request.url, request.now)
            .freshness(request.freshness)
            .same_page(request.freshness == Freshness::Default && *old_url == *request.url);
        if let Some((seed, head)) = request.seed {
            navigation = navigation.seed(seed, head);
        }
        if let Some((prefetch, head)) = request.prefetch {
            navigation = navigation.prefetch(prefetch, head);
        }

        let mut accumulation = Accumulation::default();
        let task = self.reconciler.reconcile(
            &navigation,
            &self.state.cache,
            &self.state.route,
            &route,
            &mut accumulation,
        );

        let Some(task) = task else {
            tracing::info!(url = request.url, "soft navigation impossible, reloading");
            return Navigated::Reload(request.url.to_owned());
        };

        self.state = RouterState {
            url: request.url.into(),
            route: task.route.clone(),
            cache: task.node.clone(),
        };

        Navigated::Soft(PendingNavigation {
            task,
            url: self.state.url.clone(),
            next_url: request.next_url.map(ArcStr::from),
            accumulation,
            config: self.config.clone(),
        })
    }

    /// Fetches the current page again, dropping everything cached.
    pub fn refresh(&mut self, now: u64) -> Navigated {
        let url = self.state.url.clone();
        let request = NavigationRequest::new(&url, now)
            .freshness(Freshness::RefreshAll)
            .route(self.state.route.clone());
        self.navigate(request)
    }

    /// Goes back or forward to `url`, which was displayed with `route`.
    pub fn traverse(&mut self, url: &str, route: Arc<RouteTree>, now: u64) -> Navigated {
        let request = NavigationRequest::new(url, now)
            .freshness(Freshness::HistoryTraversal)
            .route(route);
        self.navigate(request)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::future::Future;
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::cache::Resource;
    use crate::dispatch::{RouteRequest, RouteResponse};
    use crate::error::FetchError;
    use crate::route::{CHILDREN_SLOT, Marker};
    use crate::segment::{DEFAULT_SEGMENT, Segment};

    #[derive(Default)]
    struct MockFetcher {
        responses: HashMap<String, String>,
        requests: Mutex<Vec<(String, Option<Marker>)>>,
    }

    impl MockFetcher {
        fn respond(mut self, url: &str, json: &str) -> Self {
            self.responses.insert(url.to_owned(), json.to_owned());
            self
        }
    }

    impl RouteFetcher for MockFetcher {
        async fn fetch_route_data(
            &self,
            url: &str,
            request: RouteRequest<'_>,
        ) -> Result<RouteResponse, FetchError> {
            self.requests
                .lock()
                .unwrap()
                .push((url.to_owned(), request.tree.marker()));
            let json = self
                .responses
                .get(url)
                .ok_or_else(|| anyhow::anyhow!("no route at {url}"))?;
            RouteResponse::from_json(json).map_err(FetchError::new)
        }
    }

    fn block_on<F: Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    fn ready(value: serde_json::Value) -> Resource {
        Resource::from_value(value)
    }

    fn page(name: &str) -> RouteTree {
        RouteTree::new(Segment::new(name)).with_child(CHILDREN_SLOT, RouteTree::new(Segment::page()))
    }

    fn root(children: RouteTree, modal: RouteTree) -> Arc<RouteTree> {
        Arc::new(
            RouteTree::new(Segment::new(""))
                .root_layout()
                .with_child(CHILDREN_SLOT, children)
                .with_child("modal", modal),
        )
    }

    /// `/feed` with a photo open in the modal slot.
    fn router() -> Router {
        let route = root(page("feed"), page("photo"));
        let leaf = |content: &str| {
            SeedData::new(ready(json!(content))).with_child(CHILDREN_SLOT, SeedData::new(ready(json!("page"))))
        };
        let seed = SeedData::new(ready(json!("root")))
            .with_child(CHILDREN_SLOT, leaf("feed"))
            .with_child("modal", leaf("photo"));
        let head = Head::new(ready(json!("title")));

        let mut router = Router::new(
            RouterConfig::default(),
            RouterState::new("/feed", route.clone(), Arc::new(CacheNode::default())),
        );
        let request = NavigationRequest::new("/feed", 0)
            .route(route)
            .seed(&seed, Some(&head))
            .freshness(Freshness::RefreshAll);
        let Navigated::Soft(navigation) = router.navigate(request) else {
            panic!("initial render failed");
        };
        assert!(!navigation.is_pending());
        router
    }

    #[test]
    fn soft_navigation_commits_state() {
        let mut router = router();
        let old_cache = router.state().cache.clone();

        let route = root(page("about"), RouteTree::new(Segment::new(DEFAULT_SEGMENT)));
        let Navigated::Soft(navigation) = router.navigate(NavigationRequest::new("/about", 1).route(route))
        else {
            panic!("expected a soft navigation");
        };

        assert_eq!(&*router.state().url, "/about");
        assert!(navigation.is_pending());
        assert_eq!(navigation.scrollable_segments().len(), 1);

        // The modal keeps showing the photo, tagged with the page it came from.
        let modal = &router.state().route.children["modal"];
        assert_eq!(modal.segment, Segment::new("photo"));
        assert_eq!(modal.url(), Some("/feed"));
        assert_eq!(modal.marker(), Some(Marker::Refresh));
        assert!(Arc::ptr_eq(
            &router.state().cache.parallel_routes["modal"],
            &old_cache.parallel_routes["modal"],
        ));

        let fetcher = MockFetcher::default().respond(
            "/about",
            r#"[{
                "segmentPath": ["children", "about"],
                "tree": ["about", {"children": ["__PAGE__", {}]}],
                "seed": ["about", {"children": ["about page", {}, null, false, true]}, null, false],
                "head": "about title"
            }]"#,
        );
        assert_eq!(block_on(navigation.fulfill(&fetcher)), DispatchOutcome::Complete);
        assert!(router.state().cache.pending().is_empty());

        let about = router.state().cache.parallel_routes[CHILDREN_SLOT]
            .get(&Segment::new("about").key())
            .unwrap();
        assert_eq!(*about.rsc.payload().unwrap(), json!("about"));
    }

    #[test]
    fn root_layout_change_reloads() {
        let mut router = router();
        let route = Arc::new(
            RouteTree::new(Segment::new("(admin)"))
                .root_layout()
                .with_child(CHILDREN_SLOT, page("dashboard")),
        );

        let navigated = router.navigate(NavigationRequest::new("/dashboard", 1).route(route));

        assert!(matches!(navigated, Navigated::Reload(url) if url == "/dashboard"));
        assert_eq!(&*router.state().url, "/feed");
    }

    #[test]
    fn refresh_fetches_slots_from_their_own_page() {
        let mut router = router();
        let route = root(page("about"), RouteTree::new(Segment::new(DEFAULT_SEGMENT)));
        let Navigated::Soft(navigation) = router.navigate(NavigationRequest::new("/about", 1).route(route))
        else {
            panic!("expected a soft navigation");
        };
        drop(navigation);

        let Navigated::Soft(navigation) = router.refresh(2) else {
            panic!("expected a soft navigation");
        };
        assert!(router.state().cache.rsc.is_pending());

        let fetcher = MockFetcher::default()
            .respond(
                "/about",
                r#"[{
                    "segmentPath": [],
                    "tree": ["", {"children": ["about", {"children": ["__PAGE__", {}]}]}],
                    "seed": ["new root", {"children": ["new about", {"children": ["page", {}, null, false]}, null, false]}, null, false],
                    "head": "about"
                }]"#,
            )
            .respond(
                "/feed",
                r#"[{
                    "segmentPath": ["modal", "photo"],
                    "tree": ["photo", {"children": ["__PAGE__", {}]}],
                    "seed": ["new photo", {"children": ["page", {}, null, false]}, null, false],
                    "head": "feed"
                }]"#,
            );
        assert_eq!(block_on(navigation.fulfill(&fetcher)), DispatchOutcome::Complete);

        let mut requested = fetcher.requests.lock().unwrap().clone();
        requested.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            requested,
            vec![
                ("/about".to_owned(), Some(Marker::Refetch)),
                ("/feed".to_owned(), Some(Marker::Refetch)),
            ]
        );

        let cache = &router.state().cache;
        assert_eq!(*cache.rsc.payload().unwrap(), json!("new root"));
        let photo = cache.parallel_routes["modal"]
            .get(&Segment::new("photo").key())
            .unwrap();
        assert_eq!(*photo.rsc.payload().unwrap(), json!("new photo"));
        assert!(cache.pending().is_empty());
    }

    #[test]
    fn guesses_route_without_prefetch() {
        let mut router = router();

        let Navigated::Soft(navigation) = router.navigate(NavigationRequest::new("/feed/2", 1)) else {
            panic!("expected a soft navigation");
        };

        let feed = &router.state().route.children[CHILDREN_SLOT];
        assert_eq!(feed.segment, Segment::new("feed"));
        assert_eq!(feed.children[CHILDREN_SLOT].segment, Segment::new("2"));
        assert_eq!(navigation.scrollable_segments().len(), 1);
        assert!(navigation.is_pending());
    }

    #[test]
    fn traversal_reuses_everything() {
        let mut router = router();
        let route = router.state().route.clone();
        let cache = router.state().cache.clone();

        let Navigated::Soft(navigation) = router.traverse("/feed", route, 100_000) else {
            panic!("expected a soft navigation");
        };

        assert!(!navigation.is_pending());
        assert!(Arc::ptr_eq(&router.state().cache, &cache));
    }
}
