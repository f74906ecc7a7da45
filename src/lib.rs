#![forbid(unsafe_code)]
//! Client-side navigation for routed pages that stream their content.
//!
//! A page is described by a [`RouteTree`] and rendered from a tree of
//! [`CacheNode`]s. On navigation the [`Reconciler`] diffs the displayed
//! route against the target route and produces, synchronously, a new render
//! tree that reuses whatever it can. Content that isn't known yet is left as
//! a pending [`Deferred`] placeholder, and the server is asked for exactly
//! those segments. Once the response streams in, the [`NavigationTask`]
//! writes it into the placeholders.
//!
//! The [`Router`] wraps all of this in a state container:
//!
//! ```no_run
//! # use hauchiwa_nav::*;
//! # async fn demo(mut router: Router, fetcher: impl RouteFetcher) {
//! match router.navigate(NavigationRequest::new("/blog/hello", 1_000)) {
//!     Navigated::Soft(pending) => {
//!         // render `router.state().cache` right away, then
//!         pending.fulfill(&fetcher).await;
//!     }
//!     Navigated::Reload(_url) => { /* full page load */ }
//! }
//! # }
//! ```

mod cache;
mod config;
mod deferred;
mod dispatch;
mod error;
#[cfg(feature = "logging")]
mod logging;
mod navigation;
pub mod optimistic;
mod route;
mod router;
mod seed;
mod segment;

pub use crate::cache::{CacheNode, ParallelRoutes, Payload, Resource, SegmentMap};
pub use crate::config::RouterConfig;
pub use crate::deferred::{DebugInfo, Deferred, Status};
pub use crate::dispatch::{
    DispatchOutcome, FlightData, RouteFetcher, RouteRequest, RouteResponse, dispatch,
};
pub use crate::error::*;
#[cfg(feature = "logging")]
pub use crate::logging::init_logging;
pub use crate::navigation::{
    Accumulation, Freshness, Navigation, NavigationTask, Reconciler,
};
pub use crate::route::{CHILDREN_SLOT, Marker, RouteTree, SegmentPath, Slots};
pub use crate::router::{NavigationRequest, Navigated, PendingNavigation, Router, RouterState};
pub use crate::seed::{Head, SeedData};
pub use crate::segment::{
    ArcStr, DEFAULT_SEGMENT, NOT_FOUND_SEGMENT, PAGE_SEGMENT, ParamKind, Segment, SegmentKey,
    matches,
};
