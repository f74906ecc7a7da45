use std::sync::Arc;

use thiserror::Error;

/// Failure of a route data request, shown as `Failed to fetch route data`
/// followed by the cause.
///
/// Clonable so that a single failed request can reject every placeholder it
/// was supposed to fill.
#[derive(Debug, Error, Clone)]
#[error("Failed to fetch route data: {0}")]
pub struct FetchError(pub(crate) Arc<anyhow::Error>);

impl FetchError {
    pub fn new(err: impl Into<anyhow::Error>) -> Self {
        Self(Arc::new(err.into()))
    }
}

impl From<anyhow::Error> for FetchError {
    fn from(e: anyhow::Error) -> Self {
        FetchError(Arc::new(e))
    }
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("Malformed payload.\n{0}")]
    Json(#[from] serde_json::Error),

    #[error("Segment path must alternate slot and segment, got {0} entries")]
    SegmentPath(usize),
}
