use std::time::Duration;

use serde::Deserialize;

use crate::error::WireError;

/// Settings of a [`Router`](crate::Router).
///
/// Every field has a default, so an empty JSON object is a valid
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RouterConfig {
    /// How long, in milliseconds, cached dynamic content stays fresh enough to
    /// be reused by a navigation that doesn't display it right now.
    #[serde(rename = "dynamicStaleTime")]
    pub dynamic_stale_time_ms: u64,
    /// Reject pending placeholders when a route data request fails, instead
    /// of leaving them empty to be fetched lazily.
    pub reject_on_fetch_error: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            dynamic_stale_time_ms: 30_000,
            reject_on_fetch_error: false,
        }
    }
}

impl RouterConfig {
    pub fn from_json(json: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn dynamic_stale_time(&self) -> Duration {
        Duration::from_millis(self.dynamic_stale_time_ms)
    }

    pub fn with_dynamic_stale_time(mut self, stale_time: Duration) -> Self {
        self.dynamic_stale_time_ms = u64::try_from(stale_time.as_millis()).unwrap_or(u64::MAX);
        self
    }
}
