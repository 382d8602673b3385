//! Cloud client configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the Strongbox API client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Base URL for the Strongbox API (e.g., "https://api.strongbox.app").
    pub api_base_url: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.strongbox.app".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl CloudConfig {
    /// Creates a config pointing at `api_base_url` with default timeouts.
    pub fn for_base_url(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url.trim_end_matches('/'), path)
    }
}
