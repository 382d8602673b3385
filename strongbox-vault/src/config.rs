//! Vault store configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the vault state store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// How many times a bundle upload is attempted before the store gives up
    /// and keeps the vault local-only.
    pub remote_write_attempts: u32,

    /// Delay before the first upload retry; doubles on each further attempt.
    pub remote_retry_backoff_ms: u64,

    /// Compare a local cache hit against the remote copy during
    /// initialization instead of trusting it outright.
    pub revalidate_cache_hits: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            remote_write_attempts: 3,
            remote_retry_backoff_ms: 250,
            revalidate_cache_hits: false,
        }
    }
}

impl VaultConfig {
    /// Backoff before retry number `attempt` (1-based).
    pub(crate) fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.remote_retry_backoff_ms.saturating_mul(factor))
    }
}
