//! Block store configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Block store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockStoreConfig {
    /// Bound on one sync round trip, in milliseconds.
    pub sync_timeout_ms: u64,
    /// Cap on blocks returned in one `sync_response`; the rest follow on the
    /// next sweep.
    pub max_blocks_per_response: usize,
}

impl Default for BlockStoreConfig {
    fn default() -> Self {
        Self {
            sync_timeout_ms: 5_000,
            max_blocks_per_response: 500,
        }
    }
}

impl BlockStoreConfig {
    /// Short timeouts for tests.
    pub fn for_testing() -> Self {
        Self {
            sync_timeout_ms: 500,
            max_blocks_per_response: 500,
        }
    }

    /// `sync_timeout_ms` as a `Duration`.
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }
}
