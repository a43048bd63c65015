//! Registry configuration.

use serde::{Deserialize, Serialize};

/// Registry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Trust assigned to a newly registered peer.
    pub default_trust: f64,
    /// How far ahead of the local clock a gossiped write may be stamped.
    pub max_clock_skew_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_trust: 0.5,
            max_clock_skew_ms: 300_000,
        }
    }
}
