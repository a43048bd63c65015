//! Messaging configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Messaging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Upper bound on one transport hand-off.
    pub send_timeout_ms: u64,
    /// A sent message without ACK is re-sent after this long.
    pub ack_timeout_ms: u64,
    /// Give up after this many attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: 5_000,
            ack_timeout_ms: 30_000,
            max_attempts: None,
        }
    }
}

impl MessagingConfig {
    /// Short timeouts for tests.
    pub fn for_testing() -> Self {
        Self {
            send_timeout_ms: 200,
            ack_timeout_ms: 1_000,
            max_attempts: None,
        }
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}
