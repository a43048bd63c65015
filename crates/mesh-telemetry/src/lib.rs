//! # Mesh Telemetry
//!
//! Logging and metrics for Insight-Mesh peers.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mesh_telemetry::{init_logging, register_metrics, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! init_logging(&config)?;
//! register_metrics()?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `MESH_LOG_LEVEL` | `RUST_LOG`, else `info` | Log filter directive |
//! | `MESH_JSON_LOGS` | `false` (`true` in containers) | JSON log lines |
//! | `MESH_SERVICE_NAME` | `insight-mesh` | Service name in logs |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{init_logging, init_test_logging};
pub use metrics::{
    gather_text, register_metrics, BLOCKS_REJECTED, BLOCKS_STORED, CHAIN_LENGTH,
    COMPONENT_ERRORS, MESSAGES, PEERS_KNOWN, PROPOSALS_FINALIZED, SYNC_DURATION, SYNC_ROUNDS,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("A global tracing subscriber is already installed")]
    AlreadyInitialized,

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}
