//! Prometheus metrics for Insight-Mesh peers.
//!
//! All metrics follow the naming convention: `mesh_<component>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts,
    Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Crate-local metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // BLOCK STORE / CHAIN
    // =========================================================================

    /// Blocks accepted into the store
    pub static ref BLOCKS_STORED: Counter = Counter::new(
        "mesh_storage_blocks_stored_total",
        "Total number of blocks accepted into the block store"
    ).expect("metric creation failed");

    /// Blocks refused, by reason
    pub static ref BLOCKS_REJECTED: CounterVec = CounterVec::new(
        Opts::new("mesh_storage_blocks_rejected_total", "Blocks refused by the store or chain"),
        &["reason"]  // reason: integrity/authority/duplicate
    ).expect("metric creation failed");

    /// Length of the active chain
    pub static ref CHAIN_LENGTH: Gauge = Gauge::new(
        "mesh_chain_length",
        "Number of blocks on the active chain"
    ).expect("metric creation failed");

    // =========================================================================
    // SYNC
    // =========================================================================

    /// Sync rounds by outcome
    pub static ref SYNC_ROUNDS: CounterVec = CounterVec::new(
        Opts::new("mesh_sync_rounds_total", "Delta-sync rounds"),
        &["outcome"]  // outcome: completed/failed
    ).expect("metric creation failed");

    /// Sync round duration
    pub static ref SYNC_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "mesh_sync_round_duration_seconds",
            "Time spent in one sync round"
        ).buckets(exponential_buckets(0.001, 2.0, 14).expect("bucket layout"))
    ).expect("metric creation failed");

    // =========================================================================
    // MESSAGING
    // =========================================================================

    /// Messages by lifecycle event
    pub static ref MESSAGES: CounterVec = CounterVec::new(
        Opts::new("mesh_messaging_messages_total", "Peer messages by lifecycle event"),
        &["event"]  // event: sent/delivered/duplicate/failed
    ).expect("metric creation failed");

    // =========================================================================
    // CONSENSUS
    // =========================================================================

    /// Proposals leaving the pending state, by status
    pub static ref PROPOSALS_FINALIZED: CounterVec = CounterVec::new(
        Opts::new("mesh_consensus_proposals_finalized_total", "Finalized proposals"),
        &["status"]  // status: accepted/rejected/expired
    ).expect("metric creation failed");

    // =========================================================================
    // PEERS
    // =========================================================================

    /// Peers in the registry
    pub static ref PEERS_KNOWN: Gauge = Gauge::new(
        "mesh_peers_known",
        "Number of peers in the registry"
    ).expect("metric creation failed");

    /// Errors by component and class
    pub static ref COMPONENT_ERRORS: CounterVec = CounterVec::new(
        Opts::new("mesh_component_errors_total", "Errors by component and class"),
        &["component", "class"]
    ).expect("metric creation failed");
}

/// Register all metrics with [`REGISTRY`].
///
/// Safe to call more than once.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(BLOCKS_STORED.clone()),
        Box::new(BLOCKS_REJECTED.clone()),
        Box::new(CHAIN_LENGTH.clone()),
        Box::new(SYNC_ROUNDS.clone()),
        Box::new(SYNC_DURATION.clone()),
        Box::new(MESSAGES.clone()),
        Box::new(PROPOSALS_FINALIZED.clone()),
        Box::new(PEERS_KNOWN.clone()),
        Box::new(COMPONENT_ERRORS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn gather_text() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
