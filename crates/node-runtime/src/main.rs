//! # Insight-Mesh Peer
//!
//! Runs one peer until Ctrl-C.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging and register metrics
//! 2. Load configuration (JSON file from the first argument or `MESH_CONFIG`,
//!    then `MESH_*` environment overrides)
//! 3. Lock the data directory (persistent backends only)
//! 4. Load or create the device key
//! 5. Build the components and start the inbound loop and sweeps
//!
//! Frames travel over the in-process `MeshHub`; a deployment supplies its
//! own `PeerTransport` and feeds received frames to the same inbound queue.

use anyhow::{Context, Result};
use mesh_telemetry::{init_logging, register_metrics, TelemetryConfig};
use node_runtime::adapters::keystore;
use node_runtime::adapters::storage::DataDirLock;
use node_runtime::adapters::MeshHub;
use node_runtime::{MeshNode, NodeConfig, PeerContext, StorageBackend, VERSION};
use shared_types::{DeviceId, SystemTimeSource};
use std::sync::Arc;
use tracing::info;

fn load_config() -> Result<NodeConfig> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("MESH_CONFIG").ok());
    let config = match path {
        Some(path) => NodeConfig::from_file(&path)
            .with_context(|| format!("loading configuration from {path}"))?,
        None => NodeConfig::default(),
    };
    let config = config.apply_env().context("applying MESH_* overrides")?;
    config.validate().context("validating configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(&TelemetryConfig::from_env()).context("initializing logging")?;
    register_metrics().context("registering metrics")?;
    info!("Insight-Mesh peer v{}", VERSION);

    let config = load_config()?;

    let _lock = match config.storage.backend {
        StorageBackend::Memory => None,
        StorageBackend::File | StorageBackend::RocksDb => Some(
            DataDirLock::acquire(&config.storage.data_dir).context("locking data directory")?,
        ),
    };
    let keypair = keystore::load_or_create(
        &config.storage.key_path(),
        config.identity.require_existing_key,
    )
    .context("loading device key")?;
    info!("Device key {}", keypair.public_key().fingerprint());

    let hub = MeshHub::new(config.network.channel_capacity);
    let device_id = DeviceId::new(config.identity.device_id.clone());
    let inbound = hub.attach(&device_id);
    let ctx = PeerContext::build(
        config,
        keypair,
        hub.transport(device_id),
        Arc::new(SystemTimeSource),
    )
    .context("building peer")?;

    let mut node = MeshNode::new(ctx);
    node.start(inbound);

    info!("Peer is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    node.shutdown().await;
    Ok(())
}
