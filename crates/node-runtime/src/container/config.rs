//! # Node Configuration
//!
//! Unified configuration for every component and the runtime sweeps.
//!
//! Loaded from an optional JSON file, then overridden from the environment:
//!
//! | Variable          | Field                      |
//! |-------------------|----------------------------|
//! | `MESH_DEVICE_ID`  | `identity.device_id`       |
//! | `MESH_ROLE`       | `identity.role`            |
//! | `MESH_DATA_DIR`   | `storage.data_dir`         |
//! | `MESH_STORAGE`    | `storage.backend`          |

use im_01_block_store::BlockStoreConfig;
use im_02_chain_assembler::ChainConfig;
use im_04_consensus::ConsensusConfig;
use im_05_messaging::MessagingConfig;
use im_06_peer_registry::RegistryConfig;
use serde::{Deserialize, Serialize};
use shared_types::PeerRole;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Complete node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Who this device is.
    pub identity: IdentityConfig,
    /// Where component state lives.
    pub storage: StorageConfig,
    /// Periodic background work.
    pub sweeps: SweepConfig,
    /// Local transport limits.
    pub network: NetworkConfig,
    /// Devices registered at startup.
    pub peers: Vec<PeerSeed>,
    pub block_store: BlockStoreConfig,
    pub chain: ChainConfig,
    pub consensus: ConsensusConfig,
    pub messaging: MessagingConfig,
    pub registry: RegistryConfig,
}

/// Device identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Stable device id.
    pub device_id: String,
    /// Role this device registers itself with.
    pub role: PeerRole,
    /// Refuse to start without a persisted key instead of generating one.
    pub require_existing_key: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            device_id: "mesh-device".to_string(),
            role: PeerRole::Participant,
            require_existing_key: false,
        }
    }
}

/// Storage backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Nothing survives a restart.
    #[default]
    Memory,
    /// One snapshot file per component.
    File,
    /// RocksDB, one database per component (needs the `rocksdb` feature).
    RocksDb,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "file" => Ok(StorageBackend::File),
            "rocksdb" | "rocks_db" => Ok(StorageBackend::RocksDb),
            other => Err(format!("unknown storage backend: {other}")),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the key file, the lock file and component stores.
    pub data_dir: PathBuf,
    /// Backend for component stores.
    pub backend: StorageBackend,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            backend: StorageBackend::Memory,
        }
    }
}

impl StorageConfig {
    /// Path of the device key file.
    pub fn key_path(&self) -> PathBuf {
        self.data_dir.join("device.key")
    }
}

/// Background sweep intervals, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Block delta sync plus CRDT and registry exchange with every peer.
    pub sync_interval_secs: u64,
    /// Outbox re-send and proposal expiry.
    pub retry_interval_secs: u64,
    /// Heartbeats to every peer.
    pub heartbeat_interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: 30,
            retry_interval_secs: 10,
            heartbeat_interval_secs: 15,
        }
    }
}

impl SweepConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

/// Local transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Bound on each device's inbound frame queue.
    pub channel_capacity: usize,
    /// A peer not heard from for this long is reported stale.
    pub peer_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            peer_timeout_secs: 120,
        }
    }
}

/// A device known before any traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSeed {
    pub device_id: String,
    /// Compressed secp256k1 key, hex.
    pub public_key: String,
    #[serde(default)]
    pub role: PeerRole,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value {value:?} for {var}: {message}")]
    Env {
        var: &'static str,
        value: String,
        message: String,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl NodeConfig {
    /// Read a JSON config file. Missing sections take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Apply `MESH_*` overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply `MESH_*` overrides from `lookup`.
    pub fn apply_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(id) = lookup("MESH_DEVICE_ID") {
            self.identity.device_id = id;
        }
        if let Some(dir) = lookup("MESH_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(role) = lookup("MESH_ROLE") {
            self.identity.role = role.parse().map_err(|message| ConfigError::Env {
                var: "MESH_ROLE",
                value: role.clone(),
                message,
            })?;
        }
        if let Some(backend) = lookup("MESH_STORAGE") {
            self.storage.backend = backend.parse().map_err(|message| ConfigError::Env {
                var: "MESH_STORAGE",
                value: backend.clone(),
                message,
            })?;
        }
        Ok(self)
    }

    /// Reject values no component can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.identity.device_id.trim().is_empty() {
            return invalid("identity.device_id must not be empty");
        }
        if !(self.consensus.quorum > 0.0 && self.consensus.quorum <= 1.0) {
            return invalid("consensus.quorum must be in (0, 1]");
        }
        if self.consensus.weights.sum() <= 0.0 {
            return invalid("consensus.weights must not all be zero");
        }
        if !(0.0..=1.0).contains(&self.chain.min_authority_trust) {
            return invalid("chain.min_authority_trust must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.registry.default_trust) {
            return invalid("registry.default_trust must be in [0, 1]");
        }
        if self.sweeps.sync_interval_secs == 0
            || self.sweeps.retry_interval_secs == 0
            || self.sweeps.heartbeat_interval_secs == 0
        {
            return invalid("sweep intervals must be positive");
        }
        if self.network.channel_capacity == 0 {
            return invalid("network.channel_capacity must be positive");
        }
        if self.block_store.max_blocks_per_response == 0 {
            return invalid("block_store.max_blocks_per_response must be positive");
        }
        if cfg!(not(feature = "rocksdb")) && self.storage.backend == StorageBackend::RocksDb {
            return invalid("storage.backend rocks_db needs the rocksdb feature");
        }
        Ok(())
    }

    /// Fast timers and in-memory storage for tests.
    pub fn for_testing(device_id: &str, role: PeerRole) -> Self {
        Self {
            identity: IdentityConfig {
                device_id: device_id.to_string(),
                role,
                require_existing_key: false,
            },
            sweeps: SweepConfig {
                sync_interval_secs: 1,
                retry_interval_secs: 1,
                heartbeat_interval_secs: 1,
            },
            block_store: BlockStoreConfig::for_testing(),
            messaging: MessagingConfig::for_testing(),
            ..Self::default()
        }
    }
}
