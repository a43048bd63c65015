//! # Storage Adapters
//!
//! Opens one key-value store per component and guards the data directory
//! against a second process.
//!
//! ## Backends
//!
//! - `memory`: `InMemoryKVStore`, nothing survives a restart
//! - `file`: `FileBackedKVStore`, `<data_dir>/<component>.db`
//! - `rocks_db`: `RocksDbStore`, `<data_dir>/<component>/` (feature `rocksdb`)

#[cfg(feature = "rocksdb")]
pub mod rocksdb_adapter;

#[cfg(feature = "rocksdb")]
pub use rocksdb_adapter::{RocksDbConfig, RocksDbStore};

use crate::container::config::{StorageBackend, StorageConfig};
use fs2::FileExt;
use shared_types::{FileBackedKVStore, InMemoryKVStore, KVStoreError, KeyValueStore};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Store names, one per component.
pub const STORE_BLOCKS: &str = "blocks";
pub const STORE_CRDT: &str = "crdt";
pub const STORE_REGISTRY: &str = "registry";
pub const STORE_MESSAGES: &str = "messages";

const LOCK_FILE: &str = "LOCK";

/// Data directory errors.
#[derive(Debug, Error)]
pub enum DataDirError {
    #[error("Cannot prepare data directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Data directory {0} is locked by another process")]
    Locked(PathBuf),
}

/// Exclusive advisory lock on a data directory, released on drop.
#[derive(Debug)]
pub struct DataDirLock {
    file: File,
    path: PathBuf,
}

impl DataDirLock {
    /// Create `dir` if needed and take its lock without blocking.
    pub fn acquire(dir: &Path) -> Result<Self, DataDirError> {
        let io = |source| DataDirError::Io {
            path: dir.to_path_buf(),
            source,
        };
        std::fs::create_dir_all(dir).map_err(io)?;

        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(io)?;
        file.try_lock_exclusive()
            .map_err(|_| DataDirError::Locked(dir.to_path_buf()))?;

        info!("[node] Locked data directory {}", dir.display());
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!("[node] Unlock of {} failed: {}", self.path.display(), e);
        }
    }
}

/// Open the store named `name` for the configured backend.
pub fn open_store(
    config: &StorageConfig,
    name: &str,
) -> Result<Box<dyn KeyValueStore>, KVStoreError> {
    match config.backend {
        StorageBackend::Memory => Ok(Box::new(InMemoryKVStore::new())),
        StorageBackend::File => {
            let path = config.data_dir.join(format!("{name}.db"));
            debug!("[node] Opening file store {}", path.display());
            Ok(Box::new(FileBackedKVStore::open(path)?))
        }
        StorageBackend::RocksDb => open_rocksdb(&config.data_dir.join(name)),
    }
}

#[cfg(feature = "rocksdb")]
fn open_rocksdb(path: &Path) -> Result<Box<dyn KeyValueStore>, KVStoreError> {
    debug!("[node] Opening RocksDB store {}", path.display());
    Ok(Box::new(RocksDbStore::open(RocksDbConfig::at(path))?))
}

#[cfg(not(feature = "rocksdb"))]
fn open_rocksdb(path: &Path) -> Result<Box<dyn KeyValueStore>, KVStoreError> {
    Err(KVStoreError::IOError {
        message: format!(
            "RocksDB store {} requested but the rocksdb feature is disabled",
            path.display()
        ),
    })
}
