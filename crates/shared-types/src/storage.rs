//! # Key-Value Storage Port
//!
//! Every component persists through `KeyValueStore`. Two adapters live
//! here: `InMemoryKVStore` for tests and ephemeral peers, and
//! `FileBackedKVStore` for durable single-file persistence. A RocksDB
//! adapter is provided by `node-runtime` behind its `rocksdb` feature.

use crate::errors::KVStoreError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Abstract interface for key-value storage backends.
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError>;

    /// Put a single key-value pair.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError>;

    /// Delete a key.
    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError>;

    /// Execute an atomic batch write.
    ///
    /// Either ALL operations in the batch succeed, or NONE are applied.
    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError>;

    /// Check if a key exists.
    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError>;

    /// All entries whose key starts with `prefix`, in key order.
    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError>;
}

/// Batch operation for atomic writes.
#[derive(Debug, Clone)]
pub enum BatchOperation {
    /// Put a key-value pair.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Delete a key.
    Delete { key: Vec<u8> },
}

impl BatchOperation {
    /// Create a Put operation.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a Delete operation.
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Delete { key: key.into() }
    }
}

fn apply_batch(data: &mut BTreeMap<Vec<u8>, Vec<u8>>, operations: Vec<BatchOperation>) {
    for op in operations {
        match op {
            BatchOperation::Put { key, value } => {
                data.insert(key, value);
            }
            BatchOperation::Delete { key } => {
                data.remove(&key);
            }
        }
    }
}

fn scan(data: &BTreeMap<Vec<u8>, Vec<u8>>, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
    data.range(prefix.to_vec()..)
        .take_while(|(k, _)| k.starts_with(prefix))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// In-memory store. Contents vanish with the process.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKVStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl InMemoryKVStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl KeyValueStore for InMemoryKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        self.data.remove(key);
        Ok(())
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        apply_batch(&mut self.data, operations);
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        Ok(self.data.contains_key(key))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        Ok(scan(&self.data, prefix))
    }
}

/// File-backed key-value store.
///
/// Keeps the full map in memory and rewrites the file on every mutation,
/// via a temp file and rename so a crash never leaves a half-written file.
pub struct FileBackedKVStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    path: PathBuf,
}

impl FileBackedKVStore {
    /// Open (or create) a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, KVStoreError> {
        let path = path.as_ref().to_path_buf();

        let data = if path.exists() {
            let data = Self::load_from_file(&path)?;
            info!("[storage] Loaded {} keys from {}", data.len(), path.display());
            data
        } else {
            info!("[storage] No existing storage file at {}", path.display());
            BTreeMap::new()
        };

        Ok(Self { data, path })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_file(path: &Path) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, KVStoreError> {
        let bytes = std::fs::read(path).map_err(|e| KVStoreError::IOError {
            message: e.to_string(),
        })?;

        // Simple binary format: [key_len:u32][key][value_len:u32][value]...
        let mut data = BTreeMap::new();
        let mut cursor = 0;

        while cursor < bytes.len() {
            let Some((key, next)) = read_chunk(&bytes, cursor) else {
                warn!("[storage] Truncated record at offset {} in {}", cursor, path.display());
                break;
            };
            let Some((value, next)) = read_chunk(&bytes, next) else {
                warn!("[storage] Truncated record at offset {} in {}", cursor, path.display());
                break;
            };
            data.insert(key, value);
            cursor = next;
        }

        Ok(data)
    }

    /// Persist `next`, then adopt it. A failed write leaves memory unchanged.
    fn commit(&mut self, next: BTreeMap<Vec<u8>, Vec<u8>>) -> Result<(), KVStoreError> {
        Self::save_to_file(&self.path, &next)?;
        self.data = next;
        Ok(())
    }

    fn save_to_file(path: &Path, data: &BTreeMap<Vec<u8>, Vec<u8>>) -> Result<(), KVStoreError> {
        use std::io::Write;

        let io_err = |e: std::io::Error| KVStoreError::IOError {
            message: e.to_string(),
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut bytes = Vec::new();
        for (key, value) in data {
            bytes.extend_from_slice(&(key.len() as u32).to_le_bytes());
            bytes.extend_from_slice(key);
            bytes.extend_from_slice(&(value.len() as u32).to_le_bytes());
            bytes.extend_from_slice(value);
        }

        let temp_path = path.with_extension("tmp");
        let mut file = std::fs::File::create(&temp_path).map_err(io_err)?;
        file.write_all(&bytes).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        std::fs::rename(&temp_path, path).map_err(io_err)?;

        Ok(())
    }
}

fn read_chunk(bytes: &[u8], cursor: usize) -> Option<(Vec<u8>, usize)> {
    let len_end = cursor.checked_add(4)?;
    let len = u32::from_le_bytes(bytes.get(cursor..len_end)?.try_into().ok()?) as usize;
    let end = len_end.checked_add(len)?;
    Some((bytes.get(len_end..end)?.to_vec(), end))
}

impl KeyValueStore for FileBackedKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        let mut next = self.data.clone();
        next.insert(key.to_vec(), value.to_vec());
        self.commit(next)
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        if !self.data.contains_key(key) {
            return Ok(());
        }
        let mut next = self.data.clone();
        next.remove(key);
        self.commit(next)
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        let mut next = self.data.clone();
        apply_batch(&mut next, operations);
        self.commit(next)
    }

    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        Ok(self.data.contains_key(key))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        Ok(scan(&self.data, prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_prefix_scan_is_ordered() {
        let mut store = InMemoryKVStore::new();
        store.put(b"block:b", b"2").unwrap();
        store.put(b"block:a", b"1").unwrap();
        store.put(b"peer:x", b"3").unwrap();

        let scanned = store.prefix_scan(b"block:").unwrap();
        assert_eq!(scanned.len(), 2);
        assert_eq!(scanned[0].0, b"block:a".to_vec());
        assert_eq!(scanned[1].0, b"block:b".to_vec());
    }

    #[test]
    fn test_batch_write_applies_all() {
        let mut store = InMemoryKVStore::new();
        store.put(b"gone", b"x").unwrap();
        store
            .atomic_batch_write(vec![
                BatchOperation::put(b"k1".to_vec(), b"v1".to_vec()),
                BatchOperation::delete(b"gone".to_vec()),
            ])
            .unwrap();
        assert!(store.exists(b"k1").unwrap());
        assert!(!store.exists(b"gone").unwrap());
    }

    #[test]
    fn test_file_backed_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.db");

        {
            let mut store = FileBackedKVStore::open(&path).unwrap();
            store.put(b"block:1", b"payload").unwrap();
            store.put(b"block:2", b"other").unwrap();
            store.delete(b"block:2").unwrap();
        }

        let reopened = FileBackedKVStore::open(&path).unwrap();
        assert_eq!(reopened.get(b"block:1").unwrap(), Some(b"payload".to_vec()));
        assert_eq!(reopened.get(b"block:2").unwrap(), None);
    }

    #[test]
    fn test_file_backed_ignores_truncated_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");
        {
            let mut store = FileBackedKVStore::open(&path).unwrap();
            store.put(b"a", b"1").unwrap();
        }
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend_from_slice(&[9, 0, 0, 0, 1]);
        std::fs::write(&path, bytes).unwrap();

        let reopened = FileBackedKVStore::open(&path).unwrap();
        assert_eq!(reopened.get(b"a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_failed_write_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.db");
        let mut store = FileBackedKVStore::open(&path).unwrap();
        store.put(b"peer:a", b"old").unwrap();

        // A directory where the temp file goes makes every save fail.
        std::fs::create_dir(path.with_extension("tmp")).unwrap();

        assert!(store.put(b"peer:a", b"new").is_err());
        assert!(store
            .atomic_batch_write(vec![
                BatchOperation::put(b"peer:b".to_vec(), b"1".to_vec()),
                BatchOperation::delete(b"peer:a".to_vec()),
            ])
            .is_err());
        assert!(store.delete(b"peer:a").is_err());

        assert_eq!(store.get(b"peer:a").unwrap(), Some(b"old".to_vec()));
        assert!(!store.exists(b"peer:b").unwrap());
        let reopened = FileBackedKVStore::open(&path).unwrap();
        assert_eq!(reopened.get(b"peer:a").unwrap(), Some(b"old".to_vec()));
    }
}
