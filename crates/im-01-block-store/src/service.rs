//! # Block Store Service
//!
//! Owns the set of locally known blocks. Every block is keyed by its
//! `content_hash` in the key-value store (`block:<hex>`) and mirrored in an
//! in-memory index that is rebuilt on open.
//!
//! Hash validation happens at the boundary: a block whose claimed hash does
//! not recompute never reaches the index or the store.

use crate::config::BlockStoreConfig;
use crate::domain::{
    compute_merkle_root, BlockStoreError, BlockStoreResult, InsertOutcome, IntegrationReport,
    MerkleTree, SyncRequest, SyncResponse,
};
use crate::ports::inbound::BlockStoreApi;
use shared_types::{
    BatchOperation, Block, ContentHash, DeviceId, InMemoryKVStore, KeyValueStore, Metadata,
    SystemTimeSource, TimeSource,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const BLOCK_PREFIX: &str = "block:";

fn block_key(hash: &ContentHash) -> Vec<u8> {
    format!("{BLOCK_PREFIX}{hash}").into_bytes()
}

/// The Block Store Service.
pub struct BlockStoreService {
    /// Key-value store for persistence.
    kv_store: Box<dyn KeyValueStore>,
    /// Source of `created_at` for local blocks.
    time_source: Arc<dyn TimeSource>,
    /// Service configuration.
    config: BlockStoreConfig,
    /// In-memory index (hash -> block).
    blocks: BTreeMap<ContentHash, Block>,
}

impl BlockStoreService {
    /// Open over `kv_store`, reloading and re-validating persisted blocks.
    pub fn open(
        kv_store: Box<dyn KeyValueStore>,
        time_source: Arc<dyn TimeSource>,
        config: BlockStoreConfig,
    ) -> BlockStoreResult<Self> {
        let mut blocks = BTreeMap::new();
        for (key, bytes) in kv_store.prefix_scan(BLOCK_PREFIX.as_bytes())? {
            let block: Block = bincode::deserialize(&bytes)
                .map_err(|e| BlockStoreError::Serialization(e.to_string()))?;
            if !block.verify_hash() {
                warn!(
                    "[im-01] Skipping persisted block with bad hash under {}",
                    String::from_utf8_lossy(&key)
                );
                continue;
            }
            blocks.insert(block.content_hash, block);
        }

        if !blocks.is_empty() {
            info!("[im-01] Restored {} blocks", blocks.len());
        }

        Ok(Self {
            kv_store,
            time_source,
            config,
            blocks,
        })
    }

    /// Ephemeral store with the system clock.
    pub fn in_memory() -> Self {
        Self {
            kv_store: Box::new(InMemoryKVStore::new()),
            time_source: Arc::new(SystemTimeSource),
            config: BlockStoreConfig::default(),
            blocks: BTreeMap::new(),
        }
    }

    /// Service configuration.
    pub fn config(&self) -> &BlockStoreConfig {
        &self.config
    }

    /// Number of held blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// True if no blocks are held.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Merkle tree over the held hashes, for proofs.
    pub fn merkle_tree(&self) -> MerkleTree {
        MerkleTree::from_hashes(self.blocks.keys().copied())
    }

    fn validate(block: &Block) -> BlockStoreResult<()> {
        let computed = block.recompute_hash();
        if computed != block.content_hash {
            return Err(BlockStoreError::HashMismatch {
                claimed: block.content_hash,
                computed,
            });
        }
        Ok(())
    }

    fn encode(block: &Block) -> BlockStoreResult<Vec<u8>> {
        bincode::serialize(block).map_err(|e| BlockStoreError::Serialization(e.to_string()))
    }
}

impl BlockStoreApi for BlockStoreService {
    fn create_block(
        &mut self,
        content: String,
        metadata: Metadata,
        creator: DeviceId,
        previous_hash: Option<ContentHash>,
    ) -> BlockStoreResult<Block> {
        let created_at = self.time_source.now_secs();
        let block = Block::new(content, metadata, created_at, creator, previous_hash);
        self.insert_block(block.clone())?;
        info!(
            "[im-01] Created block {} (parent {})",
            block.content_hash.short(),
            block
                .previous_hash
                .map(|h| h.short())
                .unwrap_or_else(|| "genesis".to_string())
        );
        Ok(block)
    }

    fn insert_block(&mut self, block: Block) -> BlockStoreResult<InsertOutcome> {
        Self::validate(&block)?;
        if self.blocks.contains_key(&block.content_hash) {
            return Ok(InsertOutcome::AlreadyKnown);
        }

        self.kv_store
            .put(&block_key(&block.content_hash), &Self::encode(&block)?)?;
        debug!("[im-01] Stored block {}", block.content_hash.short());
        self.blocks.insert(block.content_hash, block);
        Ok(InsertOutcome::Inserted)
    }

    fn get_block(&self, hash: &ContentHash) -> Option<&Block> {
        self.blocks.get(hash)
    }

    fn contains(&self, hash: &ContentHash) -> bool {
        self.blocks.contains_key(hash)
    }

    fn all_hashes(&self) -> Vec<ContentHash> {
        self.blocks.keys().copied().collect()
    }

    fn all_blocks(&self) -> Vec<Block> {
        self.blocks.values().cloned().collect()
    }

    fn merkle_root(&self) -> ContentHash {
        compute_merkle_root(self.blocks.keys().copied())
    }

    fn build_sync_request(&self, request_id: Uuid) -> SyncRequest {
        SyncRequest {
            request_id,
            known_hashes: self.all_hashes(),
            merkle_root: self.merkle_root(),
        }
    }

    fn handle_sync_request(&self, request: &SyncRequest) -> SyncResponse {
        if request.merkle_root == self.merkle_root() {
            debug!("[im-01] Sync {} short-circuited: roots match", request.request_id);
            return SyncResponse {
                request_id: request.request_id,
                blocks: Vec::new(),
                missing_hashes: Vec::new(),
            };
        }

        let theirs: BTreeSet<&ContentHash> = request.known_hashes.iter().collect();

        let blocks: Vec<Block> = self
            .blocks
            .iter()
            .filter(|(hash, _)| !theirs.contains(hash))
            .take(self.config.max_blocks_per_response)
            .map(|(_, block)| block.clone())
            .collect();

        let missing_hashes: Vec<ContentHash> = theirs
            .into_iter()
            .filter(|hash| !self.blocks.contains_key(*hash))
            .copied()
            .collect();

        debug!(
            "[im-01] Sync {}: sending {} blocks, requesting {}",
            request.request_id,
            blocks.len(),
            missing_hashes.len()
        );

        SyncResponse {
            request_id: request.request_id,
            blocks,
            missing_hashes,
        }
    }

    fn integrate_blocks(&mut self, blocks: Vec<Block>) -> BlockStoreResult<IntegrationReport> {
        let mut report = IntegrationReport::default();
        let mut batch = Vec::new();
        let mut fresh: BTreeMap<ContentHash, Block> = BTreeMap::new();

        for block in blocks {
            let hash = block.content_hash;
            if let Err(e) = Self::validate(&block) {
                warn!("[im-01] Dropping forged block {}: {}", hash.short(), e);
                report.rejected.push(hash);
                continue;
            }
            if self.blocks.contains_key(&hash) || fresh.contains_key(&hash) {
                report.duplicates.push(hash);
                continue;
            }
            batch.push(BatchOperation::put(block_key(&hash), Self::encode(&block)?));
            report.accepted.push(hash);
            fresh.insert(hash, block);
        }

        if !batch.is_empty() {
            self.kv_store.atomic_batch_write(batch)?;
            self.blocks.extend(fresh);
            info!("[im-01] Integrated {} blocks", report.accepted.len());
        }
        Ok(report)
    }

    fn integrate_sync_response(
        &mut self,
        response: SyncResponse,
    ) -> BlockStoreResult<(IntegrationReport, Vec<Block>)> {
        let SyncResponse {
            blocks,
            missing_hashes,
            ..
        } = response;

        let report = self.integrate_blocks(blocks)?;
        let to_push = missing_hashes
            .iter()
            .filter_map(|hash| self.blocks.get(hash).cloned())
            .collect();
        Ok((report, to_push))
    }
}
