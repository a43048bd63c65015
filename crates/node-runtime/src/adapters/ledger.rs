//! # Chain Adapters
//!
//! Block store plus chain assembler, seen from consensus:
//!
//! - `KnowledgeHistory`: the tail of the active chain, for novelty scoring
//! - `BlockAppender`: create a block on the active tip
//!
//! Lock order: the block store lock is taken before the registry lock that
//! the assembler's authority checks need, never after.

use im_01_block_store::{BlockStoreApi, BlockStoreResult, BlockStoreService};
use im_02_chain_assembler::ChainAssembler;
use im_04_consensus::{BlockAppender, KnowledgeHistory};
use parking_lot::RwLock;
use shared_types::{Block, DeviceId, Metadata};
use std::sync::Arc;

/// Consensus-facing view of the local chain.
#[derive(Clone)]
pub struct ChainLedger {
    store: Arc<RwLock<BlockStoreService>>,
    assembler: Arc<ChainAssembler>,
}

impl ChainLedger {
    pub fn new(store: Arc<RwLock<BlockStoreService>>, assembler: Arc<ChainAssembler>) -> Self {
        Self { store, assembler }
    }

    /// Create a block by `creator` whose parent is the current active tip.
    pub fn append_at_tip(
        &self,
        content: String,
        metadata: Metadata,
        creator: DeviceId,
    ) -> BlockStoreResult<Block> {
        let mut store = self.store.write();
        let tip = self.assembler.tip(&store.all_blocks());
        store.create_block(content, metadata, creator, tip)
    }
}

impl KnowledgeHistory for ChainLedger {
    fn recent_blocks(&self, limit: usize) -> Vec<Block> {
        let blocks = self.store.read().all_blocks();
        let mut chain = self.assembler.active_chain(&blocks);
        let skip = chain.len().saturating_sub(limit);
        chain.drain(..skip);
        chain
    }
}

impl BlockAppender for ChainLedger {
    fn append_block(
        &self,
        content: String,
        metadata: Metadata,
        creator: DeviceId,
    ) -> Result<Block, String> {
        self.append_at_tip(content, metadata, creator)
            .map_err(|e| e.to_string())
    }
}
