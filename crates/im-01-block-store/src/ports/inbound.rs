//! # Inbound Ports (Driving Ports)
//!
//! The API other components use to read and feed the block store.

use crate::domain::{
    BlockStoreResult, InsertOutcome, IntegrationReport, SyncRequest, SyncResponse,
};
use shared_types::{Block, ContentHash, DeviceId, Metadata};
use uuid::Uuid;

/// Primary API for the block store.
///
/// Implementations validate every block's hash before storing it and
/// persist before reporting success.
pub trait BlockStoreApi {
    /// Create, hash and persist a local block linked to `previous_hash`.
    fn create_block(
        &mut self,
        content: String,
        metadata: Metadata,
        creator: DeviceId,
        previous_hash: Option<ContentHash>,
    ) -> BlockStoreResult<Block>;

    /// Store a block received from elsewhere.
    ///
    /// ## Errors
    ///
    /// - `HashMismatch`: the claimed hash does not recompute
    /// - `Storage`: persistence failed
    fn insert_block(&mut self, block: Block) -> BlockStoreResult<InsertOutcome>;

    /// Look a block up by hash.
    fn get_block(&self, hash: &ContentHash) -> Option<&Block>;

    /// True if the block is held.
    fn contains(&self, hash: &ContentHash) -> bool;

    /// Every held hash, sorted.
    fn all_hashes(&self) -> Vec<ContentHash>;

    /// Every held block, sorted by hash.
    fn all_blocks(&self) -> Vec<Block>;

    /// Root of the Merkle tree over every held hash.
    fn merkle_root(&self) -> ContentHash;

    /// Build the `sync_request` for one round with a peer.
    fn build_sync_request(&self, request_id: Uuid) -> SyncRequest;

    /// Answer a peer's `sync_request`.
    fn handle_sync_request(&self, request: &SyncRequest) -> SyncResponse;

    /// Validate and store a batch of received blocks, dropping forged ones.
    fn integrate_blocks(&mut self, blocks: Vec<Block>) -> BlockStoreResult<IntegrationReport>;

    /// Integrate a `sync_response` and collect the blocks the peer asked for.
    fn integrate_sync_response(
        &mut self,
        response: SyncResponse,
    ) -> BlockStoreResult<(IntegrationReport, Vec<Block>)>;
}
