//! # Delta Sync Messages
//!
//! One round trip: the requester sends every hash it knows, the responder
//! answers with the blocks the requester lacks and the hashes it lacks
//! itself, and the requester pushes those back.

use serde::{Deserialize, Serialize};
use shared_types::{Block, ContentHash};
use uuid::Uuid;

/// `sync_request{request_id, known_hashes}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Correlates the response with the waiting caller.
    pub request_id: Uuid,
    /// Every hash the requester holds, sorted.
    pub known_hashes: Vec<ContentHash>,
    /// Requester's Merkle root; equal roots short-circuit the response.
    pub merkle_root: ContentHash,
}

/// `sync_response{request_id, blocks, missing_hashes}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
    /// Echo of the request id.
    pub request_id: Uuid,
    /// Blocks the requester lacks.
    pub blocks: Vec<Block>,
    /// Hashes the responder lacks; the requester pushes these back.
    pub missing_hashes: Vec<ContentHash>,
}

impl SyncResponse {
    /// True if neither side needs anything.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty() && self.missing_hashes.is_empty()
    }
}

/// Result of feeding a batch of received blocks into the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrationReport {
    /// Newly stored blocks, in the order received.
    pub accepted: Vec<ContentHash>,
    /// Blocks already held.
    pub duplicates: Vec<ContentHash>,
    /// Blocks dropped because their hash did not recompute.
    pub rejected: Vec<ContentHash>,
}

impl IntegrationReport {
    /// True if at least one block was stored.
    pub fn changed(&self) -> bool {
        !self.accepted.is_empty()
    }
}

/// Result of a single insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The block was new and is now persisted.
    Inserted,
    /// The block was already known; nothing changed.
    AlreadyKnown,
}
