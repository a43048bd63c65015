//! # Domain Errors
//!
//! Duplicates are not errors here: inserting a known block is a no-op that
//! reports `InsertOutcome::AlreadyKnown`.

use shared_types::{ContentHash, ErrorClass, KVStoreError};
use thiserror::Error;

/// Errors from block store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockStoreError {
    /// The claimed hash does not recompute from the block's fields.
    #[error("Hash mismatch: claimed {claimed}, computed {computed}")]
    HashMismatch {
        /// Hash carried by the block.
        claimed: ContentHash,
        /// Hash recomputed locally.
        computed: ContentHash,
    },

    /// No block with this hash.
    #[error("Block not found: {0}")]
    NotFound(ContentHash),

    /// Persistence failed.
    #[error("Storage error: {0}")]
    Storage(#[from] KVStoreError),

    /// A persisted block did not decode.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BlockStoreError {
    /// Map onto the shared error taxonomy.
    pub fn classify(&self) -> ErrorClass {
        match self {
            BlockStoreError::HashMismatch { .. } | BlockStoreError::Serialization(_) => {
                ErrorClass::Integrity
            }
            BlockStoreError::NotFound(_) => ErrorClass::Integrity,
            BlockStoreError::Storage(e) => ErrorClass::from(e),
        }
    }
}

/// Result alias for block store operations.
pub type BlockStoreResult<T> = Result<T, BlockStoreError>;
