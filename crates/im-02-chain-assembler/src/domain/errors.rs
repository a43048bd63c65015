//! Chain errors.

use shared_types::{ContentHash, DeviceId, ErrorClass, Timestamp};

/// Why a block or a chain was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChainError {
    /// The chain has no blocks.
    #[error("Empty chain")]
    Empty,

    /// Block hash does not recompute.
    #[error("Hash mismatch at block {0}")]
    HashMismatch(ContentHash),

    /// `previous_hash` does not point at the prior block.
    #[error("Broken link at block {hash}: expected parent {expected:?}, found {found:?}")]
    BrokenLink {
        /// Offending block.
        hash: ContentHash,
        /// Hash of the prior block (`None` for the first position).
        expected: Option<ContentHash>,
        /// What the block actually cites.
        found: Option<ContentHash>,
    },

    /// `created_at` went backwards along the chain.
    #[error("Timestamp regression at block {hash}: {found} < {previous}")]
    TimestampRegression {
        /// Offending block.
        hash: ContentHash,
        /// Prior block's timestamp.
        previous: Timestamp,
        /// This block's timestamp.
        found: Timestamp,
    },

    /// Creator is not an authority.
    #[error("Block {hash} created by non-authority {creator}")]
    NotAuthority {
        /// Offending block.
        hash: ContentHash,
        /// Its creator.
        creator: DeviceId,
    },

    /// Creator is an authority but below the trust threshold.
    #[error("Block {hash} creator {creator} trust {trust:.3} below {required:.3}")]
    InsufficientTrust {
        /// Offending block.
        hash: ContentHash,
        /// Its creator.
        creator: DeviceId,
        /// Creator's trust.
        trust: f64,
        /// Configured minimum.
        required: f64,
    },
}

impl ChainError {
    /// Map onto the shared error taxonomy.
    pub fn classify(&self) -> ErrorClass {
        match self {
            ChainError::NotAuthority { .. } | ChainError::InsufficientTrust { .. } => {
                ErrorClass::Authority
            }
            _ => ErrorClass::Integrity,
        }
    }
}

/// Result alias for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;
