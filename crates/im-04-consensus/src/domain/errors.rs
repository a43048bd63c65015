//! Error types for the consensus engine.

use shared_types::{DeviceId, ErrorClass};
use uuid::Uuid;

/// Consensus error types.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConsensusError {
    #[error("Unknown proposal: {0}")]
    UnknownProposal(Uuid),

    #[error("Proposal {id} already {status}")]
    AlreadyFinalized { id: Uuid, status: String },

    #[error("Confidence {0} outside [0, 1]")]
    InvalidConfidence(f64),

    #[error("Empty knowledge content")]
    EmptyKnowledge,

    #[error("No authority signer available; proposal {0} stays pending")]
    SignerUnavailable(Uuid),

    #[error("Block is missing metadata key {0}")]
    MissingMetadata(&'static str),

    #[error("Authority signature invalid for block signed by {0}")]
    InvalidSignature(DeviceId),

    #[error("{0} is not an authority in good standing")]
    NotAnAuthority(DeviceId),

    #[error("Block does not carry the content of proposal {0}")]
    StampMismatch(Uuid),

    #[error("Block append failed: {0}")]
    AppendFailed(String),

    #[error("Trust update failed: {0}")]
    TrustUpdate(String),
}

impl ConsensusError {
    /// Map onto the shared error taxonomy.
    pub fn classify(&self) -> ErrorClass {
        match self {
            ConsensusError::SignerUnavailable(_) => ErrorClass::ConsensusPending,
            ConsensusError::AlreadyFinalized { .. } => ErrorClass::Duplicate,
            ConsensusError::InvalidSignature(_) | ConsensusError::NotAnAuthority(_) => {
                ErrorClass::Authority
            }
            ConsensusError::AppendFailed(_) | ConsensusError::TrustUpdate(_) => ErrorClass::Fatal,
            ConsensusError::UnknownProposal(_)
            | ConsensusError::InvalidConfidence(_)
            | ConsensusError::EmptyKnowledge
            | ConsensusError::MissingMetadata(_)
            | ConsensusError::StampMismatch(_) => ErrorClass::Integrity,
        }
    }
}

/// Result type for consensus operations.
pub type ConsensusResult<T> = Result<T, ConsensusError>;
