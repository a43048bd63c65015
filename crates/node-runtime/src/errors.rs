//! Runtime error type.

use crate::adapters::keystore::KeystoreError;
use crate::adapters::storage::DataDirError;
use crate::container::config::ConfigError;
use im_01_block_store::BlockStoreError;
use im_03_crdt::CrdtError;
use im_04_consensus::ConsensusError;
use im_05_messaging::MessagingError;
use im_06_peer_registry::RegistryError;
use shared_types::{DeviceId, ErrorClass, KVStoreError};
use thiserror::Error;

/// Anything a peer-level operation can fail with.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Keystore(#[from] KeystoreError),

    #[error(transparent)]
    DataDir(#[from] DataDirError),

    #[error("Storage error: {0}")]
    Storage(#[from] KVStoreError),

    #[error(transparent)]
    BlockStore(#[from] BlockStoreError),

    #[error(transparent)]
    Crdt(#[from] CrdtError),

    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Payload codec error: {0}")]
    Codec(String),

    #[error("Peer {0} could not be reached")]
    PeerUnreachable(DeviceId),

    #[error("Sync with {0} timed out")]
    SyncTimeout(DeviceId),

    #[error("Node is shutting down")]
    ShuttingDown,
}

impl NodeError {
    /// How the caller should treat this failure.
    pub fn classify(&self) -> ErrorClass {
        match self {
            NodeError::BlockStore(e) => e.classify(),
            NodeError::Crdt(e) => e.classify(),
            NodeError::Consensus(e) => e.classify(),
            NodeError::Messaging(e) => e.classify(),
            NodeError::Registry(e) => e.classify(),
            NodeError::Storage(e) => ErrorClass::from(e),
            NodeError::Codec(_) => ErrorClass::Integrity,
            NodeError::PeerUnreachable(_) | NodeError::SyncTimeout(_) => {
                ErrorClass::TransientNetwork
            }
            NodeError::Config(_)
            | NodeError::Keystore(_)
            | NodeError::DataDir(_)
            | NodeError::ShuttingDown => ErrorClass::Fatal,
        }
    }
}

pub type NodeResult<T> = Result<T, NodeError>;
