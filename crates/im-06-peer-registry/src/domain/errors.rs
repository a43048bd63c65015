//! Registry errors.

use shared_types::{DeviceId, ErrorClass, KVStoreError};

/// Peer registry errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    /// No row for the device.
    #[error("Unknown peer: {0}")]
    UnknownPeer(DeviceId),

    /// Trust outside [0, 1] or not finite.
    #[error("Invalid trust level: {0}")]
    InvalidTrust(f64),

    /// Persistence failed.
    #[error("Storage error: {0}")]
    Storage(#[from] KVStoreError),

    /// Persisted row did not decode.
    #[error("Codec error: {0}")]
    Codec(String),
}

impl RegistryError {
    /// Map onto the shared error taxonomy.
    pub fn classify(&self) -> ErrorClass {
        match self {
            RegistryError::UnknownPeer(_) => ErrorClass::Authority,
            RegistryError::InvalidTrust(_) | RegistryError::Codec(_) => ErrorClass::Integrity,
            RegistryError::Storage(e) => ErrorClass::from(e),
        }
    }
}

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
