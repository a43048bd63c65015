//! Error types for the CRDT engine.

use shared_types::{ErrorClass, KVStoreError};
use std::fmt;

/// Kind tag of a stored CRDT value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrdtKind {
    /// `LwwRegister<String>`
    Register,
    /// `GCounter`
    GCounter,
    /// `PnCounter`
    PnCounter,
    /// `OrSet<String>`
    OrSet,
}

impl fmt::Display for CrdtKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CrdtKind::Register => "lww_register",
            CrdtKind::GCounter => "g_counter",
            CrdtKind::PnCounter => "pn_counter",
            CrdtKind::OrSet => "or_set",
        };
        f.write_str(name)
    }
}

/// CRDT engine errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CrdtError {
    /// A key already holds a different CRDT kind.
    #[error("Kind mismatch for key {key}: expected {expected}, found {found}")]
    KindMismatch {
        /// Offending key
        key: String,
        /// Kind the caller asked for
        expected: CrdtKind,
        /// Kind already stored
        found: CrdtKind,
    },

    /// Persisted state could not be read or written.
    #[error("Storage error: {0}")]
    Storage(#[from] KVStoreError),

    /// Persisted bytes did not decode.
    #[error("Codec error: {0}")]
    Codec(String),
}

impl CrdtError {
    /// Map onto the shared error taxonomy.
    pub fn classify(&self) -> ErrorClass {
        match self {
            CrdtError::KindMismatch { .. } | CrdtError::Codec(_) => ErrorClass::Integrity,
            CrdtError::Storage(e) => ErrorClass::from(e),
        }
    }
}

/// Result alias for CRDT operations.
pub type CrdtResult<T> = Result<T, CrdtError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mismatch_message() {
        let err = CrdtError::KindMismatch {
            key: "likes".into(),
            expected: CrdtKind::OrSet,
            found: CrdtKind::PnCounter,
        };
        let msg = err.to_string();
        assert!(msg.contains("likes"));
        assert!(msg.contains("or_set"));
        assert!(msg.contains("pn_counter"));
        assert_eq!(err.classify(), ErrorClass::Integrity);
    }
}
