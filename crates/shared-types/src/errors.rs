//! # Error Types
//!
//! Storage errors and the cross-component error taxonomy.

use thiserror::Error;

/// Errors from a `KeyValueStore` backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KVStoreError {
    /// Underlying I/O failed.
    #[error("IO error: {message}")]
    IOError { message: String },

    /// A stored value could not be decoded.
    #[error("Corrupted record under key {key}: {message}")]
    Corruption { key: String, message: String },
}

/// Failure parsing a hex-encoded `ContentHash`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HashParseError {
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Invalid hash length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// How a failure must be treated by its caller.
///
/// Every component error maps onto exactly one class so sweeps can decide
/// between dropping, retrying, and aborting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Hash mismatch, broken link, undecodable payload. Reject and log.
    Integrity,
    /// Unauthorized or untrusted author/signer. Reject and log.
    Authority,
    /// Already known. Success no-op.
    Duplicate,
    /// Peer unreachable or timed out. Retry on the next sweep.
    TransientNetwork,
    /// Proposal has not reached a decision yet.
    ConsensusPending,
    /// Configuration, key material or local storage failure.
    Fatal,
}

impl ErrorClass {
    /// Only transient network failures are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::TransientNetwork)
    }

    /// Failures handled locally by logging and dropping the input.
    pub fn is_reject(&self) -> bool {
        matches!(self, ErrorClass::Integrity | ErrorClass::Authority)
    }

    /// Stable lowercase name, used as a metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Integrity => "integrity",
            ErrorClass::Authority => "authority",
            ErrorClass::Duplicate => "duplicate",
            ErrorClass::TransientNetwork => "transient_network",
            ErrorClass::ConsensusPending => "consensus_pending",
            ErrorClass::Fatal => "fatal",
        }
    }
}

impl From<&KVStoreError> for ErrorClass {
    fn from(err: &KVStoreError) -> Self {
        match err {
            KVStoreError::IOError { .. } => ErrorClass::Fatal,
            KVStoreError::Corruption { .. } => ErrorClass::Integrity,
        }
    }
}
