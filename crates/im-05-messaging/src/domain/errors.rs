//! Messaging errors.

use shared_crypto::CryptoError;
use shared_types::{DeviceId, ErrorClass, KVStoreError};
use thiserror::Error;

/// Failures of the byte channel below the message layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No channel to the peer.
    #[error("Peer unreachable: {0}")]
    Unreachable(DeviceId),

    /// The peer's inbound channel is closed or full.
    #[error("Channel closed: {0}")]
    Closed(String),
}

/// Messaging errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MessagingError {
    /// No public key for the recipient.
    #[error("Unknown recipient: {0}")]
    UnknownRecipient(DeviceId),

    /// No public key for the sender of an inbound frame.
    #[error("Unknown sender: {0}")]
    UnknownSender(DeviceId),

    /// Frame addressed to another device, or sender does not match the channel.
    #[error("Misrouted frame: {0}")]
    Misrouted(String),

    /// Frame bytes did not decode.
    #[error("Malformed frame: {0}")]
    Malformed(String),

    /// Sealing or opening failed.
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Durable queue failed.
    #[error("Storage error: {0}")]
    Storage(#[from] KVStoreError),

    /// Transport refused the frame.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Transport did not complete in time.
    #[error("Send to {0} timed out")]
    Timeout(DeviceId),

    /// The payload handler asked for redelivery.
    #[error("Handler deferred: {0}")]
    HandlerDeferred(String),

    /// No record for this message id.
    #[error("Unknown message: {0}")]
    UnknownMessage(uuid::Uuid),
}

impl MessagingError {
    /// Map onto the shared error taxonomy.
    pub fn classify(&self) -> ErrorClass {
        match self {
            MessagingError::UnknownRecipient(_) | MessagingError::UnknownSender(_) => {
                ErrorClass::Authority
            }
            MessagingError::Misrouted(_)
            | MessagingError::Malformed(_)
            | MessagingError::Crypto(_)
            | MessagingError::UnknownMessage(_) => ErrorClass::Integrity,
            MessagingError::Storage(e) => ErrorClass::from(e),
            MessagingError::Transport(_)
            | MessagingError::Timeout(_)
            | MessagingError::HandlerDeferred(_) => ErrorClass::TransientNetwork,
        }
    }
}

/// Result alias for messaging operations.
pub type MessagingResult<T> = Result<T, MessagingError>;

/// Error a payload handler returns.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// Payload is invalid; record the message as delivered and drop it.
    #[error("Rejected: {0}")]
    Reject(String),

    /// Payload could not be applied now; do not ACK so the sender retries.
    #[error("Retry: {0}")]
    Retry(String),
}
