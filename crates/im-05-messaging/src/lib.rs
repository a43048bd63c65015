//! # im-05-messaging
//!
//! End-to-end encrypted peer messages with a durable outbox, ACKs and
//! retries.
//!
//! ## Wire
//!
//! ```text
//! encrypted_message { message_id, sender_id, recipient_id, ciphertext, nonce, created_at }
//! message_ack       { message_id, sender_id }
//! ```
//!
//! Payloads are sealed with a key both peers derive from ECDH over their
//! registered secp256k1 keys; the message id and both device ids are bound
//! in as associated data.
//!
//! ## Delivery
//!
//! At-least-once on the wire, exactly-once to the payload handler: the
//! receiver remembers every message id it applied and only re-ACKs repeats.

#![warn(clippy::all)]

pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

pub use config::MessagingConfig;
pub use domain::{
    message_aad, DeliveryStatus, EncryptedMessage, HandlerError, InboxRecord, MessageQueue,
    MessagingError, MessagingResult, TransportError, WireFrame,
};
pub use ports::{InboundHandler, KeyDirectory, PeerTransport};
pub use service::{FrameOutcome, MessagingDependencies, MessagingService, RetryReport, SendReceipt};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
