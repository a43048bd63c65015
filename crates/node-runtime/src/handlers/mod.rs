//! # Inbound Handlers
//!
//! Consumers of payloads the messaging layer has decrypted, de-duplicated
//! and is about to ACK.

pub mod dispatcher;

pub use dispatcher::Dispatcher;
