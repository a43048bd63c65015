//! Messaging domain: message records, wire frames, durable queue, errors.

pub mod errors;
pub mod message;
pub mod queue;

pub use errors::*;
pub use message::*;
pub use queue::*;
