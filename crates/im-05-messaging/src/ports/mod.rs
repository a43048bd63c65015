//! Ports for the messaging layer.

pub mod outbound;

pub use outbound::{InboundHandler, KeyDirectory, PeerTransport};
