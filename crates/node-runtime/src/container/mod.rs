//! # Peer Container
//!
//! Configuration plus the component container that owns one peer's state.
//!
//! Components are initialized in dependency order: registry first, then the
//! storage-backed components, then consensus and messaging which consume the
//! adapters built over the first two levels.

pub mod components;
pub mod config;

pub use components::PeerContext;
pub use config::{ConfigError, NodeConfig, StorageBackend};
