//! # im-06-peer-registry
//!
//! Maps device ids to public keys, roles and trust levels.
//!
//! ## Convergent trust
//!
//! Each row is a small bundle of CRDTs, so concurrent edits from different
//! peers merge without coordination:
//!
//! | Field | CRDT |
//! |-------|------|
//! | `public_key` | LWW-Register |
//! | `role` | LWW-Register |
//! | `trust_base` | LWW-Register (milli-trust) |
//! | `trust_delta` | PN-Counter (milli-trust) |
//! | `last_seen` | max-register |
//!
//! `trust_level = clamp((trust_base + trust_delta) / 1000, 0, 1)`; two
//! peers that each reward the same device by 0.1 end up at +0.2 after
//! merging, not +0.1.
//!
//! Address discovery is not part of this crate; rows are created by
//! whoever learns about a peer.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod domain;
pub mod registry;

pub use config::RegistryConfig;
pub use domain::{PeerRecord, PeerRegistryEntry, RegistryError, RegistryResult, RegistrySnapshot};
pub use registry::PeerRegistry;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
