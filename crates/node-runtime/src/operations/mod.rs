//! # Peer Operations
//!
//! Everything a peer does, as `impl PeerContext` blocks grouped by concern.
//!
//! - `blocks`: local block creation, inbound screening, chain view
//! - `sync`: delta-sync rounds
//! - `knowledge`: proposals, votes, finalization
//! - `gossip`: CRDT, registry, heartbeat and model-update exchange

pub mod blocks;
pub mod gossip;
pub mod knowledge;
pub mod sync;

pub use sync::SyncReport;
