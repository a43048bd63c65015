//! # im-01-block-store
//!
//! Content-addressed block storage and Merkle delta sync.
//!
//! ## Sync protocol
//!
//! ```text
//! requester                         responder
//!   | sync_request{known_hashes}  ->  |
//!   |                                 | missing_for_requester = mine - theirs
//!   |                                 | peer_needs            = theirs - mine
//!   | <- sync_response{blocks, missing_hashes}
//!   | validate + store blocks         |
//!   | block_push(missing) ---------->  |
//! ```
//!
//! No locking or agreement is involved; repeated rounds converge.
//!
//! ## Invariants
//!
//! - Every stored block's hash recomputes from its fields.
//! - Inserting a known block is a no-op.
//! - Blocks are never mutated or deleted.

#![warn(clippy::all)]

pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

pub use config::BlockStoreConfig;
pub use domain::{
    compute_merkle_root, verify_merkle_proof, BlockStoreError, BlockStoreResult, InsertOutcome,
    IntegrationReport, MerkleTree, Position, ProofNode, SyncRequest, SyncResponse,
};
pub use ports::BlockStoreApi;
pub use service::BlockStoreService;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
