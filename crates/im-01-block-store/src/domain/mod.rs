//! Block store domain: errors, Merkle tree and delta-sync messages.

pub mod errors;
pub mod merkle;
pub mod sync;

pub use errors::*;
pub use merkle::*;
pub use sync::*;
