//! Consensus domain types.

pub mod errors;
pub mod proposal;
pub mod signing;

pub use errors::*;
pub use proposal::*;
pub use signing::*;
