//! Chain assembler domain types.

pub mod chain;
pub mod errors;

pub use chain::*;
pub use errors::*;
