//! Registry domain types.

pub mod errors;
pub mod record;

pub use errors::*;
pub use record::*;
