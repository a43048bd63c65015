//! # im-02-chain-assembler
//!
//! Derives the active chain from the block store's full block set. Nothing
//! is maintained incrementally: every call recomputes from the blocks it is
//! given, so two peers holding the same blocks derive the same chain.
//!
//! ## Rules
//!
//! - **Genesis**: the admissible block with no parent; earliest `created_at`
//!   wins when there are several.
//! - **Fork resolution**: at every branch the child heading the longest
//!   subtree wins; ties go to an authority-created child, then to the
//!   configured tie-break, then to the lower hash.
//! - **Authority gate**: with `require_authority`, only blocks whose creator
//!   is an authority with trust at or above `min_authority_trust` are
//!   admissible. Rejected blocks stay in the block store.

#![warn(clippy::all)]

pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

pub use config::{ChainConfig, ForkTieBreak};
pub use domain::{ChainError, ChainResult, ChainView, ForkPoint, RejectedBlock};
pub use ports::AuthorityDirectory;
pub use service::ChainAssembler;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
