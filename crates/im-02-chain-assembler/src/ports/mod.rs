//! Ports for the chain assembler.

pub mod outbound;

pub use outbound::AuthorityDirectory;
