//! Ports for the consensus engine.

pub mod outbound;

pub use outbound::{AuthoritySigner, BlockAppender, KnowledgeHistory, TrustLedger};
