//! # im-04-consensus (Proof of Insight)
//!
//! Scores proposed knowledge, collects trust-weighted votes and, once the
//! weighted ratio reaches quorum, has an authority sign the proposal and
//! append it as a block.
//!
//! ## Scoring
//!
//! | Factor | Value |
//! |--------|-------|
//! | novelty | 1.0 if no similar knowledge among recent accepted blocks, 0.5 if one, 0.1 otherwise |
//! | verification | self-reported trust, clamped to [0, 1] |
//! | usefulness | configured constant |
//! | source_quality | proposer's registry trust |
//!
//! ## Voting
//!
//! `weight = voter trust`, `weighted_value = weight * confidence * (+1 | -1)`,
//! `ratio = sum(weighted_value) / sum(weight)`; accepted iff `ratio >= quorum`.
//!
//! This is a weighted majority vote, not BFT. Without a reachable signer an
//! accepted-by-vote proposal stays pending; `proposal_ttl` adds expiry.

#![warn(clippy::all)]

pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

pub use config::{ConsensusConfig, ScoreWeights};
pub use domain::{
    normalized_digest, signing_message, verify_authority_signature, ConsensusError,
    ConsensusResult, FinalizeOutcome, Knowledge, Proposal, ProposalStatus, ScoreBreakdown, Vote,
    META_AUTHORITY_ID, META_AUTHORITY_SIGNATURE, META_PROPOSAL_ID, META_PROPOSER_ID,
};
pub use ports::{AuthoritySigner, BlockAppender, KnowledgeHistory, TrustLedger};
pub use service::{ConsensusDependencies, ConsensusService};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
