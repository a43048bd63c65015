//! Proposals and votes.

use serde::{Deserialize, Serialize};
use shared_types::{Block, ContentHash, DeviceId, Metadata, Timestamp};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Block-shaped content offered for acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Knowledge {
    /// The knowledge text.
    pub content: String,
    /// Metadata carried into the accepted block.
    #[serde(default)]
    pub metadata: Metadata,
}

impl Knowledge {
    /// Knowledge with empty metadata.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Metadata::new(),
        }
    }
}

/// Lifecycle of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    /// Collecting votes.
    Pending,
    /// Reached quorum and was appended as a block.
    Accepted,
    /// Finalised below quorum.
    Rejected,
    /// Exceeded the configured time-to-live while pending.
    Expired,
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Accepted => "accepted",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// Per-factor score and weighted total.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// 1.0, 0.5 or 0.1 depending on similar recent knowledge.
    pub novelty: f64,
    /// Self-reported trust clamped to [0, 1].
    pub verification: f64,
    /// Configured constant.
    pub usefulness: f64,
    /// Proposer's trust at proposal time.
    pub source_quality: f64,
    /// Weighted mean of the factors.
    pub total: f64,
}

/// One voter's ballot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    /// Who voted.
    pub voter_id: DeviceId,
    /// Accept or reject.
    pub accept: bool,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Voter trust when the vote was counted.
    pub weight: f64,
    /// `weight * confidence * (+1 | -1)`.
    pub weighted_value: f64,
}

impl Vote {
    /// Build a vote, deriving `weighted_value`.
    pub fn new(voter_id: DeviceId, accept: bool, confidence: f64, weight: f64) -> Self {
        let sign = if accept { 1.0 } else { -1.0 };
        Self {
            voter_id,
            accept,
            confidence,
            weight,
            weighted_value: weight * confidence * sign,
        }
    }
}

/// A knowledge proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    /// Proposal id.
    pub id: Uuid,
    /// Proposing device.
    pub proposer_device_id: DeviceId,
    /// Content under vote.
    pub knowledge: Knowledge,
    /// Trust the proposer claims for the content.
    pub proposed_trust: f64,
    /// Score computed when the proposal was made.
    pub calculated_score: ScoreBreakdown,
    /// Lifecycle state.
    pub status: ProposalStatus,
    /// Latest vote per voter.
    pub votes: BTreeMap<DeviceId, Vote>,
    /// Creation time, Unix seconds.
    pub created_at: Timestamp,
    /// Hash of the block created on acceptance.
    #[serde(default)]
    pub block_hash: Option<ContentHash>,
}

impl Proposal {
    /// True while votes are still counted.
    pub fn is_pending(&self) -> bool {
        self.status == ProposalStatus::Pending
    }

    /// `sum(weighted_value) / sum(weight)`, or `None` with no weight cast.
    pub fn ratio(&self) -> Option<f64> {
        let total_weight: f64 = self.votes.values().map(|v| v.weight).sum();
        if total_weight <= 0.0 {
            return None;
        }
        let total_value: f64 = self.votes.values().map(|v| v.weighted_value).sum();
        Some(total_value / total_weight)
    }
}

/// What `finalize_consensus` decided.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizeOutcome {
    /// Resulting status; `Pending` when no weight has been cast yet.
    pub status: ProposalStatus,
    /// Weighted ratio, if any weight was cast.
    pub ratio: Option<f64>,
    /// Block appended on acceptance.
    pub block: Option<Block>,
}
