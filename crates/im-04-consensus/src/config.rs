//! Consensus configuration.

use serde::{Deserialize, Serialize};

/// Relative weight of each scoring factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    /// Novelty weight.
    pub novelty: f64,
    /// Verification weight.
    pub verification: f64,
    /// Usefulness weight.
    pub usefulness: f64,
    /// Source quality weight.
    pub source_quality: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            novelty: 0.25,
            verification: 0.25,
            usefulness: 0.25,
            source_quality: 0.25,
        }
    }
}

impl ScoreWeights {
    /// Sum of all weights.
    pub fn sum(&self) -> f64 {
        self.novelty + self.verification + self.usefulness + self.source_quality
    }
}

/// Consensus configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Scoring weights.
    pub weights: ScoreWeights,
    /// Weighted ratio needed for acceptance (inclusive).
    pub quorum: f64,
    /// How many recent accepted blocks novelty looks at.
    pub novelty_window: usize,
    /// Usefulness factor until something better exists.
    pub usefulness: f64,
    /// Trust granted to the proposer on acceptance.
    pub trust_reward: f64,
    /// Subtract `trust_reward` from the proposer on rejection.
    pub penalise_rejections: bool,
    /// Pending proposals older than this many seconds expire. `None` disables.
    pub proposal_ttl_secs: Option<u64>,
    /// Trust an authority needs for its stamps to finalise proposals here.
    pub min_authority_trust: f64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            quorum: 0.51,
            novelty_window: 100,
            usefulness: 0.5,
            trust_reward: 0.1,
            penalise_rejections: false,
            proposal_ttl_secs: None,
            min_authority_trust: 0.5,
        }
    }
}
