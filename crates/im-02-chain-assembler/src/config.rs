//! Chain assembler configuration.

use serde::{Deserialize, Serialize};

/// Last-resort tie-break between equally long fork branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForkTieBreak {
    /// Branch whose first block was created earliest.
    #[default]
    EarliestTimestamp,
    /// Branch whose first block has the lowest hash.
    LowestHash,
}

/// Chain assembler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Enforce the Proof-of-Authority gate.
    pub require_authority: bool,
    /// Minimum creator trust for an admissible block.
    pub min_authority_trust: f64,
    /// Tie-break after length and authority.
    pub fork_tie_break: ForkTieBreak,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            require_authority: true,
            min_authority_trust: 0.5,
            fork_tie_break: ForkTieBreak::EarliestTimestamp,
        }
    }
}

impl ChainConfig {
    /// Gate disabled: every hash-valid block is admissible.
    pub fn permissive() -> Self {
        Self {
            require_authority: false,
            ..Self::default()
        }
    }
}
