//! # Chain Assembler Service
//!
//! Stateless over the block set it is handed; the only state is the
//! configuration and the authority directory.

use crate::config::{ChainConfig, ForkTieBreak};
use crate::domain::{BlockTree, ChainError, ChainResult, ChainView, ForkPoint, RejectedBlock};
use crate::ports::AuthorityDirectory;
use shared_types::{Block, ContentHash, PeerRole};
use std::cmp::{Ordering, Reverse};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Chain assembler.
pub struct ChainAssembler {
    config: ChainConfig,
    authorities: Arc<dyn AuthorityDirectory>,
}

impl ChainAssembler {
    /// Create an assembler consulting `authorities` for the gate.
    pub fn new(config: ChainConfig, authorities: Arc<dyn AuthorityDirectory>) -> Self {
        Self {
            config,
            authorities,
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Check a single block's hash and, if enabled, the authority gate.
    pub fn check_admissible(&self, block: &Block) -> ChainResult<()> {
        if !block.verify_hash() {
            return Err(ChainError::HashMismatch(block.content_hash));
        }
        if !self.config.require_authority {
            return Ok(());
        }

        let creator = &block.creator_device_id;
        if self.authorities.role(creator) != Some(PeerRole::Authority) {
            return Err(ChainError::NotAuthority {
                hash: block.content_hash,
                creator: creator.clone(),
            });
        }
        let trust = self.authorities.trust_level(creator);
        if trust < self.config.min_authority_trust {
            return Err(ChainError::InsufficientTrust {
                hash: block.content_hash,
                creator: creator.clone(),
                trust,
                required: self.config.min_authority_trust,
            });
        }
        Ok(())
    }

    /// Split `blocks` into admissible ones and rejections.
    fn admit<'a>(&self, blocks: &'a [Block]) -> (Vec<&'a Block>, Vec<RejectedBlock>) {
        let mut admitted = Vec::with_capacity(blocks.len());
        let mut rejected = Vec::new();
        for block in blocks {
            match self.check_admissible(block) {
                Ok(()) => admitted.push(block),
                Err(reason) => {
                    debug!("[im-02] Excluding block {}: {}", block.content_hash.short(), reason);
                    rejected.push(RejectedBlock {
                        hash: block.content_hash,
                        reason,
                    });
                }
            }
        }
        (admitted, rejected)
    }

    /// Naive assembly: from genesis, always follow the earliest child.
    ///
    /// This ignores branch length; `resolve_forks` gives the active chain.
    pub fn assemble(&self, blocks: &[Block]) -> Vec<Block> {
        let (admitted, _) = self.admit(blocks);
        let tree = BlockTree::new(admitted);

        let mut chain = Vec::new();
        let mut current = tree.genesis();
        while let Some(block) = current {
            chain.push(block.clone());
            current = tree
                .children(&block.content_hash)
                .iter()
                .filter_map(|h| tree.get(h))
                .min_by_key(|b| (b.created_at, b.content_hash));
        }
        chain
    }

    /// Validate hashes, links and timestamp order of a chain.
    pub fn validate(&self, chain: &[Block]) -> ChainResult<()> {
        if chain.is_empty() {
            return Err(ChainError::Empty);
        }

        let mut previous: Option<&Block> = None;
        for block in chain {
            if !block.verify_hash() {
                return Err(ChainError::HashMismatch(block.content_hash));
            }
            let expected = previous.map(|p| p.content_hash);
            if block.previous_hash != expected {
                return Err(ChainError::BrokenLink {
                    hash: block.content_hash,
                    expected,
                    found: block.previous_hash,
                });
            }
            if let Some(prev) = previous {
                if block.created_at < prev.created_at {
                    return Err(ChainError::TimestampRegression {
                        hash: block.content_hash,
                        previous: prev.created_at,
                        found: block.created_at,
                    });
                }
            }
            previous = Some(block);
        }
        Ok(())
    }

    /// Fork points among admissible blocks.
    pub fn detect_forks(&self, blocks: &[Block]) -> Vec<ForkPoint> {
        let (admitted, _) = self.admit(blocks);
        BlockTree::new(admitted).fork_points()
    }

    /// Resolve every fork and return the active chain with its audit trail.
    pub fn resolve_forks(&self, blocks: &[Block]) -> ChainView {
        let (admitted, rejected) = self.admit(blocks);
        let tree = BlockTree::new(admitted);
        let heights = tree.subtree_heights();
        let forks = tree.fork_points();

        let mut chain = Vec::new();
        let mut current = tree.genesis();
        while let Some(block) = current {
            chain.push(block.clone());
            let children = tree.children(&block.content_hash);
            current = match children.len() {
                0 => None,
                1 => tree.get(&children[0]),
                _ => self.pick_branch(&tree, &heights, children),
            };
        }

        let on_chain: HashSet<ContentHash> = chain.iter().map(|b| b.content_hash).collect();
        let orphaned: Vec<ContentHash> = tree
            .hashes()
            .filter(|h| !on_chain.contains(*h))
            .copied()
            .collect();

        if !forks.is_empty() {
            debug!(
                "[im-02] Resolved {} fork points, {} blocks orphaned",
                forks.len(),
                orphaned.len()
            );
        }
        if let Some(tip) = chain.last() {
            if self.validate(&chain).is_err() {
                warn!("[im-02] Active chain ending at {} failed validation", tip.content_hash.short());
            }
        }

        ChainView {
            blocks: chain,
            orphaned,
            rejected,
            forks,
        }
    }

    /// The active chain only.
    pub fn active_chain(&self, blocks: &[Block]) -> Vec<Block> {
        self.resolve_forks(blocks).blocks
    }

    /// Tip of the active chain, the parent for the next local block.
    pub fn tip(&self, blocks: &[Block]) -> Option<ContentHash> {
        self.resolve_forks(blocks).tip()
    }

    fn pick_branch<'a>(
        &self,
        tree: &BlockTree<'a>,
        heights: &HashMap<ContentHash, usize>,
        children: &[ContentHash],
    ) -> Option<&'a Block> {
        children
            .iter()
            .filter_map(|h| tree.get(h))
            .min_by(|a, b| self.compare_branches(a, b, heights))
    }

    /// `Less` means `a` wins.
    fn compare_branches(
        &self,
        a: &Block,
        b: &Block,
        heights: &HashMap<ContentHash, usize>,
    ) -> Ordering {
        let height = |blk: &Block| heights.get(&blk.content_hash).copied().unwrap_or(0);
        let authority = |blk: &Block| {
            self.authorities.role(&blk.creator_device_id) == Some(PeerRole::Authority)
        };

        Reverse(height(a))
            .cmp(&Reverse(height(b)))
            .then_with(|| Reverse(authority(a)).cmp(&Reverse(authority(b))))
            .then_with(|| match self.config.fork_tie_break {
                ForkTieBreak::EarliestTimestamp => a.created_at.cmp(&b.created_at),
                ForkTieBreak::LowestHash => Ordering::Equal,
            })
            .then_with(|| a.content_hash.cmp(&b.content_hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::outbound::MockAuthorities;
    use shared_types::{DeviceId, Metadata};

    fn block(content: &str, creator: &str, at: u64, parent: Option<&Block>) -> Block {
        Block::new(
            content,
            Metadata::new(),
            at,
            DeviceId::new(creator),
            parent.map(|p| p.content_hash),
        )
    }

    fn authorities() -> Arc<MockAuthorities> {
        Arc::new(
            MockAuthorities::new()
                .with("auth", PeerRole::Authority, 0.9)
                .with("auth2", PeerRole::Authority, 0.6)
                .with("weak", PeerRole::Authority, 0.3)
                .with("user", PeerRole::Participant, 1.0),
        )
    }

    fn gated() -> ChainAssembler {
        ChainAssembler::new(ChainConfig::default(), authorities())
    }

    fn open() -> ChainAssembler {
        ChainAssembler::new(ChainConfig::permissive(), authorities())
    }

    #[test]
    fn test_assemble_linear_chain() {
        let g = block("g", "auth", 1, None);
        let b1 = block("b1", "auth", 2, Some(&g));
        let b2 = block("b2", "auth", 3, Some(&b1));
        let chain = gated().assemble(&[b2.clone(), g.clone(), b1.clone()]);
        assert_eq!(chain, vec![g, b1, b2]);
        assert!(gated().validate(&chain).is_ok());
    }

    #[test]
    fn test_assemble_follows_earliest_child() {
        let g = block("g", "auth", 1, None);
        let early = block("early", "auth", 5, Some(&g));
        let late = block("late", "auth", 9, Some(&g));
        let late2 = block("late2", "auth", 10, Some(&late));
        let chain = gated().assemble(&[g.clone(), early.clone(), late, late2]);
        assert_eq!(chain, vec![g, early]);
    }

    #[test]
    fn test_validate_detects_broken_link() {
        let g = block("g", "auth", 1, None);
        let stray = block("stray", "auth", 2, Some(&block("other", "auth", 1, None)));
        let err = gated().validate(&[g, stray]).unwrap_err();
        assert!(matches!(err, ChainError::BrokenLink { .. }));
    }

    #[test]
    fn test_validate_detects_timestamp_regression() {
        let g = block("g", "auth", 10, None);
        let b1 = block("b1", "auth", 5, Some(&g));
        let err = gated().validate(&[g, b1]).unwrap_err();
        assert!(matches!(err, ChainError::TimestampRegression { .. }));
    }

    #[test]
    fn test_validate_detects_tampering() {
        let g = block("g", "auth", 1, None);
        let mut b1 = block("b1", "auth", 2, Some(&g));
        b1.content = "rewritten".into();
        let err = gated().validate(&[g, b1]).unwrap_err();
        assert!(matches!(err, ChainError::HashMismatch(_)));
        assert_eq!(err.classify(), shared_types::ErrorClass::Integrity);
    }

    #[test]
    fn test_validate_rejects_empty() {
        assert_eq!(gated().validate(&[]), Err(ChainError::Empty));
    }

    #[test]
    fn test_longest_branch_wins() {
        let g = block("g", "auth", 1, None);
        let short = block("short", "auth", 2, Some(&g));
        let long1 = block("long1", "auth", 3, Some(&g));
        let long2 = block("long2", "auth", 4, Some(&long1));
        let view = gated().resolve_forks(&[g.clone(), short.clone(), long1.clone(), long2.clone()]);

        assert_eq!(view.hashes(), vec![g.content_hash, long1.content_hash, long2.content_hash]);
        assert_eq!(view.orphaned, vec![short.content_hash]);
        assert_eq!(view.forks.len(), 1);
        assert_eq!(view.forks[0].parent, g.content_hash);
    }

    #[test]
    fn test_equal_length_prefers_authority_creator() {
        let g = block("g", "auth", 1, None);
        let by_user = block("u", "user", 2, Some(&g));
        let by_auth = block("a", "auth2", 3, Some(&g));
        let view = open().resolve_forks(&[g.clone(), by_user, by_auth.clone()]);
        assert_eq!(view.tip(), Some(by_auth.content_hash));
    }

    #[test]
    fn test_equal_authority_prefers_earliest() {
        let g = block("g", "auth", 1, None);
        let first = block("first", "auth", 2, Some(&g));
        let second = block("second", "auth2", 3, Some(&g));
        let view = gated().resolve_forks(&[g, second, first.clone()]);
        assert_eq!(view.tip(), Some(first.content_hash));
    }

    #[test]
    fn test_fork_resolution_is_deterministic() {
        let g = block("g", "auth", 1, None);
        let x = block("x", "auth", 2, Some(&g));
        let y = block("y", "auth2", 2, Some(&g));
        let forward = vec![g.clone(), x.clone(), y.clone()];
        let backward = vec![y, x, g];

        let first = gated().resolve_forks(&forward);
        for _ in 0..5 {
            assert_eq!(gated().resolve_forks(&forward).hashes(), first.hashes());
            assert_eq!(gated().resolve_forks(&backward).hashes(), first.hashes());
        }
    }

    #[test]
    fn test_authority_gate_excludes_blocks() {
        let g = block("g", "auth", 1, None);
        let by_user = block("u", "user", 2, Some(&g));
        let by_weak = block("w", "weak", 3, Some(&g));
        let view = gated().resolve_forks(&[g.clone(), by_user.clone(), by_weak.clone()]);

        assert_eq!(view.hashes(), vec![g.content_hash]);
        assert_eq!(view.rejected.len(), 2);
        assert!(view.rejected.iter().any(|r| r.hash == by_user.content_hash
            && matches!(r.reason, ChainError::NotAuthority { .. })));
        assert!(view.rejected.iter().any(|r| r.hash == by_weak.content_hash
            && matches!(r.reason, ChainError::InsufficientTrust { .. })));
        assert_eq!(
            view.rejected[0].reason.classify(),
            shared_types::ErrorClass::Authority
        );
    }

    #[test]
    fn test_descendants_of_rejected_block_are_unreachable() {
        let g = block("g", "auth", 1, None);
        let bad = block("bad", "user", 2, Some(&g));
        let child = block("child", "auth", 3, Some(&bad));
        let view = gated().resolve_forks(&[g.clone(), bad, child.clone()]);
        assert_eq!(view.hashes(), vec![g.content_hash]);
        assert_eq!(view.orphaned, vec![child.content_hash]);
    }

    #[test]
    fn test_permissive_admits_everyone() {
        let g = block("g", "stranger", 1, None);
        let view = open().resolve_forks(&[g.clone()]);
        assert_eq!(view.hashes(), vec![g.content_hash]);
    }
}
