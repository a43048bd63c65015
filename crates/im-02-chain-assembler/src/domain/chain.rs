//! # Block Tree
//!
//! Parent/child index over a block set, adapted from a fork-choice store:
//! blocks by hash, children by parent, and subtree heights for picking the
//! longest branch.

use super::errors::ChainError;
use serde::{Deserialize, Serialize};
use shared_types::{Block, ContentHash};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// A parent with more than one child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkPoint {
    /// The shared parent.
    pub parent: ContentHash,
    /// Competing children, sorted by hash.
    pub children: Vec<ContentHash>,
}

/// A block excluded at assembly, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedBlock {
    /// Excluded block.
    pub hash: ContentHash,
    /// Why.
    pub reason: ChainError,
}

/// Outcome of fork resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainView {
    /// The active chain, genesis first.
    pub blocks: Vec<Block>,
    /// Admissible blocks on losing branches (kept for audit).
    pub orphaned: Vec<ContentHash>,
    /// Blocks that failed the hash check or the authority gate.
    pub rejected: Vec<RejectedBlock>,
    /// Fork points among admissible blocks.
    pub forks: Vec<ForkPoint>,
}

impl ChainView {
    /// Hash of the last block in the active chain.
    pub fn tip(&self) -> Option<ContentHash> {
        self.blocks.last().map(|b| b.content_hash)
    }

    /// Length of the active chain.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// True if there is no active chain.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Content hashes of the active chain, genesis first.
    pub fn hashes(&self) -> Vec<ContentHash> {
        self.blocks.iter().map(|b| b.content_hash).collect()
    }
}

/// Index over a block set.
#[derive(Debug, Default)]
pub struct BlockTree<'a> {
    blocks: BTreeMap<ContentHash, &'a Block>,
    children: HashMap<ContentHash, Vec<ContentHash>>,
    roots: Vec<ContentHash>,
}

impl<'a> BlockTree<'a> {
    /// Index `blocks`. Duplicate hashes collapse to one entry.
    pub fn new(blocks: impl IntoIterator<Item = &'a Block>) -> Self {
        let mut tree = Self::default();
        for block in blocks {
            if tree.blocks.insert(block.content_hash, block).is_some() {
                continue;
            }
            match block.previous_hash {
                Some(parent) => tree
                    .children
                    .entry(parent)
                    .or_default()
                    .push(block.content_hash),
                None => tree.roots.push(block.content_hash),
            }
        }
        for children in tree.children.values_mut() {
            children.sort_unstable();
        }
        tree.roots.sort_unstable();
        tree
    }

    /// Block by hash.
    pub fn get(&self, hash: &ContentHash) -> Option<&'a Block> {
        self.blocks.get(hash).copied()
    }

    /// Children citing `parent`, sorted by hash.
    pub fn children(&self, parent: &ContentHash) -> &[ContentHash] {
        self.children.get(parent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Earliest genesis block (ties on hash).
    pub fn genesis(&self) -> Option<&'a Block> {
        self.roots
            .iter()
            .filter_map(|h| self.get(h))
            .min_by_key(|b| (b.created_at, b.content_hash))
    }

    /// Parents with more than one child.
    pub fn fork_points(&self) -> Vec<ForkPoint> {
        let mut forks: Vec<ForkPoint> = self
            .children
            .iter()
            .filter(|(_, children)| children.len() > 1)
            .map(|(parent, children)| ForkPoint {
                parent: *parent,
                children: children.clone(),
            })
            .collect();
        forks.sort_by_key(|f| f.parent);
        forks
    }

    /// Length of the longest path starting at each block reachable from a root.
    pub fn subtree_heights(&self) -> HashMap<ContentHash, usize> {
        // Breadth-first from the roots puts parents before children.
        let mut order = Vec::with_capacity(self.blocks.len());
        let mut queue: VecDeque<ContentHash> = self.roots.iter().copied().collect();
        while let Some(hash) = queue.pop_front() {
            order.push(hash);
            queue.extend(self.children(&hash).iter().copied());
        }

        let mut heights: HashMap<ContentHash, usize> = HashMap::with_capacity(order.len());
        for hash in order.iter().rev() {
            let below = self
                .children(hash)
                .iter()
                .filter_map(|c| heights.get(c))
                .max()
                .copied()
                .unwrap_or(0);
            heights.insert(*hash, below + 1);
        }
        heights
    }

    /// Every indexed hash.
    pub fn hashes(&self) -> impl Iterator<Item = &ContentHash> {
        self.blocks.keys()
    }
}
