//! # Merkle Tree over Block Hashes
//!
//! Leaves are the sorted set of known block hashes. Each level pairs nodes
//! left to right and hashes `SHA256(left || right)`; a node left over at the
//! end of an odd-length level is promoted to the next level unchanged.
//!
//! The root fingerprints a peer's entire block set: two peers with equal
//! roots skip the sync round.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared_types::ContentHash;

/// Side of the sibling in a proof step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
    /// Sibling is hashed on the left.
    Left,
    /// Sibling is hashed on the right.
    Right,
}

/// One step of an inclusion proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofNode {
    /// Sibling hash at this level.
    pub hash: ContentHash,
    /// Where the sibling sits.
    pub position: Position,
}

impl ProofNode {
    /// Sibling on the left.
    pub fn left(hash: ContentHash) -> Self {
        Self {
            hash,
            position: Position::Left,
        }
    }

    /// Sibling on the right.
    pub fn right(hash: ContentHash) -> Self {
        Self {
            hash,
            position: Position::Right,
        }
    }
}

/// Fully materialised tree. `levels[0]` holds the sorted leaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    levels: Vec<Vec<ContentHash>>,
}

impl MerkleTree {
    /// Build from any collection of hashes; leaves are sorted and deduplicated.
    pub fn from_hashes(hashes: impl IntoIterator<Item = ContentHash>) -> Self {
        let mut leaves: Vec<ContentHash> = hashes.into_iter().collect();
        leaves.sort_unstable();
        leaves.dedup();

        let mut levels = vec![leaves];
        while levels.last().map_or(0, Vec::len) > 1 {
            let next = levels
                .last()
                .map(|level| next_level(level))
                .unwrap_or_default();
            levels.push(next);
        }
        Self { levels }
    }

    /// Root hash. An empty tree has the all-zero root.
    pub fn root(&self) -> ContentHash {
        self.levels
            .last()
            .and_then(|top| top.first())
            .copied()
            .unwrap_or_default()
    }

    /// Sorted leaves.
    pub fn leaves(&self) -> &[ContentHash] {
        self.levels.first().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.leaves().len()
    }

    /// True for an empty tree.
    pub fn is_empty(&self) -> bool {
        self.leaves().is_empty()
    }

    /// Inclusion proof for `leaf`, or `None` if it is not in the tree.
    pub fn proof(&self, leaf: &ContentHash) -> Option<Vec<ProofNode>> {
        let mut index = self.leaves().binary_search(leaf).ok()?;
        let mut proof = Vec::new();

        for level in &self.levels[..self.levels.len().saturating_sub(1)] {
            let sibling = index ^ 1;
            if let Some(hash) = level.get(sibling) {
                proof.push(if index % 2 == 0 {
                    ProofNode::right(*hash)
                } else {
                    ProofNode::left(*hash)
                });
            }
            // No sibling: the node was promoted, nothing to hash at this level.
            index /= 2;
        }
        Some(proof)
    }
}

/// Root of the tree over `hashes`.
pub fn compute_merkle_root(hashes: impl IntoIterator<Item = ContentHash>) -> ContentHash {
    MerkleTree::from_hashes(hashes).root()
}

/// Check an inclusion proof against a root.
pub fn verify_merkle_proof(leaf: &ContentHash, proof: &[ProofNode], root: &ContentHash) -> bool {
    let mut current = *leaf;
    for node in proof {
        current = match node.position {
            Position::Left => hash_pair(&node.hash, &current),
            Position::Right => hash_pair(&current, &node.hash),
        };
    }
    current == *root
}

fn next_level(level: &[ContentHash]) -> Vec<ContentHash> {
    level
        .chunks(2)
        .map(|chunk| match chunk {
            [left, right] => hash_pair(left, right),
            _ => chunk[0],
        })
        .collect()
}

fn hash_pair(left: &ContentHash, right: &ContentHash) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    ContentHash::from_bytes(hasher.finalize().into())
}
