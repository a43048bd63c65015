//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Identity**: `DeviceId`, `PeerRole`
//! - **Content**: `ContentHash`, `Block`, `Metadata`

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::errors::HashParseError;

/// Wall-clock Unix seconds.
pub type Timestamp = u64;

/// Free-form block metadata. Sorted so hashing is order independent.
pub type Metadata = BTreeMap<String, String>;

// =============================================================================
// IDENTITY
// =============================================================================

/// Stable identifier of a device (peer) in the mesh.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a device id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({})", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Role of a peer in the Proof-of-Authority gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PeerRole {
    /// May author blocks that enter the active chain and sign accepted proposals.
    Authority,
    /// Syncs, votes and messages, but its blocks are not admitted to the chain.
    #[default]
    Participant,
}

impl PeerRole {
    /// True for `PeerRole::Authority`.
    pub fn is_authority(&self) -> bool {
        matches!(self, PeerRole::Authority)
    }
}

impl std::str::FromStr for PeerRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "authority" => Ok(PeerRole::Authority),
            "participant" => Ok(PeerRole::Participant),
            other => Err(format!("unknown peer role: {other}")),
        }
    }
}

// =============================================================================
// CONTENT
// =============================================================================

/// A 32-byte SHA-256 digest, hex encoded on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// Wrap raw digest bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lower-case hex encoding (64 chars).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64 character hex string.
    pub fn from_hex(s: &str) -> Result<Self, HashParseError> {
        let bytes = hex::decode(s).map_err(|e| HashParseError::InvalidHex(e.to_string()))?;
        let array: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| HashParseError::InvalidLength(bytes.len()))?;
        Ok(Self(array))
    }

    /// First 8 hex characters, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// SHA-256 of arbitrary bytes.
    pub fn digest(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({}..)", self.short())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ContentHash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A content-addressed knowledge block.
///
/// Immutable once created: `content_hash` covers every field except `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Local identifier, not part of the hash.
    pub id: Uuid,
    /// SHA-256 over the hashed fields.
    pub content_hash: ContentHash,
    /// The knowledge itself.
    pub content: String,
    /// Free-form key/value metadata.
    pub metadata: Metadata,
    /// Creation time, Unix seconds.
    pub created_at: Timestamp,
    /// Device that authored the block.
    pub creator_device_id: DeviceId,
    /// Hash of the predecessor; `None` for genesis.
    pub previous_hash: Option<ContentHash>,
}

impl Block {
    /// Build a block and compute its hash.
    pub fn new(
        content: impl Into<String>,
        metadata: Metadata,
        created_at: Timestamp,
        creator_device_id: DeviceId,
        previous_hash: Option<ContentHash>,
    ) -> Self {
        let content = content.into();
        let content_hash = Self::compute_hash(
            &content,
            &metadata,
            created_at,
            &creator_device_id,
            previous_hash.as_ref(),
        );
        Self {
            id: Uuid::new_v4(),
            content_hash,
            content,
            metadata,
            created_at,
            creator_device_id,
            previous_hash,
        }
    }

    /// Hash the content-bearing fields.
    ///
    /// Each variable-length field is prefixed with its big-endian `u64`
    /// length; metadata is hashed in key order.
    pub fn compute_hash(
        content: &str,
        metadata: &Metadata,
        created_at: Timestamp,
        creator: &DeviceId,
        previous_hash: Option<&ContentHash>,
    ) -> ContentHash {
        let mut hasher = Sha256::new();
        hash_field(&mut hasher, content.as_bytes());
        hasher.update((metadata.len() as u64).to_be_bytes());
        for (key, value) in metadata {
            hash_field(&mut hasher, key.as_bytes());
            hash_field(&mut hasher, value.as_bytes());
        }
        hasher.update(created_at.to_be_bytes());
        hash_field(&mut hasher, creator.as_str().as_bytes());
        match previous_hash {
            Some(prev) => {
                hasher.update([1u8]);
                hasher.update(prev.as_bytes());
            }
            None => hasher.update([0u8]),
        }
        ContentHash(hasher.finalize().into())
    }

    /// Recompute the hash from the current field values.
    pub fn recompute_hash(&self) -> ContentHash {
        Self::compute_hash(
            &self.content,
            &self.metadata,
            self.created_at,
            &self.creator_device_id,
            self.previous_hash.as_ref(),
        )
    }

    /// True when the stored hash matches the fields.
    pub fn verify_hash(&self) -> bool {
        self.recompute_hash() == self.content_hash
    }

    /// True when the block has no predecessor.
    pub fn is_genesis(&self) -> bool {
        self.previous_hash.is_none()
    }
}

fn hash_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block(prev: Option<ContentHash>) -> Block {
        let mut metadata = Metadata::new();
        metadata.insert("topic".into(), "rust".into());
        Block::new("ownership rules", metadata, 1_700_000_000, "device-a".into(), prev)
    }

    #[test]
    fn test_block_hash_verifies() {
        let block = sample_block(None);
        assert!(block.verify_hash());
        assert!(block.is_genesis());
    }

    #[test]
    fn test_tampered_content_fails_verification() {
        let mut block = sample_block(None);
        block.content.push('!');
        assert!(!block.verify_hash());
    }

    #[test]
    fn test_previous_hash_changes_digest() {
        let genesis = sample_block(None);
        let child = sample_block(Some(genesis.content_hash));
        assert_ne!(genesis.content_hash, child.content_hash);
    }

    #[test]
    fn test_id_is_not_hashed() {
        let a = sample_block(None);
        let b = sample_block(None);
        assert_ne!(a.id, b.id);
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_field_boundaries_are_unambiguous() {
        let a = Block::new("ab", Metadata::new(), 1, "c".into(), None);
        let b = Block::new("a", Metadata::new(), 1, "bc".into(), None);
        assert_ne!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_content_hash_hex_serde() {
        let hash = ContentHash::digest(b"hello");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash.to_hex()));
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }

    #[test]
    fn test_content_hash_rejects_bad_hex() {
        assert!(ContentHash::from_hex("zz").is_err());
        assert!(matches!(
            ContentHash::from_hex("abcd"),
            Err(HashParseError::InvalidLength(2))
        ));
    }

    #[test]
    fn test_block_survives_bincode() {
        let block = sample_block(Some(ContentHash::digest(b"parent")));
        let bytes = bincode::serialize(&block).unwrap();
        let decoded: Block = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, block);
        assert!(decoded.verify_hash());
    }

    #[test]
    fn test_peer_role_parse() {
        assert_eq!("Authority".parse::<PeerRole>().unwrap(), PeerRole::Authority);
        assert!("admin".parse::<PeerRole>().is_err());
    }
}
