//! # Authority Stamps
//!
//! An accepted proposal becomes a block created by the signing authority.
//! The block's metadata carries the proposal id, the proposer, the
//! authority id and a secp256k1 signature over:
//!
//! ```text
//! "insight-mesh/proposal/v1" || proposal_id (16 bytes)
//!   || len(proposer) || proposer || SHA256(content)
//! ```
//!
//! so any peer can check the stamp against the authority's registered key.

use super::errors::{ConsensusError, ConsensusResult};
use shared_crypto::{sha256, Secp256k1PublicKey, Secp256k1Signature};
use shared_types::{Block, DeviceId};
use uuid::Uuid;

/// Metadata key: proposal id.
pub const META_PROPOSAL_ID: &str = "proposal_id";
/// Metadata key: proposing device.
pub const META_PROPOSER_ID: &str = "proposer_id";
/// Metadata key: signing authority.
pub const META_AUTHORITY_ID: &str = "authority_id";
/// Metadata key: hex signature.
pub const META_AUTHORITY_SIGNATURE: &str = "authority_signature";

const DOMAIN_TAG: &[u8] = b"insight-mesh/proposal/v1";

/// Bytes an authority signs for a proposal.
pub fn signing_message(proposal_id: &Uuid, proposer: &DeviceId, content: &str) -> Vec<u8> {
    let proposer = proposer.as_str().as_bytes();
    let mut message = Vec::with_capacity(DOMAIN_TAG.len() + 16 + 8 + proposer.len() + 32);
    message.extend_from_slice(DOMAIN_TAG);
    message.extend_from_slice(proposal_id.as_bytes());
    message.extend_from_slice(&(proposer.len() as u64).to_be_bytes());
    message.extend_from_slice(proposer);
    message.extend_from_slice(&sha256(content.as_bytes()));
    message
}

/// SHA-256 of content lower-cased with whitespace collapsed.
///
/// Two pieces of knowledge are "similar" when these digests match.
pub fn normalized_digest(content: &str) -> [u8; 32] {
    let normalized = content
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ");
    sha256(normalized.as_bytes())
}

/// Check an accepted-proposal block's authority stamp.
///
/// Returns the authority id on success.
pub fn verify_authority_signature(
    block: &Block,
    authority_key: &Secp256k1PublicKey,
) -> ConsensusResult<DeviceId> {
    let meta = |key: &'static str| {
        block
            .metadata
            .get(key)
            .ok_or(ConsensusError::MissingMetadata(key))
    };

    let authority = DeviceId::new(meta(META_AUTHORITY_ID)?.as_str());
    let proposal_id = Uuid::parse_str(meta(META_PROPOSAL_ID)?)
        .map_err(|_| ConsensusError::MissingMetadata(META_PROPOSAL_ID))?;
    let proposer = DeviceId::new(meta(META_PROPOSER_ID)?.as_str());
    let signature = Secp256k1Signature::from_hex(meta(META_AUTHORITY_SIGNATURE)?)
        .map_err(|_| ConsensusError::InvalidSignature(authority.clone()))?;

    let message = signing_message(&proposal_id, &proposer, &block.content);
    authority_key
        .verify(&message, &signature)
        .map_err(|_| ConsensusError::InvalidSignature(authority.clone()))?;
    Ok(authority)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization_ignores_case_and_spacing() {
        assert_eq!(
            normalized_digest("Rust  has\tOwnership"),
            normalized_digest("rust has ownership")
        );
        assert_ne!(normalized_digest("rust"), normalized_digest("go"));
    }

    #[test]
    fn test_signing_message_binds_every_field() {
        let id = Uuid::new_v4();
        let base = signing_message(&id, &DeviceId::new("p"), "fact");
        assert_ne!(base, signing_message(&Uuid::new_v4(), &DeviceId::new("p"), "fact"));
        assert_ne!(base, signing_message(&id, &DeviceId::new("q"), "fact"));
        assert_ne!(base, signing_message(&id, &DeviceId::new("p"), "fact!"));
    }
}
