//! Driven ports (Outbound dependencies)
//!
//! The engine never touches the registry, the chain or the key store
//! directly; the runtime wires these ports to them.

use shared_crypto::{Secp256k1PublicKey, Secp256k1Signature};
use shared_types::{Block, DeviceId, Metadata, PeerRole};

/// Trust, role and key access, backed by the peer registry.
pub trait TrustLedger: Send + Sync {
    /// Current trust of a device in [0, 1]; unknown devices have 0.
    fn trust_level(&self, device_id: &DeviceId) -> f64;

    /// Role of a known device.
    fn role(&self, device_id: &DeviceId) -> Option<PeerRole>;

    /// Registered public key of a known device.
    fn public_key(&self, device_id: &DeviceId) -> Option<Secp256k1PublicKey>;

    /// Apply a reward (positive) or penalty (negative); returns the new level.
    fn adjust_trust(&self, device_id: &DeviceId, delta: f64) -> Result<f64, String>;
}

/// Recently accepted knowledge, newest last.
pub trait KnowledgeHistory: Send + Sync {
    /// Up to `limit` of the most recent blocks on the active chain.
    fn recent_blocks(&self, limit: usize) -> Vec<Block>;
}

/// Appends accepted knowledge to the chain.
pub trait BlockAppender: Send + Sync {
    /// Create a block created by `creator` at the chain tip and push it to peers.
    fn append_block(
        &self,
        content: String,
        metadata: Metadata,
        creator: DeviceId,
    ) -> Result<Block, String>;
}

/// The local authority key, present only on authority devices.
pub trait AuthoritySigner: Send + Sync {
    /// Device id the signature is attributed to.
    fn authority_id(&self) -> DeviceId;

    /// Sign `message`.
    fn sign(&self, message: &[u8]) -> Secp256k1Signature;
}
