//! # Registry Adapters
//!
//! The peer registry answers three component ports:
//!
//! - chain assembler: `AuthorityDirectory` (role and trust of block creators)
//! - consensus: `TrustLedger` (vote weights, proposer rewards, stamp checks)
//! - messaging: `KeyDirectory` (ECDH keys of peers)

use im_02_chain_assembler::AuthorityDirectory;
use im_04_consensus::TrustLedger;
use im_05_messaging::KeyDirectory;
use im_06_peer_registry::PeerRegistry;
use parking_lot::RwLock;
use shared_crypto::Secp256k1PublicKey;
use shared_types::{DeviceId, PeerRole};
use std::sync::Arc;

/// Shared view of the registry for the other components.
#[derive(Clone)]
pub struct RegistryDirectory {
    registry: Arc<RwLock<PeerRegistry>>,
}

impl RegistryDirectory {
    pub fn new(registry: Arc<RwLock<PeerRegistry>>) -> Self {
        Self { registry }
    }
}

impl AuthorityDirectory for RegistryDirectory {
    fn role(&self, device_id: &DeviceId) -> Option<PeerRole> {
        self.registry.read().role(device_id)
    }

    fn trust_level(&self, device_id: &DeviceId) -> f64 {
        self.registry.read().trust_level(device_id)
    }
}

impl TrustLedger for RegistryDirectory {
    fn trust_level(&self, device_id: &DeviceId) -> f64 {
        self.registry.read().trust_level(device_id)
    }

    fn role(&self, device_id: &DeviceId) -> Option<PeerRole> {
        self.registry.read().role(device_id)
    }

    fn public_key(&self, device_id: &DeviceId) -> Option<Secp256k1PublicKey> {
        self.registry.read().public_key(device_id)
    }

    fn adjust_trust(&self, device_id: &DeviceId, delta: f64) -> Result<f64, String> {
        self.registry
            .write()
            .adjust_trust(device_id, delta)
            .map_err(|e| e.to_string())
    }
}

impl KeyDirectory for RegistryDirectory {
    fn public_key(&self, device_id: &DeviceId) -> Option<Secp256k1PublicKey> {
        self.registry.read().public_key(device_id)
    }
}
