//! Registry rows.

use im_03_crdt::{Crdt, LwwRegister, PnCounter};
use serde::{Deserialize, Serialize};
use shared_crypto::Secp256k1PublicKey;
use shared_types::{DeviceId, PeerRole, Timestamp};

/// Trust is stored in thousandths so it can live in integer CRDTs.
pub const TRUST_SCALE: f64 = 1000.0;

/// Convert a trust value or delta into milli-trust.
pub fn to_milli(trust: f64) -> i64 {
    (trust * TRUST_SCALE).round() as i64
}

/// Replicated row for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    /// Device this row describes.
    pub device_id: DeviceId,
    /// Hex-encoded compressed public key.
    pub public_key: LwwRegister<String>,
    /// Authority or participant.
    pub role: LwwRegister<PeerRole>,
    /// Absolute trust baseline (milli-trust).
    pub trust_base: LwwRegister<i64>,
    /// Accumulated rewards and penalties (milli-trust).
    pub trust_delta: PnCounter,
    /// Max-register of the last time the device was heard from (Unix seconds).
    pub last_seen: Timestamp,
}

impl PeerRecord {
    /// Empty row.
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            public_key: LwwRegister::default(),
            role: LwwRegister::default(),
            trust_base: LwwRegister::default(),
            trust_delta: PnCounter::new(),
            last_seen: 0,
        }
    }

    /// Current role; participant until someone says otherwise.
    pub fn role(&self) -> PeerRole {
        self.role.value().copied().unwrap_or_default()
    }

    /// Unclamped `trust_base + trust_delta` in milli-trust.
    pub fn trust_milli(&self) -> i64 {
        let base = self.trust_base.value().copied().unwrap_or(0);
        base.saturating_add(self.trust_delta.value())
    }

    /// Current trust level in [0, 1].
    pub fn trust_level(&self) -> f64 {
        (self.trust_milli() as f64 / TRUST_SCALE).clamp(0.0, 1.0)
    }

    /// Decoded public key, if one is known and parses.
    pub fn public_key(&self) -> Option<Secp256k1PublicKey> {
        self.public_key
            .value()
            .and_then(|hex| Secp256k1PublicKey::from_hex(hex).ok())
    }

    /// Flattened view.
    pub fn entry(&self) -> PeerRegistryEntry {
        PeerRegistryEntry {
            device_id: self.device_id.clone(),
            public_key: self.public_key(),
            role: self.role(),
            trust_level: self.trust_level(),
            last_seen: self.last_seen,
        }
    }
}

impl Crdt for PeerRecord {
    fn merge(&mut self, other: &Self) {
        self.public_key.merge(&other.public_key);
        self.role.merge(&other.role);
        self.trust_base.merge(&other.trust_base);
        self.trust_delta.merge(&other.trust_delta);
        self.last_seen = self.last_seen.max(other.last_seen);
    }
}

/// Read-only view of a registry row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerRegistryEntry {
    /// Device id.
    pub device_id: DeviceId,
    /// Public key used for ECDH and signature checks.
    pub public_key: Option<Secp256k1PublicKey>,
    /// Role.
    pub role: PeerRole,
    /// Trust in [0, 1].
    pub trust_level: f64,
    /// Last heard from (Unix seconds, 0 if never).
    pub last_seen: Timestamp,
}

/// Full registry state as exchanged between peers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// Every known row.
    pub records: Vec<PeerRecord>,
}
