//! Peer registry service.

use crate::config::RegistryConfig;
use crate::domain::{
    to_milli, PeerRecord, PeerRegistryEntry, RegistryError, RegistryResult, RegistrySnapshot,
};
use im_03_crdt::{Crdt, LwwRegister};
use shared_crypto::Secp256k1PublicKey;
use shared_types::{
    BatchOperation, DeviceId, InMemoryKVStore, KeyValueStore, PeerRole, SystemTimeSource,
    TimeSource, Timestamp,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

const PEER_PREFIX: &str = "peer:";

fn peer_key(device_id: &DeviceId) -> Vec<u8> {
    format!("{PEER_PREFIX}{device_id}").into_bytes()
}

fn encode(record: &PeerRecord) -> RegistryResult<Vec<u8>> {
    bincode::serialize(record).map_err(|e| RegistryError::Codec(e.to_string()))
}

/// Registry of known devices, owned by one local device.
///
/// Every write stamps the touched registers with a local monotonic tick and
/// persists the row before it becomes visible.
pub struct PeerRegistry {
    local_device: DeviceId,
    records: BTreeMap<DeviceId, PeerRecord>,
    store: Box<dyn KeyValueStore>,
    time_source: Arc<dyn TimeSource>,
    config: RegistryConfig,
    last_tick: u64,
}

impl PeerRegistry {
    /// Open over `store`, reloading persisted rows.
    pub fn open(
        local_device: DeviceId,
        store: Box<dyn KeyValueStore>,
        time_source: Arc<dyn TimeSource>,
        config: RegistryConfig,
    ) -> RegistryResult<Self> {
        if !(0.0..=1.0).contains(&config.default_trust) {
            return Err(RegistryError::InvalidTrust(config.default_trust));
        }

        let mut records = BTreeMap::new();
        let mut last_tick = 0;
        for (_, bytes) in store.prefix_scan(PEER_PREFIX.as_bytes())? {
            let record: PeerRecord =
                bincode::deserialize(&bytes).map_err(|e| RegistryError::Codec(e.to_string()))?;
            last_tick = last_tick
                .max(record.public_key.timestamp())
                .max(record.role.timestamp())
                .max(record.trust_base.timestamp());
            records.insert(record.device_id.clone(), record);
        }

        if !records.is_empty() {
            info!("[im-06] Restored {} peer records", records.len());
        }

        Ok(Self {
            local_device,
            records,
            store,
            time_source,
            config,
            last_tick,
        })
    }

    /// Ephemeral registry with the system clock.
    pub fn in_memory(local_device: DeviceId) -> Self {
        Self {
            local_device,
            records: BTreeMap::new(),
            store: Box::new(InMemoryKVStore::new()),
            time_source: Arc::new(SystemTimeSource),
            config: RegistryConfig::default(),
            last_tick: 0,
        }
    }

    /// Device that owns this registry.
    pub fn local_device(&self) -> &DeviceId {
        &self.local_device
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// View of one row.
    pub fn get(&self, device_id: &DeviceId) -> Option<PeerRegistryEntry> {
        self.records.get(device_id).map(PeerRecord::entry)
    }

    /// Every row, ordered by device id.
    pub fn entries(&self) -> Vec<PeerRegistryEntry> {
        self.records.values().map(PeerRecord::entry).collect()
    }

    /// Every device except the local one.
    pub fn remote_peers(&self) -> Vec<DeviceId> {
        self.records
            .keys()
            .filter(|id| **id != self.local_device)
            .cloned()
            .collect()
    }

    /// True if the device has a row.
    pub fn contains(&self, device_id: &DeviceId) -> bool {
        self.records.contains_key(device_id)
    }

    /// Trust level, 0.0 for unknown devices.
    pub fn trust_level(&self, device_id: &DeviceId) -> f64 {
        self.records
            .get(device_id)
            .map(PeerRecord::trust_level)
            .unwrap_or(0.0)
    }

    /// Role, if known.
    pub fn role(&self, device_id: &DeviceId) -> Option<PeerRole> {
        self.records.get(device_id).map(PeerRecord::role)
    }

    /// Public key, if known.
    pub fn public_key(&self, device_id: &DeviceId) -> Option<Secp256k1PublicKey> {
        self.records.get(device_id).and_then(PeerRecord::public_key)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if no rows.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Register or refresh a device's key and role.
    ///
    /// A new row starts at the configured default trust. Re-registering a
    /// known device leaves its trust untouched.
    pub fn register(
        &mut self,
        device_id: DeviceId,
        public_key: &Secp256k1PublicKey,
        role: PeerRole,
    ) -> RegistryResult<()> {
        let is_new = !self.records.contains_key(&device_id);
        let default_trust = to_milli(self.config.default_trust);
        let key_hex = public_key.to_hex();

        self.update(&device_id, |record, ts, writer| {
            record.public_key.set(key_hex, ts, writer.clone());
            record.role.set(role, ts, writer.clone());
            if record.trust_base.value().is_none() {
                record.trust_base.set(default_trust, ts, writer.clone());
            }
        })?;

        if is_new {
            info!("[im-06] Registered {} as {:?}", device_id, role);
        }
        Ok(())
    }

    /// Change a known device's role.
    pub fn set_role(&mut self, device_id: &DeviceId, role: PeerRole) -> RegistryResult<()> {
        self.require_known(device_id)?;
        self.update(device_id, |record, ts, writer| {
            record.role.set(role, ts, writer.clone());
        })?;
        info!("[im-06] {} is now {:?}", device_id, role);
        Ok(())
    }

    /// Set a known device's trust to an absolute level.
    ///
    /// The baseline is chosen so that, against the deltas seen so far, the
    /// level reads exactly `level`. Deltas merged later still apply on top.
    pub fn set_trust(&mut self, device_id: &DeviceId, level: f64) -> RegistryResult<()> {
        if !level.is_finite() || !(0.0..=1.0).contains(&level) {
            return Err(RegistryError::InvalidTrust(level));
        }
        self.require_known(device_id)?;
        self.update(device_id, |record, ts, writer| {
            let base = to_milli(level) - record.trust_delta.value();
            record.trust_base.set(base, ts, writer.clone());
        })
    }

    /// Reward (positive) or penalise (negative) a known device.
    ///
    /// Only the part of `delta` that keeps the level inside [0, 1] is
    /// recorded, so a penalty after saturation moves the level at once.
    /// Returns the trust level after the adjustment.
    pub fn adjust_trust(&mut self, device_id: &DeviceId, delta: f64) -> RegistryResult<f64> {
        if !delta.is_finite() {
            return Err(RegistryError::InvalidTrust(delta));
        }
        self.require_known(device_id)?;
        self.update(device_id, |record, _, writer| {
            let target = (record.trust_level() + delta).clamp(0.0, 1.0);
            record
                .trust_delta
                .add(writer, to_milli(target) - record.trust_milli());
        })?;
        let level = self.trust_level(device_id);
        debug!("[im-06] Trust of {} adjusted by {:+.3} to {:.3}", device_id, delta, level);
        Ok(level)
    }

    /// Record that a known device was heard from at `at` (Unix seconds).
    pub fn touch(&mut self, device_id: &DeviceId, at: Timestamp) -> RegistryResult<()> {
        match self.records.get(device_id) {
            None => Err(RegistryError::UnknownPeer(device_id.clone())),
            Some(record) if record.last_seen >= at => Ok(()),
            Some(_) => self.update(device_id, |record, _, _| record.last_seen = at),
        }
    }

    // -------------------------------------------------------------------------
    // Replication
    // -------------------------------------------------------------------------

    /// Export every row.
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            records: self.records.values().cloned().collect(),
        }
    }

    /// Merge a snapshot gossiped by `sender` row by row. Returns how many
    /// rows changed.
    ///
    /// Remote writes are screened before merging and refused ones keep
    /// their local value:
    ///
    /// - a known device's public key never changes through gossip
    /// - role, trust baseline and trust deltas are only taken from the local
    ///   device or an authority, and role and baseline writes must also be
    ///   authored by one
    /// - register timestamps and `last_seen` may not run ahead of the local
    ///   clock by more than `max_clock_skew_ms`
    pub fn merge(&mut self, sender: &DeviceId, remote: &RegistrySnapshot) -> RegistryResult<usize> {
        let horizon_ms = self
            .time_source
            .now_millis()
            .saturating_add(self.config.max_clock_skew_ms);
        let admission = Admission {
            sender_administers: self.administers(sender),
            horizon_ms,
            horizon_secs: horizon_ms / 1000,
        };

        let mut changed: Vec<PeerRecord> = Vec::new();
        let mut refused = 0;
        for incoming in &remote.records {
            let (screened, dropped) = self.screen(&admission, incoming);
            refused += dropped;
            let merged = match self.records.get(&incoming.device_id) {
                Some(local) => local.merged(&screened),
                None => screened,
            };
            if self.records.get(&incoming.device_id) != Some(&merged) {
                changed.push(merged);
            }
        }
        if refused > 0 {
            debug!("[im-06] Refused {} registry writes from {}", refused, sender);
        }

        if changed.is_empty() {
            return Ok(0);
        }

        let batch = changed
            .iter()
            .map(|record| Ok(BatchOperation::put(peer_key(&record.device_id), encode(record)?)))
            .collect::<RegistryResult<Vec<_>>>()?;
        self.store.atomic_batch_write(batch)?;

        let count = changed.len();
        for record in changed {
            self.last_tick = self
                .last_tick
                .max(record.public_key.timestamp())
                .max(record.role.timestamp())
                .max(record.trust_base.timestamp());
            self.records.insert(record.device_id.clone(), record);
        }
        debug!("[im-06] Merged {} peer records", count);
        Ok(count)
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// True for the local device and for devices registered as authorities.
    fn administers(&self, device_id: &DeviceId) -> bool {
        *device_id == self.local_device || self.role(device_id) == Some(PeerRole::Authority)
    }

    /// Copy of `incoming` with every refused write replaced by the local
    /// value, plus the number of refused writes that would have won.
    fn screen(&self, admission: &Admission, incoming: &PeerRecord) -> (PeerRecord, usize) {
        let blank = PeerRecord::new(incoming.device_id.clone());
        let local = self.records.get(&incoming.device_id).unwrap_or(&blank);
        let mut screened = incoming.clone();
        let mut refused = 0;

        let key_pinned = local.public_key.value().is_some();
        if key_pinned || incoming.public_key.timestamp() > admission.horizon_ms {
            refused += refuse(&mut screened.public_key, &local.public_key);
        }
        if !self.admits(admission, incoming.role.timestamp(), incoming.role.writer_id()) {
            refused += refuse(&mut screened.role, &local.role);
        }
        let base = &incoming.trust_base;
        if !self.admits(admission, base.timestamp(), base.writer_id()) {
            refused += refuse(&mut screened.trust_base, &local.trust_base);
        }
        if !admission.sender_administers && screened.trust_delta != local.trust_delta {
            screened.trust_delta = local.trust_delta.clone();
            refused += 1;
        }
        if incoming.last_seen > admission.horizon_secs {
            screened.last_seen = local.last_seen;
            refused += 1;
        }
        (screened, refused)
    }

    fn admits(&self, admission: &Admission, timestamp: u64, writer: &DeviceId) -> bool {
        admission.sender_administers
            && timestamp <= admission.horizon_ms
            && self.administers(writer)
    }

    fn require_known(&self, device_id: &DeviceId) -> RegistryResult<()> {
        if self.records.contains_key(device_id) {
            Ok(())
        } else {
            Err(RegistryError::UnknownPeer(device_id.clone()))
        }
    }

    fn next_timestamp(&mut self) -> u64 {
        let now = self.time_source.now_millis();
        self.last_tick = now.max(self.last_tick + 1);
        self.last_tick
    }

    /// Clone, apply, persist, then commit.
    fn update<F>(&mut self, device_id: &DeviceId, apply: F) -> RegistryResult<()>
    where
        F: FnOnce(&mut PeerRecord, u64, &DeviceId),
    {
        let mut record = self
            .records
            .get(device_id)
            .cloned()
            .unwrap_or_else(|| PeerRecord::new(device_id.clone()));

        let previous_tick = self.last_tick;
        let ts = self.next_timestamp();
        apply(&mut record, ts, &self.local_device);

        if let Err(e) = self.store.put(&peer_key(device_id), &encode(&record)?) {
            self.last_tick = previous_tick;
            return Err(e.into());
        }
        self.records.insert(device_id.clone(), record);
        Ok(())
    }
}

/// Limits on one incoming snapshot, fixed when the merge starts.
struct Admission {
    sender_administers: bool,
    horizon_ms: u64,
    horizon_secs: u64,
}

/// Put `local` back in place of `incoming`; counts 1 if the incoming write
/// would have won the merge.
fn refuse<T: Clone + Ord>(incoming: &mut LwwRegister<T>, local: &LwwRegister<T>) -> usize {
    let would_win = local.merged(incoming) != *local;
    *incoming = local.clone();
    usize::from(would_win)
}
