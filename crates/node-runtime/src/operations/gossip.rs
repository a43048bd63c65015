//! State-based gossip: CRDT snapshots, registry snapshots, heartbeats and
//! model updates.

use crate::container::PeerContext;
use crate::errors::NodeResult;
use crate::wire::{ModelUpdate, Payload};
use im_03_crdt::{CrdtSnapshot, MergeReport};
use im_06_peer_registry::RegistrySnapshot;
use mesh_telemetry::PEERS_KNOWN;
use shared_bus::MeshEvent;
use shared_types::DeviceId;
use tracing::{debug, warn};

impl PeerContext {
    /// Push the full CRDT state to every remote peer.
    pub async fn share_crdt_state(&self) {
        let snapshot = self.crdt.read().get_state();
        self.broadcast(&Payload::CrdtState(snapshot)).await;
    }

    /// Push the registry snapshot to every remote peer.
    pub async fn share_registry_state(&self) {
        let snapshot = self.registry.read().snapshot();
        self.broadcast(&Payload::RegistryState(snapshot)).await;
    }

    /// Tell every remote peer this device is alive.
    pub async fn send_heartbeats(&self) {
        let heartbeat = Payload::Heartbeat {
            device_id: self.device_id.clone(),
            sent_at: self.time_source.now_secs(),
        };
        self.broadcast(&heartbeat).await;
    }

    /// Record this device's model update and relay it.
    ///
    /// The update is always attributed to this device.
    pub async fn publish_model_update(&self, mut update: ModelUpdate) {
        update.device_id = self.device_id.clone();
        if self.record_model_update(update.clone()) {
            self.broadcast(&Payload::ModelUpdate(update)).await;
        }
    }

    /// Keep `update` if it is newer than what is held for its device.
    pub fn record_model_update(&self, update: ModelUpdate) -> bool {
        let mut models = self.models.write();
        match models.get(&update.device_id) {
            Some(held) if held.model_version >= update.model_version => false,
            _ => {
                debug!(
                    "[node] Model update v{} from {} ({} samples)",
                    update.model_version, update.device_id, update.sample_count
                );
                models.insert(update.device_id.clone(), update);
                true
            }
        }
    }

    /// Newest model update held for `device_id`.
    pub fn model_update(&self, device_id: &DeviceId) -> Option<ModelUpdate> {
        self.models.read().get(device_id).cloned()
    }

    pub fn merge_crdt_state(&self, from: &DeviceId, snapshot: &CrdtSnapshot) -> NodeResult<MergeReport> {
        let report = self.crdt.write().merge_state(snapshot)?;
        if !report.rejected.is_empty() {
            warn!(
                "[node] Skipped {} CRDT keys from {} with conflicting kinds",
                report.rejected.len(),
                from
            );
        }
        if !report.changed.is_empty() {
            self.emit(MeshEvent::CrdtMerged {
                peer: from.clone(),
                changed: report.changed.len(),
            });
        }
        Ok(report)
    }

    /// Merge a registry snapshot gossiped by `from`. Writes `from` is not
    /// entitled to make are dropped by the registry.
    pub fn merge_registry_state(&self, from: &DeviceId, snapshot: &RegistrySnapshot) -> NodeResult<usize> {
        let (changed, known) = {
            let mut registry = self.registry.write();
            let changed = registry.merge(from, snapshot)?;
            (changed, registry.len())
        };
        PEERS_KNOWN.set(known as f64);
        if changed > 0 {
            self.emit(MeshEvent::RegistryMerged {
                peer: from.clone(),
                changed,
            });
        }
        Ok(changed)
    }

    /// Note traffic from `device_id`.
    pub fn mark_seen(&self, device_id: &DeviceId) {
        let at = self.time_source.now_secs();
        if let Err(e) = self.registry.write().touch(device_id, at) {
            debug!("[node] Could not mark {} seen: {}", device_id, e);
            return;
        }
        self.emit(MeshEvent::PeerSeen {
            device_id: device_id.clone(),
            at,
        });
    }

    /// Remote peers silent for longer than the configured timeout.
    ///
    /// A peer never heard from counts as stale.
    pub fn stale_peers(&self) -> Vec<DeviceId> {
        let now = self.time_source.now_secs();
        let timeout = self.config.network.peer_timeout_secs;
        self.registry
            .read()
            .entries()
            .into_iter()
            .filter(|entry| entry.device_id != self.device_id)
            .filter(|entry| now.saturating_sub(entry.last_seen) > timeout)
            .map(|entry| entry.device_id)
            .collect()
    }
}
