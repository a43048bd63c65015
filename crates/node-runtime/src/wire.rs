//! # Peer Payloads
//!
//! Everything one peer says to another travels as a `Payload`, bincode
//! encoded and then sealed by the messaging layer:
//!
//! | Payload           | Handled by                                     |
//! |-------------------|------------------------------------------------|
//! | `sync_request`    | block store, answered with `sync_response`     |
//! | `sync_response`   | the waiting `sync_with_peer` call              |
//! | `block_push`      | block store, then consensus (remote accepts)   |
//! | `proposal_push`   | consensus import                               |
//! | `vote_push`       | consensus vote                                 |
//! | `model_update`    | latest-update table (federated learning hook)  |
//! | `crdt_state`      | CRDT merge                                     |
//! | `registry_state`  | registry merge                                 |
//! | `heartbeat`       | registry `last_seen`                           |

use im_01_block_store::{SyncRequest, SyncResponse};
use im_03_crdt::CrdtSnapshot;
use im_04_consensus::Proposal;
use im_06_peer_registry::RegistrySnapshot;
use serde::{Deserialize, Serialize};
use shared_types::{Block, DeviceId, Timestamp};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Model weight deltas a device shares with its peers.
///
/// The mesh only relays and keeps the newest version per device; training
/// and aggregation happen elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelUpdate {
    pub device_id: DeviceId,
    /// Monotonic per device; older versions are ignored.
    pub model_version: u64,
    pub weight_deltas: Vec<f64>,
    pub metrics: BTreeMap<String, f64>,
    pub sample_count: u64,
}

/// A vote as sent over the wire.
///
/// The receiver recomputes the weight from its own trust view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteBallot {
    pub proposal_id: Uuid,
    pub voter_id: DeviceId,
    pub accept: bool,
    pub confidence: f64,
}

/// Application payload carried inside an encrypted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    SyncRequest(SyncRequest),
    SyncResponse(SyncResponse),
    BlockPush(Block),
    ProposalPush(Proposal),
    VotePush(VoteBallot),
    ModelUpdate(ModelUpdate),
    CrdtState(CrdtSnapshot),
    RegistryState(RegistrySnapshot),
    Heartbeat { device_id: DeviceId, sent_at: Timestamp },
}

impl Payload {
    pub fn encode(&self) -> Result<Vec<u8>, String> {
        bincode::serialize(self).map_err(|e| e.to_string())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, String> {
        bincode::deserialize(bytes).map_err(|e| e.to_string())
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::SyncRequest(_) => "sync_request",
            Payload::SyncResponse(_) => "sync_response",
            Payload::BlockPush(_) => "block_push",
            Payload::ProposalPush(_) => "proposal_push",
            Payload::VotePush(_) => "vote_push",
            Payload::ModelUpdate(_) => "model_update",
            Payload::CrdtState(_) => "crdt_state",
            Payload::RegistryState(_) => "registry_state",
            Payload::Heartbeat { .. } => "heartbeat",
        }
    }
}
