//! # Mesh Events
//!
//! Notifications that flow through the local bus.

use serde::{Deserialize, Serialize};
use shared_types::{ContentHash, DeviceId, Timestamp};
use uuid::Uuid;

/// Everything a component can announce on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MeshEvent {
    // =========================================================================
    // BLOCK STORE
    // =========================================================================
    /// A block passed hash verification and was stored.
    BlockStored {
        hash: ContentHash,
        creator: DeviceId,
    },

    /// A block was refused (hash mismatch, broken link, authority gate).
    BlockRejected { hash: ContentHash, reason: String },

    // =========================================================================
    // SYNC
    // =========================================================================
    /// One delta-sync round with a peer finished.
    SyncCompleted {
        peer: DeviceId,
        /// Blocks we accepted from the peer.
        accepted: usize,
        /// Blocks we pushed to the peer.
        pushed: usize,
    },

    /// A sync round failed soft (timeout, unreachable peer).
    SyncFailed { peer: DeviceId, reason: String },

    // =========================================================================
    // CHAIN
    // =========================================================================
    /// Fork resolution picked a tip.
    ChainResolved {
        tip: Option<ContentHash>,
        length: usize,
        orphaned: usize,
    },

    // =========================================================================
    // CRDT / REGISTRY
    // =========================================================================
    /// A peer's CRDT snapshot was merged.
    CrdtMerged { peer: DeviceId, changed: usize },

    /// A peer's registry snapshot was merged.
    RegistryMerged { peer: DeviceId, changed: usize },

    /// Any authenticated traffic or heartbeat from a peer.
    PeerSeen { device_id: DeviceId, at: Timestamp },

    // =========================================================================
    // CONSENSUS
    // =========================================================================
    /// A proposal entered voting.
    ProposalCreated { proposal_id: Uuid, proposer: DeviceId },

    /// A proposal left the pending state.
    ProposalFinalized {
        proposal_id: Uuid,
        status: String,
        block_hash: Option<ContentHash>,
    },

    // =========================================================================
    // MESSAGING
    // =========================================================================
    /// An outgoing message was acknowledged.
    MessageDelivered { message_id: Uuid, peer: DeviceId },

    /// An inbound duplicate was suppressed.
    DuplicateSuppressed { message_id: Uuid, peer: DeviceId },

    // =========================================================================
    // CRITICAL
    // =========================================================================
    /// Unrecoverable error requiring operator attention.
    CriticalError { component: String, error: String },
}

impl MeshEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::BlockStored { .. } | Self::BlockRejected { .. } => EventTopic::Storage,
            Self::SyncCompleted { .. } | Self::SyncFailed { .. } => EventTopic::Sync,
            Self::ChainResolved { .. } => EventTopic::Chain,
            Self::CrdtMerged { .. } | Self::RegistryMerged { .. } | Self::PeerSeen { .. } => {
                EventTopic::Peers
            }
            Self::ProposalCreated { .. } | Self::ProposalFinalized { .. } => {
                EventTopic::Consensus
            }
            Self::MessageDelivered { .. } | Self::DuplicateSuppressed { .. } => {
                EventTopic::Messaging
            }
            Self::CriticalError { .. } => EventTopic::Critical,
        }
    }

    /// The peer this event concerns, if any.
    #[must_use]
    pub fn peer(&self) -> Option<&DeviceId> {
        match self {
            Self::BlockStored { creator, .. } => Some(creator),
            Self::SyncCompleted { peer, .. }
            | Self::SyncFailed { peer, .. }
            | Self::CrdtMerged { peer, .. }
            | Self::RegistryMerged { peer, .. }
            | Self::MessageDelivered { peer, .. }
            | Self::DuplicateSuppressed { peer, .. } => Some(peer),
            Self::PeerSeen { device_id, .. } => Some(device_id),
            Self::ProposalCreated { proposer, .. } => Some(proposer),
            Self::BlockRejected { .. }
            | Self::ChainResolved { .. }
            | Self::ProposalFinalized { .. }
            | Self::CriticalError { .. } => None,
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    Storage,
    Sync,
    Chain,
    Peers,
    Consensus,
    Messaging,
    /// Critical errors.
    Critical,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Peers to include. Empty means any peer (and peer-less events).
    pub peers: Vec<DeviceId>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            peers: Vec::new(),
        }
    }

    /// Create a filter for events concerning specific peers.
    #[must_use]
    pub fn for_peers(peers: Vec<DeviceId>) -> Self {
        Self {
            topics: Vec::new(),
            peers,
        }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &MeshEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let peer_match = self.peers.is_empty()
            || event.peer().map_or(false, |p| self.peers.contains(p));

        topic_match && peer_match
    }
}
