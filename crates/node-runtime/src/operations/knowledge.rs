//! Proposals and votes, locally and as gossip.

use crate::container::PeerContext;
use crate::errors::NodeResult;
use crate::wire::{Payload, VoteBallot};
use im_04_consensus::{FinalizeOutcome, Knowledge, Proposal, ProposalStatus, Vote};
use mesh_telemetry::{BLOCKS_STORED, PROPOSALS_FINALIZED};
use shared_bus::MeshEvent;
use tracing::{info, warn};
use uuid::Uuid;

impl PeerContext {
    /// Score a proposal authored here and gossip it.
    pub async fn propose_knowledge(
        &self,
        knowledge: Knowledge,
        self_reported_trust: f64,
    ) -> NodeResult<Proposal> {
        let proposal = self.consensus.lock().propose_knowledge(
            self.device_id.clone(),
            knowledge,
            self_reported_trust,
        )?;
        self.emit(MeshEvent::ProposalCreated {
            proposal_id: proposal.id,
            proposer: proposal.proposer_device_id.clone(),
        });
        self.broadcast(&Payload::ProposalPush(proposal.clone())).await;
        Ok(proposal)
    }

    /// Adopt a proposal gossiped by a peer. Returns `false` if already known.
    pub fn import_proposal(&self, proposal: Proposal) -> NodeResult<bool> {
        let id = proposal.id;
        let proposer = proposal.proposer_device_id.clone();
        let imported = self.consensus.lock().import_proposal(proposal)?;
        if imported {
            self.emit(MeshEvent::ProposalCreated {
                proposal_id: id,
                proposer,
            });
        }
        Ok(imported)
    }

    /// Cast this device's vote and gossip the ballot.
    pub async fn vote(&self, proposal_id: Uuid, accept: bool, confidence: f64) -> NodeResult<Vote> {
        let vote = self.consensus.lock().vote_on_proposal(
            &proposal_id,
            self.device_id.clone(),
            accept,
            confidence,
        )?;
        let ballot = VoteBallot {
            proposal_id,
            voter_id: self.device_id.clone(),
            accept,
            confidence,
        };
        self.broadcast(&Payload::VotePush(ballot)).await;
        Ok(vote)
    }

    /// Record a peer's ballot, weighted by local trust.
    pub fn record_ballot(&self, ballot: VoteBallot) -> NodeResult<Vote> {
        let vote = self.consensus.lock().vote_on_proposal(
            &ballot.proposal_id,
            ballot.voter_id,
            ballot.accept,
            ballot.confidence,
        )?;
        Ok(vote)
    }

    /// Try to decide a proposal; an accepted one is pushed as a block.
    pub async fn finalize(&self, proposal_id: Uuid) -> NodeResult<FinalizeOutcome> {
        let outcome = self.consensus.lock().finalize_consensus(&proposal_id)?;
        if outcome.status == ProposalStatus::Pending {
            return Ok(outcome);
        }

        PROPOSALS_FINALIZED
            .with_label_values(&[&outcome.status.to_string()])
            .inc();
        self.emit(MeshEvent::ProposalFinalized {
            proposal_id,
            status: outcome.status.to_string(),
            block_hash: outcome.block.as_ref().map(|b| b.content_hash),
        });
        if let Some(block) = &outcome.block {
            BLOCKS_STORED.inc();
            self.emit(MeshEvent::BlockStored {
                hash: block.content_hash,
                creator: block.creator_device_id.clone(),
            });
            self.broadcast_block(block).await;
        }
        info!(
            "[node] Proposal {} finalized as {} (ratio {:?})",
            proposal_id, outcome.status, outcome.ratio
        );
        Ok(outcome)
    }

    /// Expire pending proposals past their time-to-live.
    pub fn expire_proposals(&self) -> Vec<Uuid> {
        let expired = self.consensus.lock().expire_stale();
        for id in &expired {
            PROPOSALS_FINALIZED.with_label_values(&["expired"]).inc();
            self.emit(MeshEvent::ProposalFinalized {
                proposal_id: *id,
                status: ProposalStatus::Expired.to_string(),
                block_hash: None,
            });
        }
        expired
    }

    pub fn proposal(&self, proposal_id: &Uuid) -> Option<Proposal> {
        self.consensus.lock().get_proposal(proposal_id).cloned()
    }

    /// Send `payload` to every remote peer, logging failures.
    pub(crate) async fn broadcast(&self, payload: &Payload) {
        for peer in self.remote_peers() {
            if let Err(e) = self.send(&peer, payload).await {
                warn!("[node] Could not queue {} for {}: {}", payload.kind(), peer, e);
            }
        }
    }
}
