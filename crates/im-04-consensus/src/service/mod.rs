//! Consensus Service - Proof of Insight
//!
//! # Architecture
//! - Proposals live in memory, keyed by id
//! - Trust, history, block appending and signing are injected ports
//! - A proposal only leaves `Pending` through finalisation, observation of
//!   its accepted block, or expiry

use crate::config::ConsensusConfig;
use crate::domain::{
    normalized_digest, signing_message, verify_authority_signature, ConsensusError,
    ConsensusResult, FinalizeOutcome, Knowledge, Proposal, ProposalStatus, ScoreBreakdown, Vote,
    META_AUTHORITY_ID, META_AUTHORITY_SIGNATURE, META_PROPOSAL_ID, META_PROPOSER_ID,
};
use crate::ports::{AuthoritySigner, BlockAppender, KnowledgeHistory, TrustLedger};
use shared_types::{Block, DeviceId, PeerRole, TimeSource};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[cfg(test)]
mod tests;

/// Dependencies for ConsensusService
pub struct ConsensusDependencies {
    pub trust: Arc<dyn TrustLedger>,
    pub history: Arc<dyn KnowledgeHistory>,
    pub appender: Arc<dyn BlockAppender>,
    /// `None` on participant devices.
    pub signer: Option<Arc<dyn AuthoritySigner>>,
    pub time_source: Arc<dyn TimeSource>,
    pub config: ConsensusConfig,
}

/// Consensus Service
pub struct ConsensusService {
    trust: Arc<dyn TrustLedger>,
    history: Arc<dyn KnowledgeHistory>,
    appender: Arc<dyn BlockAppender>,
    signer: Option<Arc<dyn AuthoritySigner>>,
    time_source: Arc<dyn TimeSource>,
    config: ConsensusConfig,
    proposals: BTreeMap<Uuid, Proposal>,
}

impl ConsensusService {
    /// Create a new ConsensusService
    pub fn new(deps: ConsensusDependencies) -> Self {
        Self {
            trust: deps.trust,
            history: deps.history,
            appender: deps.appender,
            signer: deps.signer,
            time_source: deps.time_source,
            config: deps.config,
            proposals: BTreeMap::new(),
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    // === SCORING ===

    fn novelty(&self, knowledge: &Knowledge) -> f64 {
        let digest = normalized_digest(&knowledge.content);
        let similar = self
            .history
            .recent_blocks(self.config.novelty_window)
            .iter()
            .filter(|b| normalized_digest(&b.content) == digest)
            .count();
        match similar {
            0 => 1.0,
            1 => 0.5,
            _ => 0.1,
        }
    }

    /// Score `knowledge` as if `proposer` offered it now.
    pub fn score(
        &self,
        proposer: &DeviceId,
        knowledge: &Knowledge,
        self_reported_trust: f64,
    ) -> ScoreBreakdown {
        let w = &self.config.weights;
        let novelty = self.novelty(knowledge);
        let verification = if self_reported_trust.is_finite() {
            self_reported_trust.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let usefulness = self.config.usefulness;
        let source_quality = self.trust.trust_level(proposer);

        let weight_sum = w.sum();
        let total = if weight_sum > 0.0 {
            (w.novelty * novelty
                + w.verification * verification
                + w.usefulness * usefulness
                + w.source_quality * source_quality)
                / weight_sum
        } else {
            0.0
        };

        ScoreBreakdown {
            novelty,
            verification,
            usefulness,
            source_quality,
            total,
        }
    }

    // === OPERATIONS ===

    /// Score and register a new proposal.
    pub fn propose_knowledge(
        &mut self,
        proposer: DeviceId,
        knowledge: Knowledge,
        self_reported_trust: f64,
    ) -> ConsensusResult<Proposal> {
        if knowledge.content.trim().is_empty() {
            return Err(ConsensusError::EmptyKnowledge);
        }

        let calculated_score = self.score(&proposer, &knowledge, self_reported_trust);
        let proposal = Proposal {
            id: Uuid::new_v4(),
            proposer_device_id: proposer,
            knowledge,
            proposed_trust: self_reported_trust,
            calculated_score,
            status: ProposalStatus::Pending,
            votes: BTreeMap::new(),
            created_at: self.time_source.now_secs(),
            block_hash: None,
        };

        info!(
            "[im-04] Proposal {} from {} scored {:.3}",
            proposal.id, proposal.proposer_device_id, proposal.calculated_score.total
        );
        self.proposals.insert(proposal.id, proposal.clone());
        Ok(proposal)
    }

    /// Adopt a proposal received from a peer.
    ///
    /// The score is recomputed from the local trust view and any votes it
    /// carries are re-weighted. Returns `false` if the id is already known.
    pub fn import_proposal(&mut self, mut proposal: Proposal) -> ConsensusResult<bool> {
        if self.proposals.contains_key(&proposal.id) {
            return Ok(false);
        }
        if proposal.knowledge.content.trim().is_empty() {
            return Err(ConsensusError::EmptyKnowledge);
        }

        proposal.calculated_score = self.score(
            &proposal.proposer_device_id,
            &proposal.knowledge,
            proposal.proposed_trust,
        );
        proposal.status = ProposalStatus::Pending;
        proposal.block_hash = None;
        proposal.votes = proposal
            .votes
            .into_values()
            .filter(|v| (0.0..=1.0).contains(&v.confidence))
            .map(|v| {
                let weight = self.trust.trust_level(&v.voter_id);
                (v.voter_id.clone(), Vote::new(v.voter_id, v.accept, v.confidence, weight))
            })
            .collect();

        debug!("[im-04] Imported proposal {}", proposal.id);
        self.proposals.insert(proposal.id, proposal);
        Ok(true)
    }

    /// Record `voter`'s vote; a later vote from the same voter replaces it.
    pub fn vote_on_proposal(
        &mut self,
        proposal_id: &Uuid,
        voter: DeviceId,
        accept: bool,
        confidence: f64,
    ) -> ConsensusResult<Vote> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(ConsensusError::InvalidConfidence(confidence));
        }
        let weight = self.trust.trust_level(&voter);

        let proposal = self
            .proposals
            .get_mut(proposal_id)
            .ok_or(ConsensusError::UnknownProposal(*proposal_id))?;
        if !proposal.is_pending() {
            return Err(ConsensusError::AlreadyFinalized {
                id: *proposal_id,
                status: proposal.status.to_string(),
            });
        }

        let vote = Vote::new(voter.clone(), accept, confidence, weight);
        debug!(
            "[im-04] Vote on {} by {}: accept={} weighted={:.3}",
            proposal_id, voter, accept, vote.weighted_value
        );
        proposal.votes.insert(voter, vote.clone());
        Ok(vote)
    }

    /// Decide a proposal from the votes collected so far.
    ///
    /// With no weight cast the proposal stays pending. Reaching quorum
    /// without a signer is an error and also leaves it pending.
    pub fn finalize_consensus(&mut self, proposal_id: &Uuid) -> ConsensusResult<FinalizeOutcome> {
        let proposal = self
            .proposals
            .get(proposal_id)
            .ok_or(ConsensusError::UnknownProposal(*proposal_id))?;
        if !proposal.is_pending() {
            return Err(ConsensusError::AlreadyFinalized {
                id: *proposal_id,
                status: proposal.status.to_string(),
            });
        }

        let Some(ratio) = proposal.ratio() else {
            return Ok(FinalizeOutcome {
                status: ProposalStatus::Pending,
                ratio: None,
                block: None,
            });
        };

        if ratio >= self.config.quorum {
            let block = self.accept(proposal_id)?;
            Ok(FinalizeOutcome {
                status: ProposalStatus::Accepted,
                ratio: Some(ratio),
                block: Some(block),
            })
        } else {
            self.reject(proposal_id, ratio)?;
            Ok(FinalizeOutcome {
                status: ProposalStatus::Rejected,
                ratio: Some(ratio),
                block: None,
            })
        }
    }

    fn accept(&mut self, proposal_id: &Uuid) -> ConsensusResult<Block> {
        let signer = self
            .signer
            .clone()
            .ok_or(ConsensusError::SignerUnavailable(*proposal_id))?;
        let proposal = self
            .proposals
            .get(proposal_id)
            .ok_or(ConsensusError::UnknownProposal(*proposal_id))?;

        let authority = signer.authority_id();
        let message = signing_message(
            &proposal.id,
            &proposal.proposer_device_id,
            &proposal.knowledge.content,
        );
        let signature = signer.sign(&message);

        let mut metadata = proposal.knowledge.metadata.clone();
        metadata.insert(META_PROPOSAL_ID.into(), proposal.id.to_string());
        metadata.insert(META_PROPOSER_ID.into(), proposal.proposer_device_id.to_string());
        metadata.insert(META_AUTHORITY_ID.into(), authority.to_string());
        metadata.insert(META_AUTHORITY_SIGNATURE.into(), signature.to_hex());

        let block = self
            .appender
            .append_block(proposal.knowledge.content.clone(), metadata, authority)
            .map_err(ConsensusError::AppendFailed)?;

        let proposer = proposal.proposer_device_id.clone();
        if let Some(p) = self.proposals.get_mut(proposal_id) {
            p.status = ProposalStatus::Accepted;
            p.block_hash = Some(block.content_hash);
        }

        match self.trust.adjust_trust(&proposer, self.config.trust_reward) {
            Ok(level) => debug!("[im-04] Rewarded {} to trust {:.3}", proposer, level),
            Err(e) => warn!("[im-04] Could not reward {}: {}", proposer, e),
        }

        info!(
            "[im-04] Proposal {} accepted as block {}",
            proposal_id,
            block.content_hash.short()
        );
        Ok(block)
    }

    fn reject(&mut self, proposal_id: &Uuid, ratio: f64) -> ConsensusResult<()> {
        let proposal = self
            .proposals
            .get_mut(proposal_id)
            .ok_or(ConsensusError::UnknownProposal(*proposal_id))?;
        proposal.status = ProposalStatus::Rejected;
        let proposer = proposal.proposer_device_id.clone();

        if self.config.penalise_rejections {
            if let Err(e) = self.trust.adjust_trust(&proposer, -self.config.trust_reward) {
                warn!("[im-04] Could not penalise {}: {}", proposer, e);
            }
        }
        info!("[im-04] Proposal {} rejected at ratio {:.4}", proposal_id, ratio);
        Ok(())
    }

    /// Mark a pending proposal accepted when its stamped block arrives from
    /// the authority that finalised it. Returns the proposal id if one changed.
    ///
    /// Blocks for unknown or settled proposals are ignored. For a pending
    /// proposal the block must carry its content and proposer, and the stamp
    /// must pass [`Self::check_stamp`].
    pub fn observe_block(&mut self, block: &Block) -> ConsensusResult<Option<Uuid>> {
        let Some(raw_id) = block.metadata.get(META_PROPOSAL_ID) else {
            return Ok(None);
        };
        let id = Uuid::parse_str(raw_id)
            .map_err(|_| ConsensusError::MissingMetadata(META_PROPOSAL_ID))?;
        let Some(proposal) = self.proposals.get(&id) else {
            return Ok(None);
        };
        if !proposal.is_pending() {
            return Ok(None);
        }
        let proposer = proposal.proposer_device_id.as_str();
        if block.content != proposal.knowledge.content
            || block.metadata.get(META_PROPOSER_ID).map(String::as_str) != Some(proposer)
        {
            return Err(ConsensusError::StampMismatch(id));
        }
        let authority = self.check_stamp(block)?;

        if let Some(proposal) = self.proposals.get_mut(&id) {
            proposal.status = ProposalStatus::Accepted;
            proposal.block_hash = Some(block.content_hash);
        }
        debug!("[im-04] Proposal {} accepted remotely by {}", id, authority);
        Ok(Some(id))
    }

    /// Check an accepted-proposal block against the local trust view.
    ///
    /// The named authority must be the block's creator, hold the authority
    /// role with at least `min_authority_trust`, and have signed the stamp
    /// with its registered key. Returns the authority id.
    pub fn check_stamp(&self, block: &Block) -> ConsensusResult<DeviceId> {
        let authority = block
            .metadata
            .get(META_AUTHORITY_ID)
            .map(|id| DeviceId::new(id.as_str()))
            .ok_or(ConsensusError::MissingMetadata(META_AUTHORITY_ID))?;
        if block.creator_device_id != authority {
            return Err(ConsensusError::InvalidSignature(authority));
        }
        if self.trust.role(&authority) != Some(PeerRole::Authority)
            || self.trust.trust_level(&authority) < self.config.min_authority_trust
        {
            return Err(ConsensusError::NotAnAuthority(authority));
        }
        let key = self
            .trust
            .public_key(&authority)
            .ok_or_else(|| ConsensusError::NotAnAuthority(authority.clone()))?;
        verify_authority_signature(block, &key)
    }

    /// Expire pending proposals past the configured time-to-live.
    pub fn expire_stale(&mut self) -> Vec<Uuid> {
        let Some(ttl) = self.config.proposal_ttl_secs else {
            return Vec::new();
        };
        let now = self.time_source.now_secs();
        let mut expired = Vec::new();
        for proposal in self.proposals.values_mut() {
            if proposal.is_pending() && now.saturating_sub(proposal.created_at) >= ttl {
                proposal.status = ProposalStatus::Expired;
                expired.push(proposal.id);
            }
        }
        if !expired.is_empty() {
            info!("[im-04] Expired {} proposals", expired.len());
        }
        expired
    }

    // === QUERIES ===

    /// Status of a proposal.
    pub fn proposal_status(&self, proposal_id: &Uuid) -> Option<ProposalStatus> {
        self.proposals.get(proposal_id).map(|p| p.status)
    }

    /// Full proposal.
    pub fn get_proposal(&self, proposal_id: &Uuid) -> Option<&Proposal> {
        self.proposals.get(proposal_id)
    }

    /// Every pending proposal.
    pub fn pending_proposals(&self) -> Vec<&Proposal> {
        self.proposals.values().filter(|p| p.is_pending()).collect()
    }

    /// True if this device can stamp accepted proposals.
    pub fn has_signer(&self) -> bool {
        self.signer.is_some()
    }
}
