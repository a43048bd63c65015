use super::*;
use crate::domain::verify_authority_signature;
use crate::ScoreWeights;
use shared_crypto::{Secp256k1KeyPair, Secp256k1PublicKey, Secp256k1Signature};
use shared_types::{ManualTimeSource, Metadata};
use std::collections::HashMap;
use std::sync::Mutex;

// Mock implementations for testing
struct MockTrust {
    levels: Mutex<HashMap<DeviceId, f64>>,
    authorities: Mutex<HashMap<DeviceId, Secp256k1PublicKey>>,
}

impl MockTrust {
    fn new(entries: &[(&str, f64)]) -> Self {
        Self {
            levels: Mutex::new(
                entries
                    .iter()
                    .map(|(id, t)| (DeviceId::new(*id), *t))
                    .collect(),
            ),
            authorities: Mutex::new(HashMap::new()),
        }
    }

    fn add_authority(&self, id: &str, key: Secp256k1PublicKey) {
        self.authorities.lock().unwrap().insert(DeviceId::new(id), key);
    }
}

impl TrustLedger for MockTrust {
    fn trust_level(&self, device_id: &DeviceId) -> f64 {
        self.levels.lock().unwrap().get(device_id).copied().unwrap_or(0.0)
    }

    fn role(&self, device_id: &DeviceId) -> Option<PeerRole> {
        if self.authorities.lock().unwrap().contains_key(device_id) {
            Some(PeerRole::Authority)
        } else if self.levels.lock().unwrap().contains_key(device_id) {
            Some(PeerRole::Participant)
        } else {
            None
        }
    }

    fn public_key(&self, device_id: &DeviceId) -> Option<Secp256k1PublicKey> {
        self.authorities.lock().unwrap().get(device_id).cloned()
    }

    fn adjust_trust(&self, device_id: &DeviceId, delta: f64) -> Result<f64, String> {
        let mut levels = self.levels.lock().unwrap();
        let level = levels
            .get_mut(device_id)
            .ok_or_else(|| format!("unknown {device_id}"))?;
        *level = (*level + delta).clamp(0.0, 1.0);
        Ok(*level)
    }
}

#[derive(Default)]
struct MockChain {
    blocks: Mutex<Vec<Block>>,
}

impl KnowledgeHistory for MockChain {
    fn recent_blocks(&self, limit: usize) -> Vec<Block> {
        let blocks = self.blocks.lock().unwrap();
        let skip = blocks.len().saturating_sub(limit);
        blocks[skip..].to_vec()
    }
}

impl BlockAppender for MockChain {
    fn append_block(
        &self,
        content: String,
        metadata: Metadata,
        creator: DeviceId,
    ) -> Result<Block, String> {
        let mut blocks = self.blocks.lock().unwrap();
        let parent = blocks.last().map(|b| b.content_hash);
        let block = Block::new(content, metadata, 100, creator, parent);
        blocks.push(block.clone());
        Ok(block)
    }
}

struct KeySigner {
    id: DeviceId,
    key: Secp256k1KeyPair,
}

impl AuthoritySigner for KeySigner {
    fn authority_id(&self) -> DeviceId {
        self.id.clone()
    }

    fn sign(&self, message: &[u8]) -> Secp256k1Signature {
        self.key.sign(message)
    }
}

struct Harness {
    service: ConsensusService,
    trust: Arc<MockTrust>,
    chain: Arc<MockChain>,
    clock: ManualTimeSource,
    authority_key: Secp256k1KeyPair,
}

fn harness_with(config: ConsensusConfig, with_signer: bool) -> Harness {
    let trust = Arc::new(MockTrust::new(&[
        ("proposer", 0.5),
        ("full", 1.0),
        ("half", 0.5),
        ("low", 0.2),
        ("authority", 0.9),
    ]));
    let chain = Arc::new(MockChain::default());
    let clock = ManualTimeSource::at_secs(1_000);
    let authority_key = Secp256k1KeyPair::generate();
    trust.add_authority("authority", authority_key.public_key());
    let signer: Option<Arc<dyn AuthoritySigner>> = if with_signer {
        Some(Arc::new(KeySigner {
            id: DeviceId::new("authority"),
            key: Secp256k1KeyPair::from_bytes(authority_key.to_bytes()).unwrap(),
        }))
    } else {
        None
    };

    let service = ConsensusService::new(ConsensusDependencies {
        trust: trust.clone(),
        history: chain.clone(),
        appender: chain.clone(),
        signer,
        time_source: Arc::new(clock.clone()),
        config,
    });
    Harness {
        service,
        trust,
        chain,
        clock,
        authority_key,
    }
}

fn harness() -> Harness {
    harness_with(ConsensusConfig::default(), true)
}

fn propose(h: &mut Harness, content: &str) -> Uuid {
    h.service
        .propose_knowledge(DeviceId::new("proposer"), Knowledge::new(content), 0.8)
        .unwrap()
        .id
}

#[test]
fn test_score_breakdown() {
    let mut h = harness();
    let proposal = h
        .service
        .propose_knowledge(DeviceId::new("proposer"), Knowledge::new("fresh fact"), 0.8)
        .unwrap();
    let s = proposal.calculated_score;
    assert_eq!(s.novelty, 1.0);
    assert_eq!(s.verification, 0.8);
    assert_eq!(s.usefulness, 0.5);
    assert_eq!(s.source_quality, 0.5);
    assert!((s.total - (1.0 + 0.8 + 0.5 + 0.5) / 4.0).abs() < 1e-12);
    assert_eq!(proposal.status, ProposalStatus::Pending);
}

#[test]
fn test_self_reported_trust_is_clamped() {
    let h = harness();
    let s = h
        .service
        .score(&DeviceId::new("proposer"), &Knowledge::new("x"), 3.0);
    assert_eq!(s.verification, 1.0);
}

#[test]
fn test_novelty_drops_with_similar_history() {
    let h = harness();
    h.chain
        .append_block("Known Fact".into(), Metadata::new(), DeviceId::new("authority"))
        .unwrap();
    let once = h
        .service
        .score(&DeviceId::new("proposer"), &Knowledge::new("known   fact"), 0.5);
    assert_eq!(once.novelty, 0.5);

    h.chain
        .append_block("KNOWN FACT".into(), Metadata::new(), DeviceId::new("authority"))
        .unwrap();
    let twice = h
        .service
        .score(&DeviceId::new("proposer"), &Knowledge::new("known fact"), 0.5);
    assert_eq!(twice.novelty, 0.1);
}

#[test]
fn test_novelty_window_limits_history() {
    let mut config = ConsensusConfig::default();
    config.novelty_window = 1;
    let h = harness_with(config, true);
    h.chain
        .append_block("old fact".into(), Metadata::new(), DeviceId::new("authority"))
        .unwrap();
    h.chain
        .append_block("newer fact".into(), Metadata::new(), DeviceId::new("authority"))
        .unwrap();
    let s = h
        .service
        .score(&DeviceId::new("proposer"), &Knowledge::new("old fact"), 0.5);
    assert_eq!(s.novelty, 1.0);
}

#[test]
fn test_custom_weights() {
    let mut config = ConsensusConfig::default();
    config.weights = ScoreWeights {
        novelty: 1.0,
        verification: 0.0,
        usefulness: 0.0,
        source_quality: 0.0,
    };
    let h = harness_with(config, true);
    let s = h
        .service
        .score(&DeviceId::new("proposer"), &Knowledge::new("x"), 0.0);
    assert_eq!(s.total, 1.0);
}

#[test]
fn test_empty_knowledge_rejected() {
    let mut h = harness();
    let err = h
        .service
        .propose_knowledge(DeviceId::new("proposer"), Knowledge::new("   "), 0.5)
        .unwrap_err();
    assert_eq!(err, ConsensusError::EmptyKnowledge);
}

#[test]
fn test_vote_weight_comes_from_trust() {
    let mut h = harness();
    let id = propose(&mut h, "fact");
    let vote = h
        .service
        .vote_on_proposal(&id, DeviceId::new("half"), false, 0.6)
        .unwrap();
    assert_eq!(vote.weight, 0.5);
    assert!((vote.weighted_value + 0.3).abs() < 1e-12);
}

#[test]
fn test_invalid_confidence_rejected() {
    let mut h = harness();
    let id = propose(&mut h, "fact");
    let err = h
        .service
        .vote_on_proposal(&id, DeviceId::new("full"), true, 1.5)
        .unwrap_err();
    assert!(matches!(err, ConsensusError::InvalidConfidence(_)));
}

#[test]
fn test_repeat_vote_replaces() {
    let mut h = harness();
    let id = propose(&mut h, "fact");
    h.service
        .vote_on_proposal(&id, DeviceId::new("full"), false, 1.0)
        .unwrap();
    h.service
        .vote_on_proposal(&id, DeviceId::new("full"), true, 1.0)
        .unwrap();
    let proposal = h.service.get_proposal(&id).unwrap();
    assert_eq!(proposal.votes.len(), 1);
    assert_eq!(proposal.ratio(), Some(1.0));
}

#[test]
fn test_quorum_boundary_exact_is_accepted() {
    let mut h = harness();
    let id = propose(&mut h, "boundary fact");
    h.service
        .vote_on_proposal(&id, DeviceId::new("full"), true, 0.51)
        .unwrap();
    let outcome = h.service.finalize_consensus(&id).unwrap();
    assert_eq!(outcome.ratio, Some(0.51));
    assert_eq!(outcome.status, ProposalStatus::Accepted);
}

#[test]
fn test_quorum_boundary_just_below_is_rejected() {
    let mut h = harness();
    let id = propose(&mut h, "boundary fact");
    h.service
        .vote_on_proposal(&id, DeviceId::new("full"), true, 0.50999)
        .unwrap();
    let outcome = h.service.finalize_consensus(&id).unwrap();
    assert_eq!(outcome.status, ProposalStatus::Rejected);
    assert!(outcome.block.is_none());
    assert_eq!(h.service.proposal_status(&id), Some(ProposalStatus::Rejected));
}

#[test]
fn test_acceptance_appends_signed_block_and_rewards() {
    let mut h = harness();
    let id = propose(&mut h, "signed fact");
    h.service
        .vote_on_proposal(&id, DeviceId::new("full"), true, 0.9)
        .unwrap();
    h.service
        .vote_on_proposal(&id, DeviceId::new("low"), false, 0.5)
        .unwrap();

    let outcome = h.service.finalize_consensus(&id).unwrap();
    let block = outcome.block.unwrap();
    assert_eq!(block.creator_device_id, DeviceId::new("authority"));
    assert_eq!(block.metadata[META_PROPOSAL_ID], id.to_string());
    assert_eq!(h.chain.blocks.lock().unwrap().len(), 1);

    let authority = verify_authority_signature(&block, &h.authority_key.public_key()).unwrap();
    assert_eq!(authority, DeviceId::new("authority"));

    let proposer_trust = h.trust.trust_level(&DeviceId::new("proposer"));
    assert!((proposer_trust - 0.6).abs() < 1e-12);

    let proposal = h.service.get_proposal(&id).unwrap();
    assert_eq!(proposal.status, ProposalStatus::Accepted);
    assert_eq!(proposal.block_hash, Some(block.content_hash));
}

#[test]
fn test_tampered_stamp_fails_verification() {
    let mut h = harness();
    let id = propose(&mut h, "signed fact");
    h.service
        .vote_on_proposal(&id, DeviceId::new("full"), true, 1.0)
        .unwrap();
    let mut block = h.service.finalize_consensus(&id).unwrap().block.unwrap();
    block.content = "forged fact".into();

    let err = verify_authority_signature(&block, &h.authority_key.public_key()).unwrap_err();
    assert!(matches!(err, ConsensusError::InvalidSignature(_)));
    assert_eq!(err.classify(), shared_types::ErrorClass::Authority);
}

#[test]
fn test_no_votes_stays_pending() {
    let mut h = harness();
    let id = propose(&mut h, "lonely fact");
    let outcome = h.service.finalize_consensus(&id).unwrap();
    assert_eq!(outcome.status, ProposalStatus::Pending);
    assert_eq!(h.service.pending_proposals().len(), 1);
}

#[test]
fn test_missing_signer_keeps_pending() {
    let mut h = harness_with(ConsensusConfig::default(), false);
    let id = propose(&mut h, "fact");
    h.service
        .vote_on_proposal(&id, DeviceId::new("full"), true, 1.0)
        .unwrap();
    let err = h.service.finalize_consensus(&id).unwrap_err();
    assert_eq!(err.classify(), shared_types::ErrorClass::ConsensusPending);
    assert_eq!(h.service.proposal_status(&id), Some(ProposalStatus::Pending));
    assert!(h.chain.blocks.lock().unwrap().is_empty());
}

#[test]
fn test_no_penalty_by_default() {
    let mut h = harness();
    let id = propose(&mut h, "dubious");
    h.service
        .vote_on_proposal(&id, DeviceId::new("full"), false, 1.0)
        .unwrap();
    h.service.finalize_consensus(&id).unwrap();
    assert_eq!(h.trust.trust_level(&DeviceId::new("proposer")), 0.5);
}

#[test]
fn test_penalty_when_configured() {
    let mut config = ConsensusConfig::default();
    config.penalise_rejections = true;
    let mut h = harness_with(config, true);
    let id = propose(&mut h, "dubious");
    h.service
        .vote_on_proposal(&id, DeviceId::new("full"), false, 1.0)
        .unwrap();
    h.service.finalize_consensus(&id).unwrap();
    assert!((h.trust.trust_level(&DeviceId::new("proposer")) - 0.4).abs() < 1e-12);
}

#[test]
fn test_finalized_proposal_refuses_votes() {
    let mut h = harness();
    let id = propose(&mut h, "fact");
    h.service
        .vote_on_proposal(&id, DeviceId::new("full"), false, 1.0)
        .unwrap();
    h.service.finalize_consensus(&id).unwrap();
    let err = h
        .service
        .vote_on_proposal(&id, DeviceId::new("half"), true, 1.0)
        .unwrap_err();
    assert!(matches!(err, ConsensusError::AlreadyFinalized { .. }));
    assert!(h.service.finalize_consensus(&id).is_err());
}

#[test]
fn test_unknown_proposal() {
    let mut h = harness();
    let err = h
        .service
        .vote_on_proposal(&Uuid::new_v4(), DeviceId::new("full"), true, 1.0)
        .unwrap_err();
    assert!(matches!(err, ConsensusError::UnknownProposal(_)));
}

#[test]
fn test_expiry_disabled_by_default() {
    let mut h = harness();
    propose(&mut h, "fact");
    h.clock.advance_secs(1_000_000);
    assert!(h.service.expire_stale().is_empty());
}

#[test]
fn test_expiry_with_ttl() {
    let mut config = ConsensusConfig::default();
    config.proposal_ttl_secs = Some(60);
    let mut h = harness_with(config, true);
    let id = propose(&mut h, "fact");

    h.clock.advance_secs(59);
    assert!(h.service.expire_stale().is_empty());
    h.clock.advance_secs(1);
    assert_eq!(h.service.expire_stale(), vec![id]);
    assert_eq!(h.service.proposal_status(&id), Some(ProposalStatus::Expired));
}

#[test]
fn test_import_rescoring_and_duplicate() {
    let mut remote = harness();
    let mut proposal = remote
        .service
        .propose_knowledge(DeviceId::new("proposer"), Knowledge::new("shared fact"), 0.8)
        .unwrap();
    proposal.calculated_score.total = 99.0;
    proposal.votes.insert(
        DeviceId::new("low"),
        Vote::new(DeviceId::new("low"), true, 1.0, 1.0),
    );

    let mut local = harness();
    assert!(local.service.import_proposal(proposal.clone()).unwrap());
    assert!(!local.service.import_proposal(proposal.clone()).unwrap());

    let imported = local.service.get_proposal(&proposal.id).unwrap();
    assert!(imported.calculated_score.total <= 1.0);
    assert_eq!(imported.votes[&DeviceId::new("low")].weight, 0.2);
}

#[test]
fn test_observe_block_marks_accepted() {
    let mut authority = harness();
    let mut participant = harness_with(ConsensusConfig::default(), false);
    participant
        .trust
        .add_authority("authority", authority.authority_key.public_key());

    let id = propose(&mut authority, "fact");
    let proposal = authority.service.get_proposal(&id).unwrap().clone();
    participant.service.import_proposal(proposal).unwrap();

    authority
        .service
        .vote_on_proposal(&id, DeviceId::new("full"), true, 1.0)
        .unwrap();
    let block = authority.service.finalize_consensus(&id).unwrap().block.unwrap();

    assert_eq!(participant.service.observe_block(&block), Ok(Some(id)));
    assert_eq!(participant.service.proposal_status(&id), Some(ProposalStatus::Accepted));
    assert_eq!(participant.service.observe_block(&block), Ok(None));
}

/// Participant harness holding a copy of a fresh "fact" proposal.
fn pending_on_participant() -> (Harness, Uuid) {
    let mut origin = harness();
    let mut participant = harness_with(ConsensusConfig::default(), false);
    participant
        .trust
        .add_authority("authority", origin.authority_key.public_key());
    let id = propose(&mut origin, "fact");
    let proposal = origin.service.get_proposal(&id).unwrap().clone();
    participant.service.import_proposal(proposal).unwrap();
    (participant, id)
}

fn stamped(id: Uuid, content: &str, authority: &str, key: &Secp256k1KeyPair) -> Block {
    let signature = key.sign(&signing_message(&id, &DeviceId::new("proposer"), content));
    let mut metadata = Metadata::new();
    metadata.insert(META_PROPOSAL_ID.into(), id.to_string());
    metadata.insert(META_PROPOSER_ID.into(), "proposer".into());
    metadata.insert(META_AUTHORITY_ID.into(), authority.into());
    metadata.insert(META_AUTHORITY_SIGNATURE.into(), signature.to_hex());
    Block::new(content, metadata, 100, DeviceId::new(authority), None)
}

#[test]
fn test_unstamped_block_does_not_finalize() {
    let (mut participant, id) = pending_on_participant();
    let mut metadata = Metadata::new();
    metadata.insert(META_PROPOSAL_ID.into(), id.to_string());
    metadata.insert(META_PROPOSER_ID.into(), "proposer".into());
    let block = Block::new("fact", metadata, 100, DeviceId::new("low"), None);

    assert_eq!(
        participant.service.observe_block(&block),
        Err(ConsensusError::MissingMetadata(META_AUTHORITY_ID))
    );
    assert_eq!(participant.service.proposal_status(&id), Some(ProposalStatus::Pending));
}

#[test]
fn test_stamp_from_non_authority_does_not_finalize() {
    let (mut participant, id) = pending_on_participant();
    let block = stamped(id, "fact", "low", &Secp256k1KeyPair::generate());

    assert_eq!(
        participant.service.observe_block(&block),
        Err(ConsensusError::NotAnAuthority(DeviceId::new("low")))
    );
    assert_eq!(participant.service.proposal_status(&id), Some(ProposalStatus::Pending));
}

#[test]
fn test_forged_authority_stamp_does_not_finalize() {
    let (mut participant, id) = pending_on_participant();
    let block = stamped(id, "fact", "authority", &Secp256k1KeyPair::generate());

    assert_eq!(
        participant.service.observe_block(&block),
        Err(ConsensusError::InvalidSignature(DeviceId::new("authority")))
    );
    assert_eq!(participant.service.proposal_status(&id), Some(ProposalStatus::Pending));
}

#[test]
fn test_stamp_for_other_content_does_not_finalize() {
    let (mut participant, id) = pending_on_participant();
    let block = stamped(id, "a different fact", "authority", &Secp256k1KeyPair::generate());

    assert_eq!(
        participant.service.observe_block(&block),
        Err(ConsensusError::StampMismatch(id))
    );
}

#[test]
fn test_low_trust_authority_cannot_finalize() {
    let mut config = ConsensusConfig::default();
    config.min_authority_trust = 0.95;
    let mut origin = harness();
    let mut participant = harness_with(config, false);
    participant
        .trust
        .add_authority("authority", origin.authority_key.public_key());
    let id = propose(&mut origin, "fact");
    participant
        .service
        .import_proposal(origin.service.get_proposal(&id).unwrap().clone())
        .unwrap();
    origin
        .service
        .vote_on_proposal(&id, DeviceId::new("full"), true, 1.0)
        .unwrap();
    let block = origin.service.finalize_consensus(&id).unwrap().block.unwrap();

    assert_eq!(
        participant.service.observe_block(&block),
        Err(ConsensusError::NotAnAuthority(DeviceId::new("authority")))
    );
}
