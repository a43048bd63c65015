//! Local block creation, inbound block screening and the chain view.

use crate::container::PeerContext;
use crate::errors::NodeResult;
use crate::wire::Payload;
use im_01_block_store::{BlockStoreApi, IntegrationReport};
use im_02_chain_assembler::ChainView;
use im_04_consensus::{META_AUTHORITY_ID, META_AUTHORITY_SIGNATURE, META_PROPOSAL_ID};
use mesh_telemetry::{BLOCKS_REJECTED, BLOCKS_STORED, CHAIN_LENGTH};
use shared_bus::MeshEvent;
use shared_types::{Block, DeviceId, ErrorClass, Metadata};
use tracing::{info, warn};

const STAMP_KEYS: [&str; 3] = [META_PROPOSAL_ID, META_AUTHORITY_ID, META_AUTHORITY_SIGNATURE];

impl PeerContext {
    /// Create a block authored by this device on the active tip and push it
    /// to every known peer.
    pub async fn create_block(&self, content: String, metadata: Metadata) -> NodeResult<Block> {
        let block = self
            .ledger
            .append_at_tip(content, metadata, self.device_id.clone())?;
        BLOCKS_STORED.inc();
        self.emit(MeshEvent::BlockStored {
            hash: block.content_hash,
            creator: block.creator_device_id.clone(),
        });
        self.broadcast_block(&block).await;
        Ok(block)
    }

    /// Queue `block` for every remote peer. Failed sends stay in the outbox.
    pub(crate) async fn broadcast_block(&self, block: &Block) {
        self.broadcast(&Payload::BlockPush(block.clone())).await;
    }

    /// Drop blocks that claim to finalise a proposal without a stamp that
    /// checks out against the local registry.
    ///
    /// Blocks with no stamp metadata at all pass; the chain assembler gates
    /// them by creator.
    pub(crate) fn screen_blocks(&self, from: &DeviceId, blocks: Vec<Block>) -> Vec<Block> {
        let consensus = self.consensus.lock();
        blocks
            .into_iter()
            .filter(|block| {
                let claims_stamp = STAMP_KEYS.iter().any(|k| block.metadata.contains_key(*k));
                if !claims_stamp {
                    return true;
                }
                match consensus.check_stamp(block) {
                    Ok(_) => true,
                    Err(e) => {
                        warn!(
                            "[node] Dropping block {} from {}: bad authority stamp ({})",
                            block.content_hash.short(),
                            from,
                            e
                        );
                        BLOCKS_REJECTED
                            .with_label_values(&[e.classify().as_str()])
                            .inc();
                        self.emit(MeshEvent::BlockRejected {
                            hash: block.content_hash,
                            reason: e.to_string(),
                        });
                        false
                    }
                }
            })
            .collect()
    }

    /// Account for a finished integration: events, metrics and proposals
    /// accepted elsewhere.
    pub(crate) fn after_integration(&self, report: &IntegrationReport) {
        for hash in &report.rejected {
            BLOCKS_REJECTED
                .with_label_values(&[ErrorClass::Integrity.as_str()])
                .inc();
            self.emit(MeshEvent::BlockRejected {
                hash: *hash,
                reason: "content hash mismatch".to_string(),
            });
        }
        if report.accepted.is_empty() {
            return;
        }

        let accepted: Vec<Block> = {
            let store = self.block_store.read();
            report
                .accepted
                .iter()
                .filter_map(|h| store.get_block(h).cloned())
                .collect()
        };
        for block in &accepted {
            BLOCKS_STORED.inc();
            self.emit(MeshEvent::BlockStored {
                hash: block.content_hash,
                creator: block.creator_device_id.clone(),
            });
        }

        let mut consensus = self.consensus.lock();
        for block in &accepted {
            match consensus.observe_block(block) {
                Ok(Some(proposal_id)) => self.emit(MeshEvent::ProposalFinalized {
                    proposal_id,
                    status: "accepted".to_string(),
                    block_hash: Some(block.content_hash),
                }),
                Ok(None) => {}
                Err(e) => warn!(
                    "[node] Block {} does not finalise its proposal: {}",
                    block.content_hash.short(),
                    e
                ),
            }
        }
    }

    /// Screen and store blocks pushed by `from`.
    pub fn ingest_blocks(&self, from: &DeviceId, blocks: Vec<Block>) -> NodeResult<IntegrationReport> {
        let blocks = self.screen_blocks(from, blocks);
        let report = self.block_store.write().integrate_blocks(blocks)?;
        self.after_integration(&report);
        Ok(report)
    }

    /// Resolve forks over everything held and publish the outcome.
    pub fn chain_view(&self) -> ChainView {
        let blocks = self.block_store.read().all_blocks();
        let view = self.chain.resolve_forks(&blocks);
        CHAIN_LENGTH.set(view.len() as f64);
        self.emit(MeshEvent::ChainResolved {
            tip: view.tip(),
            length: view.len(),
            orphaned: view.orphaned.len(),
        });
        if !view.forks.is_empty() {
            info!(
                "[node] Resolved {} fork points, active chain length {}",
                view.forks.len(),
                view.len()
            );
        }
        view
    }

    /// The active chain, genesis first.
    pub fn active_chain(&self) -> Vec<Block> {
        let blocks = self.block_store.read().all_blocks();
        self.chain.active_chain(&blocks)
    }
}
