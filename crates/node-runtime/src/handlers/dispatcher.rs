//! # Payload Dispatcher
//!
//! Decrypted payloads arrive here from the messaging layer and are routed
//! to the owning operation.
//!
//! ## Outcomes
//!
//! - `Ok`: applied, the frame is ACKed.
//! - `Reject`: invalid or not authorized; ACKed and dropped.
//! - `Retry`: could not be applied yet; not ACKed so the sender retries.
//!
//! A payload that names a device (proposer, voter, heartbeat, model
//! update) must name the device that sent the frame.

use crate::container::PeerContext;
use crate::errors::NodeError;
use crate::wire::Payload;
use async_trait::async_trait;
use im_04_consensus::ConsensusError;
use im_05_messaging::{HandlerError, InboundHandler};
use shared_types::{DeviceId, ErrorClass};
use std::sync::Arc;
use tracing::{debug, warn};

/// Routes decoded payloads into one peer's components.
pub struct Dispatcher {
    ctx: Arc<PeerContext>,
}

impl Dispatcher {
    pub fn new(ctx: Arc<PeerContext>) -> Self {
        Self { ctx }
    }

    async fn dispatch(&self, from: &DeviceId, payload: Payload) -> Result<(), HandlerError> {
        let ctx = &self.ctx;
        match payload {
            Payload::SyncRequest(request) => ctx
                .answer_sync_request(from, &request)
                .await
                .map_err(into_handler_error),

            Payload::SyncResponse(response) => {
                let Some(unclaimed) = ctx.pending_syncs.complete(response) else {
                    return Ok(());
                };
                // Late answer to a round that already gave up; still useful.
                debug!(
                    "[node] Applying unclaimed sync response {} from {}",
                    unclaimed.request_id, from
                );
                ctx.apply_sync_response(from, unclaimed)
                    .await
                    .map(|_| ())
                    .map_err(into_handler_error)
            }

            Payload::BlockPush(block) => ctx
                .ingest_blocks(from, vec![block])
                .map(|_| ())
                .map_err(into_handler_error),

            Payload::ProposalPush(proposal) => {
                require_sender(from, &proposal.proposer_device_id, "proposal")?;
                ctx.import_proposal(proposal)
                    .map(|_| ())
                    .map_err(into_handler_error)
            }

            Payload::VotePush(ballot) => {
                require_sender(from, &ballot.voter_id, "vote")?;
                match ctx.record_ballot(ballot) {
                    Ok(_) => Ok(()),
                    // The proposal may still be in flight behind this vote.
                    Err(NodeError::Consensus(ConsensusError::UnknownProposal(id))) => {
                        Err(HandlerError::Retry(format!("proposal {id} not known yet")))
                    }
                    Err(e) => Err(into_handler_error(e)),
                }
            }

            Payload::ModelUpdate(update) => {
                require_sender(from, &update.device_id, "model update")?;
                ctx.record_model_update(update);
                Ok(())
            }

            Payload::CrdtState(snapshot) => ctx
                .merge_crdt_state(from, &snapshot)
                .map(|_| ())
                .map_err(into_handler_error),

            Payload::RegistryState(snapshot) => ctx
                .merge_registry_state(from, &snapshot)
                .map(|_| ())
                .map_err(into_handler_error),

            Payload::Heartbeat { device_id, .. } => require_sender(from, &device_id, "heartbeat"),
        }
    }
}

#[async_trait]
impl InboundHandler for Dispatcher {
    async fn handle(&self, from: &DeviceId, payload: Vec<u8>) -> Result<(), HandlerError> {
        let payload = Payload::decode(&payload)
            .map_err(|e| HandlerError::Reject(format!("undecodable payload: {e}")))?;
        debug!("[node] Handling {} from {}", payload.kind(), from);
        self.ctx.mark_seen(from);
        self.dispatch(from, payload).await
    }
}

fn require_sender(from: &DeviceId, claimed: &DeviceId, what: &str) -> Result<(), HandlerError> {
    if from == claimed {
        return Ok(());
    }
    warn!("[node] Ignoring {} for {} relayed by {}", what, claimed, from);
    Err(HandlerError::Reject(format!(
        "{what} names {claimed} but was sent by {from}"
    )))
}

/// Network and local storage failures keep the message un-ACKed; everything
/// else drops it.
fn into_handler_error(error: NodeError) -> HandlerError {
    let class = error.classify();
    if class.is_retryable() || class == ErrorClass::Fatal {
        HandlerError::Retry(error.to_string())
    } else {
        HandlerError::Reject(error.to_string())
    }
}
