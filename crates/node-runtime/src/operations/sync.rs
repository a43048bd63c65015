//! Delta sync with one peer.
//!
//! ```text
//! A                                   B
//! │── sync_request(known, root) ─────→│
//! │←──── sync_response(blocks, missing)│
//! │── block_push × missing ──────────→│
//! ```

use crate::container::PeerContext;
use crate::errors::{NodeError, NodeResult};
use crate::wire::Payload;
use im_01_block_store::{BlockStoreApi, SyncRequest, SyncResponse};
use im_05_messaging::DeliveryStatus;
use mesh_telemetry::{time_histogram, SYNC_DURATION, SYNC_ROUNDS};
use shared_bus::MeshEvent;
use shared_types::DeviceId;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of one sync round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Blocks newly stored from the peer.
    pub accepted: usize,
    /// Blocks the peer sent that were already held.
    pub duplicates: usize,
    /// Blocks refused for integrity or authority reasons.
    pub rejected: usize,
    /// Blocks pushed back because the peer lacked them.
    pub pushed: usize,
}

impl PeerContext {
    /// Run one delta-sync round with `peer` and wait for its answer.
    ///
    /// Nothing is held across the wait; inbound frames keep flowing while
    /// the round is outstanding.
    pub async fn sync_with_peer(&self, peer: &DeviceId) -> NodeResult<SyncReport> {
        let _timer = time_histogram!(SYNC_DURATION);
        let request_id = Uuid::new_v4();
        let request = self.block_store.read().build_sync_request(request_id);
        let waiting = self.pending_syncs.register(request_id);

        let receipt = match self.send(peer, &Payload::SyncRequest(request)).await {
            Ok(receipt) => receipt,
            Err(e) => {
                self.pending_syncs.cancel(&request_id);
                return Err(self.sync_failed(peer, e));
            }
        };
        if receipt.status == DeliveryStatus::Failed {
            self.pending_syncs.cancel(&request_id);
            return Err(self.sync_failed(peer, NodeError::PeerUnreachable(peer.clone())));
        }

        let timeout = self.block_store.read().config().sync_timeout();
        let response = match tokio::time::timeout(timeout, waiting).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                return Err(self.sync_failed(peer, NodeError::ShuttingDown));
            }
            Err(_) => {
                self.pending_syncs.cancel(&request_id);
                return Err(self.sync_failed(peer, NodeError::SyncTimeout(peer.clone())));
            }
        };

        let report = self.apply_sync_response(peer, response).await?;
        SYNC_ROUNDS.with_label_values(&["completed"]).inc();
        self.emit(MeshEvent::SyncCompleted {
            peer: peer.clone(),
            accepted: report.accepted,
            pushed: report.pushed,
        });
        info!(
            "[node] Synced with {}: {} new, {} duplicate, {} rejected, {} pushed",
            peer, report.accepted, report.duplicates, report.rejected, report.pushed
        );
        Ok(report)
    }

    /// Store what a peer sent and push back what it lacks.
    pub async fn apply_sync_response(
        &self,
        peer: &DeviceId,
        mut response: SyncResponse,
    ) -> NodeResult<SyncReport> {
        let offered = response.blocks.len();
        response.blocks = self.screen_blocks(peer, std::mem::take(&mut response.blocks));
        let screened_out = offered - response.blocks.len();

        let (integration, to_push) = self.block_store.write().integrate_sync_response(response)?;
        self.after_integration(&integration);

        let mut pushed = 0;
        for block in to_push {
            let short = block.content_hash.short();
            match self.send(peer, &Payload::BlockPush(block)).await {
                Ok(_) => pushed += 1,
                Err(e) => warn!("[node] Could not push block {} to {}: {}", short, peer, e),
            }
        }

        Ok(SyncReport {
            accepted: integration.accepted.len(),
            duplicates: integration.duplicates.len(),
            rejected: integration.rejected.len() + screened_out,
            pushed,
        })
    }

    /// Answer a peer's sync request.
    pub async fn answer_sync_request(&self, from: &DeviceId, request: &SyncRequest) -> NodeResult<()> {
        let response = self.block_store.read().handle_sync_request(request);
        debug!(
            "[node] Answering sync {} from {}: {} blocks offered, {} requested",
            request.request_id,
            from,
            response.blocks.len(),
            response.missing_hashes.len()
        );
        self.send(from, &Payload::SyncResponse(response)).await?;
        Ok(())
    }

    fn sync_failed(&self, peer: &DeviceId, error: NodeError) -> NodeError {
        warn!("[node] Sync with {} failed: {}", peer, error);
        SYNC_ROUNDS.with_label_values(&["failed"]).inc();
        self.emit(MeshEvent::SyncFailed {
            peer: peer.clone(),
            reason: error.to_string(),
        });
        error
    }
}
