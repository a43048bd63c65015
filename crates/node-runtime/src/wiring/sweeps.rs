//! Periodic sweeps.
//!
//! | Sweep     | Does                                               |
//! |-----------|----------------------------------------------------|
//! | sync      | sync with each peer, gossip state, resolve chain   |
//! | retry     | resend un-ACKed messages, expire proposals         |
//! | heartbeat | heartbeat every peer, report stale ones            |
//!
//! One failing peer never stops a sweep; its error is logged and counted.

use crate::container::PeerContext;
use crate::errors::NodeError;
use mesh_telemetry::{COMPONENT_ERRORS, MESSAGES};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Run `tick` every `period` until shutdown is signalled.
///
/// The first tick fires after one full period.
pub fn spawn_sweep<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!("[node] {} sweep every {:?}", name, period);
        loop {
            tokio::select! {
                _ = interval.tick() => tick().await,
                _ = shutdown.changed() => {
                    info!("[node] {} sweep stopped", name);
                    break;
                }
            }
        }
    })
}

/// Sync with every known peer, then exchange CRDT and registry state.
pub async fn sync_sweep(ctx: Arc<PeerContext>) {
    for peer in ctx.remote_peers() {
        if let Err(e) = ctx.sync_with_peer(&peer).await {
            count_error("sync", &e);
        }
    }
    ctx.share_crdt_state().await;
    ctx.share_registry_state().await;
    ctx.chain_view();
}

/// Resend what is still un-ACKed and expire stale proposals.
pub async fn retry_sweep(ctx: Arc<PeerContext>) {
    match ctx.messaging.retry_pending().await {
        Ok(report) if report.attempted > 0 => {
            MESSAGES.with_label_values(&["failed"]).inc_by(report.failed as f64);
            debug!(
                "[node] Retried {} messages: {} sent, {} failed",
                report.attempted, report.sent, report.failed
            );
        }
        Ok(_) => {}
        Err(e) => count_error("messaging", &NodeError::from(e)),
    }
    let expired = ctx.expire_proposals();
    if !expired.is_empty() {
        info!("[node] Expired {} proposals", expired.len());
    }
}

/// Heartbeat every peer and report the ones gone quiet.
pub async fn heartbeat_sweep(ctx: Arc<PeerContext>) {
    ctx.send_heartbeats().await;
    let stale = ctx.stale_peers();
    if !stale.is_empty() {
        warn!("[node] {} peers silent past timeout: {:?}", stale.len(), stale);
    }
}

pub(crate) fn count_error(component: &str, error: &NodeError) {
    let class = error.classify();
    COMPONENT_ERRORS
        .with_label_values(&[component, class.as_str()])
        .inc();
    if class.is_retryable() {
        debug!("[node] {} failed, will retry: {}", component, error);
    } else {
        warn!("[node] {} failed: {}", component, error);
    }
}
