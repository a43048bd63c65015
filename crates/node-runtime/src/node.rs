//! # Mesh Node
//!
//! A running peer: its `PeerContext`, the inbound frame loop and the
//! periodic sweeps, all stopped by one shutdown signal.
//!
//! ## Startup Sequence
//!
//! 1. Build the `PeerContext` (stores opened, components wired)
//! 2. Spawn the inbound loop over the transport's receive queue
//! 3. Spawn the sync, retry and heartbeat sweeps
//!
//! ## Inbound Lanes
//!
//! ```text
//! transport queue ──→ router ──┬── lane(peer A) ──→ handle_frame
//!                              ├── lane(peer B) ──→ handle_frame
//!                              └── lane(peer C) ──→ handle_frame
//! ```
//!
//! Frames from one peer are handled in arrival order; lanes of different
//! peers run independently. A lane that falls `LANE_CAPACITY` frames behind
//! drops new frames, which their senders re-send for want of an ACK.

use crate::adapters::transport::InboundFrame;
use crate::container::PeerContext;
use crate::handlers::Dispatcher;
use crate::wiring::sweeps::{self, count_error};
use im_05_messaging::{FrameOutcome, MessagingError};
use mesh_telemetry::MESSAGES;
use shared_bus::MeshEvent;
use shared_types::DeviceId;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

/// How long shutdown waits for each task before abandoning it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Frames buffered per peer lane.
const LANE_CAPACITY: usize = 64;

/// A started peer.
pub struct MeshNode {
    ctx: Arc<PeerContext>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl MeshNode {
    /// Wrap `ctx`; nothing runs until `start`.
    pub fn new(ctx: PeerContext) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            ctx: Arc::new(ctx),
            shutdown_tx,
            shutdown_rx,
            tasks: Vec::new(),
        }
    }

    /// Spawn the inbound loop and the sweeps.
    pub fn start(&mut self, inbound: mpsc::Receiver<InboundFrame>) {
        self.spawn_inbound(inbound);
        self.spawn_sweeps();
        info!("[node] Node {} started", self.ctx.device_id);
    }

    /// Spawn only the inbound router. Sweeps can then be driven by hand.
    pub fn spawn_inbound(&mut self, mut inbound: mpsc::Receiver<InboundFrame>) {
        let mut router = InboundRouter::new(self.ctx.clone(), self.shutdown_rx.clone());
        let mut shutdown = self.shutdown_rx.clone();
        self.tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = inbound.recv() => match frame {
                        Some(frame) => router.route(frame),
                        None => {
                            debug!("[node] Inbound queue of {} closed", router.ctx.device_id);
                            break;
                        }
                    },
                    _ = shutdown.changed() => break,
                }
            }
            router.close().await;
        }));
    }

    fn spawn_sweeps(&mut self) {
        let config = &self.ctx.config.sweeps;

        let ctx = self.ctx.clone();
        self.tasks.push(sweeps::spawn_sweep(
            "sync",
            config.sync_interval(),
            self.shutdown_rx.clone(),
            move || sweeps::sync_sweep(ctx.clone()),
        ));

        let ctx = self.ctx.clone();
        self.tasks.push(sweeps::spawn_sweep(
            "retry",
            config.retry_interval(),
            self.shutdown_rx.clone(),
            move || sweeps::retry_sweep(ctx.clone()),
        ));

        let ctx = self.ctx.clone();
        self.tasks.push(sweeps::spawn_sweep(
            "heartbeat",
            config.heartbeat_interval(),
            self.shutdown_rx.clone(),
            move || sweeps::heartbeat_sweep(ctx.clone()),
        ));
    }

    /// Shared handle on the peer's components.
    pub fn context(&self) -> Arc<PeerContext> {
        self.ctx.clone()
    }

    /// Signal every task to stop and wait for them.
    pub async fn shutdown(mut self) {
        info!("[node] Shutting down node {}", self.ctx.device_id);
        if let Err(e) = self.shutdown_tx.send(true) {
            error!("[node] Failed to send shutdown signal: {}", e);
        }
        for task in self.tasks.drain(..) {
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                debug!("[node] A task did not stop within {:?}", SHUTDOWN_GRACE);
            }
        }
        info!("[node] Node {} stopped", self.ctx.device_id);
    }
}

impl Deref for MeshNode {
    type Target = PeerContext;

    fn deref(&self) -> &PeerContext {
        &self.ctx
    }
}

/// Fans inbound frames out to one lane task per sending peer.
struct InboundRouter {
    ctx: Arc<PeerContext>,
    dispatcher: Arc<Dispatcher>,
    shutdown: watch::Receiver<bool>,
    lanes: HashMap<DeviceId, mpsc::Sender<InboundFrame>>,
    tasks: JoinSet<()>,
}

impl InboundRouter {
    fn new(ctx: Arc<PeerContext>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new(ctx.clone())),
            ctx,
            shutdown,
            lanes: HashMap::new(),
            tasks: JoinSet::new(),
        }
    }

    fn route(&mut self, frame: InboundFrame) {
        let from = frame.from.clone();
        let lane = match self.lanes.get(&from) {
            Some(lane) => lane.clone(),
            None => self.open_lane(&from),
        };
        match lane.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!("[node] Lane of {} is full, dropping frame", from);
            }
            Err(TrySendError::Closed(frame)) => {
                let lane = self.open_lane(&from);
                if lane.try_send(frame).is_err() {
                    debug!("[node] Lane of {} closed, dropping frame", from);
                }
            }
        }
    }

    fn open_lane(&mut self, peer: &DeviceId) -> mpsc::Sender<InboundFrame> {
        let (tx, mut rx) = mpsc::channel(LANE_CAPACITY);
        let ctx = self.ctx.clone();
        let dispatcher = self.dispatcher.clone();
        let mut shutdown = self.shutdown.clone();
        self.tasks.spawn(async move {
            loop {
                tokio::select! {
                    frame = rx.recv() => match frame {
                        Some(frame) => handle_inbound(&ctx, &dispatcher, frame).await,
                        None => break,
                    },
                    _ = shutdown.changed() => break,
                }
            }
        });
        debug!("[node] Opened inbound lane for {}", peer);
        self.lanes.insert(peer.clone(), tx.clone());
        tx
    }

    /// Close every lane and wait for the lane tasks to finish.
    async fn close(mut self) {
        self.lanes.clear();
        while self.tasks.join_next().await.is_some() {}
        info!("[node] Inbound loop of {} stopped", self.ctx.device_id);
    }
}

async fn handle_inbound(ctx: &PeerContext, dispatcher: &Dispatcher, frame: InboundFrame) {
    match ctx
        .messaging
        .handle_frame(&frame.from, &frame.bytes, dispatcher)
        .await
    {
        Ok(FrameOutcome::Delivered(id)) => {
            MESSAGES.with_label_values(&["delivered"]).inc();
            ctx.emit(MeshEvent::MessageDelivered {
                message_id: id,
                peer: frame.from,
            });
        }
        Ok(FrameOutcome::Duplicate(id)) => {
            MESSAGES.with_label_values(&["duplicate"]).inc();
            ctx.emit(MeshEvent::DuplicateSuppressed {
                message_id: id,
                peer: frame.from,
            });
        }
        Ok(FrameOutcome::Rejected(id)) => {
            debug!("[node] Message {} from {} rejected by handler", id, frame.from);
        }
        Ok(FrameOutcome::Acked(_)) | Ok(FrameOutcome::AckIgnored(_)) => {}
        Err(MessagingError::HandlerDeferred(reason)) => {
            debug!("[node] Deferred message from {}: {}", frame.from, reason);
        }
        Err(e) => count_error("inbound", &e.into()),
    }
}
