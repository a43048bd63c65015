//! # In-Process Transport
//!
//! A hub of bounded channels, one inbound queue per device. Peers in the same
//! process (tests, the single-binary demo) reach each other through it; a
//! real network transport would implement the same `PeerTransport` port.
//!
//! ```text
//! MessagingService(A) ── HubTransport(A) ──┐
//!                                          ├── MeshHub ── mpsc(B) ──→ inbound loop(B)
//! MessagingService(C) ── HubTransport(C) ──┘
//! ```
//!
//! A full queue applies backpressure to the sender; the messaging layer's
//! send timeout turns that into a retryable failure.

use async_trait::async_trait;
use im_05_messaging::{PeerTransport, TransportError};
use parking_lot::RwLock;
use shared_types::DeviceId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// One frame as it arrives at a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    /// Device whose transport handed the frame over.
    pub from: DeviceId,
    pub bytes: Vec<u8>,
}

/// Routes frames between devices in one process.
pub struct MeshHub {
    capacity: usize,
    routes: RwLock<HashMap<DeviceId, mpsc::Sender<InboundFrame>>>,
}

impl MeshHub {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity: capacity.max(1),
            routes: RwLock::new(HashMap::new()),
        })
    }

    /// Attach `device`, replacing any earlier attachment.
    pub fn attach(&self, device: &DeviceId) -> mpsc::Receiver<InboundFrame> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.routes.write().insert(device.clone(), tx);
        debug!("[node] Attached {} to mesh hub", device);
        rx
    }

    /// Take `device` offline. Frames to it fail as unreachable.
    pub fn detach(&self, device: &DeviceId) -> bool {
        let removed = self.routes.write().remove(device).is_some();
        if removed {
            debug!("[node] Detached {} from mesh hub", device);
        }
        removed
    }

    pub fn is_attached(&self, device: &DeviceId) -> bool {
        self.routes.read().contains_key(device)
    }

    /// A transport that sends as `local`.
    pub fn transport(self: &Arc<Self>, local: DeviceId) -> Arc<HubTransport> {
        Arc::new(HubTransport {
            hub: self.clone(),
            local,
        })
    }

    async fn deliver(
        &self,
        from: &DeviceId,
        to: &DeviceId,
        bytes: Vec<u8>,
    ) -> Result<(), TransportError> {
        let route = self.routes.read().get(to).cloned();
        let Some(sender) = route else {
            return Err(TransportError::Unreachable(to.clone()));
        };
        trace!("[node] Hub {} -> {} ({} bytes)", from, to, bytes.len());
        sender
            .send(InboundFrame {
                from: from.clone(),
                bytes,
            })
            .await
            .map_err(|_| TransportError::Closed(format!("inbound queue of {to} is closed")))
    }
}

/// `PeerTransport` over a `MeshHub`.
pub struct HubTransport {
    hub: Arc<MeshHub>,
    local: DeviceId,
}

#[async_trait]
impl PeerTransport for HubTransport {
    async fn send(&self, to: &DeviceId, frame: Vec<u8>) -> Result<(), TransportError> {
        self.hub.deliver(&self.local, to, frame).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_reach_attached_device() {
        let hub = MeshHub::new(4);
        let a = DeviceId::new("a");
        let b = DeviceId::new("b");
        let mut inbox = hub.attach(&b);

        hub.transport(a.clone()).send(&b, vec![1, 2, 3]).await.unwrap();

        let frame = inbox.recv().await.unwrap();
        assert_eq!(frame, InboundFrame { from: a, bytes: vec![1, 2, 3] });
    }

    #[tokio::test]
    async fn test_detached_device_is_unreachable() {
        let hub = MeshHub::new(4);
        let b = DeviceId::new("b");
        let _inbox = hub.attach(&b);
        assert!(hub.detach(&b));
        assert!(!hub.is_attached(&b));

        let err = hub
            .transport(DeviceId::new("a"))
            .send(&b, vec![0])
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_closed() {
        let hub = MeshHub::new(4);
        let b = DeviceId::new("b");
        drop(hub.attach(&b));

        let err = hub
            .transport(DeviceId::new("a"))
            .send(&b, vec![0])
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Closed(_)));
    }
}
