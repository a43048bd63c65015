//! Outstanding sync requests, keyed by request id.
//!
//! `sync_with_peer` parks a oneshot here; the dispatcher completes it when
//! the matching `sync_response` arrives. A response nobody waits for any more
//! is handed back to the caller so it can still be integrated.

use im_01_block_store::SyncResponse;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::oneshot;
use uuid::Uuid;

#[derive(Default)]
pub struct PendingSyncs {
    waiting: Mutex<HashMap<Uuid, oneshot::Sender<SyncResponse>>>,
}

impl PendingSyncs {
    pub fn register(&self, request_id: Uuid) -> oneshot::Receiver<SyncResponse> {
        let (tx, rx) = oneshot::channel();
        self.waiting.lock().insert(request_id, tx);
        rx
    }

    /// Route `response` to its waiter. Returns it if nobody is waiting.
    pub fn complete(&self, response: SyncResponse) -> Option<SyncResponse> {
        let waiter = self.waiting.lock().remove(&response.request_id);
        match waiter {
            Some(tx) => tx.send(response).err(),
            None => Some(response),
        }
    }

    pub fn cancel(&self, request_id: &Uuid) {
        self.waiting.lock().remove(request_id);
    }

    pub fn len(&self) -> usize {
        self.waiting.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
