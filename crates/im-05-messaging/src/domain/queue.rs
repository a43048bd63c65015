//! # Durable Message Queue
//!
//! Outgoing messages live under `outbox:<uuid>`, received message ids under
//! `inbox:<uuid>`. Both are reloaded on open, so a crash between enqueue and
//! send loses nothing and a restarted receiver still suppresses duplicates.

use super::errors::MessagingError;
use super::message::{DeliveryStatus, EncryptedMessage, InboxRecord};
use shared_types::{KeyValueStore, Timestamp};
use std::collections::BTreeMap;
use uuid::Uuid;

const OUTBOX_PREFIX: &str = "outbox:";
const INBOX_PREFIX: &str = "inbox:";

fn outbox_key(id: &Uuid) -> Vec<u8> {
    format!("{OUTBOX_PREFIX}{id}").into_bytes()
}

fn inbox_key(id: &Uuid) -> Vec<u8> {
    format!("{INBOX_PREFIX}{id}").into_bytes()
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, MessagingError> {
    bincode::serialize(value).map_err(|e| MessagingError::Malformed(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, MessagingError> {
    bincode::deserialize(bytes).map_err(|e| MessagingError::Malformed(e.to_string()))
}

/// Outbox and inbox over a key-value store.
pub struct MessageQueue {
    store: Box<dyn KeyValueStore>,
    outbox: BTreeMap<Uuid, EncryptedMessage>,
    inbox: BTreeMap<Uuid, InboxRecord>,
}

impl MessageQueue {
    /// Open over `store`, reloading both sides.
    pub fn open(store: Box<dyn KeyValueStore>) -> Result<Self, MessagingError> {
        let mut outbox = BTreeMap::new();
        for (_, bytes) in store.prefix_scan(OUTBOX_PREFIX.as_bytes())? {
            let message: EncryptedMessage = decode(&bytes)?;
            outbox.insert(message.message_id, message);
        }
        let mut inbox = BTreeMap::new();
        for (_, bytes) in store.prefix_scan(INBOX_PREFIX.as_bytes())? {
            let record: InboxRecord = decode(&bytes)?;
            inbox.insert(record.message_id, record);
        }
        Ok(Self {
            store,
            outbox,
            inbox,
        })
    }

    /// Persist a new outgoing message.
    pub fn enqueue(&mut self, message: EncryptedMessage) -> Result<(), MessagingError> {
        self.store
            .put(&outbox_key(&message.message_id), &encode(&message)?)?;
        self.outbox.insert(message.message_id, message);
        Ok(())
    }

    /// Apply `update` to an outgoing message and persist it.
    pub fn update<F>(&mut self, id: &Uuid, update: F) -> Result<EncryptedMessage, MessagingError>
    where
        F: FnOnce(&mut EncryptedMessage),
    {
        let mut message = self
            .outbox
            .get(id)
            .cloned()
            .ok_or(MessagingError::UnknownMessage(*id))?;
        update(&mut message);
        self.store.put(&outbox_key(id), &encode(&message)?)?;
        self.outbox.insert(*id, message.clone());
        Ok(message)
    }

    /// Record one transport attempt and its result.
    pub fn record_attempt(
        &mut self,
        id: &Uuid,
        at_millis: u64,
        succeeded: bool,
    ) -> Result<EncryptedMessage, MessagingError> {
        self.update(id, |m| {
            m.attempts += 1;
            m.last_attempt_at = Some(at_millis);
            // An ACK may already have arrived; never move back from Delivered.
            if m.delivery_status != DeliveryStatus::Delivered {
                m.delivery_status = if succeeded {
                    DeliveryStatus::Sent
                } else {
                    DeliveryStatus::Failed
                };
            }
        })
    }

    /// Mark delivered on ACK. Returns `false` if it already was.
    pub fn mark_delivered(&mut self, id: &Uuid) -> Result<bool, MessagingError> {
        match self.outbox.get(id) {
            None => Err(MessagingError::UnknownMessage(*id)),
            Some(m) if m.delivery_status == DeliveryStatus::Delivered => Ok(false),
            Some(_) => {
                self.update(id, |m| {
                    m.delivery_status = DeliveryStatus::Delivered;
                    m.ack_received = true;
                })?;
                Ok(true)
            }
        }
    }

    /// Outgoing message by id.
    pub fn get(&self, id: &Uuid) -> Option<&EncryptedMessage> {
        self.outbox.get(id)
    }

    /// Every outgoing message, ordered by id.
    pub fn outbox(&self) -> Vec<EncryptedMessage> {
        self.outbox.values().cloned().collect()
    }

    /// Messages a retry sweep should re-send.
    ///
    /// Pending and failed messages always qualify; sent ones once their last
    /// attempt is older than `ack_timeout_millis`. Messages that used up
    /// `max_attempts` are left alone.
    pub fn due_for_retry(
        &self,
        now_millis: u64,
        ack_timeout_millis: u64,
        max_attempts: Option<u32>,
    ) -> Vec<EncryptedMessage> {
        self.outbox
            .values()
            .filter(|m| max_attempts.map_or(true, |max| m.attempts < max))
            .filter(|m| match m.delivery_status {
                DeliveryStatus::Pending | DeliveryStatus::Failed => true,
                DeliveryStatus::Sent => m
                    .last_attempt_at
                    .map_or(true, |at| now_millis.saturating_sub(at) >= ack_timeout_millis),
                DeliveryStatus::Delivered => false,
            })
            .cloned()
            .collect()
    }

    /// True if `id` has been received before.
    pub fn has_received(&self, id: &Uuid) -> bool {
        self.inbox.contains_key(id)
    }

    /// Persist a received message id.
    pub fn record_received(&mut self, record: InboxRecord) -> Result<(), MessagingError> {
        self.store
            .put(&inbox_key(&record.message_id), &encode(&record)?)?;
        self.inbox.insert(record.message_id, record);
        Ok(())
    }

    /// Number of received messages recorded.
    pub fn inbox_len(&self) -> usize {
        self.inbox.len()
    }
}

/// Unix seconds helper for records.
pub(crate) fn secs(millis: u64) -> Timestamp {
    millis / 1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{DeviceId, FileBackedKVStore, InMemoryKVStore};

    fn message() -> EncryptedMessage {
        EncryptedMessage {
            message_id: Uuid::new_v4(),
            sender_id: DeviceId::new("a"),
            recipient_id: DeviceId::new("b"),
            ciphertext: vec![1, 2, 3],
            nonce: vec![0; 24],
            created_at: 1,
            delivery_status: DeliveryStatus::Pending,
            ack_received: false,
            attempts: 0,
            last_attempt_at: None,
        }
    }

    fn queue() -> MessageQueue {
        MessageQueue::open(Box::new(InMemoryKVStore::new())).unwrap()
    }

    #[test]
    fn test_lifecycle() {
        let mut q = queue();
        let m = message();
        let id = m.message_id;
        q.enqueue(m).unwrap();
        assert_eq!(q.get(&id).unwrap().delivery_status, DeliveryStatus::Pending);

        q.record_attempt(&id, 10, true).unwrap();
        assert_eq!(q.get(&id).unwrap().delivery_status, DeliveryStatus::Sent);

        assert!(q.mark_delivered(&id).unwrap());
        assert!(!q.mark_delivered(&id).unwrap());
        let m = q.get(&id).unwrap();
        assert_eq!(m.delivery_status, DeliveryStatus::Delivered);
        assert!(m.ack_received);
    }

    #[test]
    fn test_late_attempt_does_not_undo_delivery() {
        let mut q = queue();
        let m = message();
        let id = m.message_id;
        q.enqueue(m).unwrap();
        q.mark_delivered(&id).unwrap();
        q.record_attempt(&id, 10, false).unwrap();
        assert_eq!(q.get(&id).unwrap().delivery_status, DeliveryStatus::Delivered);
    }

    #[test]
    fn test_due_for_retry() {
        let mut q = queue();
        let pending = message();
        let sent = message();
        let failed = message();
        let (pid, sid, fid) = (pending.message_id, sent.message_id, failed.message_id);
        q.enqueue(pending).unwrap();
        q.enqueue(sent).unwrap();
        q.enqueue(failed).unwrap();
        q.record_attempt(&sid, 1_000, true).unwrap();
        q.record_attempt(&fid, 1_000, false).unwrap();

        let due: Vec<Uuid> = q.due_for_retry(1_500, 1_000, None).iter().map(|m| m.message_id).collect();
        assert!(due.contains(&pid) && due.contains(&fid) && !due.contains(&sid));

        let due: Vec<Uuid> = q.due_for_retry(2_000, 1_000, None).iter().map(|m| m.message_id).collect();
        assert!(due.contains(&sid));

        let due: Vec<Uuid> = q.due_for_retry(2_000, 1_000, Some(1)).iter().map(|m| m.message_id).collect();
        assert_eq!(due, vec![pid]);
    }

    #[test]
    fn test_unknown_ack() {
        let mut q = queue();
        assert!(matches!(
            q.mark_delivered(&Uuid::new_v4()),
            Err(MessagingError::UnknownMessage(_))
        ));
    }

    #[test]
    fn test_queue_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");
        let m = message();
        let id = m.message_id;
        let inbound = Uuid::new_v4();
        {
            let mut q = MessageQueue::open(Box::new(FileBackedKVStore::open(&path).unwrap())).unwrap();
            q.enqueue(m).unwrap();
            q.record_received(InboxRecord {
                message_id: inbound,
                sender_id: DeviceId::new("c"),
                received_at: 5,
                applied: true,
            })
            .unwrap();
        }
        let q = MessageQueue::open(Box::new(FileBackedKVStore::open(&path).unwrap())).unwrap();
        assert_eq!(q.get(&id).unwrap().delivery_status, DeliveryStatus::Pending);
        assert!(q.has_received(&inbound));
    }
}
