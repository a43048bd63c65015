//! # Messaging Service
//!
//! Outgoing: seal, persist, then hand to the transport under a timeout.
//! A failed hand-off leaves the message queued as `failed`; the retry sweep
//! re-sends it under the same id.
//!
//! Incoming: a message id seen before is ACKed again but never handed to the
//! payload handler twice. A frame that fails to open is dropped without ACK.

use crate::config::MessagingConfig;
use crate::domain::queue::secs;
use crate::domain::{
    message_aad, DeliveryStatus, EncryptedMessage, HandlerError, InboxRecord, MessageQueue,
    MessagingError, MessagingResult, WireFrame,
};
use crate::ports::{InboundHandler, KeyDirectory, PeerTransport};
use parking_lot::Mutex;
use shared_crypto::{open, seal, Nonce, Secp256k1KeyPair, SealedPayload};
use shared_types::{DeviceId, KeyValueStore, TimeSource};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;


/// Result of [`MessagingService::send_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: Uuid,
    /// `Sent` if the transport took the frame, `Failed` otherwise.
    pub status: DeliveryStatus,
}

/// What happened to one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// New message, handled and ACKed.
    Delivered(Uuid),
    /// Seen before; ACKed again, handler not called.
    Duplicate(Uuid),
    /// Handler rejected the payload; recorded and ACKed.
    Rejected(Uuid),
    /// ACK for one of our messages.
    Acked(Uuid),
    /// ACK for something unknown or already delivered.
    AckIgnored(Uuid),
}

/// Result of one retry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryReport {
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Everything the messaging service needs.
pub struct MessagingDependencies {
    pub local_device: DeviceId,
    pub keypair: Arc<Secp256k1KeyPair>,
    pub store: Box<dyn KeyValueStore>,
    pub transport: Arc<dyn PeerTransport>,
    pub keys: Arc<dyn KeyDirectory>,
    pub time_source: Arc<dyn TimeSource>,
    pub config: MessagingConfig,
}

/// Encrypted, acknowledged, retried peer messaging.
pub struct MessagingService {
    local: DeviceId,
    keypair: Arc<Secp256k1KeyPair>,
    queue: Mutex<MessageQueue>,
    in_flight: Mutex<HashSet<Uuid>>,
    transport: Arc<dyn PeerTransport>,
    keys: Arc<dyn KeyDirectory>,
    time_source: Arc<dyn TimeSource>,
    config: MessagingConfig,
}

impl MessagingService {
    /// Open the durable queue and build the service.
    pub fn new(deps: MessagingDependencies) -> MessagingResult<Self> {
        let queue = MessageQueue::open(deps.store)?;
        info!(
            "[im-05] Messaging ready for {} ({} queued)",
            deps.local_device,
            queue.outbox().len()
        );
        Ok(Self {
            local: deps.local_device,
            keypair: deps.keypair,
            queue: Mutex::new(queue),
            in_flight: Mutex::new(HashSet::new()),
            transport: deps.transport,
            keys: deps.keys,
            time_source: deps.time_source,
            config: deps.config,
        })
    }

    pub fn local_device(&self) -> &DeviceId {
        &self.local
    }

    pub fn config(&self) -> &MessagingConfig {
        &self.config
    }

    /// Encrypt `payload` for `recipient`, persist it and try to send it once.
    ///
    /// Only a missing recipient key or a storage failure is an error; a
    /// transport failure leaves the message queued for retry.
    pub async fn send_message(
        &self,
        recipient: &DeviceId,
        payload: &[u8],
    ) -> MessagingResult<SendReceipt> {
        let recipient_key = self
            .keys
            .public_key(recipient)
            .ok_or_else(|| MessagingError::UnknownRecipient(recipient.clone()))?;

        let message_id = Uuid::new_v4();
        let aad = message_aad(&message_id, &self.local, recipient);
        let sealed = seal(&self.keypair, &recipient_key, payload, &aad)?;

        let message = EncryptedMessage {
            message_id,
            sender_id: self.local.clone(),
            recipient_id: recipient.clone(),
            ciphertext: sealed.ciphertext,
            nonce: sealed.nonce.as_bytes().to_vec(),
            created_at: self.time_source.now_secs(),
            delivery_status: DeliveryStatus::Pending,
            ack_received: false,
            attempts: 0,
            last_attempt_at: None,
        };
        self.queue.lock().enqueue(message.clone())?;

        let status = self.attempt(&message).await?;
        Ok(SendReceipt { message_id, status })
    }

    /// One transport attempt for a queued message.
    async fn attempt(&self, message: &EncryptedMessage) -> MessagingResult<DeliveryStatus> {
        let frame = message.frame().encode().map_err(MessagingError::Malformed)?;
        let result = self.deliver(&message.recipient_id, frame).await;
        let succeeded = result.is_ok();
        if let Err(e) = &result {
            warn!(
                "[im-05] Send of {} to {} failed: {}",
                message.message_id, message.recipient_id, e
            );
        }
        let updated = self.queue.lock().record_attempt(
            &message.message_id,
            self.time_source.now_millis(),
            succeeded,
        )?;
        Ok(updated.delivery_status)
    }

    async fn deliver(&self, to: &DeviceId, frame: Vec<u8>) -> MessagingResult<()> {
        match tokio::time::timeout(self.config.send_timeout(), self.transport.send(to, frame)).await
        {
            Ok(result) => result.map_err(MessagingError::from),
            Err(_) => Err(MessagingError::Timeout(to.clone())),
        }
    }

    /// Process one frame received from `from`.
    pub async fn handle_frame(
        &self,
        from: &DeviceId,
        bytes: &[u8],
        handler: &dyn InboundHandler,
    ) -> MessagingResult<FrameOutcome> {
        let frame = WireFrame::decode(bytes).map_err(MessagingError::Malformed)?;
        match frame {
            WireFrame::MessageAck {
                message_id,
                sender_id,
            } => Ok(self.handle_ack(from, message_id, &sender_id)),
            WireFrame::EncryptedMessage {
                message_id,
                sender_id,
                recipient_id,
                ciphertext,
                nonce,
                ..
            } => {
                if recipient_id != self.local {
                    return Err(MessagingError::Misrouted(format!(
                        "message {message_id} is for {recipient_id}"
                    )));
                }
                if &sender_id != from {
                    return Err(MessagingError::Misrouted(format!(
                        "message {message_id} claims {sender_id} but came from {from}"
                    )));
                }

                if self.queue.lock().has_received(&message_id) {
                    debug!("[im-05] Duplicate {} from {}", message_id, from);
                    self.send_ack(from, message_id).await;
                    return Ok(FrameOutcome::Duplicate(message_id));
                }
                // A concurrent copy of the same message is already being handled.
                if !self.in_flight.lock().insert(message_id) {
                    return Ok(FrameOutcome::Duplicate(message_id));
                }

                let result = self
                    .receive(from, message_id, ciphertext, &nonce, handler)
                    .await;
                self.in_flight.lock().remove(&message_id);
                result
            }
        }
    }

    async fn receive(
        &self,
        from: &DeviceId,
        message_id: Uuid,
        ciphertext: Vec<u8>,
        nonce: &[u8],
        handler: &dyn InboundHandler,
    ) -> MessagingResult<FrameOutcome> {
        let sender_key = self
            .keys
            .public_key(from)
            .ok_or_else(|| MessagingError::UnknownSender(from.clone()))?;
        let sealed = SealedPayload {
            ciphertext,
            nonce: Nonce::from_slice(nonce)?,
        };
        let aad = message_aad(&message_id, from, &self.local);
        let plaintext = open(&self.keypair, &sender_key, &sealed, &aad)?;

        let applied = match handler.handle(from, plaintext).await {
            Ok(()) => true,
            Err(HandlerError::Reject(reason)) => {
                warn!("[im-05] Payload {} from {} rejected: {}", message_id, from, reason);
                false
            }
            Err(HandlerError::Retry(reason)) => {
                return Err(MessagingError::HandlerDeferred(reason));
            }
        };

        self.queue.lock().record_received(InboxRecord {
            message_id,
            sender_id: from.clone(),
            received_at: secs(self.time_source.now_millis()),
            applied,
        })?;
        self.send_ack(from, message_id).await;

        Ok(if applied {
            FrameOutcome::Delivered(message_id)
        } else {
            FrameOutcome::Rejected(message_id)
        })
    }

    fn handle_ack(&self, from: &DeviceId, message_id: Uuid, sender_id: &DeviceId) -> FrameOutcome {
        let mut queue = self.queue.lock();
        let expected = queue.get(&message_id).map(|m| m.recipient_id.clone());
        if expected.as_ref() != Some(from) || sender_id != from {
            debug!("[im-05] Ignoring ACK {} from {}", message_id, from);
            return FrameOutcome::AckIgnored(message_id);
        }
        match queue.mark_delivered(&message_id) {
            Ok(true) => {
                debug!("[im-05] {} delivered to {}", message_id, from);
                FrameOutcome::Acked(message_id)
            }
            Ok(false) => FrameOutcome::AckIgnored(message_id),
            Err(e) => {
                warn!("[im-05] Could not record ACK {}: {}", message_id, e);
                FrameOutcome::AckIgnored(message_id)
            }
        }
    }

    /// ACK failures are not fatal: the sender re-sends and we ACK again.
    async fn send_ack(&self, to: &DeviceId, message_id: Uuid) {
        let ack = WireFrame::MessageAck {
            message_id,
            sender_id: self.local.clone(),
        };
        let frame = match ack.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("[im-05] Could not encode ACK {}: {}", message_id, e);
                return;
            }
        };
        if let Err(e) = self.deliver(to, frame).await {
            warn!("[im-05] ACK {} to {} failed: {}", message_id, to, e);
        }
    }

    /// Re-send everything pending, failed, or sent without an ACK in time.
    pub async fn retry_pending(&self) -> MessagingResult<RetryReport> {
        let due = self.queue.lock().due_for_retry(
            self.time_source.now_millis(),
            self.config.ack_timeout_ms,
            self.config.max_attempts,
        );
        let mut report = RetryReport::default();
        for message in due {
            report.attempted += 1;
            match self.attempt(&message).await? {
                DeliveryStatus::Failed => report.failed += 1,
                _ => report.sent += 1,
            }
        }
        if report.attempted > 0 {
            info!(
                "[im-05] Retry sweep: {} attempted, {} sent, {} failed",
                report.attempted, report.sent, report.failed
            );
        }
        Ok(report)
    }

    /// Delivery status of an outgoing message.
    pub fn delivery_status(&self, message_id: &Uuid) -> Option<DeliveryStatus> {
        self.queue.lock().get(message_id).map(|m| m.delivery_status)
    }

    /// Snapshot of the outbox.
    pub fn outbox(&self) -> Vec<EncryptedMessage> {
        self.queue.lock().outbox()
    }

    /// Outgoing messages not yet ACKed.
    pub fn undelivered_count(&self) -> usize {
        self.queue
            .lock()
            .outbox()
            .iter()
            .filter(|m| m.delivery_status != DeliveryStatus::Delivered)
            .count()
    }
}
