//! Message records and wire frames.

use serde::{Deserialize, Serialize};
use shared_types::{DeviceId, Timestamp};
use uuid::Uuid;

/// Delivery lifecycle of an outgoing message.
///
/// `Pending -> Sent -> Delivered`, or `Pending -> Failed`; failed messages
/// are retried under the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Queued, not yet handed to the transport.
    Pending,
    /// Handed to the transport, no ACK yet.
    Sent,
    /// ACK received.
    Delivered,
    /// Last attempt failed.
    Failed,
}

/// Outgoing message as held in the durable queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedMessage {
    pub message_id: Uuid,
    pub sender_id: DeviceId,
    pub recipient_id: DeviceId,
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub created_at: Timestamp,
    pub delivery_status: DeliveryStatus,
    pub ack_received: bool,
    /// Transport attempts so far.
    pub attempts: u32,
    /// Unix millis of the last attempt.
    pub last_attempt_at: Option<u64>,
}

impl EncryptedMessage {
    /// The on-wire form.
    pub fn frame(&self) -> WireFrame {
        WireFrame::EncryptedMessage {
            message_id: self.message_id,
            sender_id: self.sender_id.clone(),
            recipient_id: self.recipient_id.clone(),
            ciphertext: self.ciphertext.clone(),
            nonce: self.nonce.clone(),
            created_at: self.created_at,
        }
    }
}

/// Associated data bound into every ciphertext.
pub fn message_aad(message_id: &Uuid, sender: &DeviceId, recipient: &DeviceId) -> Vec<u8> {
    let sender = sender.as_str().as_bytes();
    let recipient = recipient.as_str().as_bytes();
    let mut aad = Vec::with_capacity(16 + 16 + sender.len() + recipient.len());
    aad.extend_from_slice(message_id.as_bytes());
    aad.extend_from_slice(&(sender.len() as u64).to_be_bytes());
    aad.extend_from_slice(sender);
    aad.extend_from_slice(&(recipient.len() as u64).to_be_bytes());
    aad.extend_from_slice(recipient);
    aad
}

/// What travels over the byte channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFrame {
    /// `encrypted_message{message_id, sender_id, recipient_id, ciphertext, nonce}`.
    EncryptedMessage {
        message_id: Uuid,
        sender_id: DeviceId,
        recipient_id: DeviceId,
        ciphertext: Vec<u8>,
        nonce: Vec<u8>,
        created_at: Timestamp,
    },
    /// `message_ack{message_id}`.
    MessageAck {
        message_id: Uuid,
        sender_id: DeviceId,
    },
}

impl WireFrame {
    /// Encode for the transport.
    pub fn encode(&self) -> Result<Vec<u8>, String> {
        bincode::serialize(self).map_err(|e| e.to_string())
    }

    /// Decode bytes off the transport.
    pub fn decode(bytes: &[u8]) -> Result<Self, String> {
        bincode::deserialize(bytes).map_err(|e| e.to_string())
    }
}

/// Inbound message recorded for duplicate suppression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxRecord {
    pub message_id: Uuid,
    pub sender_id: DeviceId,
    pub received_at: Timestamp,
    /// False when the payload was rejected by its handler.
    pub applied: bool,
}
