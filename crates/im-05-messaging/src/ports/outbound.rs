//! Outbound Ports (Driven Ports)
//!
//! The messaging service owns encryption, queuing and acknowledgement. It
//! needs a byte channel to peers, somewhere to look up peer keys, and a
//! handler for decrypted payloads.

use crate::domain::{HandlerError, TransportError};
use async_trait::async_trait;
use shared_crypto::Secp256k1PublicKey;
use shared_types::DeviceId;

/// Byte channel to a peer (Driven Port).
///
/// Delivery is best effort; the messaging layer retries.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Hand `frame` to the channel towards `to`.
    async fn send(&self, to: &DeviceId, frame: Vec<u8>) -> Result<(), TransportError>;
}

/// Public key lookup, backed by the peer registry.
pub trait KeyDirectory: Send + Sync {
    /// Registered public key of `device`.
    fn public_key(&self, device: &DeviceId) -> Option<Secp256k1PublicKey>;
}

/// Consumer of decrypted payloads.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    /// Apply `payload` received from `from`.
    async fn handle(&self, from: &DeviceId, payload: Vec<u8>) -> Result<(), HandlerError>;
}

#[cfg(test)]
pub mod mocks {
    //! In-memory doubles for the messaging ports.

    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Records every frame; can be switched to fail.
    #[derive(Default)]
    pub struct RecordingTransport {
        pub sent: Mutex<Vec<(DeviceId, Vec<u8>)>>,
        pub fail: Mutex<bool>,
    }

    impl RecordingTransport {
        pub fn set_failing(&self, fail: bool) {
            *self.fail.lock() = fail;
        }

        pub fn take(&self) -> Vec<(DeviceId, Vec<u8>)> {
            std::mem::take(&mut *self.sent.lock())
        }
    }

    #[async_trait]
    impl PeerTransport for RecordingTransport {
        async fn send(&self, to: &DeviceId, frame: Vec<u8>) -> Result<(), TransportError> {
            if *self.fail.lock() {
                return Err(TransportError::Unreachable(to.clone()));
            }
            self.sent.lock().push((to.clone(), frame));
            Ok(())
        }
    }

    /// Never completes.
    pub struct StalledTransport;

    #[async_trait]
    impl PeerTransport for StalledTransport {
        async fn send(&self, _to: &DeviceId, _frame: Vec<u8>) -> Result<(), TransportError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct StaticKeys(pub HashMap<DeviceId, Secp256k1PublicKey>);

    impl KeyDirectory for StaticKeys {
        fn public_key(&self, device: &DeviceId) -> Option<Secp256k1PublicKey> {
            self.0.get(device).copied()
        }
    }

    /// Collects payloads; answers with a scripted result.
    #[derive(Default)]
    pub struct CollectingHandler {
        pub received: Mutex<Vec<(DeviceId, Vec<u8>)>>,
        pub answer: Mutex<Option<HandlerError>>,
    }

    #[async_trait]
    impl InboundHandler for CollectingHandler {
        async fn handle(&self, from: &DeviceId, payload: Vec<u8>) -> Result<(), HandlerError> {
            if let Some(err) = self.answer.lock().clone() {
                return Err(err);
            }
            self.received.lock().push((from.clone(), payload));
            Ok(())
        }
    }
}
