//! Authority signer backed by the device key.

use im_04_consensus::AuthoritySigner;
use shared_crypto::{Secp256k1KeyPair, Secp256k1Signature};
use shared_types::DeviceId;
use std::sync::Arc;

/// Signs accepted proposals with this device's key.
///
/// Only built when the device runs with the authority role.
pub struct DeviceSigner {
    device_id: DeviceId,
    keypair: Arc<Secp256k1KeyPair>,
}

impl DeviceSigner {
    pub fn new(device_id: DeviceId, keypair: Arc<Secp256k1KeyPair>) -> Self {
        Self { device_id, keypair }
    }
}

impl AuthoritySigner for DeviceSigner {
    fn authority_id(&self) -> DeviceId {
        self.device_id.clone()
    }

    fn sign(&self, message: &[u8]) -> Secp256k1Signature {
        self.keypair.sign(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_verifies_under_device_key() {
        let keypair = Arc::new(Secp256k1KeyPair::generate());
        let signer = DeviceSigner::new(DeviceId::new("auth"), keypair.clone());

        let signature = signer.sign(b"proposal");
        assert_eq!(signer.authority_id(), DeviceId::new("auth"));
        assert!(keypair.public_key().verify(b"proposal", &signature).is_ok());
    }
}
