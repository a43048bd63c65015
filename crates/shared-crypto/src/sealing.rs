//! # Sealed Peer Messages
//!
//! Authenticated encryption keyed by (sender private key, recipient public
//! key). Both ends derive the same symmetric key:
//!
//! ```text
//! shared = ECDH(sender_sk, recipient_pk) == ECDH(recipient_sk, sender_pk)
//! key    = BLAKE3-derive(CONTEXT, shared || min(pk_a, pk_b) || max(pk_a, pk_b))
//! ```
//!
//! Each seal uses a fresh random nonce. The caller passes associated data
//! (message id, sender, recipient) so a ciphertext cannot be replayed under
//! a different header.

use crate::ecdsa::{Secp256k1KeyPair, Secp256k1PublicKey};
use crate::hashing::blake3_derive_key;
use crate::symmetric::{decrypt_with_aad, encrypt_with_aad, Nonce, SecretKey};
use crate::CryptoError;
use zeroize::Zeroize;

const BOX_CONTEXT: &str = "insight-mesh 2024-06 peer message box v1";

/// Ciphertext plus the nonce needed to open it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedPayload {
    /// XChaCha20-Poly1305 output (ciphertext || tag).
    pub ciphertext: Vec<u8>,
    /// Random 24-byte nonce.
    pub nonce: Nonce,
}

fn box_key(
    own: &Secp256k1KeyPair,
    peer: &Secp256k1PublicKey,
) -> Result<SecretKey, CryptoError> {
    let mut shared = own.shared_secret(peer)?;
    let own_pk = own.public_key();
    let (low, high) = if own_pk.as_bytes() <= peer.as_bytes() {
        (own_pk, *peer)
    } else {
        (*peer, own_pk)
    };

    let mut material = Vec::with_capacity(32 + 33 + 33);
    material.extend_from_slice(&shared);
    material.extend_from_slice(low.as_bytes());
    material.extend_from_slice(high.as_bytes());

    let key = SecretKey::from_bytes(blake3_derive_key(BOX_CONTEXT, &material));
    shared.zeroize();
    material.zeroize();
    Ok(key)
}

/// Encrypt `plaintext` from `sender` to `recipient`.
pub fn seal(
    sender: &Secp256k1KeyPair,
    recipient: &Secp256k1PublicKey,
    plaintext: &[u8],
    aad: &[u8],
) -> Result<SealedPayload, CryptoError> {
    let key = box_key(sender, recipient)?;
    let (ciphertext, nonce) = encrypt_with_aad(&key, plaintext, aad)?;
    Ok(SealedPayload { ciphertext, nonce })
}

/// Decrypt a payload sealed by `sender` for `recipient`.
pub fn open(
    recipient: &Secp256k1KeyPair,
    sender: &Secp256k1PublicKey,
    sealed: &SealedPayload,
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let key = box_key(recipient, sender)?;
    decrypt_with_aad(&key, &sealed.ciphertext, &sealed.nonce, aad)
}
