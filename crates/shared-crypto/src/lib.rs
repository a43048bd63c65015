//! # Shared Crypto - Device Keys and Peer Message Sealing
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `ecdsa` | secp256k1 | Device identity, authority signatures, ECDH |
//! | `sealing` | ECDH + BLAKE3 KDF + XChaCha20-Poly1305 | Peer-to-peer message box |
//! | `symmetric` | XChaCha20-Poly1305 | Authenticated encryption |
//! | `hashing` | SHA-256, BLAKE3 | Content digests, key derivation |
//!
//! ## Security Properties
//!
//! - **XChaCha20**: 192-bit random nonce per message, constant-time
//! - **secp256k1**: RFC 6979 deterministic signatures, low-S normalization
//! - **Sealed box**: the symmetric key depends on both parties' public keys,
//!   so a ciphertext only opens for the intended sender/recipient pair

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ecdsa;
pub mod errors;
pub mod hashing;
pub mod sealing;
pub mod symmetric;

// Re-exports
pub use ecdsa::{Secp256k1KeyPair, Secp256k1PublicKey, Secp256k1Signature};
pub use errors::CryptoError;
pub use hashing::{blake3_derive_key, sha256};
pub use sealing::{open, seal, SealedPayload};
pub use symmetric::{decrypt, encrypt, Nonce, SecretKey};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
