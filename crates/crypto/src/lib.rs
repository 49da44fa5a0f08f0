//! Cryptographic primitives for AgentMesh: Ed25519 signing, X25519
//! key-agreement, AES-256-GCM AEAD, and sealed data-encryption keys.
//!
//! Algorithm choices (documented, since interop requires pinning):
//! - AEAD: AES-256-GCM with 96-bit nonces.
//! - Sealed DEK: ephemeral X25519 ECDH → HKDF-SHA256 → AES-256-GCM,
//!   output `ephemeral_pub(32) ‖ nonce(12) ‖ ciphertext+tag`.

pub mod aead;
pub mod did;
pub mod identity;
pub mod keys;
pub mod seal;

/// Errors from key handling, AEAD, and DEK sealing.
#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    /// AEAD tag mismatch, truncated sealed box, or a wrong key.
    #[error("decrypt failed")]
    DecryptFailed,

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("invalid JWK: {0}")]
    InvalidJwk(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
