//! AEAD layer: AES-256-GCM with 96-bit nonces, plus DEK/nonce generation.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;

use crate::{CryptoError, Result};

pub const DEK_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;

/// Generate a fresh 32-byte data-encryption key.
pub fn generate_dek() -> [u8; DEK_LEN] {
    let mut dek = [0u8; DEK_LEN];
    rand::rngs::OsRng.fill_bytes(&mut dek);
    dek
}

/// Generate a fresh 12-byte nonce.
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt `plaintext` under `key`/`nonce`.  The GCM tag is appended to the
/// returned ciphertext.
pub fn encrypt(
    key: &[u8; DEK_LEN],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
    aad: Option<&[u8]>,
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad: aad.unwrap_or(&[]),
            },
        )
        .map_err(|_| CryptoError::DecryptFailed)
}

/// Decrypt and authenticate.  Any tamper of key, nonce, ciphertext, or aad
/// fails with [`CryptoError::DecryptFailed`].
pub fn decrypt(
    key: &[u8; DEK_LEN],
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    aad: Option<&[u8]>,
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: aad.unwrap_or(&[]),
            },
        )
        .map_err(|_| CryptoError::DecryptFailed)
}
