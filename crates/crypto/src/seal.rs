//! Sealed DEKs: libsodium `crypto_box_seal` semantics over X25519 + HKDF
//! + AES-256-GCM.
//!
//! The sender's ephemeral public key is embedded in the output, so only the
//! recipient's private key is needed to open:
//! `ephemeral_pub(32) ‖ nonce(12) ‖ ciphertext+tag`.

use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey};

use crate::aead::{self, DEK_LEN, NONCE_LEN};
use crate::keys::EncryptionKeyPair;
use crate::{CryptoError, Result};

const HKDF_INFO: &[u8] = b"mesh/sealed-dek/v1";
const EPHEMERAL_LEN: usize = 32;

/// Derive the symmetric wrapping key for a (shared-secret, eph-pub,
/// recipient-pub) triple.  Binding both public keys into the salt ties the
/// key to this exact pairing.
fn wrapping_key(
    shared_secret: &[u8],
    ephemeral_pub: &PublicKey,
    recipient_pub: &PublicKey,
) -> [u8; DEK_LEN] {
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(ephemeral_pub.as_bytes());
    salt[32..].copy_from_slice(recipient_pub.as_bytes());

    let hk = Hkdf::<Sha256>::new(Some(&salt), shared_secret);
    let mut key = [0u8; DEK_LEN];
    hk.expand(HKDF_INFO, &mut key)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    key
}

/// Seal a DEK for `recipient`.  A fresh ephemeral keypair is generated per
/// call, so sealing the same DEK twice yields different outputs.
pub fn seal_dek(recipient: &PublicKey, dek: &[u8; DEK_LEN]) -> Result<Vec<u8>> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_pub = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(recipient);

    let key = wrapping_key(shared.as_bytes(), &ephemeral_pub, recipient);
    let nonce = aead::generate_nonce();
    let ciphertext = aead::encrypt(&key, &nonce, dek, None)?;

    let mut out = Vec::with_capacity(EPHEMERAL_LEN + NONCE_LEN + ciphertext.len());
    out.extend_from_slice(ephemeral_pub.as_bytes());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a sealed DEK with the recipient's private key.  Fails with
/// [`CryptoError::DecryptFailed`] on truncation, tamper, or a wrong key.
pub fn open_dek(recipient: &EncryptionKeyPair, sealed: &[u8]) -> Result<[u8; DEK_LEN]> {
    if sealed.len() < EPHEMERAL_LEN + NONCE_LEN + 1 {
        return Err(CryptoError::DecryptFailed);
    }
    let ephemeral_bytes: [u8; 32] = sealed[..EPHEMERAL_LEN]
        .try_into()
        .map_err(|_| CryptoError::DecryptFailed)?;
    let ephemeral_pub = PublicKey::from(ephemeral_bytes);
    let nonce: [u8; NONCE_LEN] = sealed[EPHEMERAL_LEN..EPHEMERAL_LEN + NONCE_LEN]
        .try_into()
        .map_err(|_| CryptoError::DecryptFailed)?;
    let ciphertext = &sealed[EPHEMERAL_LEN + NONCE_LEN..];

    let shared = recipient.secret().diffie_hellman(&ephemeral_pub);
    let key = wrapping_key(shared.as_bytes(), &ephemeral_pub, &recipient.public_key());

    let dek = aead::decrypt(&key, &nonce, ciphertext, None)?;
    dek.try_into().map_err(|_| CryptoError::DecryptFailed)
}
