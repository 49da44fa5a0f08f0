//! Keypair wrappers with JWK import/export and multibase public keys.
//!
//! JWKs use the OKP key type (RFC 8037): `x` is the base64url raw public
//! key, `d` the base64url raw private key.  Private JWKs always carry `d`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signer, Verifier};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::{CryptoError, Result};

/// Multicodec prefixes for raw public keys (per the did:key registry).
const MULTICODEC_ED25519_PUB: [u8; 2] = [0xed, 0x01];
const MULTICODEC_X25519_PUB: [u8; 2] = [0xec, 0x01];

/// An OKP JSON Web Key.  `d` is present only for private keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
}

impl Jwk {
    fn okp(crv: &str, public: &[u8], private: Option<&[u8]>) -> Self {
        Self {
            kty: "OKP".into(),
            crv: crv.into(),
            x: URL_SAFE_NO_PAD.encode(public),
            d: private.map(|d| URL_SAFE_NO_PAD.encode(d)),
        }
    }

    fn decode_field(value: &str, field: &str) -> Result<[u8; 32]> {
        let bytes = URL_SAFE_NO_PAD
            .decode(value)
            .map_err(|e| CryptoError::InvalidJwk(format!("{field}: {e}")))?;
        bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidJwk(format!("{field}: expected 32 bytes")))
    }

    fn expect_crv(&self, crv: &str) -> Result<()> {
        if self.kty != "OKP" || self.crv != crv {
            return Err(CryptoError::InvalidJwk(format!(
                "expected OKP/{crv}, got {}/{}",
                self.kty, self.crv
            )));
        }
        Ok(())
    }

    /// Strip private material.
    pub fn public_only(&self) -> Jwk {
        Jwk {
            kty: self.kty.clone(),
            crv: self.crv.clone(),
            x: self.x.clone(),
            d: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Ed25519 signing keys
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
pub struct SigningKeyPair {
    secret: ed25519_dalek::SigningKey,
}

impl SigningKeyPair {
    pub fn generate() -> Self {
        Self {
            secret: ed25519_dalek::SigningKey::generate(&mut OsRng),
        }
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        self.secret.verifying_key().to_bytes()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.secret.sign(message).to_bytes()
    }

    pub fn public_jwk(&self) -> Jwk {
        Jwk::okp("Ed25519", &self.public_bytes(), None)
    }

    pub fn private_jwk(&self) -> Jwk {
        Jwk::okp(
            "Ed25519",
            &self.public_bytes(),
            Some(self.secret.to_bytes().as_slice()),
        )
    }

    pub fn from_jwk(jwk: &Jwk) -> Result<Self> {
        jwk.expect_crv("Ed25519")?;
        let d = jwk
            .d
            .as_deref()
            .ok_or_else(|| CryptoError::InvalidJwk("missing d".into()))?;
        let seed = Jwk::decode_field(d, "d")?;
        Ok(Self {
            secret: ed25519_dalek::SigningKey::from_bytes(&seed),
        })
    }

    /// Public key as a multibase string (`z` + base58btc multicodec).
    pub fn public_multibase(&self) -> String {
        public_key_multibase(&MULTICODEC_ED25519_PUB, &self.public_bytes())
    }
}

/// Verify an Ed25519 signature against a public JWK.
pub fn verify(public: &Jwk, message: &[u8], signature: &[u8]) -> Result<bool> {
    public.expect_crv("Ed25519")?;
    let key_bytes = Jwk::decode_field(&public.x, "x")?;
    let key = ed25519_dalek::VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let sig: [u8; 64] = signature
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("signature must be 64 bytes".into()))?;
    Ok(key
        .verify(message, &ed25519_dalek::Signature::from_bytes(&sig))
        .is_ok())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// X25519 key-agreement keys
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
pub struct EncryptionKeyPair {
    secret: x25519_dalek::StaticSecret,
}

impl EncryptionKeyPair {
    pub fn generate() -> Self {
        Self {
            secret: x25519_dalek::StaticSecret::random_from_rng(OsRng),
        }
    }

    pub fn public_key(&self) -> x25519_dalek::PublicKey {
        x25519_dalek::PublicKey::from(&self.secret)
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        self.public_key().to_bytes()
    }

    pub(crate) fn secret(&self) -> &x25519_dalek::StaticSecret {
        &self.secret
    }

    pub fn public_jwk(&self) -> Jwk {
        Jwk::okp("X25519", &self.public_bytes(), None)
    }

    pub fn private_jwk(&self) -> Jwk {
        Jwk::okp(
            "X25519",
            &self.public_bytes(),
            Some(self.secret.to_bytes().as_slice()),
        )
    }

    pub fn from_jwk(jwk: &Jwk) -> Result<Self> {
        jwk.expect_crv("X25519")?;
        let d = jwk
            .d
            .as_deref()
            .ok_or_else(|| CryptoError::InvalidJwk("missing d".into()))?;
        let seed = Jwk::decode_field(d, "d")?;
        Ok(Self {
            secret: x25519_dalek::StaticSecret::from(seed),
        })
    }

    pub fn public_multibase(&self) -> String {
        public_key_multibase(&MULTICODEC_X25519_PUB, &self.public_bytes())
    }
}

/// Parse an X25519 public key from its public JWK.
pub fn encryption_public_from_jwk(jwk: &Jwk) -> Result<x25519_dalek::PublicKey> {
    jwk.expect_crv("X25519")?;
    let bytes = Jwk::decode_field(&jwk.x, "x")?;
    Ok(x25519_dalek::PublicKey::from(bytes))
}

/// Parse an X25519 public key from its multibase form (`z…`).
pub fn encryption_public_from_multibase(s: &str) -> Result<x25519_dalek::PublicKey> {
    let encoded = s
        .strip_prefix('z')
        .ok_or_else(|| CryptoError::InvalidKey("multibase key must start with 'z'".into()))?;
    let decoded = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let raw = decoded
        .strip_prefix(MULTICODEC_X25519_PUB.as_slice())
        .ok_or_else(|| CryptoError::InvalidKey("not an x25519 multicodec key".into()))?;
    let bytes: [u8; 32] = raw
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("expected 32-byte key".into()))?;
    Ok(x25519_dalek::PublicKey::from(bytes))
}

fn public_key_multibase(prefix: &[u8], raw: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(prefix.len() + raw.len());
    bytes.extend_from_slice(prefix);
    bytes.extend_from_slice(raw);
    format!("z{}", bs58::encode(bytes).into_string())
}
