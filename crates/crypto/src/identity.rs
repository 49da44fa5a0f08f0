//! Agent identity: the signing + encryption keypairs and their durable
//! JWK blob form.

use serde::{Deserialize, Serialize};

use crate::keys::{EncryptionKeyPair, Jwk, SigningKeyPair};
use crate::Result;

/// Live in-memory identity.
#[derive(Clone)]
pub struct Identity {
    pub did: String,
    pub signing: SigningKeyPair,
    pub encryption: EncryptionKeyPair,
}

/// Durable identity blob, as persisted in the agent's state bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityBlob {
    pub version: u32,
    pub did: String,
    pub signing_key: KeyEntry,
    pub encryption_key: KeyEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyEntry {
    pub algorithm: String,
    pub public_jwk: Jwk,
    pub private_jwk: Jwk,
}

/// Public-key view as surfaced by `GET /identity` and the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKeys {
    /// Multibase (`z…`) X25519 public key.
    pub encryption: String,
    /// Multibase (`z…`) Ed25519 public key.
    pub signing: String,
}

impl Identity {
    /// Generate both keypairs for a new agent.
    pub fn generate(did: impl Into<String>) -> Self {
        Self {
            did: did.into(),
            signing: SigningKeyPair::generate(),
            encryption: EncryptionKeyPair::generate(),
        }
    }

    pub fn to_blob(&self) -> IdentityBlob {
        IdentityBlob {
            version: 1,
            did: self.did.clone(),
            signing_key: KeyEntry {
                algorithm: "Ed25519".into(),
                public_jwk: self.signing.public_jwk(),
                private_jwk: self.signing.private_jwk(),
            },
            encryption_key: KeyEntry {
                algorithm: "X25519".into(),
                public_jwk: self.encryption.public_jwk(),
                private_jwk: self.encryption.private_jwk(),
            },
        }
    }

    pub fn from_blob(blob: &IdentityBlob) -> Result<Self> {
        Ok(Self {
            did: blob.did.clone(),
            signing: SigningKeyPair::from_jwk(&blob.signing_key.private_jwk)?,
            encryption: EncryptionKeyPair::from_jwk(&blob.encryption_key.private_jwk)?,
        })
    }

    pub fn public_keys(&self) -> PublicKeys {
        PublicKeys {
            encryption: self.encryption.public_multibase(),
            signing: self.signing.public_multibase(),
        }
    }
}
