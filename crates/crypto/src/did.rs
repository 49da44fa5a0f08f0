//! DID minting.  Method `mesh`; the actor instance id is derived
//! deterministically from the agent name so the relay can route without a
//! lookup and a re-created actor recovers the same DID.

use sha2::{Digest, Sha256};

pub const DID_METHOD: &str = "mesh";

/// Deterministic actor instance id: first 32 hex chars of
/// SHA-256(lowercased name).
pub fn instance_id_from_name(name: &str) -> String {
    let digest = Sha256::digest(name.to_ascii_lowercase().as_bytes());
    hex::encode(&digest[..16])
}

/// Mint the DID for an actor instance id.
pub fn derive_did(instance_id: &str) -> String {
    format!("did:{DID_METHOD}:{instance_id}")
}

/// Mint the DID for an agent name.
pub fn did_from_name(name: &str) -> String {
    derive_did(&instance_id_from_name(name))
}
