//! Envelope-encrypted agent memory over the shared record store.
//!
//! Private records: payload encrypted under a per-record DEK, DEK sealed
//! for the owner (and, on share, for each recipient).  Public records:
//! plaintext stored as-is, no DEK, readable without keys.

pub mod archive;
pub mod envelope;
pub mod rkey;

pub use envelope::{Memory, OwnerKeys, RecordEntry, RecordListing};

use mesh_crypto::CryptoError;
use mesh_store::StoreError;

#[derive(thiserror::Error, Debug)]
pub enum MemoryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("decrypt failed")]
    DecryptFailed,

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error(transparent)]
    Store(StoreError),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<StoreError> for MemoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => MemoryError::NotFound(what),
            other => MemoryError::Store(other),
        }
    }
}

impl From<CryptoError> for MemoryError {
    fn from(_: CryptoError) -> Self {
        // Key-shape errors on the read path are indistinguishable from
        // tampered material as far as callers are concerned.
        MemoryError::DecryptFailed
    }
}

pub type Result<T> = std::result::Result<T, MemoryError>;
