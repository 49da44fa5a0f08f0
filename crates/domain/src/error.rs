use crate::lexicon::Issue;

/// Shared error type used across all AgentMesh crates.
///
/// Variants map onto the gateway's HTTP status codes; the mapping itself
/// lives in the gateway so this crate stays transport-agnostic.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input: {message}")]
    InvalidInput {
        message: String,
        issues: Vec<Issue>,
    },

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("decrypt failed")]
    DecryptFailed,

    #[error("transient: {0}")]
    Transient(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build an `InvalidInput` with no per-field issues.
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidInput {
            message: message.into(),
            issues: Vec::new(),
        }
    }

    /// Build an `InvalidInput` carrying lexicon/config validation issues.
    pub fn invalid_with(message: impl Into<String>, issues: Vec<Issue>) -> Self {
        Error::InvalidInput {
            message: message.into(),
            issues,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
