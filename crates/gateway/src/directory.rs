//! Public-key directory: `did → publicKeys`.
//!
//! Runs in one of two modes behind the same trait: backed by the local
//! store (the gateway *is* the relay), or as a client of a remote relay
//! named by the `RELAY` binding.  Registration failures are transient:
//! retried with jitter, then logged; an agent's identity is usable locally
//! even when registration never lands.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;

use mesh_store::Store;

const MAX_ATTEMPTS: u32 = 3;

#[derive(thiserror::Error, Debug)]
pub enum DirectoryError {
    #[error("directory transient: {0}")]
    Transient(String),

    #[error("directory: {0}")]
    Other(String),
}

#[async_trait]
pub trait KeyDirectory: Send + Sync {
    /// Upsert an agent's public keys.
    async fn register(&self, did: &str, keys: &Value) -> Result<(), DirectoryError>;

    /// Look up an agent's public keys.
    async fn lookup(&self, did: &str) -> Result<Option<Value>, DirectoryError>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Local (in-process) directory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct LocalDirectory {
    store: Store,
}

impl LocalDirectory {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl KeyDirectory for LocalDirectory {
    async fn register(&self, did: &str, keys: &Value) -> Result<(), DirectoryError> {
        self.store
            .directory_put(did, keys)
            .map_err(|e| DirectoryError::Other(e.to_string()))
    }

    async fn lookup(&self, did: &str) -> Result<Option<Value>, DirectoryError> {
        self.store
            .directory_get(did)
            .map_err(|e| DirectoryError::Other(e.to_string()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Remote relay client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct RemoteDirectory {
    base_url: String,
    client: reqwest::Client,
}

impl RemoteDirectory {
    pub fn new(base_url: impl Into<String>) -> Result<Self, DirectoryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| DirectoryError::Other(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, did: &str) -> String {
        format!("{}/directory/{did}", self.base_url)
    }
}

#[async_trait]
impl KeyDirectory for RemoteDirectory {
    async fn register(&self, did: &str, keys: &Value) -> Result<(), DirectoryError> {
        let body = serde_json::json!({ "did": did, "publicKeys": keys });
        retry_transient(MAX_ATTEMPTS, || async {
            let response = self
                .client
                .put(self.url(did))
                .json(&body)
                .send()
                .await
                .map_err(|e| DirectoryError::Transient(e.to_string()))?;
            if response.status().is_server_error() {
                return Err(DirectoryError::Transient(format!(
                    "status {}",
                    response.status()
                )));
            }
            if !response.status().is_success() {
                return Err(DirectoryError::Other(format!(
                    "status {}",
                    response.status()
                )));
            }
            Ok(())
        })
        .await
    }

    async fn lookup(&self, did: &str) -> Result<Option<Value>, DirectoryError> {
        retry_transient(MAX_ATTEMPTS, || async {
            let response = self
                .client
                .get(self.url(did))
                .send()
                .await
                .map_err(|e| DirectoryError::Transient(e.to_string()))?;
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if response.status().is_server_error() {
                return Err(DirectoryError::Transient(format!(
                    "status {}",
                    response.status()
                )));
            }
            let body: Value = response
                .json()
                .await
                .map_err(|e| DirectoryError::Other(e.to_string()))?;
            Ok(body.get("publicKeys").cloned().or(Some(body)))
        })
        .await
    }
}

/// Retry transient failures with exponential backoff plus jitter.
async fn retry_transient<T, F, Fut>(attempts: u32, op: F) -> Result<T, DirectoryError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, DirectoryError>>,
{
    let mut last = None;
    for attempt in 0..attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(DirectoryError::Transient(message)) => {
                let backoff_ms =
                    100u64 * (1 << attempt) + rand::thread_rng().gen_range(0..250);
                tracing::debug!(attempt, backoff_ms, error = %message, "directory retry");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                last = Some(DirectoryError::Transient(message));
            }
            Err(other) => return Err(other),
        }
    }
    Err(last.unwrap_or_else(|| DirectoryError::Transient("exhausted retries".into())))
}
