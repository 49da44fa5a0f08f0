//! Environment bindings.  Read once at startup; `/health` reports which of
//! the required ones are missing.

use std::path::PathBuf;

/// All environment bindings the gateway understands.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    /// Bearer token protecting mutating and admin routes.
    pub admin_token: Option<String>,
    /// Allowed CORS origin; defaults to `*`.
    pub cors_origin: Option<String>,
    /// SQLite database path for the record store.
    pub store_path: Option<PathBuf>,
    /// On-disk directory for large payloads and exports.
    pub data_dir: Option<PathBuf>,
    /// Remote key-directory endpoint.  Empty = serve the directory
    /// in-process.
    pub relay: Option<String>,
    /// Optional message-queue endpoint for broadcast fan-out.
    pub queue_url: Option<String>,
    /// Model provider credentials.  Empty = scripted offline runtime.
    pub model_api_key: Option<String>,
    /// Model provider base URL (chat-completions contract).
    pub model_base_url: Option<String>,
    /// Environments collaborator endpoint for the pass-through routes.
    pub environments_url: Option<String>,
}

fn non_empty(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

impl Bindings {
    pub fn from_env() -> Self {
        Self {
            admin_token: non_empty("ADMIN_TOKEN"),
            cors_origin: non_empty("CORS_ORIGIN"),
            store_path: non_empty("MESH_STORE_PATH").map(PathBuf::from),
            data_dir: non_empty("MESH_DATA_DIR").map(PathBuf::from),
            relay: non_empty("RELAY"),
            queue_url: non_empty("MESH_QUEUE_URL"),
            model_api_key: non_empty("MODEL_API_KEY"),
            model_base_url: non_empty("MODEL_BASE_URL"),
            environments_url: non_empty("ENVIRONMENTS_URL"),
        }
    }

    /// Names of required bindings that are absent.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.admin_token.is_none() {
            missing.push("ADMIN_TOKEN");
        }
        if self.store_path.is_none() {
            missing.push("MESH_STORE_PATH");
        }
        if self.model_api_key.is_none() {
            missing.push("MODEL_API_KEY");
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_lists_required_only() {
        let bindings = Bindings::default();
        let missing = bindings.missing();
        assert!(missing.contains(&"ADMIN_TOKEN"));
        assert!(missing.contains(&"MESH_STORE_PATH"));
        assert!(missing.contains(&"MODEL_API_KEY"));
        assert!(!missing.contains(&"RELAY"));
    }

    #[test]
    fn nothing_missing_when_required_set() {
        let bindings = Bindings {
            admin_token: Some("t".into()),
            store_path: Some("/tmp/mesh.db".into()),
            model_api_key: Some("k".into()),
            ..Default::default()
        };
        assert!(bindings.missing().is_empty());
    }
}
