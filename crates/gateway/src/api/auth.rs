//! Admin bearer-token middleware.
//!
//! `ADMIN_TOKEN` is read **once at startup** and cached as a SHA-256
//! digest; requests are compared in constant time.  With no token
//! configured, protected routes refuse access rather than falling open.
//!
//! Protection follows the gateway pipeline contract: every mutating verb
//! (`POST|PUT|PATCH|DELETE`) plus the admin-only reads (`GET /agents`,
//! `GET /environments…`, `GET …/loop/status`).  Public reads of an
//! agent's data and `/health` pass through; the websocket route checks
//! its token in the handler.

use axum::body::Body;
use axum::extract::State;
use axum::http::{Method, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::state::AppState;

use super::ApiError;

/// Check a presented token against the startup-computed digest.  Hashing
/// normalizes lengths so `ct_eq` always compares 32 bytes.
pub(crate) fn token_matches(state: &AppState, provided: &str) -> bool {
    match &state.admin_token_hash {
        Some(expected) => {
            let provided_hash = Sha256::digest(provided.as_bytes());
            bool::from(provided_hash.ct_eq(expected.as_slice()))
        }
        None => false,
    }
}

/// Whether this request needs the admin token.
fn is_protected(method: &Method, path: &str) -> bool {
    match *method {
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE => true,
        Method::GET => {
            path == "/agents"
                || path.starts_with("/environments")
                || path.ends_with("/loop/status")
        }
        _ => false,
    }
}

/// Axum middleware enforcing admin auth on protected routes.  Rejected
/// requests never reach an actor.
pub async fn require_admin_token(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !is_protected(req.method(), req.uri().path()) {
        return next.run(req).await;
    }

    let provided = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");
    if !token_matches(&state, provided) {
        return ApiError(mesh_domain::Error::Unauthorized).into_response();
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutating_verbs_are_protected() {
        assert!(is_protected(&Method::POST, "/agents/alice/memory"));
        assert!(is_protected(&Method::PUT, "/agents/alice/memory"));
        assert!(is_protected(&Method::PATCH, "/agents/alice/config"));
        assert!(is_protected(&Method::DELETE, "/agents/alice"));
    }

    #[test]
    fn admin_reads_are_protected() {
        assert!(is_protected(&Method::GET, "/agents"));
        assert!(is_protected(&Method::GET, "/environments"));
        assert!(is_protected(&Method::GET, "/environments/rpg-1"));
        assert!(is_protected(&Method::GET, "/agents/alice/loop/status"));
    }

    #[test]
    fn public_reads_pass() {
        assert!(!is_protected(&Method::GET, "/health"));
        assert!(!is_protected(&Method::GET, "/agents/alice/identity"));
        assert!(!is_protected(&Method::GET, "/agents/alice/memory"));
        assert!(!is_protected(&Method::GET, "/agents/alice/inbox"));
        assert!(!is_protected(&Method::GET, "/agents/alice/shared"));
        assert!(!is_protected(&Method::GET, "/agents/alice/config"));
        assert!(!is_protected(&Method::GET, "/directory/did:mesh:aa"));
    }
}
