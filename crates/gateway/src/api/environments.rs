//! Opaque pass-through to the environments collaborator.
//!
//! The kernel neither parses nor validates environment payloads; it
//! proxies them and maps upstream failures onto the transient class.

use axum::extract::{Path, State};
use axum::Json;
use serde_json::Value;

use mesh_domain::Error;

use crate::state::AppState;

use super::{ApiError, ApiResult};

async fn proxy(state: &AppState, suffix: &str) -> ApiResult<Json<Value>> {
    let base = state.bindings.environments_url.as_deref().ok_or_else(|| {
        ApiError(Error::Transient("environments collaborator not configured".into()))
    })?;
    let url = format!("{}/environments{suffix}", base.trim_end_matches('/'));

    let response = reqwest::get(&url)
        .await
        .map_err(|e| ApiError(Error::Transient(e.to_string())))?;
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(ApiError(Error::NotFound(format!("environment {suffix:?}"))));
    }
    if !response.status().is_success() {
        return Err(ApiError(Error::Transient(format!(
            "environments upstream returned {}",
            response.status()
        ))));
    }
    let body: Value = response
        .json()
        .await
        .map_err(|e| ApiError(Error::Transient(e.to_string())))?;
    Ok(Json(body))
}

/// `GET /environments` (admin).
pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    proxy(&state, "").await
}

/// `GET /environments/:id` (admin).
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    proxy(&state, &format!("/{id}")).await
}
