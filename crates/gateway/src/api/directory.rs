//! Key-directory routes.  Lookup is public; registration rides behind the
//! admin token like every other mutation.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use mesh_domain::Error;

use crate::state::AppState;

use super::{require_json, ApiError, ApiResult};

/// `GET /directory/:did`: public keys for a DID, or 404.
pub async fn lookup(
    State(state): State<AppState>,
    Path(did): Path<String>,
) -> ApiResult<Json<Value>> {
    let keys = state
        .directory
        .lookup(&did)
        .await
        .map_err(|e| ApiError(Error::Transient(e.to_string())))?
        .ok_or_else(|| ApiError(Error::NotFound(format!("directory entry {did}"))))?;
    Ok(Json(json!({ "did": did, "publicKeys": keys })))
}

/// `PUT /directory/:did`: upsert `{did, publicKeys}`.
pub async fn register(
    State(state): State<AppState>,
    Path(did): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let body = require_json(body)?;
    let keys = body
        .get("publicKeys")
        .cloned()
        .ok_or_else(|| ApiError(Error::invalid("publicKeys required")))?;
    state
        .directory
        .register(&did, &keys)
        .await
        .map_err(|e| ApiError(Error::Transient(e.to_string())))?;
    Ok(Json(json!({ "did": did, "registered": true })))
}
