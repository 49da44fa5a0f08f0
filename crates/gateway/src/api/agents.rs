//! Global agent lifecycle: create, list, delete.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use mesh_domain::config::AgentConfig;
use mesh_domain::Error;
use mesh_store::StoreError;

use crate::state::AppState;

use super::{require_json, ApiError, ApiResult};

/// `POST /agents`: create an agent from an [`AgentConfig`] body.
///
/// The registry insert is the race arbiter: under concurrent creates with
/// one name, exactly one caller gets 200 and the rest 409.
pub async fn create_agent(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let body = require_json(body)?;
    let mut config: AgentConfig = serde_json::from_value(body)
        .map_err(|e| ApiError(Error::invalid(format!("invalid config: {e}"))))?;
    config.name = config.name.to_ascii_lowercase();
    config.clamp();

    let issues = config.validate();
    if !issues.is_empty() {
        return Err(ApiError(Error::invalid_with("Invalid config", issues)));
    }

    let name = config.name.clone();
    let did = mesh_crypto::did::did_from_name(&name);
    let created_at = mesh_store::now_ms();

    state
        .store
        .registry_insert(&name, &did, created_at)
        .map_err(|e| match e {
            StoreError::Conflict(_) => {
                ApiError(Error::Conflict(format!("agent {name:?} already exists")))
            }
            other => ApiError(Error::Other(other.to_string())),
        })?;

    let handle = match state
        .host
        .spawn_agent(state.actor_deps(), &name, created_at, Some(config))
        .await
    {
        Ok(handle) => handle,
        Err(e) => {
            // Roll the claim back so the name is not burned by a failed boot.
            let _ = state.store.registry_delete(&name);
            return Err(ApiError(e));
        }
    };

    let identity = handle.identity().await?;
    let config = handle.get_config().await?;
    let loop_status = handle.loop_status().await?;
    tracing::info!(agent = %name, did = %identity.did, "agent created");

    Ok(Json(json!({
        "did": identity.did,
        "createdAt": identity.created_at,
        "publicKeys": identity.public_keys,
        "config": config,
        "loop": loop_status,
    })))
}

/// `GET /agents`: admin listing with identity and config per agent.
pub async fn list_agents(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let mut entries = Vec::new();
    for handle in state.host.list() {
        let identity = handle.identity().await?;
        let config = handle.get_config().await?;
        entries.push(json!({
            "name": handle.name,
            "did": identity.did,
            "createdAt": identity.created_at,
            "publicKeys": identity.public_keys,
            "config": config,
        }));
    }
    Ok(Json(json!({ "entries": entries })))
}

/// `DELETE /agents/:name`: the only way an agent is destroyed.
pub async fn delete_agent(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let handle = state
        .host
        .remove(&name)
        .ok_or_else(|| ApiError(Error::NotFound(format!("agent {name:?}"))))?;

    state.alarms.disarm(&handle.name);
    handle.shutdown().await;
    state
        .store
        .registry_delete(&handle.name)
        .map_err(|e| ApiError(Error::Other(e.to_string())))?;
    state
        .store
        .state_delete_all(&handle.did)
        .map_err(|e| ApiError(Error::Other(e.to_string())))?;

    tracing::info!(agent = %handle.name, did = %handle.did, "agent deleted");
    Ok(Json(json!({ "deleted": handle.name })))
}
