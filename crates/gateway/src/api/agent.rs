//! Per-agent routes.  Handlers here only parse, validate, and forward to
//! the named actor's mailbox; the actor owns every durable mutation.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use mesh_domain::{lexicon, Error};
use mesh_runtime::PromptOptions;
use mesh_store::ListQuery;

use crate::state::AppState;

use super::{require_json, resolve_agent, validate_record, ApiError, ApiResult};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Identity
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `GET /agents/:name/identity`: public; never returns private material.
pub async fn identity(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let handle = resolve_agent(&state, &name)?;
    let view = handle.identity().await?;
    Ok(Json(serde_json::to_value(view).map_err(Error::Json)?))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Prompt
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct PromptBody {
    prompt: String,
    #[serde(default)]
    options: Option<PromptOptions>,
}

/// `POST /agents/:name/prompt`: one interactive turn.
pub async fn prompt(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let handle = resolve_agent(&state, &name)?;
    let body = require_json(body)?;
    let body: PromptBody = serde_json::from_value(body)
        .map_err(|e| ApiError(Error::invalid(format!("prompt body: {e}"))))?;

    let result = handle
        .prompt(body.prompt, body.options.unwrap_or_default())
        .await?;
    Ok(Json(serde_json::to_value(result).map_err(Error::Json)?))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Memory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct MemoryQuery {
    pub id: Option<String>,
    pub collection: Option<String>,
    pub limit: Option<u32>,
    pub cursor: Option<String>,
    /// Store as a public (plaintext, DEK-less) record.
    #[serde(default)]
    pub public: bool,
}

/// `GET /agents/:name/memory?id=` or `?collection=&limit=`: public read.
pub async fn memory_read(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<MemoryQuery>,
) -> ApiResult<Json<Value>> {
    let handle = resolve_agent(&state, &name)?;
    match query.id {
        Some(id) => {
            let entry = handle.get_memory(id).await?;
            Ok(Json(serde_json::to_value(entry).map_err(Error::Json)?))
        }
        None => {
            let listing = handle
                .list_memory(ListQuery {
                    collection: query.collection,
                    limit: query.limit,
                    cursor: query.cursor,
                })
                .await?;
            Ok(Json(serde_json::to_value(listing).map_err(Error::Json)?))
        }
    }
}

/// `POST /agents/:name/memory`: validate + store; `?public=true` keeps
/// the record plaintext-readable.
pub async fn memory_store(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<MemoryQuery>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let handle = resolve_agent(&state, &name)?;
    let record = validate_record(&require_json(body)?)?;
    let id = handle.store_memory(record, query.public).await?;
    Ok(Json(json!({ "id": id })))
}

/// `PUT /agents/:name/memory?id=`: re-encrypt and update.
pub async fn memory_update(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<MemoryQuery>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let handle = resolve_agent(&state, &name)?;
    let id = query
        .id
        .ok_or_else(|| ApiError(Error::invalid("id query parameter required")))?;
    let record = validate_record(&require_json(body)?)?;
    handle.update_memory(id.clone(), record).await?;
    Ok(Json(json!({ "id": id })))
}

/// `DELETE /agents/:name/memory?id=`: soft delete.
pub async fn memory_delete(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<MemoryQuery>,
) -> ApiResult<Json<Value>> {
    let handle = resolve_agent(&state, &name)?;
    let id = query
        .id
        .ok_or_else(|| ApiError(Error::invalid("id query parameter required")))?;
    handle.delete_memory(id.clone()).await?;
    Ok(Json(json!({ "id": id, "deleted": true })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sharing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShareBody {
    id: String,
    recipient_did: String,
    recipient_public_key: String,
}

/// `POST /agents/:name/share`: seal the record's DEK for a recipient.
pub async fn share(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let handle = resolve_agent(&state, &name)?;
    let body: ShareBody = serde_json::from_value(require_json(body)?)
        .map_err(|e| ApiError(Error::invalid(format!("share body: {e}"))))?;
    handle
        .share(body.id.clone(), body.recipient_did, body.recipient_public_key)
        .await?;
    Ok(Json(json!({ "id": body.id, "shared": true })))
}

#[derive(Debug, Deserialize)]
pub struct SharedQuery {
    pub id: Option<String>,
}

/// `GET /agents/:name/shared?id=` / `GET /agents/:name/shared`: records
/// shared *to* this agent.
pub async fn shared_read(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<SharedQuery>,
) -> ApiResult<Json<Value>> {
    let handle = resolve_agent(&state, &name)?;
    match query.id {
        Some(id) => {
            let entry = handle.get_shared(id).await?;
            Ok(Json(serde_json::to_value(entry).map_err(Error::Json)?))
        }
        None => {
            let entries = handle.list_shared().await?;
            Ok(Json(json!({ "entries": entries })))
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inbox
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `POST /agents/:name/inbox`: deliver a message addressed to this agent.
pub async fn inbox_post(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let handle = resolve_agent(&state, &name)?;
    let record = validate_record(&require_json(body)?)?;
    if lexicon::record_type(&record) != Some(lexicon::MESSAGE) {
        return Err(ApiError(Error::invalid_with(
            "Invalid record",
            vec![lexicon::Issue::new(
                "$type",
                format!("inbox accepts {} records", lexicon::MESSAGE),
            )],
        )));
    }
    let id = handle.inbox(record).await?;
    Ok(Json(json!({ "id": id })))
}

/// `GET /agents/:name/inbox`: public listing of received messages.
pub async fn inbox_list(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let handle = resolve_agent(&state, &name)?;
    let listing = handle.list_inbox().await?;
    Ok(Json(serde_json::to_value(listing).map_err(Error::Json)?))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `GET /agents/:name/config`: public.
pub async fn config_get(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let handle = resolve_agent(&state, &name)?;
    let config = handle.get_config().await?;
    Ok(Json(serde_json::to_value(config).map_err(Error::Json)?))
}

/// `PATCH /agents/:name/config`: deep merge; `loopIntervalMs` clamped.
pub async fn config_patch(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let handle = resolve_agent(&state, &name)?;
    let patch = require_json(body)?;
    let config = handle.patch_config(patch).await?;
    Ok(Json(serde_json::to_value(config).map_err(Error::Json)?))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Loop control
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn loop_start(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let handle = resolve_agent(&state, &name)?;
    let status = handle.loop_start().await?;
    Ok(Json(serde_json::to_value(status).map_err(Error::Json)?))
}

pub async fn loop_stop(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let handle = resolve_agent(&state, &name)?;
    let status = handle.loop_stop().await?;
    Ok(Json(serde_json::to_value(status).map_err(Error::Json)?))
}

pub async fn loop_status(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let handle = resolve_agent(&state, &name)?;
    let status = handle.loop_status().await?;
    Ok(Json(serde_json::to_value(status).map_err(Error::Json)?))
}
