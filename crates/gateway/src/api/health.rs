//! Health probe: enumerates required environment bindings.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

/// `GET /health`: 200 with an empty `missing` list when every required
/// binding is present, 500 listing the absentees otherwise.  No auth.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let missing = state.bindings.missing();
    if missing.is_empty() {
        (
            StatusCode::OK,
            Json(json!({ "status": "ok", "missing": [] })),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error", "missing": missing })),
        )
    }
}
