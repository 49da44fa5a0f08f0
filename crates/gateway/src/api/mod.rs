//! API surface: router assembly, CORS, and the JSON error envelope.
//!
//! The gateway pipeline runs in order: CORS preflight → health → bearer
//! auth (every mutating verb plus admin-only reads) → agent existence →
//! body parse → lexicon validation → actor dispatch.  CORS headers ride
//! on every response, error responses included.

pub mod agent;
pub mod agents;
pub mod auth;
pub mod directory;
pub mod environments;
pub mod health;
pub mod ws;

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::json;

use mesh_domain::Error;

use crate::state::AppState;

/// Build the full application router with every layer attached.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/directory/:did", get(directory::lookup).put(directory::register))
        .route("/agents", post(agents::create_agent).get(agents::list_agents))
        .route("/agents/:name", delete(agents::delete_agent))
        .route("/agents/:name/identity", get(agent::identity))
        .route("/agents/:name/prompt", post(agent::prompt))
        .route(
            "/agents/:name/memory",
            get(agent::memory_read)
                .post(agent::memory_store)
                .put(agent::memory_update)
                .delete(agent::memory_delete),
        )
        .route("/agents/:name/share", post(agent::share))
        .route("/agents/:name/shared", get(agent::shared_read))
        .route(
            "/agents/:name/inbox",
            get(agent::inbox_list).post(agent::inbox_post),
        )
        .route(
            "/agents/:name/config",
            get(agent::config_get).patch(agent::config_patch),
        )
        .route("/agents/:name/loop/start", post(agent::loop_start))
        .route("/agents/:name/loop/stop", post(agent::loop_stop))
        .route("/agents/:name/loop/status", get(agent::loop_status))
        // Admin-authenticated inside the handler (browser websockets
        // cannot set Authorization headers).
        .route("/agents/:name/ws", get(ws::agent_ws))
        .route("/environments", get(environments::list))
        .route("/environments/:id", get(environments::get))
        // Layers run bottom-up on requests: CORS first (outermost), then
        // 500 logging, then auth.
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin_token,
        ))
        .layer(middleware::from_fn(log_internal_errors))
        .layer(middleware::from_fn_with_state(state.clone(), cors))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CORS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const ALLOW_METHODS: &str = "GET,POST,PUT,PATCH,DELETE,OPTIONS";
const ALLOW_HEADERS: &str = "Authorization,Content-Type";

/// Hand-rolled CORS so the allow-origin header lands on **every** response
/// (auth failures and 500s included) and preflights return 204 without
/// touching auth.
async fn cors(
    axum::extract::State(state): axum::extract::State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let origin = state.bindings.cors_origin.as_deref().unwrap_or("*");
    let origin_value =
        HeaderValue::from_str(origin).unwrap_or(HeaderValue::from_static("*"));

    if req.method() == Method::OPTIONS {
        return Response::builder()
            .status(StatusCode::NO_CONTENT)
            .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin_value)
            .header(header::ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS)
            .header(header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS)
            .body(Body::empty())
            .unwrap_or_else(|_| StatusCode::NO_CONTENT.into_response());
    }

    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin_value);
    response
}

/// Log 500s with their route so "Unhandled route error" carries context.
async fn log_internal_errors(req: Request<Body>, next: Next) -> Response {
    let route = req.uri().path().to_string();
    let response = next.run(req).await;
    if response.status() == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(route = %route, "Unhandled route error");
    }
    response
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error envelope
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// API-facing error wrapper mapping the shared taxonomy onto status codes
/// and the `{error, issues?}` envelope.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self.0 {
            Error::InvalidInput { message, issues } => {
                let mut body = json!({ "error": message });
                if !issues.is_empty() {
                    body["issues"] = json!(issues);
                }
                (StatusCode::BAD_REQUEST, body)
            }
            Error::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Unauthorized" }),
            ),
            Error::Forbidden(message) => {
                (StatusCode::FORBIDDEN, json!({ "error": message }))
            }
            Error::NotFound(what) => {
                tracing::debug!(what = %what, "not found");
                (StatusCode::NOT_FOUND, json!({ "error": "Not found" }))
            }
            Error::Conflict(what) => (StatusCode::CONFLICT, json!({ "error": what })),
            Error::DecryptFailed => {
                tracing::error!("decryption failure surfaced to a route");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                )
            }
            Error::Transient(message) => {
                tracing::warn!(error = %message, "transient upstream failure");
                (StatusCode::BAD_GATEWAY, json!({ "error": message }))
            }
            Error::Io(e) => {
                tracing::error!(error = %e, "io failure in route");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                )
            }
            Error::Json(e) => {
                tracing::error!(error = %e, "serialization failure in route");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                )
            }
            Error::Other(message) => {
                tracing::error!(error = %message, "unclassified route failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Resolve an agent name to its actor handle, or 404.
pub(crate) fn resolve_agent(
    state: &AppState,
    name: &str,
) -> ApiResult<crate::actor::ActorHandle> {
    state
        .host
        .get(name)
        .ok_or_else(|| ApiError(Error::NotFound(format!("agent {name:?}"))))
}

/// Decode a JSON body, mapping parse failures to `{"error":"Invalid JSON"}`.
pub(crate) fn require_json(
    body: Result<Json<serde_json::Value>, axum::extract::rejection::JsonRejection>,
) -> ApiResult<serde_json::Value> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(_) => Err(ApiError(Error::invalid("Invalid JSON"))),
    }
}

/// Run lexicon validation on a record body, mapping failures to
/// `{"error":"Invalid record", issues}` and returning the body with
/// defaults injected.
pub(crate) fn validate_record(value: &serde_json::Value) -> ApiResult<serde_json::Value> {
    mesh_domain::lexicon::validate(value)
        .map_err(|issues| ApiError(Error::invalid_with("Invalid record", issues)))
}
