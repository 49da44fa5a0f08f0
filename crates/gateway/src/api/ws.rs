//! Per-agent websocket endpoint.
//!
//! Flow:
//! 1. Client connects to `/agents/:name/ws` with the admin token in the
//!    `Authorization` header or a `?token=` query parameter (browser
//!    websocket clients cannot set headers).
//! 2. Text frames `{type:"prompt", id, prompt, options?}` run one turn on
//!    the actor and answer `{type:"prompt.result"|"prompt.error", id, …}`.
//! 3. The server pushes this agent's structured events unsolicited.
//!
//! Send failures drop the session silently.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};

use mesh_runtime::PromptOptions;

use crate::actor::ActorHandle;
use crate::state::AppState;

use super::auth;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// `GET /agents/:name/ws`: upgrade to a long-lived admin session.
pub async fn agent_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<WsQuery>,
    req_headers: axum::http::HeaderMap,
) -> impl IntoResponse {
    let provided = req_headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(String::from)
        .or(query.token)
        .unwrap_or_default();
    if !auth::token_matches(&state, &provided) {
        return (
            StatusCode::UNAUTHORIZED,
            axum::Json(json!({ "error": "Unauthorized" })),
        )
            .into_response();
    }

    let Some(handle) = state.host.get(&name) else {
        return (
            StatusCode::NOT_FOUND,
            axum::Json(json!({ "error": "Not found" })),
        )
            .into_response();
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, handle))
        .into_response()
}

async fn handle_socket(socket: WebSocket, state: AppState, handle: ActorHandle) {
    let (mut sink, mut stream) = socket.split();
    let mut events = state.host.subscribe();
    let agent_did = handle.did.clone();

    tracing::info!(agent = %handle.name, "websocket session opened");

    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_frame(&handle, &text).await;
                        if send_json(&mut sink, &reply).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(agent = %handle.name, "websocket closed");
                        return;
                    }
                    Some(Ok(_)) => {} // binary / ping / pong ignored
                    Some(Err(e)) => {
                        tracing::debug!(agent = %handle.name, error = %e, "websocket read error");
                        return;
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) if event.agent_did == agent_did => {
                        let payload = match serde_json::to_value(&event) {
                            Ok(v) => v,
                            Err(_) => continue,
                        };
                        if send_json(&mut sink, &payload).await.is_err() {
                            return;
                        }
                    }
                    Ok(_) => {} // other agents' events
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(agent = %handle.name, skipped, "websocket event stream lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ClientFrame {
    #[serde(rename = "prompt")]
    Prompt {
        id: String,
        prompt: String,
        #[serde(default)]
        options: Option<PromptOptions>,
    },
}

async fn handle_frame(handle: &ActorHandle, text: &str) -> Value {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            return json!({
                "type": "prompt.error",
                "id": Value::Null,
                "error": format!("invalid frame: {e}"),
            });
        }
    };

    match frame {
        ClientFrame::Prompt {
            id,
            prompt,
            options,
        } => match handle.prompt(prompt, options.unwrap_or_default()).await {
            Ok(result) => json!({
                "type": "prompt.result",
                "id": id,
                "result": result,
            }),
            Err(e) => json!({
                "type": "prompt.error",
                "id": id,
                "error": e.to_string(),
            }),
        },
    }
}

async fn send_json(
    sink: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    value: &Value,
) -> Result<(), ()> {
    let text = value.to_string();
    sink.send(Message::Text(text)).await.map_err(|_| ())
}
