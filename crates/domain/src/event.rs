//! Structured agent events pushed to websocket subscribers and mirrored to
//! the tracing log.  The field layout follows the OpenTelemetry log-record
//! shape without depending on the SDK.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Loop lifecycle event types.
pub const LOOP_STARTED: &str = "loop.started";
pub const LOOP_SLEEP: &str = "loop.sleep";
pub const LOOP_ERROR: &str = "loop.error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOutcome {
    Success,
    Error,
    Timeout,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventError {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

/// One event as delivered over the websocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub id: String,
    pub agent_did: String,
    pub session_id: String,
    pub event_type: String,
    pub outcome: EventOutcome,
    /// RFC 3339.
    pub timestamp: String,
    pub span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    pub context: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EventError>,
}

impl AgentEvent {
    pub fn new(
        agent_did: impl Into<String>,
        session_id: impl Into<String>,
        event_type: impl Into<String>,
        outcome: EventOutcome,
        context: Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_did: agent_did.into(),
            session_id: session_id.into(),
            event_type: event_type.into(),
            outcome,
            timestamp: chrono::Utc::now().to_rfc3339(),
            span_id: short_id(),
            parent_span_id: None,
            trace_id: None,
            context,
            error: None,
        }
    }

    pub fn with_error(
        mut self,
        code: impl Into<String>,
        message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        self.outcome = EventOutcome::Error;
        self.error = Some(EventError {
            code: code.into(),
            message: message.into(),
            retryable,
        });
        self
    }

    /// Mirror the event into the structured log.
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(agent_event = %json, "mesh_event");
    }
}

/// 16-hex-char span id.
fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..16].to_string()
}
