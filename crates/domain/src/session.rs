//! Session state: the agent's rolling message window.
//!
//! After any prompt turn a session retains at most [`MAX_SESSION_MESSAGES`]
//! messages; the overflow prefix is split off for archival.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Hard cap on retained session messages.
pub const MAX_SESSION_MESSAGES: usize = 50;

/// Durable session blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub version: u32,
    #[serde(default)]
    pub messages: Vec<SessionMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_points: Option<Vec<Value>>,
}

/// One message in the session transcript.  Extra fields (tool calls, usage
/// metadata, …) ride along untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: String,
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl SessionMessage {
    pub fn new(role: impl Into<String>, content: Value) -> Self {
        Self {
            role: role.into(),
            content,
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
            extra: serde_json::Map::new(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self {
            version: 1,
            messages: Vec::new(),
            branch_points: None,
        }
    }
}

impl Session {
    /// Trim to the message cap, returning the removed oldest prefix.
    ///
    /// Returns an empty vec when the session is within bounds.  Append
    /// order of the retained suffix is preserved.
    pub fn split_overflow(&mut self) -> Vec<SessionMessage> {
        if self.messages.len() <= MAX_SESSION_MESSAGES {
            return Vec::new();
        }
        let overflow_len = self.messages.len() - MAX_SESSION_MESSAGES;
        self.messages.drain(..overflow_len).collect()
    }
}
