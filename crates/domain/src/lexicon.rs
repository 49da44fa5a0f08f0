//! Lexicon validation: named record schemas keyed on `$type`.
//!
//! Validation is shallow by design: required fields and basic shapes are
//! checked, recognized defaults are injected, and everything else passes
//! through opaque.  Unknown `$type` values are accepted as-is.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Collection / `$type` names for the built-in lexicons.
pub const NOTE: &str = "agent.memory.note";
pub const DECISION: &str = "agent.memory.decision";
pub const MESSAGE: &str = "agent.comms.message";
pub const SESSION_ARCHIVE: &str = "agent.session.archive";

/// Default priority for `agent.comms.message` records.
pub const DEFAULT_MESSAGE_PRIORITY: i64 = 3;

/// A single validation failure, addressed by JSON-pointer-ish path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub path: String,
    pub message: String,
}

impl Issue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Extract the `$type` of a record body, if present.
pub fn record_type(record: &Value) -> Option<&str> {
    record.get("$type").and_then(Value::as_str)
}

/// Validate a record against the lexicon for its `$type` and inject
/// defaults.  Returns the (possibly amended) record or the issue list.
///
/// Records without `$type`, and records of unrecognized types, pass through
/// unchanged; the lexicon only constrains what it names.
pub fn validate(record: &Value) -> Result<Value, Vec<Issue>> {
    let Some(ty) = record_type(record) else {
        return Ok(record.clone());
    };

    let mut issues = Vec::new();
    let mut amended = record.clone();

    match ty {
        NOTE => {
            require_string(record, "summary", &mut issues);
            optional_string(record, "text", &mut issues);
            optional_string_array(record, "tags", &mut issues);
            require_string(record, "createdAt", &mut issues);
        }
        DECISION => {
            require_string(record, "decision", &mut issues);
            require_string(record, "status", &mut issues);
            optional_string(record, "context", &mut issues);
            optional_string(record, "rationale", &mut issues);
            require_string(record, "createdAt", &mut issues);
        }
        MESSAGE => {
            require_string(record, "sender", &mut issues);
            require_string(record, "recipient", &mut issues);
            match record.get("content") {
                Some(Value::Object(content)) => {
                    match content.get("kind").and_then(Value::as_str) {
                        Some("text") | Some("json") | Some("ref") => {}
                        Some(other) => issues.push(Issue::new(
                            "content/kind",
                            format!("unknown kind {other:?}, expected text|json|ref"),
                        )),
                        None => issues.push(Issue::new("content/kind", "required")),
                    }
                }
                Some(_) => issues.push(Issue::new("content", "must be an object")),
                None => issues.push(Issue::new("content", "required")),
            }
            require_string(record, "createdAt", &mut issues);
            match record.get("priority") {
                None => {
                    amended["priority"] = Value::from(DEFAULT_MESSAGE_PRIORITY);
                }
                Some(v) if !v.is_i64() && !v.is_u64() => {
                    issues.push(Issue::new("priority", "must be an integer"));
                }
                Some(_) => {}
            }
        }
        SESSION_ARCHIVE => {
            if !record.get("messages").is_some_and(Value::is_array) {
                issues.push(Issue::new("messages", "required array"));
            }
            require_string(record, "archivedAt", &mut issues);
        }
        // Unrecognized types are opaque.
        _ => {}
    }

    if issues.is_empty() {
        Ok(amended)
    } else {
        Err(issues)
    }
}

fn require_string(record: &Value, field: &str, issues: &mut Vec<Issue>) {
    match record.get(field) {
        Some(Value::String(s)) if !s.is_empty() => {}
        Some(Value::String(_)) => issues.push(Issue::new(field, "must not be empty")),
        Some(_) => issues.push(Issue::new(field, "must be a string")),
        None => issues.push(Issue::new(field, "required")),
    }
}

fn optional_string(record: &Value, field: &str, issues: &mut Vec<Issue>) {
    if let Some(v) = record.get(field) {
        if !v.is_string() {
            issues.push(Issue::new(field, "must be a string"));
        }
    }
}

fn optional_string_array(record: &Value, field: &str, issues: &mut Vec<Issue>) {
    if let Some(v) = record.get(field) {
        match v.as_array() {
            Some(items) if items.iter().all(Value::is_string) => {}
            _ => issues.push(Issue::new(field, "must be an array of strings")),
        }
    }
}
