//! The base tool set exposed to agent runtimes, keyed on the config's
//! `enabledTools`.
//!
//! Each tool's execute closure captures actor-local handles.  Record
//! writes go straight to the agent's memory (still on the actor's logical
//! thread; the actor is suspended in `prompt()` while tools run); config
//! writes are staged and applied by the actor after the turn.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use mesh_domain::config::{
    Profile, PROFILE_FOCUS_MAX, PROFILE_MOOD_MAX, PROFILE_STATUS_MAX,
};
use mesh_domain::event::{AgentEvent, EventOutcome};
use mesh_domain::lexicon;
use mesh_domain::tool::ToolDefinition;
use mesh_memory::{Memory, OwnerKeys};
use mesh_runtime::ToolHandle;
use mesh_store::ListQuery;

/// The operator agent allowed to drive the environment extension.
pub const RESERVED_OPERATOR: &str = "grimlock";

/// Actor-local handles captured by tool closures.  Cheap to clone.
#[derive(Clone)]
pub struct ToolContext {
    pub agent_name: String,
    pub owner: OwnerKeys,
    pub memory: Memory,
    pub events: broadcast::Sender<AgentEvent>,
    /// Config patches staged by tools, applied by the actor post-turn.
    pending_config: Arc<Mutex<Vec<Value>>>,
}

impl ToolContext {
    pub fn new(
        agent_name: String,
        owner: OwnerKeys,
        memory: Memory,
        events: broadcast::Sender<AgentEvent>,
    ) -> Self {
        Self {
            agent_name,
            owner,
            memory,
            events,
            pending_config: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn drain_config_patches(&self) -> Vec<Value> {
        std::mem::take(&mut *self.pending_config.lock())
    }
}

/// Build the tool handles for one prompt turn.
pub fn build_tools(
    enabled: &std::collections::BTreeSet<String>,
    ctx: &ToolContext,
) -> Vec<ToolHandle> {
    let mut handles = Vec::new();

    if enabled.contains("remember") {
        handles.push(remember_tool(ctx.clone()));
    }
    if enabled.contains("recall") {
        handles.push(recall_tool(ctx.clone()));
    }
    if enabled.contains("update_profile") {
        handles.push(update_profile_tool(ctx.clone()));
    }
    // Double gate: the allowlist AND the reserved operator name.
    if enabled.contains("gm") && ctx.agent_name == RESERVED_OPERATOR {
        handles.push(gm_tool(ctx.clone()));
    }

    handles
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// remember
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn remember_tool(ctx: ToolContext) -> ToolHandle {
    ToolHandle::new(
        ToolDefinition {
            name: "remember".into(),
            description: "Store a record in your private encrypted memory. \
                          The record must carry a $type (e.g. agent.memory.note)."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "record": {
                        "type": "object",
                        "description": "The record body, including $type"
                    }
                },
                "required": ["record"]
            }),
        },
        move |args| {
            let ctx = ctx.clone();
            Box::pin(async move {
                let record = args
                    .get("record")
                    .cloned()
                    .ok_or_else(|| "missing required argument: record".to_string())?;
                let validated = lexicon::validate(&record).map_err(|issues| {
                    let rendered: Vec<String> =
                        issues.iter().map(ToString::to_string).collect();
                    format!("invalid record: {}", rendered.join("; "))
                })?;
                let collection = lexicon::record_type(&validated)
                    .ok_or_else(|| "record must carry $type".to_string())?
                    .to_string();
                let id = ctx
                    .memory
                    .store(&ctx.owner, &collection, &validated, false)
                    .map_err(|e| e.to_string())?;
                Ok(json!({ "id": id }))
            })
        },
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// recall
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn recall_tool(ctx: ToolContext) -> ToolHandle {
    ToolHandle::new(
        ToolDefinition {
            name: "recall".into(),
            description: "Search recent memory records. Exact/substring match \
                          over summaries, text, and content, not semantic."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Substring to match" },
                    "limit": { "type": "integer", "description": "Max results (default 10)" }
                },
                "required": ["query"]
            }),
        },
        move |args| {
            let ctx = ctx.clone();
            Box::pin(async move {
                let query = args
                    .get("query")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_lowercase();
                let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(10) as usize;

                let listing = ctx
                    .memory
                    .list(
                        &ctx.owner,
                        &ListQuery {
                            limit: Some(100),
                            ..Default::default()
                        },
                    )
                    .map_err(|e| e.to_string())?;

                let matches: Vec<Value> = listing
                    .entries
                    .into_iter()
                    .filter(|entry| record_matches(&entry.record, &query))
                    .take(limit)
                    .map(|entry| json!({ "id": entry.id, "record": entry.record }))
                    .collect();
                let count = matches.len();
                Ok(json!({ "entries": matches, "count": count }))
            })
        },
    )
}

/// Substring match over the fields the kernel exposes for search.
fn record_matches(record: &Value, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    for field in ["summary", "text", "decision", "context", "rationale"] {
        if let Some(s) = record.get(field).and_then(Value::as_str) {
            if s.to_lowercase().contains(query) {
                return true;
            }
        }
    }
    if let Some(content) = record.get("content") {
        if content.to_string().to_lowercase().contains(query) {
            return true;
        }
    }
    false
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// update_profile
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn update_profile_tool(ctx: ToolContext) -> ToolHandle {
    ToolHandle::new(
        ToolDefinition {
            name: "update_profile".into(),
            description: format!(
                "Update your presence profile. Fields are truncated to \
                 status {PROFILE_STATUS_MAX}, currentFocus {PROFILE_FOCUS_MAX}, \
                 mood {PROFILE_MOOD_MAX} characters."
            ),
            parameters: json!({
                "type": "object",
                "properties": {
                    "status": { "type": "string" },
                    "currentFocus": { "type": "string" },
                    "mood": { "type": "string" }
                }
            }),
        },
        move |args| {
            let ctx = ctx.clone();
            Box::pin(async move {
                let mut profile: Profile =
                    serde_json::from_value(args.clone()).map_err(|e| e.to_string())?;
                profile.truncate();
                profile.updated_at = Some(chrono::Utc::now());

                let patch = json!({
                    "profile": serde_json::to_value(&profile).map_err(|e| e.to_string())?
                });
                ctx.pending_config.lock().push(patch);
                Ok(json!({ "ok": true, "profile": profile }))
            })
        },
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// gm (environment operator)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn gm_tool(ctx: ToolContext) -> ToolHandle {
    ToolHandle::new(
        ToolDefinition {
            name: "gm".into(),
            description: "Broadcast a game-master action to the environment \
                          extension. Operator only."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "action": { "type": "string", "description": "Environment action" },
                    "payload": { "type": "object", "description": "Action payload" }
                },
                "required": ["action"]
            }),
        },
        move |args| {
            let ctx = ctx.clone();
            Box::pin(async move {
                let action = args
                    .get("action")
                    .and_then(Value::as_str)
                    .ok_or_else(|| "missing required argument: action".to_string())?
                    .to_string();

                let event = AgentEvent::new(
                    &ctx.owner.did,
                    format!("{}#gm", ctx.owner.did),
                    format!("gm.{action}"),
                    EventOutcome::Success,
                    args.get("payload").cloned().unwrap_or(json!({})),
                );
                event.emit();
                let delivered = ctx.events.send(event).unwrap_or(0);
                Ok(json!({ "ok": true, "action": action, "subscribers": delivered }))
            })
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_crypto::keys::EncryptionKeyPair;
    use mesh_store::Store;
    use std::collections::BTreeSet;

    fn ctx(name: &str) -> ToolContext {
        let (events, _) = broadcast::channel(8);
        ToolContext::new(
            name.into(),
            OwnerKeys {
                did: mesh_crypto::did::did_from_name(name),
                encryption: EncryptionKeyPair::generate(),
            },
            Memory::new(Store::open_in_memory().unwrap()),
            events,
        )
    }

    fn enabled(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn tools_follow_the_allowlist() {
        let ctx = ctx("alice");
        let handles = build_tools(&enabled(&["remember", "recall"]), &ctx);
        let names: Vec<_> = handles.iter().map(|h| h.definition.name.clone()).collect();
        assert_eq!(names, vec!["remember", "recall"]);
    }

    #[test]
    fn gm_requires_both_gates() {
        // Allowlisted but wrong agent: no gm.
        let alice = ctx("alice");
        let handles = build_tools(&enabled(&["gm"]), &alice);
        assert!(handles.is_empty());

        // Right agent but not allowlisted: no gm.
        let op = ctx(RESERVED_OPERATOR);
        assert!(build_tools(&enabled(&[]), &op).is_empty());

        // Both gates open.
        let handles = build_tools(&enabled(&["gm"]), &op);
        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].definition.name, "gm");
    }

    #[tokio::test]
    async fn remember_validates_and_stores() {
        let ctx = ctx("alice");
        let handles = build_tools(&enabled(&["remember"]), &ctx);
        let remember = &handles[0];

        let result = remember
            .run(json!({ "record": {
                "$type": "agent.memory.note",
                "summary": "remembered",
                "createdAt": "2026-02-07T00:00:00Z",
            }}))
            .await
            .unwrap();
        let id = result["id"].as_str().unwrap();
        assert!(id.starts_with(&ctx.owner.did));

        // Invalid records are refused with the issue text.
        let err = remember
            .run(json!({ "record": { "$type": "agent.memory.note" } }))
            .await
            .unwrap_err();
        assert!(err.contains("summary"));
    }

    #[tokio::test]
    async fn recall_filters_by_substring() {
        let ctx = ctx("alice");
        for (summary, text) in [("alpha report", "x"), ("beta report", "alpha inside")] {
            ctx.memory
                .store(
                    &ctx.owner,
                    "agent.memory.note",
                    &json!({ "$type": "agent.memory.note", "summary": summary, "text": text }),
                    false,
                )
                .unwrap();
        }
        let handles = build_tools(&enabled(&["recall"]), &ctx);
        let result = handles[0]
            .run(json!({ "query": "alpha" }))
            .await
            .unwrap();
        assert_eq!(result["count"], 2);

        let result = handles[0]
            .run(json!({ "query": "beta" }))
            .await
            .unwrap();
        assert_eq!(result["count"], 1);
    }

    #[tokio::test]
    async fn update_profile_truncates_and_stages_patch() {
        let ctx = ctx("alice");
        let handles = build_tools(&enabled(&["update_profile"]), &ctx);
        let result = handles[0]
            .run(json!({ "mood": "y".repeat(200), "status": "ok" }))
            .await
            .unwrap();
        assert_eq!(
            result["profile"]["mood"].as_str().unwrap().chars().count(),
            PROFILE_MOOD_MAX
        );

        let patches = ctx.drain_config_patches();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0]["profile"]["status"], "ok");
        assert!(ctx.drain_config_patches().is_empty());
    }
}
