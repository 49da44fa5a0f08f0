//! Command handlers: every durable mutation of one agent lives here and
//! runs on the actor's single-writer loop.

use std::time::Duration;

use serde_json::Value;

use mesh_domain::config::AgentConfig;
use mesh_domain::event::{AgentEvent, EventOutcome, LOOP_STARTED};
use mesh_domain::session::SessionMessage;
use mesh_domain::tool::{ChatMessage, Role};
use mesh_domain::{lexicon, Error, Result};
use mesh_memory::{MemoryError, RecordEntry, RecordListing};
use mesh_runtime::{PromptOptions, PromptResult, RuntimeSeed};
use mesh_store::state::{STATE_CONFIG, STATE_LOOP, STATE_SESSION};
use mesh_store::ListQuery;

use super::{Actor, LoopStatus};
use crate::tools;

/// Deadline for one prompt turn, HTTP or loop.
pub(crate) const PROMPT_TIMEOUT: Duration = Duration::from_secs(120);

/// Map memory failures onto the shared taxonomy.
fn memory_err(err: MemoryError) -> Error {
    match err {
        MemoryError::NotFound(what) => Error::NotFound(what),
        MemoryError::DecryptFailed => Error::DecryptFailed,
        MemoryError::InvalidRecord(message) => Error::invalid(message),
        MemoryError::Store(mesh_store::StoreError::Conflict(what)) => Error::Conflict(what),
        MemoryError::Store(mesh_store::StoreError::InvalidCursor(cursor)) => {
            Error::invalid(format!("invalid cursor {cursor:?}"))
        }
        MemoryError::Store(other) => Error::Other(other.to_string()),
        MemoryError::Json(e) => Error::Json(e),
    }
}

impl Actor {
    // ── Persistence (write-through, before the reply) ─────────────

    pub(crate) fn persist_config(&self) -> Result<()> {
        self.deps
            .store
            .state_put(&self.did, STATE_CONFIG, &self.config)
            .map_err(|e| Error::Other(e.to_string()))
    }

    pub(crate) fn persist_session(&self) -> Result<()> {
        self.deps
            .store
            .state_put(&self.did, STATE_SESSION, &self.session)
            .map_err(|e| Error::Other(e.to_string()))
    }

    pub(crate) fn persist_loop(&self) -> Result<()> {
        self.deps
            .store
            .state_put(&self.did, STATE_LOOP, &self.loop_state)
            .map_err(|e| Error::Other(e.to_string()))
    }

    // ── Memory ─────────────────────────────────────────────────────

    pub(crate) fn handle_store_memory(&self, record: &Value, public: bool) -> Result<String> {
        let collection = record_collection(record)?;
        self.deps
            .memory
            .store(&self.owner, &collection, record, public)
            .map_err(memory_err)
    }

    pub(crate) fn handle_get_memory(&self, id: &str) -> Result<RecordEntry> {
        let record = self.deps.memory.load(&self.owner, id).map_err(memory_err)?;
        Ok(RecordEntry {
            id: id.to_string(),
            record,
        })
    }

    pub(crate) fn handle_list_memory(&self, query: &ListQuery) -> Result<RecordListing> {
        self.deps
            .memory
            .list(&self.owner, query)
            .map_err(memory_err)
    }

    pub(crate) fn handle_update_memory(&self, id: &str, record: &Value) -> Result<()> {
        self.deps
            .memory
            .update(&self.owner, id, record)
            .map_err(memory_err)
    }

    pub(crate) fn handle_delete_memory(&self, id: &str) -> Result<()> {
        self.deps
            .memory
            .delete(&self.owner, id)
            .map_err(memory_err)
    }

    // ── Sharing ────────────────────────────────────────────────────

    pub(crate) fn handle_share(
        &self,
        id: &str,
        recipient_did: &str,
        recipient_public_key: &str,
    ) -> Result<()> {
        let recipient_pub = mesh_crypto::keys::encryption_public_from_multibase(
            recipient_public_key,
        )
        .map_err(|e| Error::invalid(format!("recipientPublicKey: {e}")))?;
        self.deps
            .memory
            .share(&self.owner, id, recipient_did, &recipient_pub)
            .map_err(memory_err)
    }

    pub(crate) fn handle_get_shared(&self, id: &str) -> Result<RecordEntry> {
        let record = self
            .deps
            .memory
            .load_shared(&self.owner, id)
            .map_err(memory_err)?;
        Ok(RecordEntry {
            id: id.to_string(),
            record,
        })
    }

    pub(crate) fn handle_list_shared(&self) -> Result<Vec<RecordEntry>> {
        self.deps.memory.list_shared(&self.owner).map_err(memory_err)
    }

    // ── Inbox ──────────────────────────────────────────────────────

    /// Accept a message addressed to this agent.  A mismatched recipient
    /// is rejected before anything touches the store.
    pub(crate) fn handle_inbox(&self, record: &Value) -> Result<String> {
        let recipient = record
            .get("recipient")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid("recipient required"))?;
        if recipient != self.did {
            return Err(Error::Forbidden("Recipient mismatch".into()));
        }
        self.deps
            .memory
            .store(&self.owner, lexicon::MESSAGE, record, false)
            .map_err(memory_err)
    }

    pub(crate) fn handle_list_inbox(&self) -> Result<RecordListing> {
        let query = ListQuery {
            collection: Some(lexicon::MESSAGE.to_string()),
            ..Default::default()
        };
        self.deps
            .memory
            .list(&self.owner, &query)
            .map_err(memory_err)
    }

    // ── Config ─────────────────────────────────────────────────────

    pub(crate) fn handle_patch_config(&mut self, patch: &Value) -> Result<AgentConfig> {
        let next = self
            .config
            .merge_patch(patch)
            .map_err(|issues| Error::invalid_with("Invalid config", issues))?;
        self.config = next;
        self.persist_config()?;
        Ok(self.config.clone())
    }

    // ── Loop control ───────────────────────────────────────────────

    pub(crate) fn handle_loop_start(&mut self) -> Result<LoopStatus> {
        if !self.loop_state.loop_running {
            self.loop_state.loop_running = true;
            let next = mesh_store::now_ms() + self.config.loop_interval_ms as i64;
            self.loop_state.next_alarm_at = Some(next);
            self.deps.alarms.arm(&self.name, next);
            self.persist_loop()?;

            let event = AgentEvent::new(
                &self.did,
                self.session_id(),
                LOOP_STARTED,
                EventOutcome::Success,
                serde_json::json!({ "intervalMs": self.config.loop_interval_ms }),
            );
            event.emit();
            let _ = self.deps.events.send(event);
        }
        Ok(self.loop_status())
    }

    pub(crate) fn handle_loop_stop(&mut self) -> Result<LoopStatus> {
        if self.loop_state.loop_running {
            self.loop_state.loop_running = false;
            self.loop_state.next_alarm_at = None;
            self.deps.alarms.disarm(&self.name);
            self.persist_loop()?;
        }
        Ok(self.loop_status())
    }

    // ── Prompt ─────────────────────────────────────────────────────

    pub(crate) async fn handle_prompt(
        &mut self,
        prompt: &str,
        options: &PromptOptions,
    ) -> Result<PromptResult> {
        self.run_prompt(prompt, options).await
    }

    /// One full prompt turn: build the runtime from the session, prompt
    /// with a deadline, fold the transcript back, apply tool-side config
    /// patches, then trim + archive in the same turn.
    pub(crate) async fn run_prompt(
        &mut self,
        input: &str,
        options: &PromptOptions,
    ) -> Result<PromptResult> {
        let tool_ctx = tools::ToolContext::new(
            self.name.clone(),
            self.owner.clone(),
            self.deps.memory.clone(),
            self.deps.events.clone(),
        );
        let handles = tools::build_tools(&self.config.enabled_tools, &tool_ctx);

        let seed = RuntimeSeed {
            agent_name: self.name.clone(),
            agent_did: self.did.clone(),
            system_prompt: self.system_prompt(),
            model: self.config.model.clone(),
            fast_model: self.config.fast_model.clone(),
            tools: handles,
            messages: self.session.messages.iter().map(session_to_chat).collect(),
        };
        let prior_len = seed.messages.len();
        let mut runtime = self.deps.factory.create(seed);

        let result = tokio::time::timeout(PROMPT_TIMEOUT, runtime.prompt(input, options))
            .await
            .map_err(|_| Error::Other("prompt deadline exceeded".into()))?
            .map_err(|e| Error::Other(e.to_string()))?;

        // Fold only the appended suffix back into the session so existing
        // entries keep their original timestamps.
        for message in runtime.messages().iter().skip(prior_len) {
            self.session.messages.push(chat_to_session(message));
        }

        // Tool-side config writes are applied after the turn, on the
        // actor's own thread of execution.
        for patch in tool_ctx.drain_config_patches() {
            match self.config.merge_patch(&patch) {
                Ok(next) => self.config = next,
                Err(issues) => tracing::warn!(
                    agent = %self.name,
                    ?issues,
                    "dropping invalid tool-side config patch"
                ),
            }
        }
        self.persist_config()?;

        mesh_memory::archive::archive_overflow(&self.deps.memory, &self.owner, &mut self.session)
            .map_err(memory_err)?;
        self.persist_session()?;

        Ok(result)
    }

    pub(crate) fn system_prompt(&self) -> String {
        let mut parts = vec![format!(
            "You are {name}, an autonomous agent on the mesh. Your DID is {did}.",
            name = self.config.name,
            did = self.did
        )];
        if !self.config.personality.is_empty() {
            parts.push(format!("Personality: {}", self.config.personality));
        }
        if !self.config.specialty.is_empty() {
            parts.push(format!("Specialty: {}", self.config.specialty));
        }
        let active_goals: Vec<String> = self
            .config
            .goals
            .iter()
            .filter(|g| {
                matches!(
                    g.status,
                    mesh_domain::config::GoalStatus::Active
                        | mesh_domain::config::GoalStatus::InProgress
                        | mesh_domain::config::GoalStatus::Pending
                )
            })
            .map(|g| format!("- [{:?}] {}", g.status, g.description))
            .collect();
        if !active_goals.is_empty() {
            parts.push(format!("Current goals:\n{}", active_goals.join("\n")));
        }
        parts.join("\n\n")
    }

    pub(crate) fn session_id(&self) -> String {
        format!("{}#session", self.did)
    }
}

fn record_collection(record: &Value) -> Result<String> {
    match lexicon::record_type(record) {
        Some(ty) => Ok(ty.to_string()),
        None => Err(Error::invalid_with(
            "Invalid record",
            vec![lexicon::Issue::new("$type", "required")],
        )),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session ↔ runtime transcript conversion
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) fn session_to_chat(message: &SessionMessage) -> ChatMessage {
    let role = match message.role.as_str() {
        "system" => Role::System,
        "assistant" => Role::Assistant,
        "tool" => Role::Tool,
        _ => Role::User,
    };
    let content = match &message.content {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    ChatMessage {
        role,
        content,
        tool_calls: Vec::new(),
        tool_call_id: None,
    }
}

pub(crate) fn chat_to_session(message: &ChatMessage) -> SessionMessage {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };
    let mut out = SessionMessage::new(role, Value::String(message.content.clone()));
    if !message.tool_calls.is_empty() {
        if let Ok(calls) = serde_json::to_value(&message.tool_calls) {
            out.extra.insert("toolCalls".into(), calls);
        }
    }
    out
}
