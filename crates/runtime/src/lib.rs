//! The agent-runtime contract.
//!
//! The kernel treats the LLM agent as an opaque collaborator: an
//! [`AgentFactory`] produces a [`PiRuntime`] holding an internal message
//! list and exposing `prompt(input, options)`.  Two implementations ship:
//! a chat-completions HTTP runtime ([`http`]) and a deterministic scripted
//! runtime ([`scripted`]) for tests and offline operation.

pub mod http;
pub mod scripted;

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::Value;

use mesh_domain::tool::{ChatMessage, ToolDefinition};

/// Default bound on a single tool execution.
pub const TOOL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(thiserror::Error, Debug)]
pub enum RuntimeError {
    #[error("prompt timed out")]
    Timeout,

    #[error("model endpoint: {0}")]
    Http(String),

    #[error("model response malformed: {0}")]
    Malformed(String),

    #[error("tool {name}: {message}")]
    Tool { name: String, message: String },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Options for one prompt turn.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptOptions {
    /// Model override for this turn.
    #[serde(default)]
    pub model: Option<String>,
    /// Route to the agent's fast model.
    #[serde(default)]
    pub fast: bool,
    /// Extra system message prepended for this turn only.
    #[serde(default)]
    pub system: Option<String>,
}

/// Result of one prompt turn.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptResult {
    pub text: String,
    /// Number of tool calls executed during the turn.
    pub tool_calls: u32,
}

/// A tool as handed to the runtime: schema plus an execute closure that
/// captures actor-local handles (memory, broadcast).
#[derive(Clone)]
pub struct ToolHandle {
    pub definition: ToolDefinition,
    pub execute: Arc<
        dyn Fn(Value) -> BoxFuture<'static, std::result::Result<Value, String>> + Send + Sync,
    >,
}

impl ToolHandle {
    pub fn new(
        definition: ToolDefinition,
        execute: impl Fn(Value) -> BoxFuture<'static, std::result::Result<Value, String>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            definition,
            execute: Arc::new(execute),
        }
    }

    /// Run the tool with the standard execution bound.  A timeout is a tool
    /// error, not a runtime abort.
    pub async fn run(&self, arguments: Value) -> std::result::Result<Value, String> {
        match tokio::time::timeout(TOOL_TIMEOUT, (self.execute)(arguments)).await {
            Ok(result) => result,
            Err(_) => Err(format!(
                "tool timed out after {}s",
                TOOL_TIMEOUT.as_secs()
            )),
        }
    }
}

/// Everything a factory needs to build one agent's runtime.
pub struct RuntimeSeed {
    pub agent_name: String,
    pub agent_did: String,
    pub system_prompt: String,
    pub model: String,
    pub fast_model: String,
    pub tools: Vec<ToolHandle>,
    /// Prior session transcript, replayed into the internal message list.
    pub messages: Vec<ChatMessage>,
}

/// A live agent runtime: an internal message list plus `prompt`.
#[async_trait::async_trait]
pub trait PiRuntime: Send {
    async fn prompt(&mut self, input: &str, options: &PromptOptions) -> Result<PromptResult>;

    /// Snapshot of the internal message list (system messages excluded).
    fn messages(&self) -> Vec<ChatMessage>;
}

/// Produces a runtime per agent.  Supplied to the kernel at process start.
pub trait AgentFactory: Send + Sync {
    fn create(&self, seed: RuntimeSeed) -> Box<dyn PiRuntime>;
}
