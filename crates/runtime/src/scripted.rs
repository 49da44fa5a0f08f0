//! Deterministic runtime for tests and offline operation.
//!
//! Turns are popped from a shared script: each entry either replies with
//! text, invokes one named tool first, or fails.  With an empty script the
//! runtime echoes, which keeps a gateway without model credentials usable.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use mesh_domain::tool::ChatMessage;

use crate::{
    AgentFactory, PiRuntime, PromptOptions, PromptResult, Result, RuntimeError, RuntimeSeed,
};

/// One scripted prompt turn.
#[derive(Clone)]
pub enum ScriptedTurn {
    /// Reply with this text.
    Reply(String),
    /// Invoke `tool` with `arguments`, then reply with `reply`.
    ToolThenReply {
        tool: String,
        arguments: Value,
        reply: String,
    },
    /// Fail the turn with this message.
    Fail(String),
}

/// Factory sharing one script across every runtime it creates.
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    script: Arc<Mutex<VecDeque<ScriptedTurn>>>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a turn.
    pub fn push(&self, turn: ScriptedTurn) {
        self.script.lock().push_back(turn);
    }

    /// Remaining queued turns.
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

impl AgentFactory for ScriptedFactory {
    fn create(&self, seed: RuntimeSeed) -> Box<dyn PiRuntime> {
        Box::new(ScriptedRuntime {
            script: self.script.clone(),
            seed,
        })
    }
}

pub struct ScriptedRuntime {
    script: Arc<Mutex<VecDeque<ScriptedTurn>>>,
    seed: RuntimeSeed,
}

#[async_trait::async_trait]
impl PiRuntime for ScriptedRuntime {
    async fn prompt(&mut self, input: &str, _options: &PromptOptions) -> Result<PromptResult> {
        self.seed.messages.push(ChatMessage::user(input));

        let turn = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| ScriptedTurn::Reply(format!("echo: {input}")));

        match turn {
            ScriptedTurn::Reply(text) => {
                self.seed.messages.push(ChatMessage::assistant(&text));
                Ok(PromptResult {
                    text,
                    tool_calls: 0,
                })
            }
            ScriptedTurn::ToolThenReply {
                tool,
                arguments,
                reply,
            } => {
                let handle = self
                    .seed
                    .tools
                    .iter()
                    .find(|t| t.definition.name == tool)
                    .ok_or_else(|| RuntimeError::Tool {
                        name: tool.clone(),
                        message: "not available to this agent".into(),
                    })?
                    .clone();
                let result = handle.run(arguments).await.map_err(|message| {
                    RuntimeError::Tool {
                        name: tool.clone(),
                        message,
                    }
                })?;

                let mut assistant = ChatMessage::assistant(&reply);
                assistant.tool_calls = vec![mesh_domain::tool::ToolCall {
                    call_id: uuid::Uuid::new_v4().to_string(),
                    tool_name: tool,
                    arguments: result,
                }];
                self.seed.messages.push(assistant);
                Ok(PromptResult {
                    text: reply,
                    tool_calls: 1,
                })
            }
            ScriptedTurn::Fail(message) => Err(RuntimeError::Other(message)),
        }
    }

    fn messages(&self) -> Vec<ChatMessage> {
        self.seed.messages.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_domain::tool::ToolDefinition;
    use crate::ToolHandle;

    fn seed(tools: Vec<ToolHandle>) -> RuntimeSeed {
        RuntimeSeed {
            agent_name: "alice".into(),
            agent_did: "did:mesh:aa".into(),
            system_prompt: "you are alice".into(),
            model: "m".into(),
            fast_model: "f".into(),
            tools,
            messages: Vec::new(),
        }
    }

    #[tokio::test]
    async fn empty_script_echoes() {
        let factory = ScriptedFactory::new();
        let mut runtime = factory.create(seed(Vec::new()));
        let result = runtime
            .prompt("hello", &PromptOptions::default())
            .await
            .unwrap();
        assert_eq!(result.text, "echo: hello");
        assert_eq!(runtime.messages().len(), 2);
    }

    #[tokio::test]
    async fn scripted_tool_turn_executes_tool() {
        let factory = ScriptedFactory::new();
        factory.push(ScriptedTurn::ToolThenReply {
            tool: "ping".into(),
            arguments: serde_json::json!({ "n": 1 }),
            reply: "pinged".into(),
        });

        let tool = ToolHandle::new(
            ToolDefinition {
                name: "ping".into(),
                description: "test tool".into(),
                parameters: serde_json::json!({ "type": "object" }),
            },
            |args| Box::pin(async move { Ok(serde_json::json!({ "echo": args["n"] })) }),
        );

        let mut runtime = factory.create(seed(vec![tool]));
        let result = runtime
            .prompt("go", &PromptOptions::default())
            .await
            .unwrap();
        assert_eq!(result.tool_calls, 1);
        assert_eq!(result.text, "pinged");
    }

    #[tokio::test]
    async fn scripted_failure_surfaces() {
        let factory = ScriptedFactory::new();
        factory.push(ScriptedTurn::Fail("boom".into()));
        let mut runtime = factory.create(seed(Vec::new()));
        assert!(runtime
            .prompt("go", &PromptOptions::default())
            .await
            .is_err());
    }
}
