//! Chat-completions runtime.
//!
//! Works against any endpoint following the OpenAI chat-completions
//! contract (OpenRouter, vLLM, Ollama, …).  Tool calls returned by the
//! model are executed through the seeded [`ToolHandle`]s and fed back,
//! up to a bounded number of rounds per prompt.

use std::time::Duration;

use serde_json::{json, Value};

use mesh_domain::tool::{ChatMessage, Role, ToolCall};

use crate::{
    AgentFactory, PiRuntime, PromptOptions, PromptResult, Result, RuntimeError, RuntimeSeed,
    ToolHandle,
};

/// Upper bound on model→tool→model rounds within one prompt.
const MAX_TOOL_ROUNDS: usize = 8;

/// HTTP request timeout per model call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Factory for [`HttpRuntime`]s sharing one client and credentials.
pub struct HttpAgentFactory {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpAgentFactory {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RuntimeError::Http(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }
}

impl AgentFactory for HttpAgentFactory {
    fn create(&self, seed: RuntimeSeed) -> Box<dyn PiRuntime> {
        Box::new(HttpRuntime {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            client: self.client.clone(),
            seed,
        })
    }
}

pub struct HttpRuntime {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    seed: RuntimeSeed,
}

impl HttpRuntime {
    fn effective_model(&self, options: &PromptOptions) -> String {
        if let Some(model) = &options.model {
            return model.clone();
        }
        if options.fast {
            self.seed.fast_model.clone()
        } else {
            self.seed.model.clone()
        }
    }

    fn build_body(&self, model: &str, options: &PromptOptions) -> Value {
        let mut messages = vec![json!({
            "role": "system",
            "content": self.seed.system_prompt,
        })];
        if let Some(system) = &options.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.extend(self.seed.messages.iter().map(message_to_wire));

        let mut body = json!({
            "model": model,
            "messages": messages,
        });
        if !self.seed.tools.is_empty() {
            let tools: Vec<Value> = self
                .seed
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.definition.name,
                            "description": t.definition.description,
                            "parameters": t.definition.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }
        body
    }

    async fn chat(&self, body: &Value) -> Result<Value> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RuntimeError::Timeout
                } else {
                    RuntimeError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| RuntimeError::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(RuntimeError::Http(format!(
                "status {status}: {}",
                payload["error"]["message"].as_str().unwrap_or("unknown")
            )));
        }
        Ok(payload)
    }

    fn find_tool(&self, name: &str) -> Option<&ToolHandle> {
        self.seed.tools.iter().find(|t| t.definition.name == name)
    }
}

#[async_trait::async_trait]
impl PiRuntime for HttpRuntime {
    async fn prompt(&mut self, input: &str, options: &PromptOptions) -> Result<PromptResult> {
        self.seed.messages.push(ChatMessage::user(input));
        let model = self.effective_model(options);
        let mut executed: u32 = 0;

        for round in 0..MAX_TOOL_ROUNDS {
            let body = self.build_body(&model, options);
            let payload = self.chat(&body).await?;
            let message = &payload["choices"][0]["message"];
            if message.is_null() {
                return Err(RuntimeError::Malformed("no choices in response".into()));
            }

            let text = message["content"].as_str().unwrap_or("").to_string();
            let tool_calls = parse_tool_calls(message);

            if tool_calls.is_empty() {
                self.seed.messages.push(ChatMessage::assistant(&text));
                return Ok(PromptResult {
                    text,
                    tool_calls: executed,
                });
            }

            // Record the assistant turn with its calls, then execute each.
            let mut assistant = ChatMessage::assistant(&text);
            assistant.tool_calls = tool_calls.clone();
            self.seed.messages.push(assistant);

            for call in tool_calls {
                let result = match self.find_tool(&call.tool_name) {
                    Some(tool) => tool.run(call.arguments.clone()).await,
                    None => Err(format!("unknown tool {:?}", call.tool_name)),
                };
                executed += 1;
                let content = match result {
                    Ok(value) => value.to_string(),
                    Err(message) => {
                        tracing::warn!(
                            tool = %call.tool_name,
                            error = %message,
                            round,
                            "tool execution failed"
                        );
                        json!({ "error": message }).to_string()
                    }
                };
                self.seed
                    .messages
                    .push(ChatMessage::tool_result(&call.call_id, content));
            }
        }

        Err(RuntimeError::Other(format!(
            "model did not converge within {MAX_TOOL_ROUNDS} tool rounds"
        )))
    }

    fn messages(&self) -> Vec<ChatMessage> {
        self.seed.messages.clone()
    }
}

fn message_to_wire(message: &ChatMessage) -> Value {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };
    let mut wire = json!({ "role": role, "content": message.content });
    if !message.tool_calls.is_empty() {
        wire["tool_calls"] = Value::Array(
            message
                .tool_calls
                .iter()
                .map(|c| {
                    json!({
                        "id": c.call_id,
                        "type": "function",
                        "function": {
                            "name": c.tool_name,
                            "arguments": c.arguments.to_string(),
                        }
                    })
                })
                .collect(),
        );
    }
    if let Some(call_id) = &message.tool_call_id {
        wire["tool_call_id"] = Value::String(call_id.clone());
    }
    wire
}

fn parse_tool_calls(message: &Value) -> Vec<ToolCall> {
    let Some(calls) = message["tool_calls"].as_array() else {
        return Vec::new();
    };
    calls
        .iter()
        .filter_map(|c| {
            let name = c["function"]["name"].as_str()?;
            let raw_args = c["function"]["arguments"].as_str().unwrap_or("{}");
            Some(ToolCall {
                call_id: c["id"]
                    .as_str()
                    .map(String::from)
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                tool_name: name.to_string(),
                arguments: serde_json::from_str(raw_args).unwrap_or(Value::Null),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tool_calls_with_string_arguments() {
        let message = json!({
            "tool_calls": [{
                "id": "call_1",
                "function": { "name": "remember", "arguments": "{\"record\":{}}" }
            }]
        });
        let calls = parse_tool_calls(&message);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool_name, "remember");
        assert_eq!(calls[0].arguments["record"], json!({}));
    }

    #[test]
    fn wire_round_includes_tool_result_linkage() {
        let msg = ChatMessage::tool_result("call_1", "{\"id\":\"x\"}");
        let wire = message_to_wire(&msg);
        assert_eq!(wire["role"], "tool");
        assert_eq!(wire["tool_call_id"], "call_1");
    }
}
