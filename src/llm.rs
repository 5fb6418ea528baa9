//! OpenAI-compatible chat completions client.
//!
//! Works against any endpoint implementing `POST {base_url}/chat/completions`
//! (OpenAI, OpenRouter, vLLM, llama.cpp server, Ollama's `/v1`). Tool
//! descriptors are advertised through function calling; assistant tool
//! calls and tool results are replayed with matching `tool_call_id`s.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rag_agent_core::error::ModelError;
use rag_agent_core::llm::{strip_code_fences, ChatModel, Completion};
use rag_agent_core::models::{Message, Role, ToolCallRequest};
use rag_agent_core::tools::ToolDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::config::LlmConfig;

#[derive(Clone)]
pub struct OpenAiChatModel {
    http_client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
}

/// Request body for the Chat Completions API
#[derive(Debug, Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ToolCall {
    #[serde(default)]
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: ToolCallFunction,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct ToolCallFunction {
    name: String,
    /// JSON-encoded arguments object.
    arguments: String,
}

#[derive(Debug, Serialize)]
struct OpenAiToolDefinition {
    r#type: String,
    function: OpenAiFunctionDefinition,
}

#[derive(Debug, Serialize)]
struct OpenAiFunctionDefinition {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: OpenAiMessage,
}

impl OpenAiChatModel {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            api_key,
            model: model.into(),
            base_url: base_url.into(),
            temperature: 0.0,
            max_tokens: 1024,
        })
    }

    /// Build a client from `[llm]`, reading the key from `api_key_env`.
    ///
    /// A missing key is allowed: local OpenAI-compatible servers often
    /// need none.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).ok();
        if api_key.is_none() {
            debug!(var = %config.api_key_env, "no API key in environment");
        }
        let mut client = Self::new(
            config.base_url.clone(),
            api_key,
            config.model.clone(),
            config.timeout(),
        )?;
        client.temperature = config.temperature;
        client.max_tokens = config.max_tokens;
        Ok(client)
    }

    fn chat_completions_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{}/chat/completions", base)
        } else {
            format!("{}/v1/chat/completions", base)
        }
    }

    fn convert_messages(messages: &[Message]) -> Vec<OpenAiMessage> {
        messages
            .iter()
            .map(|m| match (&m.role, &m.tool_call) {
                (Role::Assistant, Some(call)) => OpenAiMessage {
                    role: "assistant".to_string(),
                    content: None,
                    tool_calls: Some(vec![ToolCall {
                        id: call.id.clone(),
                        r#type: function_type(),
                        function: ToolCallFunction {
                            name: call.name.clone(),
                            arguments: call.arguments.to_string(),
                        },
                    }]),
                    tool_call_id: None,
                },
                (Role::Tool, _) => OpenAiMessage {
                    role: "tool".to_string(),
                    content: Some(m.content.clone()),
                    tool_calls: None,
                    tool_call_id: m.tool_call_id.clone(),
                },
                (role, _) => OpenAiMessage {
                    role: role.as_str().to_string(),
                    content: Some(m.content.clone()),
                    tool_calls: None,
                    tool_call_id: None,
                },
            })
            .collect()
    }

    fn convert_tools(tools: &[ToolDescriptor]) -> Vec<OpenAiToolDefinition> {
        tools
            .iter()
            .map(|tool| OpenAiToolDefinition {
                r#type: function_type(),
                function: OpenAiFunctionDefinition {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.parameters.clone(),
                },
            })
            .collect()
    }

    async fn send(&self, request: &ChatCompletionsRequest<'_>) -> Result<OpenAiMessage, ModelError> {
        let mut builder = self.http_client.post(self.chat_completions_url()).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ModelError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatCompletionsResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| ModelError::InvalidResponse("response has no choices".to_string()))
    }
}

/// The first tool call wins; otherwise the text content is the answer.
fn completion_from_message(message: OpenAiMessage) -> Result<Completion, ModelError> {
    if let Some(call) = message.tool_calls.and_then(|calls| calls.into_iter().next()) {
        let arguments = if call.function.arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            // Malformed arguments go to validation as a string and come
            // back to the model as an observation.
            serde_json::from_str(&call.function.arguments)
                .unwrap_or(Value::String(call.function.arguments.clone()))
        };
        let id = if call.id.is_empty() {
            format!("call_{}", Uuid::new_v4().simple())
        } else {
            call.id
        };
        return Ok(Completion::ToolCall(ToolCallRequest {
            id,
            name: call.function.name,
            arguments,
        }));
    }
    Ok(Completion::Text(message.content.unwrap_or_default()))
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<Completion, ModelError> {
        let request = ChatCompletionsRequest {
            model: &self.model,
            messages: Self::convert_messages(messages),
            tools: (!tools.is_empty()).then(|| Self::convert_tools(tools)),
            tool_choice: (!tools.is_empty()).then(|| serde_json::json!("auto")),
            response_format: None,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        debug!(model = %self.model, messages = messages.len(), tools = tools.len(), "chat completion");
        completion_from_message(self.send(&request).await?)
    }

    async fn complete_json(
        &self,
        messages: &[Message],
        name: &str,
        schema: &Value,
    ) -> Result<Value, ModelError> {
        let request = ChatCompletionsRequest {
            model: &self.model,
            messages: Self::convert_messages(messages),
            tools: None,
            tool_choice: None,
            response_format: Some(serde_json::json!({
                "type": "json_schema",
                "json_schema": { "name": name, "schema": schema }
            })),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let message = self.send(&request).await?;
        let text = message.content.unwrap_or_default();
        serde_json::from_str(strip_code_fences(&text))
            .map_err(|e| ModelError::InvalidResponse(format!("expected JSON: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_completions_url() {
        let timeout = std::time::Duration::from_secs(5);
        let a = OpenAiChatModel::new("https://api.openai.com/v1/", None, "m", timeout).unwrap();
        assert_eq!(a.chat_completions_url(), "https://api.openai.com/v1/chat/completions");
        let b = OpenAiChatModel::new("http://localhost:8080", None, "m", timeout).unwrap();
        assert_eq!(b.chat_completions_url(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_convert_messages_links_tool_calls() {
        let call = ToolCallRequest {
            id: "call_9".into(),
            name: "calculator".into(),
            arguments: json!({"expression": "2+2"}),
        };
        let messages = vec![
            Message::user("2+2?"),
            Message::tool_call(call.clone()),
            Message::tool_result(&call, "Result: 2+2 = 4"),
        ];
        let converted = OpenAiChatModel::convert_messages(&messages);
        let value = serde_json::to_value(&converted).unwrap();
        assert_eq!(value[0], json!({"role": "user", "content": "2+2?"}));
        assert_eq!(value[1]["tool_calls"][0]["id"], "call_9");
        assert_eq!(value[1]["tool_calls"][0]["function"]["arguments"], "{\"expression\":\"2+2\"}");
        assert!(value[1].get("content").is_none());
        assert_eq!(value[2]["role"], "tool");
        assert_eq!(value[2]["tool_call_id"], "call_9");
    }

    #[test]
    fn test_completion_prefers_tool_call() {
        let message: OpenAiMessage = serde_json::from_value(json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [
                { "id": "a", "type": "function", "function": { "name": "roll_die", "arguments": "{\"faces\": 20}" } },
                { "id": "b", "type": "function", "function": { "name": "current_date", "arguments": "{}" } }
            ]
        }))
        .unwrap();
        match completion_from_message(message).unwrap() {
            Completion::ToolCall(call) => {
                assert_eq!(call.name, "roll_die");
                assert_eq!(call.arguments, json!({"faces": 20}));
            }
            other => panic!("expected tool call, got {:?}", other),
        }
    }

    #[test]
    fn test_completion_text_and_bad_arguments() {
        let text: OpenAiMessage =
            serde_json::from_value(json!({"role": "assistant", "content": "Hello"})).unwrap();
        assert_eq!(completion_from_message(text).unwrap(), Completion::Text("Hello".into()));

        let bad: OpenAiMessage = serde_json::from_value(json!({
            "role": "assistant",
            "tool_calls": [{ "function": { "name": "calculator", "arguments": "not json" } }]
        }))
        .unwrap();
        match completion_from_message(bad).unwrap() {
            Completion::ToolCall(call) => {
                assert!(call.id.starts_with("call_"));
                assert_eq!(call.arguments, Value::String("not json".into()));
            }
            other => panic!("expected tool call, got {:?}", other),
        }
    }
}
