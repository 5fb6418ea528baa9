//! Chat model abstraction.
//!
//! A [`ChatModel`] is stateless per call: the full message list and the
//! advertised tools are passed every time. The hosted client lives in the
//! app crate; tests use `testing::ScriptedModel` (behind the `testing` feature).

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ModelError;
use crate::models::{Message, ToolCallRequest};
use crate::tools::ToolDescriptor;

/// What the model produced for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// A final answer.
    Text(String),
    /// A request to run exactly one tool.
    ToolCall(ToolCallRequest),
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;

    /// Send `messages` and return either text or a tool call.
    ///
    /// `tools` may be empty, in which case the model can only answer.
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<Completion, ModelError>;

    /// Ask for a JSON value conforming to `schema`.
    ///
    /// The default implementation appends the schema to the conversation
    /// as an instruction and parses the text reply. Providers with native
    /// structured output should override it.
    async fn complete_json(
        &self,
        messages: &[Message],
        name: &str,
        schema: &Value,
    ) -> Result<Value, ModelError> {
        let mut prompt = messages.to_vec();
        prompt.push(Message::system(format!(
            "Respond with a single JSON object named '{}' that conforms to this JSON Schema, and nothing else:\n{}",
            name, schema
        )));
        match self.complete(&prompt, &[]).await? {
            Completion::Text(text) => serde_json::from_str(strip_code_fences(&text))
                .map_err(|e| ModelError::InvalidResponse(format!("expected JSON: {}", e))),
            Completion::ToolCall(call) => Err(ModelError::InvalidResponse(format!(
                "expected JSON, got a call to tool '{}'",
                call.name
            ))),
        }
    }
}

/// Remove a surrounding Markdown code fence, if any.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}
