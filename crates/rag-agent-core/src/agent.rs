//! The tool-calling agent loop.
//!
//! One user turn runs as an explicit state machine:
//!
//! ```text
//!            ┌──────────────────────────────────┐
//!            ▼                                  │
//! user ─▶ Thinking ──tool call──▶ ToolCall ─▶ Observing
//!            │
//!            └──text──▶ DirectAnswer ─▶ done
//! ```
//!
//! Every model request counts as one iteration. When the cap is reached
//! without a direct answer the turn fails with
//! [`AgentError::MaxIterationsExceeded`].
//!
//! Tool lookup, argument validation and execution failures become
//! `Error: ...` observations so the model can adapt. Timeouts are fatal
//! unless the tool declares itself [`resilient`](crate::tools::Tool::resilient).
//!
//! The conversation lock is held for the whole turn, so the history of one
//! thread always reads as complete turns.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AgentError, ToolError};
use crate::llm::{ChatModel, Completion};
use crate::memory::{Conversation, MemoryStore, TurnGuard};
use crate::models::{Message, ToolCallRequest};
use crate::tools::{ToolDescriptor, ToolRegistry};

pub const DEFAULT_MAX_ITERATIONS: usize = 10;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. \
Use the available tools when they help answer the question, \
and answer directly once you have what you need.";

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum model requests per turn.
    pub max_iterations: usize,
    pub model_timeout: Option<Duration>,
    pub tool_timeout: Option<Duration>,
    /// Prepended to every model request; never stored in the history.
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            model_timeout: None,
            tool_timeout: None,
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }
}

/// One tool execution within a turn.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: Value,
    pub output: String,
    pub is_error: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub answer: String,
    /// Model requests made during the turn.
    pub iterations: usize,
    pub invocations: Vec<ToolInvocation>,
}

enum State {
    Thinking,
    ToolCall(ToolCallRequest),
    Observing(ToolCallRequest, Observation),
    DirectAnswer(String),
}

struct Observation {
    output: String,
    is_error: bool,
}

impl Observation {
    fn ok(output: String) -> Self {
        Self {
            output,
            is_error: false,
        }
    }

    fn error(message: impl std::fmt::Display) -> Self {
        Self {
            output: format!("Error: {}", message),
            is_error: true,
        }
    }
}

pub struct Agent {
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
}

impl Agent {
    pub fn new(model: Arc<dyn ChatModel>, tools: Arc<ToolRegistry>, config: AgentConfig) -> Self {
        Self {
            model,
            tools,
            config,
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run one turn on `thread_id`, creating the thread if needed.
    pub async fn run(
        &self,
        memory: &MemoryStore,
        thread_id: &str,
        input: &str,
    ) -> Result<TurnOutcome, AgentError> {
        let conversation = memory.get_or_create(thread_id).await;
        self.run_turn(&conversation, input).await
    }

    /// Append `input` as a user message and loop until a direct answer.
    pub async fn run_turn(
        &self,
        conversation: &Conversation,
        input: &str,
    ) -> Result<TurnOutcome, AgentError> {
        let mut turn = conversation.lock().await;
        turn.push(Message::user(input)).await;

        let descriptors = self.tools.descriptors();
        let max = self.config.max_iterations;
        let mut iterations = 0;
        let mut invocations = Vec::new();
        let mut state = State::Thinking;

        loop {
            state = match state {
                State::Thinking => {
                    if iterations >= max {
                        warn!(thread = %turn.thread_id(), iterations, "iteration cap reached");
                        return Err(AgentError::MaxIterationsExceeded { iterations });
                    }
                    iterations += 1;
                    debug!(thread = %turn.thread_id(), iteration = iterations, "thinking");
                    match self.think(&turn, &descriptors).await? {
                        Completion::Text(answer) => State::DirectAnswer(answer),
                        Completion::ToolCall(call) => State::ToolCall(call),
                    }
                }
                State::ToolCall(mut call) => {
                    if call.id.is_empty() {
                        call.id = format!("call_{}", Uuid::new_v4().simple());
                    }
                    info!(thread = %turn.thread_id(), tool = %call.name, "tool call");
                    turn.push(Message::tool_call(call.clone())).await;
                    match self.execute(&call).await {
                        Ok(observation) => State::Observing(call, observation),
                        Err(e) => {
                            // Every recorded tool call keeps a result, even when the turn ends.
                            let observation = Observation::error(&e);
                            turn.push(Message::tool_result(&call, observation.output)).await;
                            return Err(e);
                        }
                    }
                }
                State::Observing(call, observation) => {
                    if observation.is_error {
                        debug!(thread = %turn.thread_id(), tool = %call.name, output = %observation.output, "tool error observed");
                    }
                    turn.push(Message::tool_result(&call, observation.output.clone()))
                        .await;
                    invocations.push(ToolInvocation {
                        name: call.name,
                        arguments: call.arguments,
                        output: observation.output,
                        is_error: observation.is_error,
                    });
                    State::Thinking
                }
                State::DirectAnswer(answer) => {
                    turn.push(Message::assistant(answer.clone())).await;
                    info!(thread = %turn.thread_id(), iterations, tools = invocations.len(), "turn complete");
                    return Ok(TurnOutcome {
                        answer,
                        iterations,
                        invocations,
                    });
                }
            };
        }
    }

    async fn think(
        &self,
        turn: &TurnGuard<'_>,
        descriptors: &[ToolDescriptor],
    ) -> Result<Completion, AgentError> {
        let mut prompt = Vec::with_capacity(turn.messages().len() + 1);
        if let Some(system) = &self.config.system_prompt {
            prompt.push(Message::system(system.clone()));
        }
        prompt.extend_from_slice(turn.messages());

        let request = self.model.complete(&prompt, descriptors);
        let completion = match self.config.model_timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .map_err(|_| AgentError::ModelTimeout(limit))??,
            None => request.await?,
        };
        Ok(completion)
    }

    /// Run one tool call. Only a non-resilient timeout escapes as an error.
    async fn execute(&self, call: &ToolCallRequest) -> Result<Observation, AgentError> {
        let (tool, args) = match self.tools.prepare(&call.name, &call.arguments) {
            Ok(prepared) => prepared,
            Err(e @ ToolError::UnknownTool(_)) => {
                return Ok(Observation::error(format!(
                    "{}. Available tools: {}",
                    e,
                    self.tools.names().join(", ")
                )))
            }
            Err(e) => return Ok(Observation::error(e)),
        };

        let invocation = tool.invoke(args);
        let result = match self.config.tool_timeout {
            Some(limit) => match tokio::time::timeout(limit, invocation).await {
                Ok(result) => result,
                Err(_) if tool.resilient() => {
                    return Ok(Observation::error(format!(
                        "tool '{}' did not finish within {:?}",
                        call.name, limit
                    )))
                }
                Err(_) => {
                    return Err(AgentError::ToolTimeout {
                        tool: call.name.clone(),
                        timeout: limit,
                    })
                }
            },
            None => invocation.await,
        };

        Ok(match result {
            Ok(output) => Observation::ok(output),
            Err(e) => Observation::error(ToolError::Execution {
                tool: call.name.clone(),
                message: e.to_string(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::testing::ScriptedModel;
    use crate::tools::{BoxError, Tool};
    use async_trait::async_trait;
    use serde_json::json;

    struct Add;

    #[async_trait]
    impl Tool for Add {
        fn name(&self) -> &str {
            "add"
        }
        fn description(&self) -> &str {
            "Add two integers"
        }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": { "a": { "type": "integer" }, "b": { "type": "integer" } },
                "required": ["a", "b"]
            })
        }
        async fn invoke(&self, args: Value) -> Result<String, BoxError> {
            let a = args["a"].as_i64().unwrap_or(0);
            let b = args["b"].as_i64().unwrap_or(0);
            Ok((a + b).to_string())
        }
    }

    struct Sleepy {
        resilient: bool,
    }

    #[async_trait]
    impl Tool for Sleepy {
        fn name(&self) -> &str {
            "sleepy"
        }
        fn description(&self) -> &str {
            "Takes its time"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object", "properties": {} })
        }
        fn resilient(&self) -> bool {
            self.resilient
        }
        async fn invoke(&self, _args: Value) -> Result<String, BoxError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("finally".to_string())
        }
    }

    struct Failing;

    #[async_trait]
    impl Tool for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        fn description(&self) -> &str {
            "Always reports failure"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object", "properties": {} })
        }
        async fn invoke(&self, _args: Value) -> Result<String, BoxError> {
            Err("service unavailable".into())
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut r = ToolRegistry::new();
        r.register(Box::new(Add)).unwrap();
        r.register(Box::new(Failing)).unwrap();
        r.register(Box::new(Sleepy { resilient: false })).unwrap();
        Arc::new(r)
    }

    fn agent(model: Arc<ScriptedModel>, config: AgentConfig) -> Agent {
        Agent::new(model, registry(), config)
    }

    #[tokio::test]
    async fn test_add_then_answer_history() {
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedModel::call("call_1", "add", json!({"a": 2, "b": 3})),
            ScriptedModel::text("5"),
        ]));
        let agent = agent(model.clone(), AgentConfig::default());
        let memory = MemoryStore::new();

        let outcome = agent.run(&memory, "t", "What is 2 + 3?").await.unwrap();
        assert_eq!(outcome.answer, "5");
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.invocations.len(), 1);
        assert_eq!(outcome.invocations[0].output, "5");

        let history = memory.history("t").await;
        let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
        assert_eq!(history[0].content, "What is 2 + 3?");
        assert_eq!(history[1].tool_call.as_ref().unwrap().name, "add");
        assert_eq!(history[2].content, "5");
        assert_eq!(history[2].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(history[3].content, "5");
        assert!(!history[3].is_tool_call());
    }

    #[tokio::test]
    async fn test_system_prompt_sent_not_stored() {
        let model = Arc::new(ScriptedModel::new(vec![ScriptedModel::text("hi")]));
        let agent = agent(model.clone(), AgentConfig::default());
        let memory = MemoryStore::new();
        agent.run(&memory, "t", "hello").await.unwrap();

        let requests = model.requests();
        assert_eq!(requests[0][0].role, Role::System);
        assert_eq!(requests[0][1].content, "hello");
        assert_eq!(model.advertised_tools()[0], vec!["add", "failing", "sleepy"]);
        assert!(memory.history("t").await.iter().all(|m| m.role != Role::System));
    }

    #[tokio::test]
    async fn test_unknown_tool_until_cap() {
        let model = Arc::new(ScriptedModel::repeating(ScriptedModel::call(
            "",
            "teleport",
            json!({}),
        )));
        let config = AgentConfig {
            max_iterations: 4,
            ..AgentConfig::default()
        };
        let agent = agent(model.clone(), config);
        let memory = MemoryStore::new();

        let err = agent.run(&memory, "t", "beam me up").await.unwrap_err();
        assert!(matches!(err, AgentError::MaxIterationsExceeded { iterations: 4 }));
        assert_eq!(err.to_string(), "could not complete the request after 4 attempts");
        assert_eq!(model.request_count(), 4);

        let history = memory.history("t").await;
        assert_eq!(history.len(), 1 + 4 * 2);
        let observation = &history[2];
        assert!(observation.content.starts_with("Error: unknown tool 'teleport'"));
        assert!(observation.content.contains("add, failing, sleepy"));
        assert!(history[1].tool_call.as_ref().unwrap().id.starts_with("call_"));
    }

    #[tokio::test]
    async fn test_default_cap_is_ten() {
        let model = Arc::new(ScriptedModel::repeating(ScriptedModel::call(
            "c",
            "nope",
            json!({}),
        )));
        let agent = agent(model.clone(), AgentConfig::default());
        let memory = MemoryStore::new();
        let err = agent.run(&memory, "t", "loop").await.unwrap_err();
        assert!(matches!(err, AgentError::MaxIterationsExceeded { iterations: 10 }));
        assert_eq!(model.request_count(), 10);
    }

    #[tokio::test]
    async fn test_invalid_arguments_observed_and_recovered() {
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedModel::call("c1", "add", json!({"a": "two", "b": 3})),
            ScriptedModel::call("c2", "add", json!({"a": 2, "b": 3})),
            ScriptedModel::text("5"),
        ]));
        let agent = agent(model, AgentConfig::default());
        let memory = MemoryStore::new();

        let outcome = agent.run(&memory, "t", "add").await.unwrap();
        assert_eq!(outcome.answer, "5");
        assert!(outcome.invocations[0].is_error);
        assert!(outcome.invocations[0].output.contains("invalid arguments for 'add'"));
        assert!(!outcome.invocations[1].is_error);
    }

    #[tokio::test]
    async fn test_execution_error_is_observation() {
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedModel::call("c1", "failing", json!({})),
            ScriptedModel::text("The service is down."),
        ]));
        let agent = agent(model, AgentConfig::default());
        let memory = MemoryStore::new();

        let outcome = agent.run(&memory, "t", "status?").await.unwrap();
        assert_eq!(outcome.answer, "The service is down.");
        assert_eq!(
            outcome.invocations[0].output,
            "Error: tool 'failing' failed: service unavailable"
        );
    }

    #[tokio::test]
    async fn test_tool_timeout_is_fatal() {
        let model = Arc::new(ScriptedModel::new(vec![ScriptedModel::call(
            "c1",
            "sleepy",
            json!({}),
        )]));
        let config = AgentConfig {
            tool_timeout: Some(Duration::from_millis(20)),
            ..AgentConfig::default()
        };
        let agent = agent(model, config);
        let memory = MemoryStore::new();

        let err = agent.run(&memory, "t", "wait").await.unwrap_err();
        assert!(matches!(err, AgentError::ToolTimeout { ref tool, .. } if tool == "sleepy"));

        let history = memory.history("t").await;
        let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool]);
        assert_eq!(history[2].tool_call_id.as_deref(), Some("c1"));
        assert!(history[2].content.starts_with("Error: tool 'sleepy' did not finish"));
    }

    #[tokio::test]
    async fn test_thread_usable_after_tool_timeout() {
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedModel::call("c1", "sleepy", json!({})),
            ScriptedModel::text("Sorry about that."),
        ]));
        let config = AgentConfig {
            tool_timeout: Some(Duration::from_millis(20)),
            ..AgentConfig::default()
        };
        let agent = agent(model.clone(), config);
        let memory = MemoryStore::new();

        assert!(agent.run(&memory, "t", "wait").await.is_err());
        agent.run(&memory, "t", "still there?").await.unwrap();

        let second = &model.requests()[1];
        for (i, message) in second.iter().enumerate() {
            if let Some(call) = &message.tool_call {
                let next = &second[i + 1];
                assert_eq!(next.role, Role::Tool);
                assert_eq!(next.tool_call_id.as_deref(), Some(call.id.as_str()));
            }
        }
    }

    #[tokio::test]
    async fn test_resilient_tool_timeout_is_observation() {
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedModel::call("c1", "sleepy", json!({})),
            ScriptedModel::text("It took too long."),
        ]));
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(Sleepy { resilient: true })).unwrap();
        let config = AgentConfig {
            tool_timeout: Some(Duration::from_millis(20)),
            ..AgentConfig::default()
        };
        let agent = Agent::new(model, Arc::new(tools), config);
        let memory = MemoryStore::new();

        let outcome = agent.run(&memory, "t", "wait").await.unwrap();
        assert_eq!(outcome.answer, "It took too long.");
        assert!(outcome.invocations[0].output.contains("did not finish within"));
    }

    #[tokio::test]
    async fn test_model_timeout() {
        let model = Arc::new(
            ScriptedModel::new(vec![ScriptedModel::text("late")])
                .with_delay(Duration::from_millis(200)),
        );
        let config = AgentConfig {
            model_timeout: Some(Duration::from_millis(10)),
            ..AgentConfig::default()
        };
        let agent = agent(model, config);
        let memory = MemoryStore::new();

        let err = agent.run(&memory, "t", "hello").await.unwrap_err();
        assert!(matches!(err, AgentError::ModelTimeout(_)));
    }

    #[tokio::test]
    async fn test_history_carries_across_turns() {
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedModel::text("Nice to meet you, Ana."),
            ScriptedModel::text("Your name is Ana."),
        ]));
        let agent = agent(model.clone(), AgentConfig::default());
        let memory = MemoryStore::new();

        agent.run(&memory, "t", "My name is Ana.").await.unwrap();
        agent.run(&memory, "t", "What is my name?").await.unwrap();

        let second = &model.requests()[1];
        let contents: Vec<&str> = second.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            &contents[1..],
            &["My name is Ana.", "Nice to meet you, Ana.", "What is my name?"]
        );
        assert_eq!(memory.history("t").await.len(), 4);
    }
}
