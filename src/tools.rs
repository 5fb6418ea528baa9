//! Built-in tools.
//!
//! | Tool | Purpose |
//! |------|---------|
//! | `search_documents` | Retrieve passages from the indexed documents |
//! | `calculator` | Evaluate an arithmetic expression |
//! | `current_date` | Report the local date and time |
//! | `roll_die` | Roll an n-sided die |
//! | `convert_length` | Convert between km, m, cm and mm |
//! | `counter` | A small stateful counter |
//!
//! Every tool answers with a human-readable string. Failures are returned
//! as errors and reach the model as `Error: ...` observations.

use anyhow::Result;
use async_trait::async_trait;
use rag_agent_core::calc::{evaluate, format_number};
use rag_agent_core::prompt::format_context;
use rag_agent_core::retriever::Retriever;
use rag_agent_core::tools::{BoxError, Tool, ToolRegistry};
use rand::Rng;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;

pub const NO_RESULTS: &str = "No relevant information found in the documents.";

/// Searches the document index.
pub struct SearchDocumentsTool {
    retriever: Retriever,
}

impl SearchDocumentsTool {
    pub fn new(retriever: Retriever) -> Self {
        Self { retriever }
    }
}

#[async_trait]
impl Tool for SearchDocumentsTool {
    fn name(&self) -> &str {
        "search_documents"
    }

    fn description(&self) -> &str {
        "Search the indexed documents for passages relevant to a question"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": { "type": "string", "description": "What to look for" }
            },
            "required": ["question"]
        })
    }

    fn resilient(&self) -> bool {
        true
    }

    async fn invoke(&self, args: Value) -> Result<String, BoxError> {
        let question = args["question"].as_str().unwrap_or("");
        if question.trim().is_empty() {
            return Err("question must not be empty".into());
        }
        let result = self.retriever.retrieve_default(question).await?;
        if result.is_empty() {
            return Ok(NO_RESULTS.to_string());
        }
        Ok(format_context(&result))
    }
}

/// An integer argument, `default` when absent. Values outside `i64` are errors.
fn integer_arg(args: &Value, key: &str, default: i64) -> Result<i64, BoxError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value.as_i64().ok_or_else(|| {
            format!(
                "{} must be an integer between {} and {}",
                key,
                i64::MIN,
                i64::MAX
            )
            .into()
        }),
    }
}

fn overflow(value: i64, op: &str, amount: i64) -> BoxError {
    format!("counter overflow: {} {} {} is out of range", value, op, amount).into()
}

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression using numbers, parentheses and + - * / **"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": { "type": "string", "description": "e.g. (2 + 3) * 4 ** 2" }
            },
            "required": ["expression"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<String, BoxError> {
        let expression = args["expression"].as_str().unwrap_or("").trim();
        let value = evaluate(expression)?;
        Ok(format!("Result: {} = {}", expression, format_number(value)))
    }
}

pub struct CurrentDateTool;

#[async_trait]
impl Tool for CurrentDateTool {
    fn name(&self) -> &str {
        "current_date"
    }

    fn description(&self) -> &str {
        "Get the current local date and time"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn invoke(&self, _args: Value) -> Result<String, BoxError> {
        let now = chrono::Local::now();
        Ok(format!("Today is {}", now.format("%A, %d %B %Y, %H:%M:%S")))
    }
}

pub struct RollDieTool;

#[async_trait]
impl Tool for RollDieTool {
    fn name(&self) -> &str {
        "roll_die"
    }

    fn description(&self) -> &str {
        "Roll a die with the given number of faces"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "faces": { "type": "integer", "description": "Number of faces", "default": 6 }
            }
        })
    }

    async fn invoke(&self, args: Value) -> Result<String, BoxError> {
        let faces = integer_arg(&args, "faces", 6)?;
        if faces < 1 {
            return Err(format!("a die needs at least one face, got {}", faces).into());
        }
        let roll = rand::thread_rng().gen_range(1..=faces);
        Ok(format!("Rolled a {} on a {}-sided die", roll, faces))
    }
}

pub struct ConvertLengthTool;

fn metres_per(unit: &str) -> Option<f64> {
    match unit {
        "km" => Some(1000.0),
        "m" => Some(1.0),
        "cm" => Some(0.01),
        "mm" => Some(0.001),
        _ => None,
    }
}

#[async_trait]
impl Tool for ConvertLengthTool {
    fn name(&self) -> &str {
        "convert_length"
    }

    fn description(&self) -> &str {
        "Convert a length between km, m, cm and mm"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "value": { "type": "number" },
                "from_unit": { "type": "string", "enum": ["km", "m", "cm", "mm"] },
                "to_unit": { "type": "string", "enum": ["km", "m", "cm", "mm"] }
            },
            "required": ["value", "from_unit", "to_unit"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<String, BoxError> {
        let value = args["value"].as_f64().ok_or("value must be a number")?;
        let from = args["from_unit"].as_str().unwrap_or("");
        let to = args["to_unit"].as_str().unwrap_or("");
        let from_factor = metres_per(from).ok_or_else(|| format!("unknown unit '{}'", from))?;
        let to_factor = metres_per(to).ok_or_else(|| format!("unknown unit '{}'", to))?;
        let converted = value * from_factor / to_factor;
        Ok(format!(
            "{} {} = {} {}",
            format_number(value),
            from,
            format_number(converted),
            to
        ))
    }
}

/// A counter kept for the lifetime of the tool, shared by all threads.
#[derive(Default)]
pub struct CounterTool {
    state: Mutex<CounterState>,
}

#[derive(Default)]
struct CounterState {
    value: i64,
    history: VecDeque<String>,
}

const COUNTER_HISTORY: usize = 5;

#[async_trait]
impl Tool for CounterTool {
    fn name(&self) -> &str {
        "counter"
    }

    fn description(&self) -> &str {
        "Increment, decrement, reset or read a persistent counter"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ["increment", "decrement", "reset", "value"] },
                "amount": { "type": "integer", "default": 1 }
            },
            "required": ["action"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<String, BoxError> {
        let action = args["action"].as_str().unwrap_or("value");
        let amount = integer_arg(&args, "amount", 1)?;
        let mut state = self.state.lock().map_err(|_| "counter state poisoned")?;

        let entry = match action {
            "increment" => {
                state.value = state
                    .value
                    .checked_add(amount)
                    .ok_or_else(|| overflow(state.value, "+", amount))?;
                format!("+{}", amount)
            }
            "decrement" => {
                state.value = state
                    .value
                    .checked_sub(amount)
                    .ok_or_else(|| overflow(state.value, "-", amount))?;
                format!("-{}", amount)
            }
            "reset" => {
                state.value = 0;
                "reset".to_string()
            }
            "value" => {
                return Ok(format!(
                    "Counter is {}. Recent: [{}]",
                    state.value,
                    state.history.iter().cloned().collect::<Vec<_>>().join(", ")
                ))
            }
            other => return Err(format!("unknown action '{}'", other).into()),
        };

        state.history.push_back(entry);
        while state.history.len() > COUNTER_HISTORY {
            state.history.pop_front();
        }
        Ok(format!("Counter is now {}", state.value))
    }
}

/// The standard tool set. `search_documents` is only offered when a
/// retriever is available.
pub fn builtin_registry(retriever: Option<Retriever>) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    if let Some(retriever) = retriever {
        registry.register(Box::new(SearchDocumentsTool::new(retriever)))?;
    }
    registry.register(Box::new(CalculatorTool))?;
    registry.register(Box::new(CurrentDateTool))?;
    registry.register(Box::new(RollDieTool))?;
    registry.register(Box::new(ConvertLengthTool))?;
    registry.register(Box::new(CounterTool::default()))?;
    Ok(registry)
}
