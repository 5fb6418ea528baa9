//! Tool trait and registry.
//!
//! Tools are a closed set of trait objects registered by name at startup.
//! Each one advertises a JSON Schema for its arguments; the registry looks
//! tools up, validates arguments against that schema, and invokes them.
//!
//! ```text
//! ToolCallRequest { name, arguments }
//!        │
//!        ▼
//!   ToolRegistry::prepare ── unknown name ──▶ ToolError::UnknownTool
//!        │            └──── bad arguments ──▶ ToolError::InvalidArguments
//!        ▼
//!   Tool::invoke(validated args) ── Err ───▶ ToolError::Execution
//!        │
//!        ▼
//!   observation text
//! ```

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ToolError;

/// Error type tools report failures with.
///
/// Anything convertible into a boxed error works with `?`, including
/// `String`, `&str` and `anyhow::Error`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What the model is told about a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema (`type: "object"`) for the arguments.
    pub parameters: Value,
}

/// A named capability the agent can invoke.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::{json, Value};
/// use rag_agent_core::tools::{BoxError, Tool};
///
/// pub struct Echo;
///
/// #[async_trait]
/// impl Tool for Echo {
///     fn name(&self) -> &str { "echo" }
///     fn description(&self) -> &str { "Repeat the input text" }
///
///     fn parameters_schema(&self) -> Value {
///         json!({
///             "type": "object",
///             "properties": { "text": { "type": "string" } },
///             "required": ["text"]
///         })
///     }
///
///     async fn invoke(&self, args: Value) -> Result<String, BoxError> {
///         Ok(args["text"].as_str().unwrap_or_default().to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Lowercase identifier with underscores, unique within a registry.
    fn name(&self) -> &str;

    /// One-line description the model uses to decide whether to call it.
    fn description(&self) -> &str;

    /// JSON Schema for the arguments object.
    fn parameters_schema(&self) -> Value;

    /// Whether a timeout should be fed back to the model as an observation
    /// instead of failing the turn.
    fn resilient(&self) -> bool {
        false
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }

    /// Run the tool with arguments already validated against
    /// [`Tool::parameters_schema`] (defaults filled in).
    async fn invoke(&self, args: Value) -> Result<String, BoxError>;
}

/// Tools keyed by name, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool. Names must be unique.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), ToolError> {
        if self.find(tool.name()).is_some() {
            return Err(ToolError::Duplicate(tool.name().to_string()));
        }
        self.tools.push(tool);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Look up `name` and validate `args` without invoking anything.
    pub fn prepare(&self, name: &str, args: &Value) -> Result<(&dyn Tool, Value), ToolError> {
        let tool = self
            .find(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let args = validate_args(&tool.parameters_schema(), args).map_err(|message| {
            ToolError::InvalidArguments {
                tool: name.to_string(),
                message,
            }
        })?;
        Ok((tool, args))
    }

    /// Look up, validate and invoke a tool.
    pub async fn dispatch(&self, name: &str, args: &Value) -> Result<String, ToolError> {
        let (tool, args) = self.prepare(name, args)?;
        tool.invoke(args)
            .await
            .map_err(|e| ToolError::Execution {
                tool: name.to_string(),
                message: e.to_string(),
            })
    }
}

/// Validate `args` against an object JSON Schema.
///
/// Checks required properties, primitive types and `enum` membership of
/// top-level properties and fills in `default` values for absent ones.
/// `null` is accepted as an empty object; any other non-object is rejected.
/// Returns the arguments with defaults applied.
pub fn validate_args(schema: &Value, args: &Value) -> Result<Value, String> {
    let args_obj = match args {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            return Err(format!(
                "arguments must be a JSON object, got {}",
                json_type_name(other)
            ))
        }
    };

    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();

    let required: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    for field in &required {
        if !args_obj.contains_key(*field) {
            return Err(format!("missing required parameter: {}", field));
        }
    }

    let mut result = args_obj.clone();

    for (prop_name, prop_schema) in &properties {
        match args_obj.get(prop_name) {
            Some(value) => {
                if let Some(expected) = prop_schema.get("type") {
                    if !type_matches(expected, value) {
                        return Err(format!(
                            "parameter '{}' must be of type {}, got {}",
                            prop_name,
                            expected,
                            json_type_name(value)
                        ));
                    }
                }
                if let Some(allowed) = prop_schema.get("enum").and_then(|e| e.as_array()) {
                    if !allowed.contains(value) {
                        let allowed: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
                        return Err(format!(
                            "parameter '{}' must be one of [{}], got {}",
                            prop_name,
                            allowed.join(", "),
                            value
                        ));
                    }
                }
            }
            None => {
                if let Some(default) = prop_schema.get("default") {
                    result.insert(prop_name.clone(), default.clone());
                }
            }
        }
    }

    Ok(Value::Object(result))
}

/// `type` may be a single name or a list of names (`["string", "null"]`).
fn type_matches(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(name) => primitive_matches(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(|n| n.as_str())
            .any(|n| primitive_matches(n, value)),
        _ => true,
    }
}

fn primitive_matches(name: &str, value: &Value) -> bool {
    match name {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
