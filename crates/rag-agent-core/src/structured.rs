//! Schema-checked structured output.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ExtractError;
use crate::llm::ChatModel;
use crate::models::Message;
use crate::tools::validate_args;

/// Ask `model` to describe `input` as JSON matching `schema`, then check
/// it against the schema and decode it into `T`.
pub async fn extract_structured<T: DeserializeOwned>(
    model: &dyn ChatModel,
    name: &str,
    schema: &Value,
    instruction: &str,
    input: &str,
) -> Result<T, ExtractError> {
    let messages = vec![Message::system(instruction), Message::user(input)];
    let raw = model.complete_json(&messages, name, schema).await?;
    let checked = validate_args(schema, &raw).map_err(ExtractError::Schema)?;
    Ok(serde_json::from_value(checked)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Person {
        name: String,
        age: u32,
        #[serde(default)]
        profession: Option<String>,
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "age": { "type": "integer" },
                "profession": { "type": ["string", "null"] }
            },
            "required": ["name", "age"]
        })
    }

    #[tokio::test]
    async fn test_extracts_typed_value() {
        let model = ScriptedModel::new(vec![ScriptedModel::text(
            r#"{"name": "Ana Souza", "age": 28, "profession": "engineer"}"#,
        )]);
        let person: Person = extract_structured(
            &model,
            "person",
            &schema(),
            "Extract the person described.",
            "Ana Souza, 28, is an engineer.",
        )
        .await
        .unwrap();
        assert_eq!(
            person,
            Person {
                name: "Ana Souza".into(),
                age: 28,
                profession: Some("engineer".into())
            }
        );
    }

    #[tokio::test]
    async fn test_schema_violation() {
        let model = ScriptedModel::new(vec![ScriptedModel::text(r#"{"name": "Ana"}"#)]);
        let err = extract_structured::<Person>(&model, "person", &schema(), "x", "Ana")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Schema(m) if m.contains("age")));
    }

    #[tokio::test]
    async fn test_decode_failure() {
        let model = ScriptedModel::new(vec![ScriptedModel::text(r#"{"name": "Ana", "age": -3}"#)]);
        let err = extract_structured::<Person>(&model, "person", &schema(), "x", "Ana")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Decode(_)));
    }
}
