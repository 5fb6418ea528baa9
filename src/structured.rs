//! Built-in extraction schemas for `ragent extract`.
//!
//! Each schema pairs a JSON Schema (sent to the model and used for
//! validation) with the Rust type the validated JSON decodes into.

use anyhow::{bail, Result};
use rag_agent_core::error::ExtractError;
use rag_agent_core::llm::ChatModel;
use rag_agent_core::structured::extract_structured;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub age: u32,
    pub city: String,
    #[serde(default)]
    pub profession: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketCategory {
    Billing,
    Technical,
    Account,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub category: TicketCategory,
    pub urgency: Urgency,
    pub product: String,
    pub summary: String,
}

pub fn person_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": { "type": "string", "description": "Full name" },
            "age": { "type": "integer", "description": "Age in years" },
            "city": { "type": "string", "description": "City of residence" },
            "profession": { "type": ["string", "null"], "description": "Occupation, if mentioned" }
        },
        "required": ["name", "age", "city"]
    })
}

pub fn ticket_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "category": { "type": "string", "enum": ["billing", "technical", "account", "other"] },
            "urgency": { "type": "string", "enum": ["low", "medium", "high"] },
            "product": { "type": "string", "description": "Product the customer is writing about" },
            "summary": { "type": "string", "description": "One-sentence summary of the issue" }
        },
        "required": ["category", "urgency", "product", "summary"]
    })
}

const PERSON_INSTRUCTION: &str =
    "Extract the person described in the text. Reply with JSON only.";
const TICKET_INSTRUCTION: &str =
    "Classify the customer support message. Reply with JSON only.";

pub async fn extract_person(model: &dyn ChatModel, text: &str) -> Result<Person, ExtractError> {
    extract_structured(model, "person", &person_schema(), PERSON_INSTRUCTION, text).await
}

pub async fn extract_ticket(model: &dyn ChatModel, text: &str) -> Result<Ticket, ExtractError> {
    extract_structured(model, "ticket", &ticket_schema(), TICKET_INSTRUCTION, text).await
}

/// Run the named extraction and return the result as JSON.
pub async fn extract_named(model: &dyn ChatModel, kind: &str, text: &str) -> Result<Value> {
    let value = match kind {
        "person" => serde_json::to_value(extract_person(model, text).await?)?,
        "ticket" => serde_json::to_value(extract_ticket(model, text).await?)?,
        other => bail!("unknown extraction schema '{}' (expected person or ticket)", other),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_agent_core::llm::Completion;
    use rag_agent_core::testing::ScriptedModel;

    #[tokio::test]
    async fn test_extract_person() {
        let model = ScriptedModel::new(vec![Completion::Text(
            r#"{"name": "Ana Souza", "age": 34, "city": "Recife", "profession": "engineer"}"#.into(),
        )]);
        let person = extract_person(&model, "Ana, 34, engineer from Recife").await.unwrap();
        assert_eq!(person.name, "Ana Souza");
        assert_eq!(person.age, 34);
        assert_eq!(person.profession.as_deref(), Some("engineer"));
    }

    #[tokio::test]
    async fn test_extract_ticket_rejects_unknown_urgency() {
        let model = ScriptedModel::new(vec![Completion::Text(
            r#"{"category": "billing", "urgency": "critical", "product": "Pro plan", "summary": "Charged twice"}"#.into(),
        )]);
        let err = extract_ticket(&model, "I was charged twice!").await.unwrap_err();
        assert!(matches!(err, ExtractError::Schema(_)));
    }

    #[tokio::test]
    async fn test_extract_named() {
        let model = ScriptedModel::new(vec![Completion::Text(
            "```json\n{\"category\": \"technical\", \"urgency\": \"high\", \"product\": \"App\", \"summary\": \"Crashes on start\"}\n```".into(),
        )]);
        let value = extract_named(&model, "ticket", "the app crashes").await.unwrap();
        assert_eq!(value["urgency"], "high");

        let model = ScriptedModel::new(vec![]);
        assert!(extract_named(&model, "invoice", "x").await.is_err());
    }
}
