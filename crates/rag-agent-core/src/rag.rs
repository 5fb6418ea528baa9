//! Retrieval-augmented answering.
//!
//! [`RagPipeline::answer`] retrieves context, renders it into the prompt
//! template and asks the model once. When retrieval finds nothing it says
//! so explicitly instead of letting the model improvise.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::error::RagError;
use crate::llm::{ChatModel, Completion};
use crate::models::ScoredChunk;
use crate::prompt::{format_context, ChatPromptTemplate, RAG_TEMPLATE};
use crate::retriever::Retriever;

/// Returned when retrieval yields no usable context.
pub const NO_INFORMATION: &str = "I could not find any information about this in the documents.";

#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub answer: String,
    /// Chunks the answer was conditioned on, closest first.
    pub sources: Vec<ScoredChunk>,
}

pub struct RagPipeline {
    retriever: Retriever,
    model: Arc<dyn ChatModel>,
    template: ChatPromptTemplate,
    timeout: Option<Duration>,
}

impl RagPipeline {
    /// Pipeline using the built-in question-answering template.
    pub fn new(retriever: Retriever, model: Arc<dyn ChatModel>) -> Result<Self, RagError> {
        Ok(Self::with_template(
            retriever,
            model,
            ChatPromptTemplate::from_template(RAG_TEMPLATE)?,
        ))
    }

    /// The template receives `{context}` and `{question}`.
    pub fn with_template(
        retriever: Retriever,
        model: Arc<dyn ChatModel>,
        template: ChatPromptTemplate,
    ) -> Self {
        Self {
            retriever,
            model,
            template,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub async fn answer(&self, question: &str) -> Result<RagAnswer, RagError> {
        let retrieved = self.retriever.retrieve_default(question).await?;
        if retrieved.is_empty() {
            debug!("no context retrieved");
            return Ok(RagAnswer {
                answer: NO_INFORMATION.to_string(),
                sources: Vec::new(),
            });
        }

        let mut values = HashMap::new();
        values.insert("context", format_context(&retrieved));
        values.insert("question", question.to_string());
        let messages = self.template.render(&values)?;

        let request = self.model.complete(&messages, &[]);
        let completion = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .map_err(|_| RagError::ModelTimeout(limit))??,
            None => request.await?,
        };

        let answer = match completion {
            Completion::Text(text) => text,
            Completion::ToolCall(call) => {
                return Err(crate::error::ModelError::InvalidResponse(format!(
                    "unexpected call to tool '{}'",
                    call.name
                ))
                .into())
            }
        };

        Ok(RagAnswer {
            answer,
            sources: retrieved.hits,
        })
    }
}
