//! Error types for each seam of the pipeline.
//!
//! Provider-facing failures (embedding, model) are surfaced to the caller.
//! Tool failures inside the agent loop are turned into observations by
//! [`crate::agent`]; only [`AgentError`] ends a turn.

use std::time::Duration;

use thiserror::Error;

/// The embedding provider failed or timed out.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider error: {0}")]
    Provider(String),
    #[error("embedding request timed out after {0:?}")]
    Timeout(Duration),
    #[error("embedding provider returned {got} vectors for {expected} texts")]
    CountMismatch { expected: usize, got: usize },
}

/// Building the index failed; no partial index is returned.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index build failed: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("index build failed: chunk {position} of {document} has {got} dims, expected {expected}")]
    Dimensions {
        document: String,
        position: usize,
        expected: usize,
        got: usize,
    },
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error("query embedder '{query_model}' does not match index model '{index_model}'")]
    ModelMismatch {
        index_model: String,
        query_model: String,
    },
    #[error("query vector has {got} dims, index has {expected}")]
    Dimensions { expected: usize, got: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("missing value for placeholder '{0}'")]
    MissingVariable(String),
    #[error("malformed template: {0}")]
    Malformed(String),
}

/// The language model provider failed.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Request(String),
    #[error("model API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("invalid model response: {0}")]
    InvalidResponse(String),
}

/// Tool lookup, validation, or execution failure.
///
/// The agent loop never propagates these; it records them as observations.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
    #[error("invalid arguments for '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },
    #[error("tool '{tool}' failed: {message}")]
    Execution { tool: String, message: String },
    #[error("a tool named '{0}' is already registered")]
    Duplicate(String),
}

/// Fatal outcomes of one agent turn.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("model did not respond within {0:?}")]
    ModelTimeout(Duration),
    #[error("tool '{tool}' did not finish within {timeout:?}")]
    ToolTimeout { tool: String, timeout: Duration },
    #[error("could not complete the request after {iterations} attempts")]
    MaxIterationsExceeded { iterations: usize },
}

#[derive(Debug, Error)]
pub enum RagError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("model did not respond within {0:?}")]
    ModelTimeout(Duration),
}

/// Structured output could not be produced or did not match its schema.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("model output does not match schema: {0}")]
    Schema(String),
    #[error("model output could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}
