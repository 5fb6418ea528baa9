//! Deterministic in-process doubles for the provider traits.
//!
//! Used by this crate's unit tests and by the app crate's integration
//! tests; none of these talk to the network.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::embedding::EmbeddingProvider;
use crate::error::{EmbeddingError, ModelError};
use crate::llm::{ChatModel, Completion};
use crate::models::{Chunk, Message, ToolCallRequest};
use crate::tools::ToolDescriptor;

/// A chunk whose span is its own text, for building indexes by hand.
pub fn chunk(source: &str, position: usize, text: &str) -> Chunk {
    Chunk {
        id: format!("{}#{}", source, position),
        source: source.to_string(),
        position,
        start: 0,
        end: text.len(),
        overlap: 0,
        text: text.to_string(),
        hash: format!("{:x}", Sha256::digest(text.as_bytes())),
    }
}

/// Returns a fixed vector per known text; unknown texts are an error.
pub struct FixedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    dims: usize,
    failing_on: Option<String>,
    calls: AtomicUsize,
}

impl FixedEmbedder {
    pub fn new(pairs: &[(&str, &[f32])]) -> Self {
        Self {
            vectors: pairs
                .iter()
                .map(|(t, v)| (t.to_string(), v.to_vec()))
                .collect(),
            dims: pairs.first().map(|(_, v)| v.len()).unwrap_or(0),
            failing_on: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail any batch containing `text`.
    pub fn failing_on(mut self, text: &str) -> Self {
        self.failing_on = Some(text.to_string());
        self
    }

    /// Number of `embed_batch` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    fn model_name(&self) -> &str {
        "fixed"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        texts
            .iter()
            .map(|t| {
                if self.failing_on.as_deref() == Some(t.as_str()) {
                    return Err(EmbeddingError::Provider(format!("refusing to embed '{}'", t)));
                }
                self.vectors
                    .get(t)
                    .cloned()
                    .ok_or_else(|| EmbeddingError::Provider(format!("no vector for '{}'", t)))
            })
            .collect()
    }
}

/// Bag-of-words embedder: each lowercase alphanumeric token adds 1.0 to
/// the bucket picked by its FNV-1a hash.
pub struct HashEmbedder {
    dims: usize,
    model: String,
    delay: Option<Duration>,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        let dims = dims.max(1);
        Self {
            dims,
            model: format!("hash-bow-{}", dims),
            delay: None,
        }
    }

    /// Sleep before answering every request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let bucket = fnv1a(&token.to_lowercase()) % self.dims as u64;
            v[bucket as usize] += 1.0;
        }
        v
    }
}

fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in s.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

/// A chat model that replays a fixed script of completions.
///
/// Every request is recorded so tests can inspect what the model saw.
pub struct ScriptedModel {
    script: Mutex<VecDeque<Completion>>,
    repeat: Option<Completion>,
    delay: Option<Duration>,
    requests: Mutex<Vec<Vec<Message>>>,
    advertised: Mutex<Vec<Vec<String>>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<Completion>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            repeat: None,
            delay: None,
            requests: Mutex::new(Vec::new()),
            advertised: Mutex::new(Vec::new()),
        }
    }

    /// A model that answers every request with `completion`.
    pub fn repeating(completion: Completion) -> Self {
        Self {
            repeat: Some(completion),
            ..Self::new(Vec::new())
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shorthand for a tool-call completion.
    pub fn call(id: &str, name: &str, arguments: serde_json::Value) -> Completion {
        Completion::ToolCall(ToolCallRequest {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        })
    }

    pub fn text(answer: &str) -> Completion {
        Completion::Text(answer.to_string())
    }

    /// Message lists received so far, one entry per request.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Tool names advertised with each request.
    pub fn advertised_tools(&self) -> Vec<Vec<String>> {
        self.advertised.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<Completion, ModelError> {
        if let Ok(mut r) = self.requests.lock() {
            r.push(messages.to_vec());
        }
        if let Ok(mut a) = self.advertised.lock() {
            a.push(tools.iter().map(|t| t.name.clone()).collect());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .script
            .lock()
            .map_err(|_| ModelError::Request("script lock poisoned".to_string()))?
            .pop_front();
        next.or_else(|| self.repeat.clone())
            .ok_or_else(|| ModelError::InvalidResponse("script exhausted".to_string()))
    }
}
