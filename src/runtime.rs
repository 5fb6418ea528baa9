//! Assembles the pipeline from configuration.
//!
//! [`Runtime::build`] performs the whole initialisation sequence once:
//! load documents, chunk, embed into an immutable [`VectorIndex`], then
//! wire the retriever, RAG pipeline, tool registry, agent and memory
//! store. Nothing is served until it returns, so every reader sees a
//! fully built index.
//!
//! [`Runtime::assemble`] takes an already-built index and injected
//! providers; integration tests use it with deterministic fakes.

use anyhow::{Context, Result};
use rag_agent_core::agent::{Agent, AgentConfig, DEFAULT_SYSTEM_PROMPT};
use rag_agent_core::chunk::chunk_documents;
use rag_agent_core::embedding::EmbeddingProvider;
use rag_agent_core::index::VectorIndex;
use rag_agent_core::llm::ChatModel;
use rag_agent_core::memory::MemoryStore;
use rag_agent_core::rag::RagPipeline;
use rag_agent_core::retriever::Retriever;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::journal::{rehydrate, SqliteJournal};
use crate::llm::OpenAiChatModel;
use crate::loader::load_documents;
use crate::tools::builtin_registry;

/// Summary of an index build, printed by `ragent index`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
    pub model: String,
    pub dims: usize,
}

/// Everything a command or request handler needs, built once.
pub struct Runtime {
    pub config: Arc<Config>,
    pub model: Arc<dyn ChatModel>,
    /// `None` when `[embedding].provider = "disabled"`.
    pub rag: Option<RagPipeline>,
    pub agent: Agent,
    pub memory: Arc<MemoryStore>,
}

impl Runtime {
    /// Build the full runtime: index, model client, tools, agent and memory.
    pub async fn build(config: Config) -> Result<Self> {
        let index = if config.embedding.is_enabled() {
            let provider = create_provider(&config.embedding)?;
            let (index, stats) = build_index(&config, provider.as_ref()).await?;
            info!(
                documents = stats.documents,
                chunks = stats.chunks,
                model = %stats.model,
                "index ready"
            );
            Some((Arc::new(index), provider))
        } else {
            info!("embeddings disabled; document search is unavailable");
            None
        };

        let model: Arc<dyn ChatModel> = Arc::new(OpenAiChatModel::from_config(&config.llm)?);
        let memory = open_memory(&config).await?;
        Self::assemble(config, index, model, memory)
    }

    /// Wire the runtime around an existing index and model.
    pub fn assemble(
        config: Config,
        index: Option<(Arc<VectorIndex>, Arc<dyn EmbeddingProvider>)>,
        model: Arc<dyn ChatModel>,
        memory: Arc<MemoryStore>,
    ) -> Result<Self> {
        let llm_timeout = Some(config.llm.timeout());

        let retriever = match index {
            Some((index, provider)) => Some(
                Retriever::new(index, provider)?
                    .with_default_k(config.retrieval.top_k)
                    .with_min_score(config.retrieval.min_score)
                    .with_timeout(Some(config.embedding.timeout())),
            ),
            None => None,
        };

        let rag = match &retriever {
            Some(retriever) => Some(
                RagPipeline::new(retriever.clone(), model.clone())?.with_timeout(llm_timeout),
            ),
            None => None,
        };

        let tools = Arc::new(builtin_registry(retriever)?);
        let agent_config = AgentConfig {
            max_iterations: config.agent.max_iterations,
            model_timeout: llm_timeout,
            tool_timeout: Some(Duration::from_secs(config.agent.tool_timeout_secs)),
            system_prompt: Some(
                config
                    .agent
                    .system_prompt
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            ),
        };
        let agent = Agent::new(model.clone(), tools, agent_config);

        Ok(Self {
            config: Arc::new(config),
            model,
            rag,
            agent,
            memory,
        })
    }
}

/// Load, chunk and embed the configured documents.
pub async fn build_index(
    config: &Config,
    provider: &dyn EmbeddingProvider,
) -> Result<(VectorIndex, IndexStats)> {
    let documents = load_documents(&config.documents)?;
    let chunks = chunk_documents(&documents, &config.chunking.params());
    info!(
        documents = documents.len(),
        chunks = chunks.len(),
        "embedding chunks"
    );

    let index = VectorIndex::build(chunks, provider, config.embedding.batch_size)
        .await
        .context("Failed to build the document index")?;

    let stats = IndexStats {
        documents: documents.len(),
        chunks: index.len(),
        model: provider.model_name().to_string(),
        dims: provider.dims(),
    };
    Ok((index, stats))
}

/// An in-memory store, journaled and rehydrated when `[memory].journal_path` is set.
pub async fn open_memory(config: &Config) -> Result<Arc<MemoryStore>> {
    let Some(path) = &config.memory.journal_path else {
        return Ok(Arc::new(MemoryStore::new()));
    };
    let journal = Arc::new(SqliteJournal::open(path).await?);
    let store = MemoryStore::with_journal(journal.clone());
    rehydrate(&journal, &store).await?;
    Ok(Arc::new(store))
}
