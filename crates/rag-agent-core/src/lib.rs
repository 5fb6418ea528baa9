//! # rag-agent core
//!
//! Runtime-light building blocks for retrieval-augmented answering and
//! tool-calling agents: data models, chunking, an in-memory vector index,
//! retrieval, prompt templates, per-thread conversation memory, the tool
//! registry and the agent loop.
//!
//! This crate performs no filesystem or network I/O. Embedding providers
//! and chat models are reached through the [`embedding::EmbeddingProvider`]
//! and [`llm::ChatModel`] traits, implemented by the `rag-agent` app crate.
//!
//! ```text
//! Document ─▶ chunk ─▶ VectorIndex::build ─▶ Retriever ─┬─▶ RagPipeline
//!                                                       │
//!                       MemoryStore ◀── Agent ◀─────────┘ (search tool)
//!                                         │
//!                                    ToolRegistry
//! ```
//!
//! The `testing` feature exposes deterministic embedders and a scripted
//! chat model for downstream test suites.

pub mod agent;
pub mod calc;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod index;
pub mod llm;
pub mod memory;
pub mod models;
pub mod prompt;
pub mod rag;
pub mod retriever;
pub mod structured;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tools;
