//! # rag-agent
//!
//! Retrieval-augmented question answering and a tool-calling agent over a
//! directory of local documents.
//!
//! The pipeline itself (chunking, vector index, retrieval, prompts, memory,
//! tools and the agent loop) lives in [`rag_agent_core`]. This crate wires
//! it to the outside world: configuration, document loading, embedding
//! providers, an OpenAI-compatible chat client, the built-in tools, the
//! optional SQLite conversation journal, the HTTP server and the CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Loader    │──▶│ Chunk+Embed  │──▶│ VectorIndex  │
//! │ md/txt/pdf  │   │  (provider)  │   │  (in memory) │
//! └─────────────┘   └──────────────┘   └──────┬───────┘
//!                                             │ Retriever
//!                      ┌──────────────────────┼───────────────┐
//!                      ▼                      ▼               ▼
//!                 ┌──────────┐          ┌───────────┐   ┌──────────┐
//!                 │   RAG    │          │   Agent   │◀─▶│  Memory  │
//!                 │ pipeline │          │ + tools   │   │ (+SQLite)│
//!                 └────┬─────┘          └─────┬─────┘   └──────────┘
//!                      └──────────┬───────────┘
//!                          ┌──────┴──────┐
//!                          │  CLI / HTTP │
//!                          └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ragent index                          # load, chunk and embed
//! ragent ask "What pets are allowed?"   # one RAG answer
//! ragent agent "What is 2 ** 10?"       # one agent turn
//! ragent chat --thread demo             # interactive agent
//! ragent serve                          # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`loader`] | Document loading from a directory |
//! | [`embedding`] | Embedding provider implementations |
//! | [`llm`] | OpenAI-compatible chat model client |
//! | [`tools`] | Built-in agent tools |
//! | [`structured`] | Built-in extraction schemas |
//! | [`journal`] | SQLite conversation journal |
//! | [`runtime`] | Builds the pipeline from config |
//! | [`server`] | HTTP server |

pub mod config;
pub mod embedding;
pub mod journal;
pub mod llm;
pub mod loader;
pub mod runtime;
pub mod server;
pub mod structured;
pub mod tools;
