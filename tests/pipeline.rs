//! End-to-end tests over a temporary documents directory, with a
//! deterministic embedder and a scripted model (no network).

use rag_agent::config::{parse_config, Config};
use rag_agent::runtime::{build_index, open_memory, Runtime};
use rag_agent_core::embedding::EmbeddingProvider;
use rag_agent_core::error::AgentError;
use rag_agent_core::memory::MemoryStore;
use rag_agent_core::models::Role;
use rag_agent_core::rag::NO_INFORMATION;
use rag_agent_core::testing::{HashEmbedder, ScriptedModel};
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn write_docs(root: &Path) {
    fs::create_dir_all(root.join("handbook")).unwrap();
    fs::write(
        root.join("handbook/pets.md"),
        "# Pets\n\nStudents may bring an owl, a cat or a toad.",
    )
    .unwrap();
    fs::write(
        root.join("handbook/feast.txt"),
        "The start of term feast begins at seven in the Great Hall.",
    )
    .unwrap();
    fs::write(root.join("notes.bin"), [0u8, 159, 146, 150]).unwrap();
}

fn config(root: &Path, extra: &str) -> Config {
    parse_config(&format!(
        r#"
        [documents]
        root = "{}"

        [chunking]
        max_chars = 200
        overlap_chars = 20

        [retrieval]
        top_k = 2
        {}
        "#,
        root.display(),
        extra
    ))
    .unwrap()
}

async fn runtime(config: Config, model: Arc<ScriptedModel>) -> Runtime {
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashEmbedder::new(256));
    let (index, _) = build_index(&config, provider.as_ref()).await.unwrap();
    Runtime::assemble(
        config,
        Some((Arc::new(index), provider)),
        model,
        Arc::new(MemoryStore::new()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_rag_answer_uses_retrieved_context() {
    let tmp = TempDir::new().unwrap();
    write_docs(tmp.path());
    let model = Arc::new(ScriptedModel::new(vec![ScriptedModel::text(
        "An owl, a cat or a toad.",
    )]));
    let rt = runtime(config(tmp.path(), ""), model.clone()).await;

    let answer = rt
        .rag
        .as_ref()
        .unwrap()
        .answer("Which pets may students bring?")
        .await
        .unwrap();

    assert_eq!(answer.answer, "An owl, a cat or a toad.");
    assert_eq!(answer.sources[0].chunk.source, "handbook/pets.md");

    let requests = model.requests();
    assert_eq!(requests.len(), 1);
    let prompt: String = requests[0].iter().map(|m| m.content.as_str()).collect();
    assert!(prompt.contains("[Source: pets.md]"));
    assert!(prompt.contains("Which pets may students bring?"));
}

#[tokio::test]
async fn test_rag_without_hits_skips_model() {
    let tmp = TempDir::new().unwrap();
    write_docs(tmp.path());
    let model = Arc::new(ScriptedModel::new(vec![]));
    let rt = runtime(config(tmp.path(), "min_score = 0.99"), model.clone()).await;

    let answer = rt
        .rag
        .as_ref()
        .unwrap()
        .answer("quantum chromodynamics")
        .await
        .unwrap();

    assert_eq!(answer.answer, NO_INFORMATION);
    assert!(answer.sources.is_empty());
    assert_eq!(model.request_count(), 0);
}

#[tokio::test]
async fn test_agent_searches_then_calculates() {
    let tmp = TempDir::new().unwrap();
    write_docs(tmp.path());
    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedModel::call("c1", "search_documents", json!({"question": "pets students bring"})),
        ScriptedModel::call("c2", "calculator", json!({"expression": "3 * 2"})),
        ScriptedModel::text("Three kinds of pet; two each makes 6."),
    ]));
    let rt = runtime(config(tmp.path(), ""), model.clone()).await;

    let outcome = rt
        .agent
        .run(&rt.memory, "t1", "What pets are allowed, and what is 3 * 2?")
        .await
        .unwrap();

    assert_eq!(outcome.answer, "Three kinds of pet; two each makes 6.");
    assert_eq!(outcome.iterations, 3);
    assert!(outcome.invocations[0].output.starts_with("[Source: pets.md]"));
    assert_eq!(outcome.invocations[1].output, "Result: 3 * 2 = 6");

    let history = rt.memory.history("t1").await;
    let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            Role::User,
            Role::Assistant,
            Role::Tool,
            Role::Assistant,
            Role::Tool,
            Role::Assistant
        ]
    );
    assert_eq!(history[2].tool_call_id.as_deref(), Some("c1"));
    assert_eq!(history[4].tool_call_id.as_deref(), Some("c2"));
}

#[tokio::test]
async fn test_agent_gives_up_after_configured_iterations() {
    let tmp = TempDir::new().unwrap();
    write_docs(tmp.path());
    let mut cfg = config(tmp.path(), "");
    cfg.agent.max_iterations = 3;
    let model = Arc::new(ScriptedModel::repeating(ScriptedModel::call(
        "",
        "web_search",
        json!({"q": "x"}),
    )));
    let rt = runtime(cfg, model.clone()).await;

    let err = rt.agent.run(&rt.memory, "loop", "search the web").await.unwrap_err();
    assert!(matches!(err, AgentError::MaxIterationsExceeded { iterations: 3 }));
    assert_eq!(model.request_count(), 3);
    assert!(err.to_string().contains("after 3 attempts"));
}

#[tokio::test]
async fn test_journal_restores_threads_across_restarts() {
    let tmp = TempDir::new().unwrap();
    write_docs(tmp.path());
    let mut cfg = config(tmp.path(), "");
    cfg.memory.journal_path = Some(tmp.path().join("state/memory.sqlite"));

    {
        let memory = open_memory(&cfg).await.unwrap();
        let model = Arc::new(ScriptedModel::new(vec![ScriptedModel::text("Hello, Ana.")]));
        let rt = Runtime::assemble(cfg.clone(), None, model, memory).unwrap();
        rt.agent.run(&rt.memory, "ana", "Hi, I'm Ana").await.unwrap();
    }

    let memory = open_memory(&cfg).await.unwrap();
    let history = memory.history("ana").await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "Hi, I'm Ana");
    assert_eq!(history[1].content, "Hello, Ana.");
}
