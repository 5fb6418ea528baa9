//! HTTP server.
//!
//! Exposes the RAG pipeline, the agent, the tool registry and the
//! conversation store as a JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/tools/list` | List registered tools with schemas |
//! | `POST` | `/tools/{name}` | Call a tool directly |
//! | `POST` | `/ask` | Answer a question from the documents |
//! | `POST` | `/chat` | Run one agent turn on a thread |
//! | `GET`  | `/threads/{id}` | Conversation history of a thread |
//! | `DELETE` | `/threads/{id}` | Forget a thread |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "message must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `timeout` (408),
//! `max_iterations` (422), `upstream_error` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rag_agent_core::agent::ToolInvocation;
use rag_agent_core::error::{AgentError, EmbeddingError, RagError, RetrievalError, ToolError};
use rag_agent_core::models::{Message, ScoredChunk};
use rag_agent_core::tools::ToolDescriptor;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::runtime::Runtime;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    runtime: Arc<Runtime>,
}

/// Starts the HTTP server on `[server].bind`.
///
/// The runtime is already built, so the index is complete before the
/// first request is accepted. Runs until the process is terminated.
pub async fn run_server(runtime: Arc<Runtime>) -> anyhow::Result<()> {
    let bind_addr = runtime.config.server.bind.clone();

    for tool in runtime.agent.tools().tools() {
        info!(tool = tool.name(), "registered tool");
    }

    let app = router(runtime);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "listening");
    println!("Server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// The application router, without binding a socket.
pub fn router(runtime: Arc<Runtime>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/ask", post(handle_ask))
        .route("/chat", post(handle_chat))
        .route(
            "/threads/{id}",
            get(handle_get_thread).delete(handle_delete_thread),
        )
        .layer(cors)
        .with_state(AppState { runtime })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(code = self.code, message = %self.message, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::NOT_FOUND, "not_found", message)
}

fn timeout_error(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::REQUEST_TIMEOUT, "timeout", message)
}

fn upstream_error(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_GATEWAY, "upstream_error", message)
}

fn internal(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

impl From<ToolError> for AppError {
    fn from(err: ToolError) -> Self {
        match &err {
            ToolError::UnknownTool(_) => not_found(err.to_string()),
            ToolError::InvalidArguments { .. } => bad_request(err.to_string()),
            ToolError::Execution { .. } | ToolError::Duplicate(_) => internal(err.to_string()),
        }
    }
}

impl From<AgentError> for AppError {
    fn from(err: AgentError) -> Self {
        match &err {
            AgentError::Model(_) => upstream_error(err.to_string()),
            AgentError::ModelTimeout(_) | AgentError::ToolTimeout { .. } => {
                timeout_error(err.to_string())
            }
            AgentError::MaxIterationsExceeded { .. } => AppError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "max_iterations",
                err.to_string(),
            ),
        }
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        match &err {
            RagError::ModelTimeout(_)
            | RagError::Retrieval(RetrievalError::Embedding(EmbeddingError::Timeout(_))) => {
                timeout_error(err.to_string())
            }
            RagError::Retrieval(_) | RagError::Model(_) => upstream_error(err.to_string()),
            RagError::Prompt(_) => internal(err.to_string()),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolDescriptor>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    Json(ToolListResponse {
        tools: state.runtime.agent.tools().descriptors(),
    })
}

// ============ POST /tools/{name} ============

/// Validates the body against the tool's schema and runs it.
async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let result = state.runtime.agent.tools().dispatch(&name, &params).await?;
    Ok(Json(serde_json::json!({ "result": result })))
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
    sources: Vec<ScoredChunk>,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    let rag = state
        .runtime
        .rag
        .as_ref()
        .ok_or_else(|| bad_request("document search is disabled: configure [embedding]"))?;

    let answer = rag.answer(&req.question).await?;
    Ok(Json(AskResponse {
        answer: answer.answer,
        sources: answer.sources,
    }))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    thread_id: Option<String>,
    message: String,
}

#[derive(Serialize)]
struct ChatResponse {
    thread_id: String,
    answer: String,
    iterations: usize,
    tool_calls: Vec<ToolInvocation>,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if req.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    let thread_id = match req.thread_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => Uuid::new_v4().to_string(),
    };

    let runtime = &state.runtime;
    let outcome = runtime
        .agent
        .run(&runtime.memory, &thread_id, &req.message)
        .await?;

    Ok(Json(ChatResponse {
        thread_id,
        answer: outcome.answer,
        iterations: outcome.iterations,
        tool_calls: outcome.invocations,
    }))
}

// ============ /threads/{id} ============

#[derive(Serialize)]
struct ThreadResponse {
    thread_id: String,
    messages: Vec<Message>,
}

async fn handle_get_thread(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ThreadResponse>, AppError> {
    let conversation = state
        .runtime
        .memory
        .get(&id)
        .await
        .ok_or_else(|| not_found(format!("no thread with id: {}", id)))?;
    Ok(Json(ThreadResponse {
        thread_id: id,
        messages: conversation.history().await,
    }))
}

async fn handle_delete_thread(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.runtime.memory.reset(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("no thread with id: {}", id)))
    }
}
