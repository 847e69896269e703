//! HTTP Server - the query API boundary
//!
//! A single route, `POST /api/chat`, consumed by the presentation layer.
//! The corpus index is built by a background task at startup; requests that
//! arrive first are served against the empty index and fall back to
//! ungrounded answers.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::collector::ingest_dir;
use crate::embedding::EmbeddingProvider;
use crate::knowledge::{swap, ChunkConfig, CorpusIndex, SharedIndex};
use crate::pipeline::ChatPipeline;

// ============================================================================
// State & Routing
// ============================================================================

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ChatPipeline>,
}

/// Build the router with CORS open to any origin (the chat UI is served
/// separately) and per-request tracing.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Handler
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: Option<String>,
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Response {
    let message = request.message.unwrap_or_default();
    if message.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Message is required" })),
        )
            .into_response();
    }

    tracing::info!(message = %message, "processing question");

    match state.pipeline.chat(&message).await {
        Ok(reply) => (StatusCode::OK, Json(reply)).into_response(),
        Err(err) => {
            // Request-level failure: log the detail, return a generic message.
            tracing::error!(error = %err, "chat request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to process your request" })),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Startup
// ============================================================================

/// Build the corpus index from a documents directory and swap it into the
/// shared handle. Runs in the background relative to request serving.
pub async fn initialize_index(
    embedder: Arc<dyn EmbeddingProvider>,
    index: SharedIndex,
    docs_dir: PathBuf,
    chunk_config: ChunkConfig,
) {
    tracing::info!(dir = %docs_dir.display(), "initializing document chunks");

    let chunks = match ingest_dir(&docs_dir, &chunk_config) {
        Ok(chunks) => chunks,
        Err(err) => {
            tracing::error!(error = %err, "failed to initialize document chunks");
            return;
        }
    };

    if chunks.is_empty() {
        tracing::warn!("no text chunks were extracted; the knowledge base will be empty");
        return;
    }

    let built = CorpusIndex::build(embedder.as_ref(), chunks).await;
    swap(&index, built).await;
    tracing::info!("document chunks and embeddings are ready");
}

/// Serve the chat API on `port`, building the index from `docs_dir` (if
/// given) in a background task.
pub async fn serve(
    pipeline: Arc<ChatPipeline>,
    embedder: Arc<dyn EmbeddingProvider>,
    docs_dir: Option<PathBuf>,
    chunk_config: ChunkConfig,
    port: u16,
) -> Result<()> {
    if let Some(dir) = docs_dir {
        let index = pipeline.index().clone();
        tokio::spawn(initialize_index(embedder, index, dir, chunk_config));
    } else {
        tracing::warn!("no documents directory configured; serving with an empty knowledge base");
    }

    let state = AppState { pipeline };
    let router = build_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("server is running on http://localhost:{port}");
    axum::serve(listener, router)
        .await
        .context("server error")?;

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
