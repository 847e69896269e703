//! Embedding Module - text vectorization through the Gemini API
//!
//! Converts text into fixed-length vectors for semantic search. Backend
//! failures are classified so callers can tell a bad credential (abort the
//! batch) from a rate limit (degrade and continue).
//!
//! ## Usage
//! ```rust,ignore
//! let embedder = GeminiEmbedding::from_env()?;
//! let vector = embedder.embed("What is internal audit?").await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Classification of a non-success backend response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// 4xx format/auth failure. Retrying the rest of a batch cannot help.
    InvalidRequest,
    /// 429. Transient; the item degrades, the batch continues.
    RateLimited,
    /// Anything else (5xx, transport, malformed body).
    Unknown,
}

/// Embedding failure taxonomy.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("empty input after whitespace normalization")]
    EmptyInput,

    #[error("embedding backend error ({kind:?}): {message}")]
    Backend {
        kind: BackendErrorKind,
        message: String,
    },

    #[error("embedding request timed out")]
    Timeout,
}

impl EmbedError {
    /// True for errors that must abort a whole ingestion batch.
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            EmbedError::Backend {
                kind: BackendErrorKind::InvalidRequest,
                ..
            }
        )
    }
}

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// Interface for turning text into a fixed-length vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Output dimensionality of every vector this provider returns.
    fn dimension(&self) -> usize;

    /// Provider name (for logs).
    fn name(&self) -> &str;
}

// ============================================================================
// Google Gemini Embedding
// ============================================================================

/// Gemini embedding endpoint
const GEMINI_EMBED_URL: &str =
    "https://generativelanguage.googleapis.com/v1/models/embedding-001:embedContent";

/// Model identifier sent in the request body
const EMBED_MODEL: &str = "models/embedding-001";

/// Output dimensionality of embedding-001
pub const EMBEDDING_DIMENSION: usize = 768;

/// Upper bound on a single backend call
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Gemini embedding client.
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    client: reqwest::Client,
    dimension: usize,
}

impl GeminiEmbedding {
    /// Create a new client with the given API key.
    pub fn new(api_key: String) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            api_key,
            client,
            dimension: EMBEDDING_DIMENSION,
        })
    }

    /// Create a client from the `GEMINI_API_KEY` / `GOOGLE_AI_API_KEY`
    /// environment variables.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        Self::new(get_api_key()?)
    }
}

/// Normalize text before embedding: trim and collapse internal whitespace.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Map a reqwest transport failure onto the error taxonomy.
fn map_transport_error(err: reqwest::Error) -> EmbedError {
    if err.is_timeout() {
        EmbedError::Timeout
    } else {
        EmbedError::Backend {
            kind: BackendErrorKind::Unknown,
            message: err.to_string(),
        }
    }
}

/// Classify an HTTP status into a backend error kind.
fn classify_status(status: reqwest::StatusCode) -> BackendErrorKind {
    match status.as_u16() {
        400 | 401 | 403 => BackendErrorKind::InvalidRequest,
        429 => BackendErrorKind::RateLimited,
        _ => BackendErrorKind::Unknown,
    }
}

// ----------------------------------------------------------------------------
// Wire format
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: &'static str,
    content: EmbedContent,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// Gemini error envelope
#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

/// Extract a readable message from a Gemini error body.
pub(crate) fn backend_error_message(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<GeminiError>(body) {
        Ok(parsed) => format!("{} ({})", parsed.error.message, parsed.error.status),
        Err(_) => format!("HTTP {}: {}", status, body),
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let clean = clean_text(text);
        if clean.is_empty() {
            return Err(EmbedError::EmptyInput);
        }

        let request = EmbedRequest {
            model: EMBED_MODEL,
            content: EmbedContent {
                parts: vec![EmbedPart { text: clean }],
            },
        };

        // API key travels in a header, not the URL, so it never hits logs.
        let response = self
            .client
            .post(GEMINI_EMBED_URL)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;

        if !status.is_success() {
            return Err(EmbedError::Backend {
                kind: classify_status(status),
                message: backend_error_message(status, &body),
            });
        }

        let parsed: EmbedResponse =
            serde_json::from_str(&body).map_err(|e| EmbedError::Backend {
                kind: BackendErrorKind::Unknown,
                message: format!("malformed embedding response: {e}"),
            })?;

        tracing::debug!(
            dimensions = parsed.embedding.values.len(),
            "generated embedding"
        );
        Ok(parsed.embedding.values)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "embedding-001"
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// Load the API key from the environment.
///
/// Priority:
/// 1. `GEMINI_API_KEY`
/// 2. `GOOGLE_AI_API_KEY`
pub fn get_api_key() -> Result<String, anyhow::Error> {
    for var in ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"] {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {var}");
                return Ok(key);
            }
        }
    }

    anyhow::bail!(
        "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable.\n\
         Get your API key at: https://aistudio.google.com/app/apikey"
    )
}

/// Whether an API key is configured.
pub fn has_api_key() -> bool {
    ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"]
        .iter()
        .any(|var| std::env::var(var).map(|k| !k.is_empty()).unwrap_or(false))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  a\t b\n\nc  "), "a b c");
        assert_eq!(clean_text("تدقيق   داخلي"), "تدقيق داخلي");
    }

    #[test]
    fn test_clean_text_empty_inputs() {
        assert_eq!(clean_text(""), "");
        assert_eq!(clean_text("   \n\t  "), "");
    }

    #[test]
    fn test_classify_status() {
        use reqwest::StatusCode;
        assert_eq!(
            classify_status(StatusCode::BAD_REQUEST),
            BackendErrorKind::InvalidRequest
        );
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED),
            BackendErrorKind::InvalidRequest
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            BackendErrorKind::RateLimited
        );
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            BackendErrorKind::Unknown
        );
    }

    #[test]
    fn test_backend_error_message_parses_envelope() {
        let body = r#"{"error":{"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        let message = backend_error_message(reqwest::StatusCode::BAD_REQUEST, body);
        assert!(message.contains("API key not valid"));
        assert!(message.contains("INVALID_ARGUMENT"));
    }

    #[test]
    fn test_backend_error_message_falls_back_to_raw_body() {
        let message = backend_error_message(reqwest::StatusCode::BAD_GATEWAY, "upstream down");
        assert!(message.contains("502"));
        assert!(message.contains("upstream down"));
    }

    #[test]
    fn test_is_invalid_request() {
        let fatal = EmbedError::Backend {
            kind: BackendErrorKind::InvalidRequest,
            message: "bad key".into(),
        };
        let transient = EmbedError::Backend {
            kind: BackendErrorKind::RateLimited,
            message: "slow down".into(),
        };
        assert!(fatal.is_invalid_request());
        assert!(!transient.is_invalid_request());
        assert!(!EmbedError::EmptyInput.is_invalid_request());
        assert!(!EmbedError::Timeout.is_invalid_request());
    }

    #[tokio::test]
    async fn test_embed_rejects_blank_text() {
        let embedder = GeminiEmbedding::new("fake-key".to_string()).unwrap();
        let result = embedder.embed("   \n ").await;
        assert!(matches!(result, Err(EmbedError::EmptyInput)));
    }
}
