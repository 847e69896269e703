//! Generation Module - answer synthesis through the Gemini API
//!
//! Thin adapter over the `generateContent` endpoint. A safety block is a
//! distinct outcome that must reach the user with its reason; every other
//! backend failure surfaces as a generic request-level error.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::embedding::{backend_error_message, BackendErrorKind};

// ============================================================================
// Errors
// ============================================================================

/// Generation failure taxonomy.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The prompt was blocked by the backend's safety layer. The reason is
    /// surfaced to the end user verbatim, never hidden behind a generic
    /// failure.
    #[error("generation blocked: {reason}")]
    Blocked { reason: String },

    #[error("generation backend error ({kind:?}): {message}")]
    Backend {
        kind: BackendErrorKind,
        message: String,
    },

    #[error("generation request timed out")]
    Timeout,
}

// ============================================================================
// GenerationProvider Trait
// ============================================================================

/// Interface for producing an answer from a fully assembled prompt.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerateError>;
}

// ============================================================================
// Google Gemini Generation
// ============================================================================

/// Gemini generation endpoint
const GEMINI_GENERATE_URL: &str =
    "https://generativelanguage.googleapis.com/v1/models/gemini-1.5-pro:generateContent";

/// Upper bound on a single backend call
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Returned when the backend answers successfully but with no usable text.
const EMPTY_RESPONSE_APOLOGY: &str =
    "I am sorry, but I could not generate a response. Please try again.";

/// Sampling settings sent with every request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: 4096,
        }
    }
}

/// Gemini generation client.
#[derive(Debug)]
pub struct GeminiGenerator {
    api_key: String,
    client: reqwest::Client,
    config: GenerationConfig,
}

impl GeminiGenerator {
    pub fn new(api_key: String) -> Result<Self, anyhow::Error> {
        Self::with_config(api_key, GenerationConfig::default())
    }

    pub fn with_config(api_key: String, config: GenerationConfig) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            api_key,
            client,
            config,
        })
    }

    /// Create a client from the `GEMINI_API_KEY` / `GOOGLE_AI_API_KEY`
    /// environment variables.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        Self::new(crate::embedding::get_api_key()?)
    }
}

// ----------------------------------------------------------------------------
// Wire format
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

impl GenerateResponse {
    /// Text of the first candidate's first part, if any.
    fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.first())
            .and_then(|p| p.text.as_deref())
            .filter(|t| !t.is_empty())
    }

    fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
    }
}

fn map_transport_error(err: reqwest::Error) -> GenerateError {
    if err.is_timeout() {
        GenerateError::Timeout
    } else {
        GenerateError::Backend {
            kind: BackendErrorKind::Unknown,
            message: err.to_string(),
        }
    }
}

fn classify_status(status: reqwest::StatusCode) -> BackendErrorKind {
    match status.as_u16() {
        400 | 401 | 403 => BackendErrorKind::InvalidRequest,
        429 => BackendErrorKind::RateLimited,
        _ => BackendErrorKind::Unknown,
    }
}

#[async_trait]
impl GenerationProvider for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: self.config.clone(),
        };

        let response = self
            .client
            .post(GEMINI_GENERATE_URL)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;

        if !status.is_success() {
            return Err(GenerateError::Backend {
                kind: classify_status(status),
                message: backend_error_message(status, &body),
            });
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&body).map_err(|e| GenerateError::Backend {
                kind: BackendErrorKind::Unknown,
                message: format!("malformed generation response: {e}"),
            })?;

        if let Some(text) = parsed.first_text() {
            return Ok(text.to_string());
        }

        if let Some(reason) = parsed.block_reason() {
            return Err(GenerateError::Blocked {
                reason: reason.to_string(),
            });
        }

        tracing::warn!("generation response had no candidates and no block reason");
        Ok(EMPTY_RESPONSE_APOLOGY.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
