//! Chat Pipeline - one request through the retrieval core
//!
//! Gate -> expand -> embed -> rank -> assemble -> generate. The gate runs
//! before any backend call: an off-topic query costs nothing and gets the
//! fixed refusal. Past the gate, retrieval failures degrade to an ungrounded
//! answer; only a generation failure (or a rejected request) fails the
//! request itself.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::embedding::{EmbedError, EmbeddingProvider};
use crate::generation::{GenerateError, GenerationProvider};
use crate::knowledge::{rank, RankConfig, ScoredChunk, SharedIndex};
use crate::language::expand;

// ============================================================================
// Fixed Messages
// ============================================================================

/// Model name advertised in every reply.
pub const MODEL_NAME: &str = "gemini-pro";

/// Polite refusal for queries outside the internal-audit domain.
pub const REFUSAL_MESSAGE: &str = "عذراً، هذا الشات بوت متخصص فقط في الإجابة على الأسئلة المتعلقة بالتدقيق الداخلي. يرجى طرح سؤال متعلق بمجال التدقيق الداخلي أو المراجعة الداخلية.";

// ============================================================================
// Answer Assembler
// ============================================================================

/// Build the generation prompt.
///
/// With retrieved chunks the prompt is grounded: each chunk is cited as
/// `[rank] text (المصدر: source)` and the model is instructed to answer from
/// that context. With none, the model is asked to answer as fully as it can
/// on its own.
pub fn build_prompt(enhanced_query: &str, chunks: &[ScoredChunk]) -> String {
    if chunks.is_empty() {
        return format!(
            "سؤال المستخدم: \"{enhanced_query}\"\nيرجى تقديم إجابة شاملة ومفصلة وشرح موسع على قدر الإمكان."
        );
    }

    let context = chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| format!("[{}] {} (المصدر: {})", i + 1, chunk.text, chunk.source))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "السياق من المستندات:\n{context}\n\nسؤال المستخدم: \"{enhanced_query}\"\nيرجى تقديم إجابة شاملة ومفصلة وشرح موسع بناءً على السياق أعلاه."
    )
}

// ============================================================================
// Types
// ============================================================================

/// Reply returned over the query API boundary.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub model: String,
    /// Source names of the cited chunks; empty when the gate refused or no
    /// chunk scored above the floor.
    pub sources: Vec<String>,
    /// Similarity scores aligned with `sources`.
    pub scores: Vec<f32>,
}

impl ChatReply {
    fn refusal() -> Self {
        Self {
            response: REFUSAL_MESSAGE.to_string(),
            model: MODEL_NAME.to_string(),
            sources: Vec::new(),
            scores: Vec::new(),
        }
    }
}

/// Request-level failure. Everything here reaches the caller as a generic
/// message; raw backend text stays in the logs.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("query embedding rejected: {0}")]
    Embedding(EmbedError),
    #[error("generation failed: {0}")]
    Generation(GenerateError),
}

// ============================================================================
// ChatPipeline
// ============================================================================

/// The retrieval-augmented answer pipeline. One instance serves all
/// requests; per-request state lives on the stack.
pub struct ChatPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    index: SharedIndex,
    rank_config: RankConfig,
}

impl ChatPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
        index: SharedIndex,
        rank_config: RankConfig,
    ) -> Self {
        Self {
            embedder,
            generator,
            index,
            rank_config,
        }
    }

    /// Shared index handle (for the rebuild task).
    pub fn index(&self) -> &SharedIndex {
        &self.index
    }

    /// Answer one user message.
    pub async fn chat(&self, message: &str) -> Result<ChatReply, ChatError> {
        let expanded = expand(message);
        tracing::info!(
            language = %expanded.analysis.language,
            strategy = %expanded.strategy,
            concepts = expanded.analysis.concepts.len(),
            "analyzed query"
        );

        // Off-topic: refuse before any backend call is made.
        if !expanded.is_audit_related() {
            tracing::info!("query outside the audit domain, refusing");
            return Ok(ChatReply::refusal());
        }

        // Readers take the lock only long enough to clone the handle.
        let index = self.index.read().await.clone();

        let ranked = match self.embedder.embed(&expanded.enhanced_query).await {
            Ok(query_embedding) => rank(&query_embedding, &index, &self.rank_config),
            Err(err) if err.is_invalid_request() => {
                return Err(ChatError::Embedding(err));
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "query embedding failed, answering without document context"
                );
                Vec::new()
            }
        };

        let prompt = build_prompt(&expanded.enhanced_query, &ranked);
        tracing::debug!(chunks = ranked.len(), grounded = !ranked.is_empty(), "built prompt");

        let response = match self.generator.generate(&prompt).await {
            Ok(text) => text,
            Err(GenerateError::Blocked { reason }) => {
                tracing::warn!(reason = %reason, "generation blocked");
                format!(
                    "I am unable to answer this question because it was blocked for the following reason: {reason}."
                )
            }
            Err(err) => return Err(ChatError::Generation(err)),
        };

        Ok(ChatReply {
            response,
            model: MODEL_NAME.to_string(),
            sources: ranked.iter().map(|c| c.source.clone()).collect(),
            scores: ranked.iter().map(|c| c.score).collect(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::BackendErrorKind;
    use crate::knowledge::{shared, CorpusIndex, EmbeddedChunk, EmbeddingSlot};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embedder that always returns the same vector, counting calls.
    struct FixedEmbedder {
        vector: Vec<f32>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.vector.clone())
        }

        fn dimension(&self) -> usize {
            self.vector.len()
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    /// Embedder that always fails with the given kind.
    struct FailingEmbedder {
        kind: BackendErrorKind,
    }

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            Err(EmbedError::Backend {
                kind: self.kind,
                message: "scripted failure".into(),
            })
        }

        fn dimension(&self) -> usize {
            3
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    /// Generator that echoes the prompt, counting calls.
    struct EchoGenerator {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl GenerationProvider for EchoGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("echo: {prompt}"))
        }
    }

    struct BlockedGenerator;

    #[async_trait]
    impl GenerationProvider for BlockedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerateError> {
            Err(GenerateError::Blocked {
                reason: "SAFETY".into(),
            })
        }
    }

    fn corpus_chunk(source: &str, vector: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            text: format!("content of {source}"),
            source: source.to_string(),
            embedding: EmbeddingSlot::Embedded(vector),
        }
    }

    fn pipeline_with(
        index: CorpusIndex,
        vector: Vec<f32>,
    ) -> (ChatPipeline, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let embed_calls = Arc::new(AtomicUsize::new(0));
        let generate_calls = Arc::new(AtomicUsize::new(0));
        let pipeline = ChatPipeline::new(
            Arc::new(FixedEmbedder {
                vector,
                calls: embed_calls.clone(),
            }),
            Arc::new(EchoGenerator {
                calls: generate_calls.clone(),
            }),
            shared(index),
            RankConfig::default(),
        );
        (pipeline, embed_calls, generate_calls)
    }

    #[test]
    fn test_build_prompt_grounded() {
        let chunks = vec![
            ScoredChunk {
                text: "controls matter".into(),
                source: "manual.pdf".into(),
                score: 0.9,
            },
            ScoredChunk {
                text: "risk registers".into(),
                source: "guide.docx".into(),
                score: 0.5,
            },
        ];
        let prompt = build_prompt("what are controls", &chunks);

        assert!(prompt.contains("السياق من المستندات"));
        assert!(prompt.contains("[1] controls matter (المصدر: manual.pdf)"));
        assert!(prompt.contains("[2] risk registers (المصدر: guide.docx)"));
        assert!(prompt.contains("\"what are controls\""));
    }

    #[test]
    fn test_build_prompt_ungrounded() {
        let prompt = build_prompt("what are controls", &[]);
        assert!(!prompt.contains("السياق من المستندات"));
        assert!(prompt.contains("\"what are controls\""));
    }

    #[tokio::test]
    async fn test_out_of_domain_query_is_refused_without_backend_calls() {
        let (pipeline, embed_calls, generate_calls) =
            pipeline_with(CorpusIndex::empty(3), vec![1.0, 0.0, 0.0]);

        let reply = pipeline.chat("What is the weather today?").await.unwrap();

        assert_eq!(reply.response, REFUSAL_MESSAGE);
        assert!(reply.sources.is_empty());
        assert!(reply.scores.is_empty());
        assert_eq!(embed_calls.load(Ordering::SeqCst), 0);
        assert_eq!(generate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_corpus_still_answers_ungrounded() {
        let (pipeline, _, generate_calls) =
            pipeline_with(CorpusIndex::empty(3), vec![1.0, 0.0, 0.0]);

        let reply = pipeline.chat("What are internal controls?").await.unwrap();

        assert!(reply.sources.is_empty());
        assert!(reply.scores.is_empty());
        assert!(!reply.response.is_empty());
        assert_eq!(generate_calls.load(Ordering::SeqCst), 1);
        // Ungrounded prompt: no context header.
        assert!(!reply.response.contains("السياق من المستندات"));
    }

    #[tokio::test]
    async fn test_identical_embedding_ranks_first_with_perfect_score() {
        let index = CorpusIndex::from_embedded(
            vec![
                corpus_chunk("other.txt", vec![0.0, 1.0, 0.0]),
                corpus_chunk("match.txt", vec![1.0, 0.0, 0.0]),
            ],
            3,
        );
        let (pipeline, _, _) = pipeline_with(index, vec![1.0, 0.0, 0.0]);

        let reply = pipeline.chat("What are internal controls?").await.unwrap();

        assert_eq!(reply.sources[0], "match.txt");
        assert!((reply.scores[0] - 1.0).abs() < 0.0001);
        // The grounded prompt reached the generator.
        assert!(reply.response.contains("السياق من المستندات"));
    }

    #[tokio::test]
    async fn test_transient_embed_failure_degrades_to_ungrounded() {
        let generate_calls = Arc::new(AtomicUsize::new(0));
        let pipeline = ChatPipeline::new(
            Arc::new(FailingEmbedder {
                kind: BackendErrorKind::RateLimited,
            }),
            Arc::new(EchoGenerator {
                calls: generate_calls.clone(),
            }),
            shared(CorpusIndex::empty(3)),
            RankConfig::default(),
        );

        let reply = pipeline.chat("What are internal controls?").await.unwrap();

        assert!(reply.sources.is_empty());
        assert_eq!(generate_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_request_on_query_fails_the_request() {
        let pipeline = ChatPipeline::new(
            Arc::new(FailingEmbedder {
                kind: BackendErrorKind::InvalidRequest,
            }),
            Arc::new(EchoGenerator {
                calls: Arc::new(AtomicUsize::new(0)),
            }),
            shared(CorpusIndex::empty(3)),
            RankConfig::default(),
        );

        let result = pipeline.chat("What are internal controls?").await;
        assert!(matches!(result, Err(ChatError::Embedding(_))));
    }

    #[tokio::test]
    async fn test_blocked_generation_surfaces_reason() {
        let pipeline = ChatPipeline::new(
            Arc::new(FixedEmbedder {
                vector: vec![1.0, 0.0, 0.0],
                calls: Arc::new(AtomicUsize::new(0)),
            }),
            Arc::new(BlockedGenerator),
            shared(CorpusIndex::empty(3)),
            RankConfig::default(),
        );

        let reply = pipeline.chat("What are internal controls?").await.unwrap();
        assert!(reply.response.contains("blocked for the following reason: SAFETY"));
    }
}
