//! Corpus Index - the in-memory knowledge base
//!
//! An ordered collection of embedded chunks built once at startup and
//! read-only afterwards. The only update path is a full rebuild that swaps a
//! new instance into the shared handle; readers always see either the old
//! complete index or the new one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::embedding::{EmbedError, EmbeddingProvider};

/// Delay between consecutive embedding calls during ingestion. Sequential
/// pacing is a deliberate backpressure choice against backend rate limits.
const PACING_DELAY: Duration = Duration::from_millis(200);

// ============================================================================
// Types
// ============================================================================

/// A bounded substring of a source document, tagged with its origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Chunk text
    pub text: String,
    /// Display name of the originating document
    pub source: String,
}

/// Outcome of embedding one chunk.
///
/// A failed embedding stays in the index as `Failed` so the chunk remains
/// addressable; it collapses to a zero score only where the ranker consumes
/// it. The failure reason stays visible to logging until then.
#[derive(Debug, Clone)]
pub enum EmbeddingSlot {
    Embedded(Vec<f32>),
    Failed(String),
}

/// A chunk with its embedding outcome.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub text: String,
    pub source: String,
    pub embedding: EmbeddingSlot,
}

impl EmbeddedChunk {
    /// The embedded vector, or `None` for a failed slot.
    pub fn vector(&self) -> Option<&[f32]> {
        match &self.embedding {
            EmbeddingSlot::Embedded(values) => Some(values),
            EmbeddingSlot::Failed(_) => None,
        }
    }
}

// ============================================================================
// CorpusIndex
// ============================================================================

/// Read-only ordered collection of embedded chunks.
#[derive(Debug)]
pub struct CorpusIndex {
    chunks: Vec<EmbeddedChunk>,
    dimension: usize,
}

impl CorpusIndex {
    /// An index with no entries. Requests served against it fall back to
    /// ungrounded generation.
    pub fn empty(dimension: usize) -> Self {
        Self {
            chunks: Vec::new(),
            dimension,
        }
    }

    /// Embed `chunks` one at a time and collect the results.
    ///
    /// Strictly sequential with a short pacing delay between calls. A chunk
    /// whose embedding fails transiently keeps its place with a `Failed`
    /// slot. An `InvalidRequest` backend error (bad credentials or request
    /// format) aborts the batch immediately and returns what was accumulated:
    /// that class of error will not resolve by retrying the remaining chunks.
    pub async fn build(provider: &dyn EmbeddingProvider, chunks: Vec<Chunk>) -> Self {
        let total = chunks.len();
        tracing::info!(total, provider = provider.name(), "embedding corpus chunks");

        let mut embedded = Vec::with_capacity(total);

        for (i, chunk) in chunks.into_iter().enumerate() {
            match provider.embed(&chunk.text).await {
                Ok(values) => {
                    tracing::debug!(chunk = i + 1, total, source = %chunk.source, "embedded chunk");
                    embedded.push(EmbeddedChunk {
                        text: chunk.text,
                        source: chunk.source,
                        embedding: EmbeddingSlot::Embedded(values),
                    });
                }
                Err(EmbedError::EmptyInput) => {
                    tracing::debug!(chunk = i + 1, total, source = %chunk.source, "skipping blank chunk");
                }
                Err(err) => {
                    let abort = err.is_invalid_request();
                    tracing::warn!(
                        chunk = i + 1,
                        total,
                        source = %chunk.source,
                        error = %err,
                        "embedding failed, keeping chunk without a vector"
                    );
                    embedded.push(EmbeddedChunk {
                        text: chunk.text,
                        source: chunk.source,
                        embedding: EmbeddingSlot::Failed(err.to_string()),
                    });
                    if abort {
                        tracing::error!(
                            embedded = embedded.len(),
                            total,
                            "stopping corpus embedding: the backend rejected the request"
                        );
                        break;
                    }
                }
            }

            if i + 1 < total {
                tokio::time::sleep(PACING_DELAY).await;
            }
        }

        let index = Self {
            chunks: embedded,
            dimension: provider.dimension(),
        };
        if index.is_empty() {
            tracing::warn!("corpus index is empty; answers will not be grounded in documents");
        } else {
            tracing::info!(chunks = index.len(), "corpus index ready");
        }
        index
    }

    /// Build an index directly from already-embedded chunks.
    pub fn from_embedded(chunks: Vec<EmbeddedChunk>, dimension: usize) -> Self {
        Self { chunks, dimension }
    }

    pub fn chunks(&self) -> &[EmbeddedChunk] {
        &self.chunks
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

// ============================================================================
// Shared handle
// ============================================================================

/// Handle the request path reads the index through. The startup task replaces
/// the inner `Arc` wholesale; readers clone it and drop the lock immediately,
/// so in-flight requests keep whichever index they started with.
pub type SharedIndex = Arc<RwLock<Arc<CorpusIndex>>>;

/// Wrap an index for sharing between the server and the rebuild task.
pub fn shared(index: CorpusIndex) -> SharedIndex {
    Arc::new(RwLock::new(Arc::new(index)))
}

/// Replace the shared index atomically from the reader's perspective.
pub async fn swap(handle: &SharedIndex, index: CorpusIndex) {
    *handle.write().await = Arc::new(index);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::BackendErrorKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted provider: each call pops the next outcome.
    struct ScriptedEmbedder {
        outcomes: std::sync::Mutex<Vec<Result<Vec<f32>, EmbedError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedEmbedder {
        fn new(outcomes: Vec<Result<Vec<f32>, EmbedError>>) -> Self {
            Self {
                outcomes: std::sync::Mutex::new(outcomes),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for ScriptedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.is_empty() {
                Ok(vec![0.0; 3])
            } else {
                outcomes.remove(0)
            }
        }

        fn dimension(&self) -> usize {
            3
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn chunk(text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            source: "doc.txt".to_string(),
        }
    }

    #[tokio::test]
    async fn test_build_embeds_all_chunks() {
        let provider = ScriptedEmbedder::new(vec![
            Ok(vec![1.0, 0.0, 0.0]),
            Ok(vec![0.0, 1.0, 0.0]),
        ]);
        let index = CorpusIndex::build(&provider, vec![chunk("a"), chunk("b")]).await;

        assert_eq!(index.len(), 2);
        assert_eq!(index.dimension(), 3);
        assert!(index.chunks().iter().all(|c| c.vector().is_some()));
    }

    #[tokio::test]
    async fn test_transient_failure_keeps_chunk_without_vector() {
        let provider = ScriptedEmbedder::new(vec![
            Ok(vec![1.0, 0.0, 0.0]),
            Err(EmbedError::Backend {
                kind: BackendErrorKind::RateLimited,
                message: "429".into(),
            }),
            Ok(vec![0.0, 0.0, 1.0]),
        ]);
        let index =
            CorpusIndex::build(&provider, vec![chunk("a"), chunk("b"), chunk("c")]).await;

        // All three chunks survive; the middle one has no vector.
        assert_eq!(index.len(), 3);
        assert!(index.chunks()[0].vector().is_some());
        assert!(index.chunks()[1].vector().is_none());
        assert!(index.chunks()[2].vector().is_some());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_invalid_request_aborts_batch() {
        let provider = ScriptedEmbedder::new(vec![
            Ok(vec![1.0, 0.0, 0.0]),
            Err(EmbedError::Backend {
                kind: BackendErrorKind::InvalidRequest,
                message: "bad key".into(),
            }),
            Ok(vec![0.0, 0.0, 1.0]),
        ]);
        let index =
            CorpusIndex::build(&provider, vec![chunk("a"), chunk("b"), chunk("c")]).await;

        // The failing chunk is kept (vectorless) but the rest of the batch
        // is never attempted.
        assert_eq!(index.len(), 2);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_blank_chunk_is_dropped() {
        let provider = ScriptedEmbedder::new(vec![Err(EmbedError::EmptyInput), Ok(vec![1.0, 0.0, 0.0])]);
        let index = CorpusIndex::build(&provider, vec![chunk("   "), chunk("b")]).await;

        assert_eq!(index.len(), 1);
        assert_eq!(index.chunks()[0].text, "b");
    }

    #[tokio::test]
    async fn test_shared_swap_replaces_index() {
        let handle = shared(CorpusIndex::empty(3));
        assert!(handle.read().await.is_empty());

        let rebuilt = CorpusIndex::from_embedded(
            vec![EmbeddedChunk {
                text: "a".into(),
                source: "doc.txt".into(),
                embedding: EmbeddingSlot::Embedded(vec![1.0, 0.0, 0.0]),
            }],
            3,
        );
        swap(&handle, rebuilt).await;
        assert_eq!(handle.read().await.len(), 1);
    }

    #[test]
    fn test_empty_index() {
        let index = CorpusIndex::empty(768);
        assert!(index.is_empty());
        assert_eq!(index.dimension(), 768);
    }
}
