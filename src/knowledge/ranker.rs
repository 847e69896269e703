//! Similarity Ranker - cosine scoring against the corpus index
//!
//! Scores a query embedding against every corpus entry, keeps the best K,
//! then drops anything below the quality floor. Filtering happens after
//! truncation so a small high-quality corpus is never starved by the
//! threshold alone.

use super::index::CorpusIndex;

// ============================================================================
// Configuration
// ============================================================================

/// Ranking parameters. The defaults come from the deployed system; neither
/// value is known to be optimal, so both stay configurable.
#[derive(Debug, Clone)]
pub struct RankConfig {
    /// Maximum number of results
    pub top_k: usize,
    /// Quality floor: results must score strictly above this
    pub min_score: f32,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: 0.1,
        }
    }
}

// ============================================================================
// Types
// ============================================================================

/// A corpus chunk scored against one query embedding. Transient; exists only
/// within a single ranking call and the prompt built from it.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub text: String,
    pub source: String,
    /// Cosine similarity in [-1, 1]
    pub score: f32,
}

// ============================================================================
// Cosine Similarity
// ============================================================================

/// Cosine similarity between two vectors, in [-1.0, 1.0].
///
/// Defined as exactly 0.0 when either vector has zero magnitude (or the
/// lengths differ), so an unembeddable chunk ranks as maximally dissimilar
/// instead of erroring.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ============================================================================
// Ranking
// ============================================================================

/// Score every index entry against `query_embedding` and return the top
/// results.
///
/// Order of operations: score all chunks, stable-sort descending (equal
/// scores keep their original index order), truncate to `top_k`, then filter
/// to `score > min_score`. Chunks without a vector score 0. Chunks whose
/// vector length disagrees with the query are skipped with a warning rather
/// than silently truncated.
pub fn rank(query_embedding: &[f32], index: &CorpusIndex, config: &RankConfig) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = Vec::with_capacity(index.len());

    for chunk in index.chunks() {
        let score = match chunk.vector() {
            Some(vector) if vector.len() != query_embedding.len() => {
                tracing::warn!(
                    source = %chunk.source,
                    expected = query_embedding.len(),
                    actual = vector.len(),
                    "dimension mismatch, skipping chunk"
                );
                continue;
            }
            Some(vector) => cosine_similarity(query_embedding, vector),
            None => 0.0,
        };

        scored.push(ScoredChunk {
            text: chunk.text.clone(),
            source: chunk.source.clone(),
            score,
        });
    }

    // Stable sort: ties keep original corpus order.
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(config.top_k);
    scored.retain(|chunk| chunk.score > config.min_score);
    scored
}

// ============================================================================
// Tests
// ============================================================================
