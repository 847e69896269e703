//! Knowledge Module - the in-memory retrieval core
//!
//! - Chunker: fixed-size overlapping windows over raw document text
//! - Corpus Index: ordered embedded chunks, built once at startup
//! - Ranker: cosine-similarity top-K retrieval with a quality floor

mod chunker;
mod index;
mod ranker;

// Re-exports
pub use chunker::{split_into_chunks, ChunkConfig};
pub use index::{
    shared, swap, Chunk, CorpusIndex, EmbeddedChunk, EmbeddingSlot, SharedIndex,
};
pub use ranker::{cosine_similarity, rank, RankConfig, ScoredChunk};
