//! audit-rag - internal-audit assistant backend
//!
//! Answers natural-language questions about internal-audit topics by
//! retrieving relevant passages from a private document corpus and grounding
//! a Gemini generation call on them. Queries outside the audit domain are
//! refused by a bilingual keyword gate before any backend call is made.

pub mod cli;
pub mod collector;
pub mod embedding;
pub mod generation;
pub mod knowledge;
pub mod language;
pub mod pipeline;
pub mod server;

// Re-exports
pub use collector::{chunk_documents, collect_dir, ingest_dir, RawDocument};
pub use embedding::{
    get_api_key, has_api_key, BackendErrorKind, EmbedError, EmbeddingProvider, GeminiEmbedding,
    EMBEDDING_DIMENSION,
};
pub use generation::{GenerateError, GenerationConfig, GenerationProvider, GeminiGenerator};
pub use knowledge::{
    cosine_similarity, rank, split_into_chunks, Chunk, ChunkConfig, CorpusIndex, EmbeddedChunk,
    EmbeddingSlot, RankConfig, ScoredChunk, SharedIndex,
};
pub use language::{
    analyze, expand, ConceptAnalysis, ExpandedQuery, Language, SearchStrategy,
};
pub use pipeline::{build_prompt, ChatError, ChatPipeline, ChatReply, MODEL_NAME, REFUSAL_MESSAGE};
