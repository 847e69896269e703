//! Document Collection Module
//!
//! The ingestion boundary: everything upstream of the chunker is consumed as
//! `(rawText, documentName, mimeType)` triples. A small local-directory
//! source is provided so the server and CLI run against a folder of
//! plain-text documents; any richer connector (remote drives, PDF
//! conversion) lives outside this crate and only has to produce the same
//! triples.

use std::path::Path;

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::knowledge::{split_into_chunks, Chunk, ChunkConfig};

// ============================================================================
// Types
// ============================================================================

/// One document as delivered by a source connector.
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// Display name, used as the citation source for every chunk
    pub name: String,
    /// MIME type reported by the connector
    pub mime_type: String,
    /// Extracted plain text
    pub text: String,
}

// ============================================================================
// Directory Source
// ============================================================================

/// MIME type for a file extension this source understands.
fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_lowercase().as_str() {
        "txt" => Some("text/plain"),
        "md" | "markdown" => Some("text/markdown"),
        _ => None,
    }
}

/// Collect raw documents from a directory tree.
///
/// Files with an unsupported extension are skipped with a warning, as are
/// files that cannot be read as UTF-8 text. Walk order is stabilized by file
/// name so repeated runs index chunks in the same order.
pub fn collect_dir(dir: &Path) -> Result<Vec<RawDocument>> {
    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut documents = Vec::new();

    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();

        let Some(mime_type) = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(mime_for_extension)
        else {
            tracing::warn!(file = %path.display(), "unsupported file type, skipping");
            continue;
        };

        match std::fs::read_to_string(path) {
            Ok(text) => documents.push(RawDocument {
                name,
                mime_type: mime_type.to_string(),
                text,
            }),
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "failed to read file, skipping");
            }
        }
    }

    tracing::info!(documents = documents.len(), dir = %dir.display(), "collected documents");
    Ok(documents)
}

// ============================================================================
// Ingestion
// ============================================================================

/// Turn raw documents into chunks ready for embedding.
///
/// Only plain-text-extractable types (`text/*`) are accepted; anything else
/// is skipped with a warning, not an error. Documents with no usable text
/// are skipped the same way.
pub fn chunk_documents(documents: &[RawDocument], config: &ChunkConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for doc in documents {
        if !doc.mime_type.starts_with("text/") {
            tracing::warn!(document = %doc.name, mime = %doc.mime_type, "unsupported mime type, skipping");
            continue;
        }
        if doc.text.trim().is_empty() {
            tracing::warn!(document = %doc.name, "no text extracted, skipping");
            continue;
        }

        let doc_chunks = split_into_chunks(&doc.text, &doc.name, config);
        tracing::info!(document = %doc.name, chunks = doc_chunks.len(), "chunked document");
        chunks.extend(doc_chunks);
    }

    tracing::info!(total = chunks.len(), "created text chunks");
    chunks
}

/// Collect a directory and chunk everything in one pass.
pub fn ingest_dir(dir: &Path, config: &ChunkConfig) -> Result<Vec<Chunk>> {
    let documents = collect_dir(dir).context("failed to collect documents")?;
    Ok(chunk_documents(&documents, config))
}

// ============================================================================
// Tests
// ============================================================================
