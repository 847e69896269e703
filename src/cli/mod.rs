//! CLI Module
//!
//! Subcommand definitions and runners for the audit assistant.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::collector::ingest_dir;
use crate::embedding::{has_api_key, EmbeddingProvider, GeminiEmbedding};
use crate::generation::GeminiGenerator;
use crate::knowledge::{shared, ChunkConfig, CorpusIndex, RankConfig};
use crate::language::analyze;
use crate::pipeline::ChatPipeline;
use crate::server;

/// Port used when neither `--port` nor `PORT` is set.
const DEFAULT_PORT: u16 = 3001;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "audit-rag")]
#[command(version, about = "Internal-audit RAG assistant", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the chat API server
    Serve {
        /// Port to listen on (falls back to the PORT environment variable)
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory of plain-text documents to index at startup
        #[arg(short, long)]
        docs: Option<PathBuf>,
    },

    /// Ask a single question against a documents directory
    Ask {
        /// The question
        question: String,

        /// Directory of plain-text documents to index first
        #[arg(short, long)]
        docs: Option<PathBuf>,

        /// Maximum number of cited chunks
        #[arg(long, default_value_t = 5)]
        top_k: usize,

        /// Minimum similarity score for a citation
        #[arg(long, default_value_t = 0.1)]
        min_score: f32,
    },

    /// Show how the relevance gate reads a query (no network calls)
    Analyze {
        /// The query to analyze
        query: String,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

/// Execute the parsed command.
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve { port, docs } => cmd_serve(port, docs).await,
        Commands::Ask {
            question,
            docs,
            top_k,
            min_score,
        } => cmd_ask(&question, docs, top_k, min_score).await,
        Commands::Analyze { query } => cmd_analyze(&query),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

fn require_api_key() -> Result<()> {
    if !has_api_key() {
        bail!(
            "API key not configured.\n\n\
             Set one of:\n  \
             export GEMINI_API_KEY=your-api-key\n  \
             export GOOGLE_AI_API_KEY=your-api-key\n\n\
             Get your API key at: https://aistudio.google.com/app/apikey"
        );
    }
    Ok(())
}

fn resolve_port(flag: Option<u16>) -> u16 {
    flag.or_else(|| std::env::var("PORT").ok().and_then(|p| p.parse().ok()))
        .unwrap_or(DEFAULT_PORT)
}

/// `serve` - run the HTTP server, indexing in the background.
async fn cmd_serve(port: Option<u16>, docs: Option<PathBuf>) -> Result<()> {
    require_api_key()?;

    let embedder: Arc<GeminiEmbedding> =
        Arc::new(GeminiEmbedding::from_env().context("failed to create embedder")?);
    let generator = Arc::new(GeminiGenerator::from_env().context("failed to create generator")?);

    let index = shared(CorpusIndex::empty(embedder.dimension()));
    let pipeline = Arc::new(ChatPipeline::new(
        embedder.clone(),
        generator,
        index,
        RankConfig::default(),
    ));

    server::serve(
        pipeline,
        embedder,
        docs,
        ChunkConfig::default(),
        resolve_port(port),
    )
    .await
}

/// `ask` - index a directory in the foreground, then answer one question.
async fn cmd_ask(
    question: &str,
    docs: Option<PathBuf>,
    top_k: usize,
    min_score: f32,
) -> Result<()> {
    require_api_key()?;

    let embedder: Arc<GeminiEmbedding> =
        Arc::new(GeminiEmbedding::from_env().context("failed to create embedder")?);
    let generator = Arc::new(GeminiGenerator::from_env().context("failed to create generator")?);

    let index = if let Some(ref dir) = docs {
        println!("[*] Indexing documents from {}...", dir.display());
        let chunks = ingest_dir(dir, &ChunkConfig::default())?;
        let built = CorpusIndex::build(embedder.as_ref(), chunks).await;
        println!("[*] Indexed {} chunks", built.len());
        built
    } else {
        println!("[!] No documents directory given; answering without grounding");
        CorpusIndex::empty(embedder.dimension())
    };

    let pipeline = ChatPipeline::new(
        embedder,
        generator,
        shared(index),
        RankConfig { top_k, min_score },
    );

    let reply = pipeline
        .chat(question)
        .await
        .context("failed to answer the question")?;

    println!();
    println!("{}", reply.response);

    if !reply.sources.is_empty() {
        println!();
        println!("Sources:");
        for (source, score) in reply.sources.iter().zip(&reply.scores) {
            println!("  [{score:.3}] {source}");
        }
    }

    Ok(())
}

/// `analyze` - print the relevance gate's view of a query.
fn cmd_analyze(query: &str) -> Result<()> {
    let analysis = analyze(query);
    let expanded = crate::language::expand(query);

    println!("original:      {}", analysis.original);
    println!("normalized:    {}", analysis.normalized);
    println!("language:      {}", analysis.language);
    println!("concepts:      {}", analysis.concepts.join(", "));
    println!("audit-related: {}", analysis.is_audit_related);
    println!("strategy:      {}", expanded.strategy);
    if expanded.enhanced_query != analysis.original {
        println!("expanded:      {}", expanded.enhanced_query);
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
