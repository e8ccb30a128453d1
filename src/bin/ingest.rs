use std::path::PathBuf;
use std::time::Duration;

use allen_agent::chunker::{Chunker, ChunkerConfig};
use allen_agent::config::{load_dotenv, HttpArgs, LogArgs, OpenAiArgs, PineconeArgs};
use allen_agent::embedder::Embedder;
use allen_agent::ingest::{ingest_text, prepare_index, read_corpus, source_label, IndexMode};
use allen_agent::logging;
use allen_agent::vector_store::VectorIndex;
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "allen-ingest",
    about = "Chunk, embed and upsert the Paul Allen corpus into the vector index"
)]
struct IngestCli {
    /// UTF-8 text file to ingest
    #[arg(long, default_value = "data/paul_allen_data.txt")]
    input_file: PathBuf,

    /// Reuse a matching index (ensure) or drop and recreate it (recreate)
    #[arg(long, value_enum, default_value_t = IndexMode::Ensure)]
    index_mode: IndexMode,

    /// Passages per embedding request
    #[arg(long, env = "INGEST_BATCH_SIZE", default_value_t = 64)]
    batch_size: usize,

    /// Seconds to wait for a new index to become ready
    #[arg(long, default_value_t = 120)]
    ready_timeout_secs: u64,

    /// Target passage size in whitespace tokens
    #[arg(long, default_value_t = 256)]
    chunk_tokens: usize,

    /// Tokens repeated between consecutive passages
    #[arg(long, default_value_t = 20)]
    chunk_overlap: usize,

    #[command(flatten)]
    openai: OpenAiArgs,

    #[command(flatten)]
    pinecone: PineconeArgs,

    #[command(flatten)]
    http: HttpArgs,

    #[command(flatten)]
    log: LogArgs,
}

fn main() -> Result<()> {
    let dotenv = load_dotenv()?;
    let cli = IngestCli::parse();
    logging::init(&cli.log)?;
    if let Some(path) = dotenv {
        debug!(path = %path.display(), "loaded .env");
    }

    let openai = cli.openai.validate()?;
    let pinecone = cli.pinecone.validate(true)?;
    let http = cli.http.settings();
    let spec = pinecone
        .serverless
        .clone()
        .ok_or_else(|| anyhow!("serverless placement is required to create the index"))?;
    // surface a bad path before any remote call
    let text = read_corpus(&cli.input_file)?;

    let chunker = Chunker::new(ChunkerConfig {
        chunk_target_tokens: cli.chunk_tokens,
        chunk_overlap_tokens: cli.chunk_overlap,
    });
    let embedder = openai.build_embedder(&http, cli.batch_size.max(1))?;
    let client = pinecone.build_client(&http)?;
    let description = prepare_index(
        &client,
        &pinecone.index,
        openai.embedding_dim,
        &spec,
        cli.index_mode,
        Duration::from_secs(cli.ready_timeout_secs.max(1)),
    )
    .with_context(|| format!("failed to prepare index '{}'", pinecone.index))?;
    let index = client.index(&description, &pinecone.namespace);
    info!(
        input = %cli.input_file.display(),
        index = %pinecone.index,
        model = embedder.model(),
        batch_size = embedder.batch_size(),
        "starting ingestion"
    );

    let report = ingest_text(
        &source_label(&cli.input_file),
        &text,
        &chunker,
        &embedder,
        &index,
        openai.embedding_dim,
    )?;
    match index.vector_count() {
        Ok(count) => info!(vectors = count, "index stats"),
        Err(err) => warn!(error = %format!("{err:#}"), "failed to read index stats"),
    }
    println!(
        "ingested {} passages from {} ({} vectors upserted in {} batches, {:.1}s)",
        report.passages,
        cli.input_file.display(),
        report.upserted,
        report.batches,
        report.elapsed.as_secs_f64()
    );
    Ok(())
}
