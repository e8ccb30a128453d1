use std::time::Duration;

use allen_agent::bootstrap::connect_engine;
use allen_agent::config::{load_dotenv, HttpArgs, LogArgs, OpenAiArgs, PineconeArgs, RetrievalArgs};
use allen_agent::logging;
use allen_agent::server::{self, AppState};
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(
    name = "allen-chat",
    about = "Web chat that answers questions about Paul Allen from the ingested corpus"
)]
struct ChatCli {
    /// Interface to bind
    #[arg(long, env = "CHAT_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to bind
    #[arg(long, env = "CHAT_PORT", default_value_t = 8000)]
    port: u16,

    /// Minutes a chat session may sit idle before it is dropped
    #[arg(long, env = "SESSION_TTL_MINUTES", default_value_t = 30)]
    session_ttl_minutes: u64,

    #[command(flatten)]
    openai: OpenAiArgs,

    #[command(flatten)]
    pinecone: PineconeArgs,

    #[command(flatten)]
    http: HttpArgs,

    #[command(flatten)]
    retrieval: RetrievalArgs,

    #[command(flatten)]
    log: LogArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = load_dotenv()?;
    let cli = ChatCli::parse();
    logging::init(&cli.log)?;
    if let Some(path) = dotenv {
        debug!(path = %path.display(), "loaded .env");
    }

    let openai = cli.openai.validate()?;
    let pinecone = cli.pinecone.validate(false)?;
    let http = cli.http.settings();
    let (router_config, answer_config) = cli.retrieval.validate()?;

    let engine = tokio::task::spawn_blocking(move || {
        connect_engine(&openai, &pinecone, http, router_config, answer_config)
    })
    .await
    .context("startup task panicked")??;

    let addr = tokio::net::lookup_host((cli.host.as_str(), cli.port))
        .await
        .with_context(|| format!("failed to resolve {}:{}", cli.host, cli.port))?
        .next()
        .ok_or_else(|| anyhow!("{}:{} resolved to no address", cli.host, cli.port))?;
    let session_ttl = Duration::from_secs(cli.session_ttl_minutes.max(1) * 60);
    server::serve(addr, AppState::new(engine, session_ttl)).await
}
