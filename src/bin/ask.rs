use allen_agent::bootstrap::connect_engine;
use allen_agent::config::{load_dotenv, HttpArgs, LogArgs, OpenAiArgs, PineconeArgs, RetrievalArgs};
use allen_agent::logging;
use allen_agent::rag::{render_context, Reply};
use allen_agent::topics::REFUSAL_MESSAGE;
use anyhow::Result;
use clap::Parser;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(
    name = "allen-ask",
    about = "Ask a single question about Paul Allen from the command line"
)]
struct AskCli {
    /// Question to answer
    #[arg(long)]
    query: String,

    /// Only print the routing decision and retrieved context (skip the LLM call)
    #[arg(long, default_value_t = false)]
    dry_run: bool,

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

fn main() -> Result<()> {
    let dotenv = load_dotenv()?;
    let cli = AskCli::parse();
    logging::init(&cli.log)?;
    if let Some(path) = dotenv {
        debug!(path = %path.display(), "loaded .env");
    }

    let openai = cli.openai.validate()?;
    let pinecone = cli.pinecone.validate(false)?;
    let http = cli.http.settings();
    let (router_config, answer_config) = cli.retrieval.validate()?;
    let engine = connect_engine(&openai, &pinecone, http, router_config, answer_config)?;

    if cli.dry_run {
        let retrieval = engine.retrieve(&cli.query)?;
        println!(
            "--- Route ---\n{} ({:?}, score {:.4})\n",
            retrieval.decision.route.as_deref().unwrap_or("none"),
            retrieval.decision.label,
            retrieval.decision.score
        );
        if retrieval.decision.is_in_domain() {
            println!("--- Retrieved Context ---\n{}", render_context(&retrieval.passages));
        } else {
            println!("--- Refusal ---\n{REFUSAL_MESSAGE}");
        }
        println!("dry-run enabled; skipping LLM call.");
        return Ok(());
    }

    match engine.respond(&cli.query, &[])? {
        Reply::Refused { .. } => println!("{REFUSAL_MESSAGE}"),
        Reply::Answered { text, passages, .. } => {
            println!("--- Retrieved Context ---\n{}", render_context(&passages));
            println!("--- Answer ---\n{text}");
        }
    }
    Ok(())
}
