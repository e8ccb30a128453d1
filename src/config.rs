//! Process-wide settings shared by the binaries.
//!
//! Every knob is a clap flag backed by an environment variable, so the same
//! `.env` file drives ingestion, the chat server and the one-shot CLI. Raw
//! arguments are turned into validated settings once, at startup.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Args;

use crate::embedder::openai::OpenAiEmbedder;
use crate::error::ConfigError;
use crate::llm::openai::OpenAiChatModel;
use crate::pinecone::{PineconeClient, ServerlessSpec};
use crate::rag::AnswerConfig;
use crate::router::RouterConfig;
use crate::vector_store::IndexName;

/// Default OpenAI-compatible API root.
pub const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";
/// Default Pinecone control-plane root.
pub const DEFAULT_PINECONE_CONTROLLER: &str = "https://api.pinecone.io";

/// Loads `.env` from the working directory (or a parent) into the process
/// environment. A missing file is fine; a malformed one is not.
pub fn load_dotenv() -> Result<Option<PathBuf>> {
    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(err) if err.not_found() => Ok(None),
        Err(err) => Err(anyhow::Error::new(err).context("failed to parse .env file")),
    }
}

/// Language-model provider settings (embeddings and chat completions).
#[derive(Args, Debug, Clone)]
pub struct OpenAiArgs {
    /// API key for the embedding and chat completion endpoints
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Base URL for the OpenAI-compatible API
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_OPENAI_BASE)]
    pub openai_base_url: String,

    /// Embedding model identifier
    #[arg(long, env = "EMBEDDING_MODEL", default_value = "text-embedding-3-small")]
    pub embedding_model: String,

    /// Embedding dimensionality; must match the vector index
    #[arg(long, env = "EMBEDDING_DIM", default_value_t = 1024)]
    pub embedding_dim: usize,

    /// Chat completion model used to write answers
    #[arg(long, env = "CHAT_MODEL", default_value = "gpt-4o")]
    pub chat_model: String,
}

/// Validated language-model settings.
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    /// Bearer token.
    pub api_key: String,
    /// API root without trailing slash.
    pub base_url: String,
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Expected vector length.
    pub embedding_dim: usize,
    /// Chat model identifier.
    pub chat_model: String,
}

impl OpenAiArgs {
    /// Checks required values and normalizes the rest.
    pub fn validate(&self) -> Result<OpenAiSettings, ConfigError> {
        let api_key = required(&self.openai_api_key, "OPENAI_API_KEY")?;
        let base_url = http_url(&self.openai_base_url, "OPENAI_BASE_URL")?;
        let embedding_model = non_blank(&self.embedding_model, "EMBEDDING_MODEL")?;
        let chat_model = non_blank(&self.chat_model, "CHAT_MODEL")?;
        if self.embedding_dim == 0 {
            return Err(ConfigError::Invalid {
                var: "EMBEDDING_DIM",
                reason: "must be a positive integer".to_string(),
            });
        }
        Ok(OpenAiSettings {
            api_key,
            base_url,
            embedding_model,
            embedding_dim: self.embedding_dim,
            chat_model,
        })
    }
}

impl OpenAiSettings {
    /// Builds the embeddings client.
    pub fn build_embedder(&self, http: &HttpSettings, batch_size: usize) -> Result<OpenAiEmbedder> {
        OpenAiEmbedder::new(
            self.api_key.clone(),
            self.base_url.clone(),
            self.embedding_model.clone(),
            Some(self.embedding_dim),
            http.timeout,
            http.max_attempts,
            batch_size,
        )
    }

    /// Builds the chat completions client.
    pub fn build_chat_model(&self, http: &HttpSettings) -> Result<OpenAiChatModel> {
        OpenAiChatModel::new(
            self.api_key.clone(),
            self.base_url.clone(),
            self.chat_model.clone(),
            http.completion_timeout(),
            http.max_attempts,
        )
    }
}

/// Vector database settings.
#[derive(Args, Debug, Clone)]
pub struct PineconeArgs {
    /// Pinecone API key
    #[arg(long, env = "PINECONE_API_KEY", hide_env_values = true)]
    pub pinecone_api_key: Option<String>,

    /// Name of the index holding the passages
    #[arg(long, env = "PINECONE_INDEX_NAME")]
    pub pinecone_index_name: Option<String>,

    /// Cloud provider for serverless index creation (aws, gcp, azure)
    #[arg(long, env = "PINECONE_CLOUD")]
    pub pinecone_cloud: Option<String>,

    /// Region for serverless index creation (e.g. us-east-1)
    #[arg(long, env = "PINECONE_REGION")]
    pub pinecone_region: Option<String>,

    /// Namespace inside the index (empty = default namespace)
    #[arg(long, env = "PINECONE_NAMESPACE", default_value = "")]
    pub pinecone_namespace: String,

    /// Control-plane API root
    #[arg(long, env = "PINECONE_CONTROLLER_URL", default_value = DEFAULT_PINECONE_CONTROLLER)]
    pub pinecone_controller_url: String,
}

/// Validated vector database settings.
#[derive(Debug, Clone)]
pub struct PineconeSettings {
    /// API key.
    pub api_key: String,
    /// Target index.
    pub index: IndexName,
    /// Namespace inside the index.
    pub namespace: String,
    /// Control-plane API root.
    pub controller_url: String,
    /// Where to create the index; only present when creation was requested.
    pub serverless: Option<ServerlessSpec>,
}

impl PineconeArgs {
    /// Checks required values. `needs_serverless` is set by callers that may
    /// create the index and therefore need cloud and region.
    pub fn validate(&self, needs_serverless: bool) -> Result<PineconeSettings, ConfigError> {
        let api_key = required(&self.pinecone_api_key, "PINECONE_API_KEY")?;
        let raw_index = required(&self.pinecone_index_name, "PINECONE_INDEX_NAME")?;
        let index = IndexName::new(raw_index).map_err(|err| ConfigError::Invalid {
            var: "PINECONE_INDEX_NAME",
            reason: err.to_string(),
        })?;
        let controller_url = http_url(&self.pinecone_controller_url, "PINECONE_CONTROLLER_URL")?;
        let serverless = if needs_serverless {
            Some(ServerlessSpec {
                cloud: required(&self.pinecone_cloud, "PINECONE_CLOUD")?,
                region: required(&self.pinecone_region, "PINECONE_REGION")?,
            })
        } else {
            None
        };
        Ok(PineconeSettings {
            api_key,
            index,
            namespace: self.pinecone_namespace.trim().to_string(),
            controller_url,
            serverless,
        })
    }
}

impl PineconeSettings {
    /// Builds the REST client.
    pub fn build_client(&self, http: &HttpSettings) -> Result<PineconeClient> {
        PineconeClient::new(
            self.api_key.clone(),
            self.controller_url.clone(),
            http.timeout,
            http.max_attempts,
        )
    }
}

/// Outbound HTTP behaviour shared by all clients.
#[derive(Args, Debug, Clone)]
pub struct HttpArgs {
    /// Seconds before an outbound request times out
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = 30)]
    pub http_timeout_secs: u64,

    /// Retries after the first attempt for rate limits and transient errors
    #[arg(long, env = "HTTP_MAX_RETRIES", default_value_t = 5)]
    pub max_retries: usize,
}

/// Validated HTTP settings.
#[derive(Debug, Clone, Copy)]
pub struct HttpSettings {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Requests sent per call: the first attempt plus `--max-retries`.
    pub max_attempts: usize,
}

impl HttpArgs {
    /// Clamps values into usable ranges.
    pub fn settings(&self) -> HttpSettings {
        HttpSettings {
            timeout: Duration::from_secs(self.http_timeout_secs.max(1)),
            max_attempts: self.max_retries.saturating_add(1),
        }
    }
}

impl HttpSettings {
    /// Completions take longer than embeddings; give them twice the budget.
    pub fn completion_timeout(&self) -> Duration {
        self.timeout * 2
    }
}

/// Topic gate and answer generation knobs.
#[derive(Args, Debug, Clone)]
pub struct RetrievalArgs {
    /// Minimum similarity to the closest example of the winning route
    #[arg(long, env = "ROUTER_THRESHOLD", default_value_t = 0.3)]
    pub router_threshold: f32,

    /// Passages retrieved per question
    #[arg(long, env = "RAG_TOP_K", default_value_t = 3)]
    pub top_k: usize,

    /// Sampling temperature for answers
    #[arg(long, default_value_t = 0.2)]
    pub temperature: f32,

    /// Completion token ceiling for answers
    #[arg(long, default_value_t = 512)]
    pub max_completion_tokens: usize,
}

impl RetrievalArgs {
    /// Checks ranges and splits the flags into router and generation settings.
    pub fn validate(&self) -> Result<(RouterConfig, AnswerConfig), ConfigError> {
        if !self.router_threshold.is_finite() || !(-1.0..=1.0).contains(&self.router_threshold) {
            return Err(ConfigError::Invalid {
                var: "ROUTER_THRESHOLD",
                reason: format!("{} is outside [-1, 1]", self.router_threshold),
            });
        }
        if self.top_k == 0 {
            return Err(ConfigError::Invalid {
                var: "RAG_TOP_K",
                reason: "must be at least 1".to_string(),
            });
        }
        let router = RouterConfig {
            threshold: self.router_threshold,
            ..RouterConfig::default()
        };
        let answer = AnswerConfig {
            top_k: self.top_k,
            temperature: self.temperature.clamp(0.0, 2.0),
            max_tokens: self.max_completion_tokens.max(1),
            ..AnswerConfig::default()
        };
        Ok((router, answer))
    }
}

/// Logging flags.
#[derive(Args, Debug, Clone)]
pub struct LogArgs {
    /// Default log filter when RUST_LOG is unset (e.g. info, debug, allen_agent=trace)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit JSON lines instead of human-readable logs
    #[arg(long, env = "LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

fn required(value: &Option<String>, var: &'static str) -> Result<String, ConfigError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ConfigError::Missing { var }),
    }
}

fn non_blank(value: &str, var: &'static str) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Missing { var });
    }
    Ok(trimmed.to_string())
}

fn http_url(value: &str, var: &'static str) -> Result<String, ConfigError> {
    let trimmed = non_blank(value, var)?;
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ConfigError::Invalid {
            var,
            reason: format!("'{trimmed}' is not an http(s) URL"),
        });
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        openai: OpenAiArgs,
        #[command(flatten)]
        pinecone: PineconeArgs,
        #[command(flatten)]
        http: HttpArgs,
        #[command(flatten)]
        retrieval: RetrievalArgs,
    }

    fn parse(args: &[&str]) -> TestCli {
        let mut argv = vec!["test"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).expect("parse")
    }

    const FULL: &[&str] = &[
        "--openai-api-key",
        "sk-test",
        "--pinecone-api-key",
        "pc-test",
        "--pinecone-index-name",
        "paul-allen",
        "--pinecone-cloud",
        "aws",
        "--pinecone-region",
        "us-east-1",
    ];

    #[test]
    fn full_configuration_validates() {
        let cli = parse(FULL);
        let openai = cli.openai.validate().expect("openai settings");
        assert_eq!(openai.api_key, "sk-test");
        assert_eq!(openai.base_url, DEFAULT_OPENAI_BASE);
        let pinecone = cli.pinecone.validate(true).expect("pinecone settings");
        assert_eq!(pinecone.index.as_str(), "paul-allen");
        let spec = pinecone.serverless.expect("serverless");
        assert_eq!(spec.cloud, "aws");
        assert_eq!(spec.region, "us-east-1");
    }

    #[test]
    fn blank_api_key_is_reported_by_name() {
        let cli = parse(&["--openai-api-key", "   "]);
        let err = cli.openai.validate().expect_err("blank key rejected");
        assert!(matches!(
            err,
            ConfigError::Missing {
                var: "OPENAI_API_KEY"
            }
        ));
    }

    #[test]
    fn region_only_required_for_index_creation() {
        let cli = parse(&[
            "--pinecone-api-key",
            "pc-test",
            "--pinecone-index-name",
            "paul-allen",
            "--pinecone-cloud",
            "",
            "--pinecone-region",
            "",
        ]);
        assert!(cli.pinecone.validate(false).is_ok());
        let err = cli.pinecone.validate(true).expect_err("cloud required");
        assert!(err.to_string().contains("PINECONE_CLOUD"), "{err}");
    }

    #[test]
    fn zero_dimension_rejected() {
        let mut cli = parse(FULL);
        cli.openai.embedding_dim = 0;
        let err = cli.openai.validate().expect_err("zero dim");
        assert!(err.to_string().contains("EMBEDDING_DIM"));
    }

    #[test]
    fn invalid_index_name_rejected() {
        let mut cli = parse(FULL);
        cli.pinecone.pinecone_index_name = Some("Paul_Allen".to_string());
        let err = cli.pinecone.validate(false).expect_err("bad index name");
        assert!(err.to_string().contains("PINECONE_INDEX_NAME"), "{err}");
    }

    #[test]
    fn base_url_must_be_http() {
        let mut cli = parse(FULL);
        cli.openai.openai_base_url = "api.openai.com/v1/".to_string();
        assert!(cli.openai.validate().is_err());
        cli.openai.openai_base_url = "http://localhost:9000/v1/".to_string();
        let settings = cli.openai.validate().expect("http url accepted");
        assert_eq!(settings.base_url, "http://localhost:9000/v1");
    }

    #[test]
    fn http_settings_clamp_to_usable_values() {
        let mut cli = parse(FULL);
        cli.http.http_timeout_secs = 0;
        cli.http.max_retries = 0;
        let http = cli.http.settings();
        assert_eq!(http.timeout, Duration::from_secs(1));
        assert_eq!(http.max_attempts, 1);
    }

    #[test]
    fn max_retries_counts_retries_after_the_first_attempt() {
        let mut args = FULL.to_vec();
        args.extend_from_slice(&["--max-retries", "5"]);
        let cli = parse(&args);
        assert_eq!(cli.http.settings().max_attempts, 6);
    }

    #[test]
    fn retrieval_flags_split_into_router_and_answer_settings() {
        let mut args = FULL.to_vec();
        args.extend_from_slice(&["--router-threshold", "0.45", "--top-k", "4"]);
        let cli = parse(&args);
        let (router, answer) = cli.retrieval.validate().expect("valid");
        assert_eq!(router.threshold, 0.45);
        assert_eq!(router.top_k, RouterConfig::default().top_k);
        assert_eq!(answer.top_k, 4);
        assert_eq!(answer.max_tokens, 512);
    }

    #[test]
    fn out_of_range_threshold_rejected() {
        let mut cli = parse(FULL);
        cli.retrieval.router_threshold = 1.5;
        let err = cli.retrieval.validate().expect_err("threshold");
        assert!(err.to_string().contains("ROUTER_THRESHOLD"));
        cli.retrieval.router_threshold = 0.3;
        cli.retrieval.top_k = 0;
        assert!(cli.retrieval.validate().is_err());
    }
}
