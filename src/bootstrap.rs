//! Startup wiring for the online binaries: validated settings in, a ready
//! [`AnswerEngine`] out. Fails fast before anything starts listening.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::info;

use crate::config::{HttpSettings, OpenAiSettings, PineconeSettings};
use crate::embedder::Embedder;
use crate::rag::{AnswerConfig, AnswerEngine};
use crate::router::{RouterConfig, SemanticRouter};
use crate::topics::default_routes;

/// Batch size for query-time embedding calls, including the router examples.
pub const QUERY_EMBED_BATCH: usize = 64;

/// Builds every client, embeds the router examples and checks that the
/// vector index exists with the configured dimension.
pub fn connect_engine(
    openai: &OpenAiSettings,
    pinecone: &PineconeSettings,
    http: HttpSettings,
    router_config: RouterConfig,
    answer_config: AnswerConfig,
) -> Result<AnswerEngine> {
    let embedder: Arc<dyn Embedder> = Arc::new(openai.build_embedder(&http, QUERY_EMBED_BATCH)?);
    let router = SemanticRouter::build(default_routes(), embedder.as_ref(), router_config)?;
    info!(
        examples = router.example_count(),
        threshold = router_config.threshold,
        "topic router ready"
    );

    let client = pinecone.build_client(&http)?;
    let description = client
        .describe_index(&pinecone.index)
        .with_context(|| format!("failed to describe index '{}'", pinecone.index))?
        .ok_or_else(|| {
            anyhow!(
                "index '{}' does not exist; run allen-ingest first",
                pinecone.index
            )
        })?;
    anyhow::ensure!(
        description.dimension == openai.embedding_dim,
        "index '{}' has dimension {} but EMBEDDING_DIM is {}",
        pinecone.index,
        description.dimension,
        openai.embedding_dim
    );
    let index = client.index(&description, &pinecone.namespace);
    info!(
        index = %pinecone.index,
        namespace = %pinecone.namespace,
        dimension = description.dimension,
        "vector index ready"
    );

    let llm = openai.build_chat_model(&http)?;
    info!(model = llm.model(), "chat model configured");
    Ok(AnswerEngine::new(
        embedder,
        Arc::new(index),
        Arc::new(llm),
        router,
        answer_config,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::MockServer;
    use crate::vector_store::IndexName;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::time::Duration;

    const DIM: usize = 8;

    async fn embeddings(Json(body): Json<Value>) -> Json<Value> {
        let count = body["input"].as_array().map(Vec::len).unwrap_or(1);
        let data: Vec<Value> = (0..count)
            .map(|idx| {
                let mut v = vec![0.0f32; DIM];
                v[idx % DIM] = 1.0;
                json!({ "index": idx, "embedding": v })
            })
            .collect();
        Json(json!({ "data": data }))
    }

    fn start(index_dimension: usize) -> MockServer {
        let app = Router::new()
            .route("/v1/embeddings", post(embeddings))
            .route(
                "/indexes/{name}",
                get(move |Path(name): Path<String>| async move {
                    if name == "paul-allen" {
                        Ok(Json(json!({
                            "name": name,
                            "dimension": index_dimension,
                            "metric": "cosine",
                            "host": "index.example.test",
                            "status": { "ready": true, "state": "Ready" },
                        })))
                    } else {
                        Err(StatusCode::NOT_FOUND)
                    }
                }),
            );
        MockServer::start(app)
    }

    fn settings(server: &MockServer, index: &str) -> (OpenAiSettings, PineconeSettings, HttpSettings) {
        let openai = OpenAiSettings {
            api_key: "sk-test".into(),
            base_url: server.url("/v1"),
            embedding_model: "text-embedding-3-small".into(),
            embedding_dim: DIM,
            chat_model: "gpt-4o".into(),
        };
        let pinecone = PineconeSettings {
            api_key: "pc-test".into(),
            index: IndexName::new(index).unwrap(),
            namespace: String::new(),
            controller_url: server.base_url(),
            serverless: None,
        };
        let http = HttpSettings {
            timeout: Duration::from_secs(5),
            max_attempts: 1,
        };
        (openai, pinecone, http)
    }

    #[test]
    fn connects_when_index_matches() {
        let server = start(DIM);
        let (openai, pinecone, http) = settings(&server, "paul-allen");
        let engine = connect_engine(
            &openai,
            &pinecone,
            http,
            RouterConfig::default(),
            AnswerConfig::default(),
        )
        .expect("engine");
        assert_eq!(engine.config().top_k, 3);
    }

    #[test]
    fn missing_index_points_at_ingestion() {
        let server = start(DIM);
        let (openai, pinecone, http) = settings(&server, "other-index");
        let err = connect_engine(
            &openai,
            &pinecone,
            http,
            RouterConfig::default(),
            AnswerConfig::default(),
        )
        .err()
        .expect("missing index");
        assert!(err.to_string().contains("run allen-ingest"), "{err:#}");
    }

    #[test]
    fn dimension_mismatch_fails_fast() {
        let server = start(DIM * 2);
        let (openai, pinecone, http) = settings(&server, "paul-allen");
        let err = connect_engine(
            &openai,
            &pinecone,
            http,
            RouterConfig::default(),
            AnswerConfig::default(),
        )
        .err()
        .expect("dimension mismatch");
        assert!(err.to_string().contains("EMBEDDING_DIM"), "{err:#}");
    }
}
