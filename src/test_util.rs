use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use tokio::runtime::Runtime;

use crate::chunker::{Chunker, ChunkerConfig};
use crate::embedder::hashing::HashingEmbedder;
use crate::embedder::Embedder;
use crate::embeddings::EmbeddedPassage;
use crate::llm::{ChatMessage, LlmProvider, ProviderRequest};
use crate::rag::{AnswerConfig, AnswerEngine};
use crate::router::{RouterConfig, SemanticRouter};
use crate::topics::default_routes;
use crate::vector_store::{InMemoryIndex, VectorIndex};

/// Local axum server standing in for a remote API. Runs on its own runtime so
/// blocking clients can call it from a plain `#[test]`.
pub struct MockServer {
    addr: SocketAddr,
    _runtime: Runtime,
}

impl MockServer {
    pub fn start(app: Router) -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("mock runtime");
        let listener = runtime
            .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
            .expect("bind mock server");
        let addr = listener.local_addr().expect("mock addr");
        runtime.spawn(async move {
            axum::serve(listener, app).await.expect("mock server");
        });
        Self {
            addr,
            _runtime: runtime,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }
}

pub const DEMO_DIM: usize = 4096;
pub const DEMO_CORPUS: &str = "Paul Allen was born on January 21, 1953, in Seattle, Washington.\n\n\
    Allen co-founded Microsoft with Bill Gates in 1975.\n\n\
    Vulcan Inc. was founded by Allen and his sister Jody Allen in 1986.";

/// Language model stand-in that records every conversation it is sent.
pub struct RecordingLlm {
    reply: String,
    pub calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl RecordingLlm {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl LlmProvider for RecordingLlm {
    fn answer(&self, request: &ProviderRequest) -> anyhow::Result<String> {
        self.calls.lock().unwrap().push(request.messages.to_vec());
        Ok(self.reply.clone())
    }
}

/// Embedder that fails its first `failures` calls with an upstream error,
/// then behaves like the demo hashing embedder.
pub struct FlakyEmbedder {
    inner: HashingEmbedder,
    failures: AtomicUsize,
}

impl FlakyEmbedder {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: HashingEmbedder::new(DEMO_DIM),
            failures: AtomicUsize::new(failures),
        }
    }
}

impl Embedder for FlakyEmbedder {
    fn embed_batch(&self, inputs: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            anyhow::bail!("embed 503");
        }
        self.inner.embed_batch(inputs)
    }

    fn batch_size(&self) -> usize {
        self.inner.batch_size()
    }
}

/// In-memory index seeded with [`DEMO_CORPUS`].
pub fn demo_index() -> Arc<InMemoryIndex> {
    let embedder = HashingEmbedder::new(DEMO_DIM);
    let chunker = Chunker::new(ChunkerConfig {
        chunk_target_tokens: 16,
        chunk_overlap_tokens: 0,
    });
    let passages = chunker.split("bio", DEMO_CORPUS);
    let texts: Vec<&str> = passages.iter().map(|p| p.text.as_str()).collect();
    let vectors = embedder.embed_all(&texts).expect("embed corpus");
    let records: Vec<EmbeddedPassage> = passages
        .into_iter()
        .zip(vectors)
        .map(|(passage, embedding)| EmbeddedPassage { passage, embedding })
        .collect();
    let index = Arc::new(InMemoryIndex::new(DEMO_DIM));
    index.upsert(&records).expect("seed index");
    index
}

/// Engine with the default routes (embedded by the hashing embedder) around
/// the given query embedder, index and model.
pub fn demo_engine_from(
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    llm: Arc<dyn LlmProvider>,
) -> AnswerEngine {
    let router = SemanticRouter::build(
        default_routes(),
        &HashingEmbedder::new(DEMO_DIM),
        RouterConfig::default(),
    )
    .expect("router");
    AnswerEngine::new(embedder, index, llm, router, AnswerConfig::default())
}

/// [`demo_engine`] with a different query embedder.
pub fn demo_engine_with(embedder: Arc<dyn Embedder>, llm: Arc<dyn LlmProvider>) -> AnswerEngine {
    demo_engine_from(embedder, demo_index(), llm)
}

/// Answer engine over a three-paragraph corpus with the hashing embedder,
/// an in-memory index and the default routes.
pub fn demo_engine(llm: Arc<dyn LlmProvider>) -> AnswerEngine {
    demo_engine_with(Arc::new(HashingEmbedder::new(DEMO_DIM)), llm)
}
