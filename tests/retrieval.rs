use std::path::PathBuf;

use allen_agent::embedder::hashing::HashingEmbedder;
use allen_agent::embedder::Embedder;
use allen_agent::ingest::{ingest_text, read_corpus, source_label, IngestReport};
use allen_agent::router::{RouterConfig, SemanticRouter};
use allen_agent::topics::default_routes;
use allen_agent::vector_store::{InMemoryIndex, VectorIndex};
use allen_agent::{Chunker, ChunkerConfig};

const DIM: usize = 4096;

fn corpus_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data/paul_allen_data.txt")
}

fn ingest_corpus(embedder: &HashingEmbedder, index: &InMemoryIndex) -> IngestReport {
    let path = corpus_path();
    let text = read_corpus(&path).expect("read bundled corpus");
    ingest_text(
        &source_label(&path),
        &text,
        &Chunker::new(ChunkerConfig::default()),
        embedder,
        index,
        DIM,
    )
    .expect("ingest bundled corpus")
}

fn ingested() -> (HashingEmbedder, InMemoryIndex, usize) {
    let embedder = HashingEmbedder::new(DIM);
    let index = InMemoryIndex::new(DIM);
    let report = ingest_corpus(&embedder, &index);
    (embedder, index, report.passages)
}

#[test]
fn bundled_corpus_ingests_into_passages() {
    let text = read_corpus(&corpus_path()).expect("corpus");
    let (_, index, passages) = ingested();
    assert!(passages > 1);
    assert_eq!(index.vector_count().unwrap(), passages);
    assert!(text.contains("January 21, 1953"));
}

#[test]
fn birth_date_is_retrieved_for_birth_question() {
    let (embedder, index, _) = ingested();
    let query = embedder.embed_one("When was Paul Allen born?").unwrap();
    let hits = index.query(&query, 5).unwrap();
    assert!(
        hits.iter().any(|hit| hit.text.contains("January 21, 1953")),
        "top hits: {:?}",
        hits.iter().map(|h| &h.id).collect::<Vec<_>>()
    );
}

#[test]
fn second_ingest_is_an_upsert() {
    let (embedder, index, passages) = ingested();
    ingest_corpus(&embedder, &index);
    assert_eq!(index.vector_count().unwrap(), passages);
}

#[test]
fn router_gates_sample_questions() {
    let embedder = HashingEmbedder::new(DIM);
    let router =
        SemanticRouter::build(default_routes(), &embedder, RouterConfig::default()).unwrap();
    for question in ["When did Paul Allen die?", "What is Vulcan Inc?", "thanks for your help"] {
        let decision = router.route(question, &embedder).unwrap();
        assert!(decision.is_in_domain(), "{question}: {decision:?}");
    }
    for question in [
        "What is the boiling point of nitrogen?",
        "Write a python function that reverses a list",
    ] {
        let decision = router.route(question, &embedder).unwrap();
        assert!(!decision.is_in_domain(), "{question}: {decision:?}");
    }
}
