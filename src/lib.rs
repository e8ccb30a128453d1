#![warn(missing_docs)]
//! Core library for the Paul Allen question-answering agent: corpus
//! ingestion, the semantic topic gate and the retrieval-augmented answer
//! engine behind the chat server.

pub mod bootstrap;
pub mod chat;
pub mod chunker;
pub mod config;
pub mod embedder;
pub mod embeddings;
pub mod error;
pub mod http;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod pinecone;
pub mod rag;
pub mod router;
pub mod server;
pub mod topics;
pub mod vector_store;

#[cfg(test)]
mod test_util;

pub use chat::{ChatReply, SessionStore};
pub use chunker::{Chunker, ChunkerConfig};
pub use embeddings::{EmbeddedPassage, Passage, ScoredPassage};
pub use error::{ConfigError, QueryError};
pub use ingest::{IndexMode, IngestReport};
pub use rag::{AnswerConfig, AnswerEngine, Reply};
pub use router::{RouteDecision, RouteLabel, SemanticRouter};
pub use vector_store::{IndexName, VectorIndex};
