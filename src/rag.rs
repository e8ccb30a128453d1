//! Question answering: topic gate, retrieval, prompt assembly, completion.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::embedder::Embedder;
use crate::embeddings::ScoredPassage;
use crate::error::QueryError;
use crate::llm::{ChatMessage, LlmProvider, ProviderRequest};
use crate::router::{RouteDecision, SemanticRouter};
use crate::vector_store::VectorIndex;

const SYSTEM_PROMPT: &str = "You are the Paul Allen AI Agent, a precise assistant that answers questions about Paul Allen, co-founder of Microsoft. Use only the supplied context passages. If the context does not contain the answer, say that you do not know rather than guessing. Keep answers concise and factual.";

/// Generation knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnswerConfig {
    /// Passages retrieved per question.
    pub top_k: usize,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token ceiling.
    pub max_tokens: usize,
    /// Prior question/answer pairs replayed as history.
    pub history_turns: usize,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            temperature: 0.2,
            max_tokens: 512,
            history_turns: 3,
        }
    }
}

/// A completed question/answer exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    /// User question.
    pub question: String,
    /// Assistant reply.
    pub answer: String,
}

/// Gate decision plus any passages retrieved for it.
#[derive(Debug, Clone)]
pub struct Retrieval {
    /// Topic gate outcome.
    pub decision: RouteDecision,
    /// Retrieved passages; empty when the question was refused.
    pub passages: Vec<ScoredPassage>,
}

/// Outcome of one chat turn.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Off-topic question; no completion was requested.
    Refused {
        /// Topic gate outcome.
        decision: RouteDecision,
    },
    /// Grounded answer.
    Answered {
        /// Model reply.
        text: String,
        /// Passages the reply was grounded on.
        passages: Vec<ScoredPassage>,
        /// Topic gate outcome.
        decision: RouteDecision,
    },
}

impl Reply {
    /// Topic gate outcome for either variant.
    pub fn decision(&self) -> &RouteDecision {
        match self {
            Reply::Refused { decision } | Reply::Answered { decision, .. } => decision,
        }
    }
}

/// Wires the embedder, topic gate, vector index and language model together.
///
/// Every collaborator is blocking and shared; async callers hold the engine
/// in an `Arc` and call it from `spawn_blocking`.
pub struct AnswerEngine {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    llm: Arc<dyn LlmProvider>,
    router: SemanticRouter,
    config: AnswerConfig,
}

impl AnswerEngine {
    /// Assembles an engine from its collaborators.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        llm: Arc<dyn LlmProvider>,
        router: SemanticRouter,
        config: AnswerConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            llm,
            router,
            config: AnswerConfig {
                top_k: config.top_k.max(1),
                ..config
            },
        }
    }

    /// Active generation settings.
    pub fn config(&self) -> &AnswerConfig {
        &self.config
    }

    /// Embeds the question once, gates it and, when in-domain, retrieves
    /// the nearest passages with the same vector.
    pub fn retrieve(&self, question: &str) -> Result<Retrieval, QueryError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::EmptyQuestion);
        }
        let vector = self
            .embedder
            .embed_one(question)
            .map_err(QueryError::Embedding)?;
        let decision = self.router.decide(&vector).map_err(QueryError::Routing)?;
        if !decision.is_in_domain() {
            info!(score = decision.score, route = ?decision.route, "question refused as off-topic");
            return Ok(Retrieval {
                decision,
                passages: Vec::new(),
            });
        }
        let passages = self
            .index
            .query(&vector, self.config.top_k)
            .map_err(QueryError::Retrieval)?;
        debug!(
            route = ?decision.route,
            score = decision.score,
            passages = passages.len(),
            "retrieved context"
        );
        Ok(Retrieval { decision, passages })
    }

    /// Answers one question, replaying the tail of `history`.
    pub fn respond(&self, question: &str, history: &[Turn]) -> Result<Reply, QueryError> {
        let Retrieval { decision, passages } = self.retrieve(question)?;
        if !decision.is_in_domain() {
            return Ok(Reply::Refused { decision });
        }
        let skip = history.len().saturating_sub(self.config.history_turns);
        let messages = build_messages(question.trim(), &render_context(&passages), &history[skip..]);
        let text = self
            .llm
            .answer(&ProviderRequest {
                messages: &messages,
                temperature: self.config.temperature,
                max_tokens: self.config.max_tokens,
            })
            .map_err(QueryError::Completion)?;
        Ok(Reply::Answered {
            text,
            passages,
            decision,
        })
    }
}

/// System prompt, history, then a user message holding context and question.
pub fn build_messages(question: &str, context_block: &str, history: &[Turn]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2 + history.len() * 2);
    messages.push(ChatMessage::system(SYSTEM_PROMPT));
    for turn in history {
        messages.push(ChatMessage::user(turn.question.as_str()));
        messages.push(ChatMessage::assistant(turn.answer.as_str()));
    }
    let mut prompt = String::new();
    prompt.push_str("Context:\n");
    prompt.push_str(context_block);
    prompt.push_str("\nQuestion:\n");
    prompt.push_str(question);
    messages.push(ChatMessage::user(prompt));
    messages
}

/// Numbered passage listing for the prompt.
pub fn render_context(passages: &[ScoredPassage]) -> String {
    if passages.is_empty() {
        return String::from("(no passages retrieved)\n");
    }
    let mut out = String::new();
    for (idx, passage) in passages.iter().enumerate() {
        out.push_str(&format!(
            "[{}] Passage ID: {} | Score: {:.4}\n{}\n---\n",
            idx + 1,
            passage.id,
            passage.score,
            passage.text.trim()
        ));
    }
    out
}
