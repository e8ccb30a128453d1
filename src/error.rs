//! Typed errors for the two places callers branch on failure kind: startup
//! configuration and per-turn question answering.

use thiserror::Error;

/// Startup configuration problems. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting was absent or blank.
    #[error("{var} is not set; export it or add it to .env")]
    Missing {
        /// Environment variable that holds the setting.
        var: &'static str,
    },
    /// A setting was present but unusable.
    #[error("{var} is invalid: {reason}")]
    Invalid {
        /// Environment variable that holds the setting.
        var: &'static str,
        /// Human-readable explanation.
        reason: String,
    },
}

/// Failure while answering a single chat turn.
///
/// The session survives these; the server turns them into a visible error
/// message for the user.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Nothing to answer.
    #[error("question must not be empty")]
    EmptyQuestion,
    /// The question vector did not fit the topic gate's examples.
    #[error("failed to classify question: {0:#}")]
    Routing(anyhow::Error),
    /// Embedding the question for retrieval failed.
    #[error("failed to embed question: {0:#}")]
    Embedding(anyhow::Error),
    /// Vector index query failed.
    #[error("failed to retrieve passages: {0:#}")]
    Retrieval(anyhow::Error),
    /// Chat completion call failed.
    #[error("failed to generate answer: {0:#}")]
    Completion(anyhow::Error),
}

impl QueryError {
    /// Short label for the pipeline stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            QueryError::EmptyQuestion => "input",
            QueryError::Routing(_) => "routing",
            QueryError::Embedding(_) => "embedding",
            QueryError::Retrieval(_) => "retrieval",
            QueryError::Completion(_) => "completion",
        }
    }
}
