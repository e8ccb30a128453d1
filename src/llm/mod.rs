//! Chat completion providers.

use anyhow::Result;
use serde::Serialize;

pub mod openai;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions framing the conversation.
    System,
    /// End-user input.
    User,
    /// Model output.
    Assistant,
}

/// One message in a completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// Author.
    pub role: Role,
    /// Message body.
    pub content: String,
}

impl ChatMessage {
    /// System message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// User message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Request envelope shared by the various providers.
pub struct ProviderRequest<'a> {
    /// Conversation, system message first.
    pub messages: &'a [ChatMessage],
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token ceiling.
    pub max_tokens: usize,
}

/// Trait implemented by concrete LLM providers.
pub trait LlmProvider: Send + Sync {
    /// Returns the model's reply text.
    fn answer(&self, request: &ProviderRequest) -> Result<String>;
}
