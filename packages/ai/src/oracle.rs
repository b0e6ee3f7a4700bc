// ABOUTME: Completion oracle contract used by the generation pipeline
// ABOUTME: Provider-neutral request options, chat messages and responses

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use specforge_core::MessageRole;

use crate::service::AIServiceResult;

/// One message sent to the completion provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Per-call generation options
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    /// Overrides the provider's configured model for this call
    pub model: Option<String>,
}

/// Raw completion result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub tokens_used: Option<u32>,
    pub finish_reason: Option<String>,
}

/// Single-shot text generation capability
#[async_trait]
pub trait CompletionOracle: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> AIServiceResult<CompletionResponse>;
}
