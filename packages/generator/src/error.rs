// ABOUTME: Error types for the generation pipeline and conversation manager
// ABOUTME: Each variant maps to a stable error kind carried on the wire error event

use serde::{Deserialize, Serialize};
use specforge_ai::AIServiceError;
use specforge_core::{ConversationStatus, WaitingFor};
use specforge_openapi::ValidationIssue;
use specforge_storage::StorageError;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Completion provider is not configured: {0}. Set ANTHROPIC_API_KEY (or inject a configured oracle) and start a new conversation")]
    Configuration(String),

    #[error("Generated text is not an OpenAPI document: {0}. Rephrase the description and start a new conversation")]
    MalformedArtifact(String),

    #[error("{}", exhausted_message(*attempts, errors))]
    ValidationExhausted {
        attempts: usize,
        errors: Vec<ValidationIssue>,
    },

    #[error("Conversation not found: {0}. It may have expired; start a new conversation without a conversation id")]
    NotFound(String),

    #[error("Conversation {id} cannot accept this action: {reason}")]
    StateConflict { id: String, reason: String },

    #[error("Oracle call failed: {0}. Check provider connectivity and start a new conversation")]
    Oracle(String),

    #[error("Conversation storage failed: {0}. Check the database path and retry")]
    Storage(#[from] StorageError),

    #[error("Generation was cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, GenerationError>;

fn exhausted_message(attempts: usize, errors: &[ValidationIssue]) -> String {
    let mut message = format!(
        "The artifact still failed validation after {} attempts with {} remaining error{}:",
        attempts,
        errors.len(),
        if errors.len() == 1 { "" } else { "s" }
    );
    for issue in errors {
        message.push_str("\n  - ");
        message.push_str(&issue.to_string());
    }
    message.push_str("\nRefine the description or fix these errors in the artifact and submit it in modify mode");
    message
}

impl GenerationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::MalformedArtifact(_) => ErrorKind::MalformedArtifact,
            Self::ValidationExhausted { .. } => ErrorKind::ValidationExhausted,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::StateConflict { .. } => ErrorKind::StateConflict,
            Self::Oracle(_) => ErrorKind::Oracle,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Remaining validation errors, if this is a validation failure
    pub fn validation_errors(&self) -> &[ValidationIssue] {
        match self {
            Self::ValidationExhausted { errors, .. } => errors,
            _ => &[],
        }
    }

    pub(crate) fn conflict(id: &str, reason: impl Into<String>) -> Self {
        Self::StateConflict {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn terminal(id: &str, status: ConversationStatus) -> Self {
        Self::conflict(
            id,
            format!(
                "it is {} and no longer accepts changes; start a new conversation",
                status
            ),
        )
    }

    pub(crate) fn not_paused(id: &str, status: ConversationStatus) -> Self {
        Self::conflict(
            id,
            format!("it is {} rather than paused; send the request without a reply", status),
        )
    }

    pub(crate) fn awaiting(id: &str, waiting_for: WaitingFor) -> Self {
        let remedy = match waiting_for {
            WaitingFor::QuestionAnswer => "answer the pending question",
            WaitingFor::DiffApproval => "approve or reject the pending diff",
        };
        Self::conflict(
            id,
            format!("it is paused waiting for {}; {} to continue", waiting_for, remedy),
        )
    }
}

impl From<AIServiceError> for GenerationError {
    fn from(err: AIServiceError) -> Self {
        match err {
            AIServiceError::NoApiKey => Self::Configuration(err.to_string()),
            other => Self::Oracle(other.to_string()),
        }
    }
}

/// Stable error classification carried on `error` events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Configuration,
    MalformedArtifact,
    ValidationExhausted,
    NotFound,
    StateConflict,
    Oracle,
    Storage,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::MalformedArtifact => "malformed-artifact",
            Self::ValidationExhausted => "validation-exhausted",
            Self::NotFound => "not-found",
            Self::StateConflict => "state-conflict",
            Self::Oracle => "oracle",
            Self::Storage => "storage",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
