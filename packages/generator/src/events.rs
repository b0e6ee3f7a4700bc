// ABOUTME: Events emitted by the generation pipeline
// ABOUTME: Tagged union serialized with a `type` discriminator for NDJSON or SSE transport

use serde::{Deserialize, Serialize};
use specforge_core::ConversationStatus;
use specforge_openapi::ValidationIssue;
use std::fmt;

use crate::analyzer::Decision;
use crate::error::{ErrorKind, GenerationError};
use crate::quality::QualityReport;

/// Pipeline stage announced by `status` events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Analyzing,
    Generating,
    Validating,
    Improving,
    Diffing,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analyzing => "analyzing",
            Self::Generating => "generating",
            Self::Validating => "validating",
            Self::Improving => "improving",
            Self::Diffing => "diffing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// First event when continuing an existing conversation
    #[serde(rename_all = "camelCase")]
    Conversation {
        conversation_id: String,
        status: ConversationStatus,
        message_count: usize,
    },
    Status {
        stage: Stage,
        message: String,
    },
    /// Informational; the pipeline does not wait for an answer
    Question {
        id: String,
        question: String,
        options: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<String>,
        decisions: Vec<Decision>,
        blocking: bool,
    },
    Diff {
        added: usize,
        removed: usize,
        modified: usize,
        summary: String,
        preview: String,
    },
    #[serde(rename_all = "camelCase")]
    Result {
        conversation_id: String,
        spec: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quality: Option<QualityReport>,
        #[serde(default)]
        awaiting_approval: bool,
    },
    Error {
        kind: ErrorKind,
        message: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        errors: Vec<ValidationIssue>,
    },
}

impl StreamEvent {
    pub fn status(stage: Stage, message: impl Into<String>) -> Self {
        Self::Status {
            stage,
            message: message.into(),
        }
    }

    /// The `type` discriminator as it appears on the wire
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Conversation { .. } => "conversation",
            Self::Status { .. } => "status",
            Self::Question { .. } => "question",
            Self::Diff { .. } => "diff",
            Self::Result { .. } => "result",
            Self::Error { .. } => "error",
        }
    }

    /// `result` and `error` end a stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Result { .. } | Self::Error { .. })
    }
}

impl From<&GenerationError> for StreamEvent {
    fn from(err: &GenerationError) -> Self {
        Self::Error {
            kind: err.kind(),
            message: err.to_string(),
            errors: err.validation_errors().to_vec(),
        }
    }
}
