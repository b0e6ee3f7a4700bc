// ABOUTME: Conversation data model shared by the store, manager and orchestrator
// ABOUTME: Defines conversation state, messages, pending checkpoints and listing metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Whether a run creates a new artifact or modifies an existing one
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    Create,
    Modify,
}

impl GenerationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
        }
    }
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Paused,
    Completed,
    Error,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Completed and errored conversations accept no further mutation
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a paused conversation is waiting on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum WaitingFor {
    QuestionAnswer,
    DiffApproval,
}

impl fmt::Display for WaitingFor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QuestionAnswer => f.write_str("question-answer"),
            Self::DiffApproval => f.write_str("diff-approval"),
        }
    }
}

/// Role of the message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }
}

/// Question awaiting a caller answer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingQuestion {
    pub id: String,
    pub question: String,
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// Before/after snapshot awaiting caller approval.
///
/// Both texts are owned copies; nothing else in the conversation aliases them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingDiff {
    pub before: String,
    pub after: String,
    pub summary: String,
}

/// Mutable context accumulated over a conversation
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_used: Option<String>,
    #[serde(default)]
    pub patterns_applied: BTreeSet<String>,
    #[serde(default)]
    pub quality_scores: Vec<u32>,
    #[serde(default)]
    pub user_preferences: BTreeMap<String, String>,
    #[serde(default)]
    pub previous_requests: Vec<String>,
    #[serde(default)]
    pub applied_changes: Vec<String>,
}

/// Full persisted state of a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    pub id: String,
    pub mode: GenerationMode,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_spec: Option<String>,
    #[serde(default)]
    pub messages: Vec<ConversationMessage>,
    pub status: ConversationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting_for: Option<WaitingFor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_question: Option<PendingQuestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_diff: Option<PendingDiff>,
    #[serde(default)]
    pub context: ConversationContext,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    /// Check the pause invariants: `waiting_for` is set iff the conversation
    /// is paused, and each pending payload is present iff it is the one
    /// being waited on.
    pub fn is_consistent(&self) -> bool {
        let paused = self.status == ConversationStatus::Paused;
        paused == self.waiting_for.is_some()
            && self.pending_question.is_some()
                == (self.waiting_for == Some(WaitingFor::QuestionAnswer))
            && self.pending_diff.is_some() == (self.waiting_for == Some(WaitingFor::DiffApproval))
    }

    /// Lightweight projection used for listing
    pub fn metadata(&self) -> ConversationMetadata {
        ConversationMetadata {
            id: self.id.clone(),
            mode: self.mode,
            description: self.description.clone(),
            status: self.status,
            message_count: self.messages.len(),
            latest_quality_score: self.context.quality_scores.last().copied(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Listing projection of a conversation, readable without the full state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMetadata {
    pub id: String,
    pub mode: GenerationMode,
    pub description: String,
    pub status: ConversationStatus,
    pub message_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_quality_score: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
