// ABOUTME: Core types, configuration and utilities for specforge
// ABOUTME: Foundational package providing the conversation data model shared by all packages

pub mod config;
pub mod constants;
pub mod types;
pub mod utils;

// Re-export main types
pub use types::{
    ConversationContext, ConversationMessage, ConversationMetadata, ConversationState,
    ConversationStatus, GenerationMode, MessageRole, PendingDiff, PendingQuestion, WaitingFor,
};

// Re-export configuration
pub use config::{Config, ConfigError};
pub use constants::{default_db_path, specforge_dir};

// Re-export utilities
pub use utils::{generate_conversation_id, generate_short_id, truncate};
