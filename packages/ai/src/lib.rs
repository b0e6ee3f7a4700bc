// ABOUTME: Completion provider integration for specforge
// ABOUTME: Provider-neutral completion oracle trait and the Anthropic client implementing it

pub mod oracle;
pub mod service;

pub use oracle::{ChatMessage, CompletionOptions, CompletionOracle, CompletionResponse};
pub use service::{AIService, AIServiceError, AIServiceResult, Usage};
