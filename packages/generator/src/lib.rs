// ABOUTME: specforge generator library - conversation management and the generation pipeline
// ABOUTME: Provides the orchestrator, conversation manager, diff engine and quality assessor

pub mod analyzer;
pub mod artifact;
pub mod conversation_manager;
pub mod diff;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod prompts;
pub mod quality;
pub mod scheduler;

pub use analyzer::{analyze, Analysis, Decision, GenerationPreferences, Pattern};
pub use conversation_manager::{
    CleanupStats, ConversationManager, ConversationUpdate, Suspension,
};
pub use diff::{generate_change_summary, generate_diff, DiffResult, ModifiedLine};
pub use error::{ErrorKind, GenerationError, Result};
pub use events::{Stage, StreamEvent};
pub use orchestrator::{
    CallerReply, EventStream, GenerationRequest, Orchestrator, OrchestratorSettings,
    MAX_VALIDATION_ATTEMPTS,
};
pub use quality::{QualityAssessor, QualityCategory, QualityIssue, QualityReport, Severity};
pub use scheduler::PeriodicTask;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::conversation_manager::{ConversationManager, Suspension};
    pub use crate::error::{GenerationError, Result};
    pub use crate::events::StreamEvent;
    pub use crate::orchestrator::{CallerReply, GenerationRequest, Orchestrator};
}
