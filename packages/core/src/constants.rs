// ABOUTME: Environment variable names and default values
// ABOUTME: Centralized definitions used by Config::from_env and the binary

use std::env;
use std::path::PathBuf;

// Storage Configuration
pub const SPECFORGE_DB_PATH: &str = "SPECFORGE_DB_PATH";
pub const SPECFORGE_CONVERSATION_TTL_HOURS: &str = "SPECFORGE_CONVERSATION_TTL_HOURS";
pub const SPECFORGE_CLEANUP_INTERVAL_MINUTES: &str = "SPECFORGE_CLEANUP_INTERVAL_MINUTES";

// Generation Configuration
pub const SPECFORGE_MAX_TOKENS: &str = "SPECFORGE_MAX_TOKENS";
pub const SPECFORGE_TEMPERATURE: &str = "SPECFORGE_TEMPERATURE";
pub const SPECFORGE_REPAIR_TEMPERATURE: &str = "SPECFORGE_REPAIR_TEMPERATURE";

// Completion Provider
pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const ANTHROPIC_MODEL: &str = "ANTHROPIC_MODEL";
pub const ANTHROPIC_BASE_URL: &str = "ANTHROPIC_BASE_URL";

// System Environment Variables
pub const HOME: &str = "HOME";

/// Conversations soft-expire this long after their last update
pub const DEFAULT_CONVERSATION_TTL_HOURS: u64 = 24;
pub const DEFAULT_CLEANUP_INTERVAL_MINUTES: u64 = 60;
pub const DEFAULT_MAX_TOKENS: u32 = 8000;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_REPAIR_TEMPERATURE: f32 = 0.2;

/// Get the path to the specforge directory (~/.specforge)
pub fn specforge_dir() -> PathBuf {
    // HOME first so tests can redirect it
    if let Ok(home) = env::var(HOME) {
        PathBuf::from(home).join(".specforge")
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".specforge")
    }
}

/// Default SQLite database location (~/.specforge/conversations.db)
pub fn default_db_path() -> PathBuf {
    specforge_dir().join("conversations.db")
}
