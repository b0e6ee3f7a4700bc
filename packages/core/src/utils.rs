// ABOUTME: Shared utility functions for specforge
// ABOUTME: ID generation and text truncation helpers

/// Generate a unique conversation ID
pub fn generate_conversation_id() -> String {
    format!("conv_{}", nanoid::nanoid!(16))
}

/// Generate a short ID for questions and other sub-records
pub fn generate_short_id() -> String {
    nanoid::nanoid!(8)
}

/// Truncate to at most `max_chars` characters, appending an ellipsis when cut
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}
