// ABOUTME: Cleanup and sanity checks for raw completion text
// ABOUTME: Strips markdown fences and checks for the OpenAPI document marker

use crate::error::{GenerationError, Result};

const FENCE: &str = "```";

/// Remove markdown code fences and surrounding prose.
///
/// The result is trimmed and ends with exactly one newline.
pub fn strip_wrappers(raw: &str) -> String {
    let body = match fenced_block(raw) {
        Some(block) => block,
        None => raw,
    };
    let trimmed = body.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}\n", trimmed)
    }
}

/// Content of the first fenced block, if any
fn fenced_block(raw: &str) -> Option<&str> {
    let start = raw.find(FENCE)?;
    let after_open = &raw[start + FENCE.len()..];
    // Skip the info string (```yaml)
    let body_start = after_open.find('\n')? + 1;
    let body = &after_open[body_start..];
    match body.find(FENCE) {
        Some(end) => Some(&body[..end]),
        None => Some(body),
    }
}

/// Whether the text declares an OpenAPI document at its top level
pub fn has_openapi_marker(text: &str) -> bool {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') {
        return trimmed.contains("\"openapi\"");
    }
    text.lines()
        .any(|line| line.starts_with("openapi:") || line.starts_with("\"openapi\":"))
}

/// Clean raw completion text, failing if it is not an OpenAPI document
pub fn extract_artifact(raw: &str) -> Result<String> {
    let artifact = strip_wrappers(raw);
    if artifact.is_empty() {
        return Err(GenerationError::MalformedArtifact(
            "the completion was empty".to_string(),
        ));
    }
    if !has_openapi_marker(&artifact) {
        return Err(GenerationError::MalformedArtifact(
            "the completion does not declare a top-level openapi version field".to_string(),
        ));
    }
    Ok(artifact)
}
