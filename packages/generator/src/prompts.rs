// ABOUTME: Prompt builders for generating, modifying and repairing OpenAPI artifacts
// ABOUTME: Augments the caller's description with template, pattern and preference guidance

use specforge_openapi::ValidationIssue;

use crate::analyzer::{Analysis, GenerationPreferences};

/// System prompt shared by every generation call
pub const SYSTEM_PROMPT: &str = "You are an API design assistant that writes OpenAPI 3.0 specifications. \
Respond with a single complete OpenAPI 3.0.3 document in YAML and nothing else: \
no explanations and no markdown fences. \
Use PascalCase schema names under components.schemas, camelCase operationIds, \
a summary and description on every operation, and documented error responses.";

fn guidance_section(analysis: &Analysis, preferences: &GenerationPreferences) -> String {
    let mut lines = Vec::new();

    if let Some(template) = &analysis.template {
        lines.push(format!(
            "- Follow the conventions of a typical {} API",
            template.name
        ));
    }
    for pattern in analysis.included_patterns() {
        lines.push(format!("- {}", pattern.guidance()));
    }
    for (key, value) in &preferences.notes {
        lines.push(format!("- {}: {}", key, value));
    }

    if lines.is_empty() {
        String::new()
    } else {
        format!("\n\nRequirements:\n{}", lines.join("\n"))
    }
}

/// Prompt for a brand new artifact
pub fn create_prompt(
    description: &str,
    analysis: &Analysis,
    preferences: &GenerationPreferences,
) -> String {
    format!(
        "Design an OpenAPI specification for the following API.\n\nDescription:\n{}{}",
        description.trim(),
        guidance_section(analysis, preferences)
    )
}

/// Prompt for changing an existing artifact
pub fn modify_prompt(
    description: &str,
    current_spec: &str,
    previous_requests: &[String],
    analysis: &Analysis,
    preferences: &GenerationPreferences,
) -> String {
    let history = if previous_requests.is_empty() {
        String::new()
    } else {
        let items: Vec<String> = previous_requests
            .iter()
            .map(|r| format!("- {}", r.trim()))
            .collect();
        format!("\n\nEarlier requests in this conversation:\n{}", items.join("\n"))
    };

    format!(
        "Modify the OpenAPI specification below.\n\nRequested change:\n{}{}{}\n\n\
Return the complete updated document, keeping everything the change does not touch.\n\n\
Current specification:\n{}",
        description.trim(),
        history,
        guidance_section(analysis, preferences),
        current_spec
    )
}

/// Prompt asking the model to fix reported validation errors
pub fn repair_prompt(artifact: &str, errors: &[ValidationIssue]) -> String {
    let error_list: Vec<String> = errors.iter().map(|e| format!("- {}", e)).collect();

    format!(
        "The OpenAPI specification below failed validation with these errors:\n{}\n\n\
Fix every error and return the complete corrected document. \
Do not remove operations or schemas that are not involved in an error.\n\n\
Specification:\n{}",
        error_list.join("\n"),
        artifact
    )
}
