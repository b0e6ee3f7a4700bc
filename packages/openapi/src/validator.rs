// ABOUTME: Structural OpenAPI 3.x validator implementing the validation oracle
// ABOUTME: Checks version, info, paths, operation responses, operation ids and local references

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use crate::parse::{collect_refs, operations, parse_artifact};
use crate::{ValidationIssue, ValidationOracle, ValidationReport};

/// Validator for OpenAPI 3.x documents in YAML or JSON form
#[derive(Debug, Clone, Default)]
pub struct OpenApiValidator;

impl OpenApiValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate synchronously
    pub fn check(&self, artifact: &str) -> ValidationReport {
        let doc = match parse_artifact(artifact) {
            Ok(doc) => doc,
            Err(issue) => return ValidationReport::invalid(vec![issue], None),
        };

        let errors = self.check_document(&doc);
        debug!("OpenAPI validation finished with {} errors", errors.len());

        if errors.is_empty() {
            ValidationReport::valid(Some(doc))
        } else {
            ValidationReport::invalid(errors, Some(doc))
        }
    }

    fn check_document(&self, doc: &Value) -> Vec<ValidationIssue> {
        let mut errors = Vec::new();

        if !doc.is_object() {
            errors.push(ValidationIssue::at("Document root must be a mapping", "/"));
            return errors;
        }

        self.check_version(doc, &mut errors);
        self.check_info(doc, &mut errors);
        self.check_paths(doc, &mut errors);
        self.check_refs(doc, &mut errors);

        errors
    }

    fn check_version(&self, doc: &Value, errors: &mut Vec<ValidationIssue>) {
        match doc.get("openapi") {
            Some(Value::String(version)) if version.starts_with("3.") => {}
            Some(Value::String(version)) => errors.push(ValidationIssue::at(
                format!("Unsupported OpenAPI version '{}'; expected 3.x", version),
                "/openapi",
            )),
            Some(_) => errors.push(ValidationIssue::at(
                "The openapi field must be a string such as \"3.0.3\"",
                "/openapi",
            )),
            None if doc.get("swagger").is_some() => errors.push(ValidationIssue::at(
                "Swagger 2.0 documents are not supported; use OpenAPI 3.x",
                "/swagger",
            )),
            None => errors.push(ValidationIssue::at("Missing required field 'openapi'", "/")),
        }
    }

    fn check_info(&self, doc: &Value, errors: &mut Vec<ValidationIssue>) {
        let Some(info) = doc.get("info").and_then(Value::as_object) else {
            errors.push(ValidationIssue::at("Missing required object 'info'", "/info"));
            return;
        };

        for field in ["title", "version"] {
            if !info.get(field).map(Value::is_string).unwrap_or(false) {
                errors.push(ValidationIssue::at(
                    format!("info.{} must be a string", field),
                    format!("/info/{}", field),
                ));
            }
        }
    }

    fn check_paths(&self, doc: &Value, errors: &mut Vec<ValidationIssue>) {
        let Some(paths) = doc.get("paths") else {
            errors.push(ValidationIssue::at("Missing required object 'paths'", "/paths"));
            return;
        };
        let Some(paths) = paths.as_object() else {
            errors.push(ValidationIssue::at("paths must be a mapping", "/paths"));
            return;
        };

        for path in paths.keys() {
            if !path.starts_with('/') {
                errors.push(ValidationIssue::at(
                    format!("Path '{}' must begin with '/'", path),
                    "/paths",
                ));
            }
        }

        let mut seen_ids: HashMap<&str, String> = HashMap::new();
        for op in operations(doc) {
            if !op.value.is_object() {
                errors.push(ValidationIssue::at(
                    format!("Operation {} must be a mapping", op.label()),
                    op.pointer(),
                ));
                continue;
            }

            match op.value.get("responses").and_then(Value::as_object) {
                Some(responses) if !responses.is_empty() => {}
                _ => errors.push(ValidationIssue::at(
                    format!("Operation {} must declare at least one response", op.label()),
                    format!("{}/responses", op.pointer()),
                )),
            }

            if let Some(id) = op.operation_id() {
                if let Some(previous) = seen_ids.insert(id, op.label()) {
                    errors.push(ValidationIssue::at(
                        format!(
                            "Duplicate operationId '{}' (also used by {})",
                            id, previous
                        ),
                        format!("{}/operationId", op.pointer()),
                    ));
                }
            }
        }
    }

    fn check_refs(&self, doc: &Value, errors: &mut Vec<ValidationIssue>) {
        for (location, target) in collect_refs(doc) {
            let Some(pointer) = target.strip_prefix('#') else {
                // External references are not resolved
                continue;
            };
            if doc.pointer(pointer).is_none() {
                errors.push(ValidationIssue::at(
                    format!("Unresolved reference '{}'", target),
                    location,
                ));
            }
        }
    }
}

#[async_trait]
impl ValidationOracle for OpenApiValidator {
    async fn validate(&self, artifact: &str) -> ValidationReport {
        self.check(artifact)
    }
}
