// ABOUTME: OpenAPI artifact parsing and structural validation
// ABOUTME: Validation oracle contract plus a YAML/JSON OpenAPI 3.x validator

pub mod parse;
pub mod validator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use parse::{parse_artifact, HTTP_METHODS};
pub use validator::OpenApiValidator;

/// A single validation failure with its location when known
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationIssue {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
}

impl ValidationIssue {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            line: None,
            column: None,
        }
    }

    pub fn at(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::new(message)
        }
    }

    /// Human-readable location, if any part of it is known
    pub fn location(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(path) = &self.path {
            parts.push(path.clone());
        }
        match (self.line, self.column) {
            (Some(line), Some(column)) => parts.push(format!("line {}, column {}", line, column)),
            (Some(line), None) => parts.push(format!("line {}", line)),
            _ => {}
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location() {
            Some(location) => write!(f, "{} (at {})", self.message, location),
            None => f.write_str(&self.message),
        }
    }
}

/// Outcome of validating one artifact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    /// Present whenever the text parsed, even if it failed validation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed: Option<serde_json::Value>,
}

impl ValidationReport {
    pub fn valid(parsed: Option<serde_json::Value>) -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            parsed,
        }
    }

    pub fn invalid(errors: Vec<ValidationIssue>, parsed: Option<serde_json::Value>) -> Self {
        Self {
            valid: false,
            errors,
            parsed,
        }
    }
}

/// Syntactic and semantic checker for generated artifacts
#[async_trait]
pub trait ValidationOracle: Send + Sync {
    async fn validate(&self, artifact: &str) -> ValidationReport;
}
