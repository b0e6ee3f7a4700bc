// ABOUTME: Deterministic quality scoring for generated OpenAPI artifacts
// ABOUTME: Scores completeness, structure, standards and best practices against fixed weights

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use specforge_openapi::parse::{collect_refs, operations, Operation};
use specforge_openapi::ValidationOracle;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

pub const COMPLETENESS_WEIGHT: u32 = 40;
pub const STRUCTURE_WEIGHT: u32 = 30;
pub const STANDARDS_WEIGHT: u32 = 20;
pub const BEST_PRACTICES_WEIGHT: u32 = 10;

/// Minimum total score for a passing report
pub const PASS_THRESHOLD: u32 = 85;

const MISSING_DESCRIPTION: u32 = 2;
const MISSING_SUMMARY: u32 = 2;
const MISSING_ERROR_RESPONSE: u32 = 3;
const MISSING_EXAMPLES: u32 = 2;
const NO_OPERATIONS: u32 = 20;

const MISSING_COMPONENTS: u32 = 15;
const MISSING_SCHEMAS: u32 = 10;
const UNUSED_SCHEMA: u32 = 2;
const UNUSED_SCHEMA_CAP: u32 = 10;

const WRONG_VERSION_FAMILY: u32 = 10;
const NAMING_VIOLATION: u32 = 2;
const NAMING_CAP: u32 = 10;

const MISSING_SECURITY: u32 = 5;
const MISSING_VERSIONING: u32 = 5;

const SCHEMA_PREFIX: &str = "#/components/schemas/";

lazy_static! {
    static ref PASCAL_CASE: Regex = Regex::new(r"^[A-Z][A-Za-z0-9]*$").expect("valid regex");
    static ref CAMEL_CASE: Regex = Regex::new(r"^[a-z][A-Za-z0-9]*$").expect("valid regex");
    static ref VERSION_SEGMENT: Regex = Regex::new(r"/v[0-9]+(/|$)").expect("valid regex");
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum QualityCategory {
    Completeness,
    Structure,
    Standards,
    BestPractices,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityIssue {
    pub category: QualityCategory,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub total: u32,
    pub completeness: u32,
    pub structure: u32,
    pub standards: u32,
    pub best_practices: u32,
    pub issues: Vec<QualityIssue>,
    pub suggestions: Vec<String>,
    pub passed: bool,
}

/// Accumulates deductions for one category
struct Category {
    kind: QualityCategory,
    weight: u32,
    deducted: u32,
}

impl Category {
    fn new(kind: QualityCategory, weight: u32) -> Self {
        Self {
            kind,
            weight,
            deducted: 0,
        }
    }

    fn score(&self) -> u32 {
        self.weight.saturating_sub(self.deducted)
    }
}

#[derive(Default)]
struct Findings {
    issues: Vec<QualityIssue>,
    suggestions: BTreeSet<String>,
}

impl Findings {
    fn deduct(
        &mut self,
        category: &mut Category,
        points: u32,
        severity: Severity,
        message: String,
        location: Option<String>,
        suggestion: &str,
    ) {
        category.deducted += points;
        self.issues.push(QualityIssue {
            category: category.kind,
            severity,
            message,
            location,
        });
        self.suggestions.insert(suggestion.to_string());
    }
}

/// Scores artifacts, using the validation oracle to parse them
#[derive(Clone)]
pub struct QualityAssessor {
    validator: Arc<dyn ValidationOracle>,
}

impl QualityAssessor {
    pub fn new(validator: Arc<dyn ValidationOracle>) -> Self {
        Self { validator }
    }

    /// Parse and score an artifact.
    ///
    /// Unparseable input scores zero with a single standards issue.
    pub async fn assess(&self, artifact: &str) -> QualityReport {
        let report = self.validator.validate(artifact).await;
        match report.parsed {
            Some(doc) => assess_parsed(&doc),
            None => {
                let reason = report
                    .errors
                    .first()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "the artifact could not be parsed".to_string());
                unparseable(reason)
            }
        }
    }
}

fn unparseable(reason: String) -> QualityReport {
    QualityReport {
        total: 0,
        completeness: 0,
        structure: 0,
        standards: 0,
        best_practices: 0,
        issues: vec![QualityIssue {
            category: QualityCategory::Standards,
            severity: Severity::Error,
            message: format!("Artifact could not be parsed: {}", reason),
            location: None,
        }],
        suggestions: vec![
            "Fix the syntax errors so the document parses as YAML or JSON".to_string(),
        ],
        passed: false,
    }
}

/// Score an already-parsed document
pub fn assess_parsed(doc: &Value) -> QualityReport {
    let mut findings = Findings::default();
    let ops = operations(doc);

    let completeness = completeness(&ops, &mut findings);
    let structure = structure(doc, &mut findings);
    let standards = standards(doc, &ops, &mut findings);
    let best_practices = best_practices(doc, &ops, &mut findings);

    let total = completeness + structure + standards + best_practices;
    debug!(
        total,
        completeness, structure, standards, best_practices, "Assessed artifact quality"
    );

    QualityReport {
        total,
        completeness,
        structure,
        standards,
        best_practices,
        issues: findings.issues,
        suggestions: findings.suggestions.into_iter().collect(),
        passed: total >= PASS_THRESHOLD,
    }
}

fn has_text(value: &Value, field: &str) -> bool {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(|s| !s.trim().is_empty())
        .unwrap_or(false)
}

fn has_error_response(op: &Operation<'_>) -> bool {
    op.value
        .get("responses")
        .and_then(Value::as_object)
        .map(|responses| {
            responses
                .keys()
                .any(|code| code.starts_with('4') || code.starts_with('5'))
        })
        .unwrap_or(false)
}

fn contains_example(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            map.contains_key("example")
                || map.contains_key("examples")
                || map.values().any(contains_example)
        }
        Value::Array(items) => items.iter().any(contains_example),
        _ => false,
    }
}

fn completeness(ops: &[Operation<'_>], findings: &mut Findings) -> u32 {
    let mut category = Category::new(QualityCategory::Completeness, COMPLETENESS_WEIGHT);

    if ops.is_empty() {
        findings.deduct(
            &mut category,
            NO_OPERATIONS,
            Severity::Error,
            "The document defines no operations".to_string(),
            Some("/paths".to_string()),
            "Add at least one path with an operation",
        );
    }

    for op in ops {
        let location = Some(op.pointer());
        if !has_text(op.value, "description") {
            findings.deduct(
                &mut category,
                MISSING_DESCRIPTION,
                Severity::Warning,
                format!("{} has no description", op.label()),
                location.clone(),
                "Describe what each operation does",
            );
        }
        if !has_text(op.value, "summary") {
            findings.deduct(
                &mut category,
                MISSING_SUMMARY,
                Severity::Warning,
                format!("{} has no summary", op.label()),
                location.clone(),
                "Give each operation a one-line summary",
            );
        }
        if !has_error_response(op) {
            findings.deduct(
                &mut category,
                MISSING_ERROR_RESPONSE,
                Severity::Warning,
                format!("{} documents no 4xx or 5xx response", op.label()),
                location.clone(),
                "Document error responses such as 400, 404 and 500",
            );
        }
        if !contains_example(op.value) {
            findings.deduct(
                &mut category,
                MISSING_EXAMPLES,
                Severity::Info,
                format!("{} has no request or response examples", op.label()),
                location,
                "Add request and response examples",
            );
        }
    }

    category.score()
}

fn structure(doc: &Value, findings: &mut Findings) -> u32 {
    let mut category = Category::new(QualityCategory::Structure, STRUCTURE_WEIGHT);

    let Some(components) = doc.get("components").and_then(Value::as_object) else {
        findings.deduct(
            &mut category,
            MISSING_COMPONENTS,
            Severity::Warning,
            "The document has no components section".to_string(),
            Some("/components".to_string()),
            "Move shared definitions into components",
        );
        return category.score();
    };

    let schemas = components
        .get("schemas")
        .and_then(Value::as_object)
        .filter(|schemas| !schemas.is_empty());
    let Some(schemas) = schemas else {
        findings.deduct(
            &mut category,
            MISSING_SCHEMAS,
            Severity::Warning,
            "No reusable schemas are defined".to_string(),
            Some("/components/schemas".to_string()),
            "Define request and response bodies as reusable schemas",
        );
        return category.score();
    };

    let referenced: BTreeSet<String> = collect_refs(doc)
        .into_iter()
        .filter_map(|(_, target)| {
            target
                .strip_prefix(SCHEMA_PREFIX)
                .map(|name| name.split('/').next().unwrap_or(name).to_string())
        })
        .collect();

    let mut unused_penalty = 0;
    for name in schemas.keys() {
        if referenced.contains(name) {
            continue;
        }
        let points = UNUSED_SCHEMA.min(UNUSED_SCHEMA_CAP - unused_penalty);
        unused_penalty += points;
        findings.deduct(
            &mut category,
            points,
            Severity::Info,
            format!("Schema '{}' is never referenced", name),
            Some(format!("/components/schemas/{}", name)),
            "Remove unused schemas or reference them with $ref",
        );
    }

    category.score()
}

fn standards(doc: &Value, ops: &[Operation<'_>], findings: &mut Findings) -> u32 {
    let mut category = Category::new(QualityCategory::Standards, STANDARDS_WEIGHT);

    let version = doc.get("openapi").and_then(Value::as_str).unwrap_or("");
    if !version.starts_with("3.") {
        findings.deduct(
            &mut category,
            WRONG_VERSION_FAMILY,
            Severity::Error,
            format!("OpenAPI version '{}' is not in the 3.x family", version),
            Some("/openapi".to_string()),
            "Declare openapi: 3.0.3",
        );
    }

    let mut naming_penalty = 0;
    let mut naming = |findings: &mut Findings,
                      category: &mut Category,
                      message: String,
                      location: String,
                      suggestion: &str| {
        let points = NAMING_VIOLATION.min(NAMING_CAP - naming_penalty);
        naming_penalty += points;
        findings.deduct(
            category,
            points,
            Severity::Info,
            message,
            Some(location),
            suggestion,
        );
    };

    if let Some(schemas) = doc.pointer("/components/schemas").and_then(Value::as_object) {
        for name in schemas.keys() {
            if !PASCAL_CASE.is_match(name) {
                naming(
                    findings,
                    &mut category,
                    format!("Schema name '{}' is not PascalCase", name),
                    format!("/components/schemas/{}", name),
                    "Name schemas in PascalCase",
                );
            }
        }
    }

    for op in ops {
        if let Some(id) = op.operation_id() {
            if !CAMEL_CASE.is_match(id) {
                naming(
                    findings,
                    &mut category,
                    format!("operationId '{}' is not camelCase", id),
                    format!("{}/operationId", op.pointer()),
                    "Name operationIds in camelCase",
                );
            }
        }
    }

    category.score()
}

fn best_practices(doc: &Value, ops: &[Operation<'_>], findings: &mut Findings) -> u32 {
    let mut category = Category::new(QualityCategory::BestPractices, BEST_PRACTICES_WEIGHT);

    let has_security_schemes = doc
        .pointer("/components/securitySchemes")
        .and_then(Value::as_object)
        .map(|schemes| !schemes.is_empty())
        .unwrap_or(false);
    if ops.iter().any(Operation::is_mutating) && !has_security_schemes {
        findings.deduct(
            &mut category,
            MISSING_SECURITY,
            Severity::Warning,
            "Mutating operations exist but no security schemes are defined".to_string(),
            Some("/components/securitySchemes".to_string()),
            "Define a security scheme and apply it to write operations",
        );
    }

    let server_versioned = doc
        .get("servers")
        .and_then(Value::as_array)
        .map(|servers| {
            servers.iter().any(|server| {
                server
                    .get("url")
                    .and_then(Value::as_str)
                    .map(|url| VERSION_SEGMENT.is_match(url))
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false);
    let path_versioned = ops.iter().any(|op| VERSION_SEGMENT.is_match(op.path));

    if !server_versioned && !path_versioned {
        findings.deduct(
            &mut category,
            MISSING_VERSIONING,
            Severity::Info,
            "No API version appears in server URLs or paths".to_string(),
            None,
            "Include a version segment such as /v1 in the server URL",
        );
    }

    category.score()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use specforge_openapi::OpenApiValidator;

    fn polished() -> Value {
        json!({
            "openapi": "3.0.3",
            "info": {"title": "Todo API", "version": "1.0.0"},
            "servers": [{"url": "https://api.example.com/v1"}],
            "paths": {
                "/todos": {
                    "get": {
                        "operationId": "listTodos",
                        "summary": "List todos",
                        "description": "Returns every todo",
                        "responses": {
                            "200": {
                                "description": "ok",
                                "content": {"application/json": {
                                    "schema": {"$ref": "#/components/schemas/Todo"},
                                    "example": {"id": 1, "title": "milk"}
                                }}
                            },
                            "500": {"description": "server error"}
                        }
                    }
                }
            },
            "components": {
                "schemas": {"Todo": {"type": "object"}}
            }
        })
    }

    #[test]
    fn test_polished_document_scores_full_marks() {
        let report = assess_parsed(&polished());
        assert_eq!(report.total, 100, "issues: {:?}", report.issues);
        assert!(report.passed);
        assert!(report.issues.is_empty());
        assert!(report.suggestions.is_empty());
    }

    #[test]
    fn test_missing_components_costs_exactly_the_structure_deduction() {
        let mut doc = polished();
        doc.as_object_mut().unwrap().remove("components");

        let report = assess_parsed(&doc);
        assert_eq!(report.structure, STRUCTURE_WEIGHT - MISSING_COMPONENTS);
        assert_eq!(report.total, 100 - MISSING_COMPONENTS);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].category, QualityCategory::Structure);
    }

    #[test]
    fn test_operation_level_completeness_deductions() {
        let doc = json!({
            "openapi": "3.0.3",
            "paths": {"/v1/todos": {"get": {"responses": {"200": {"description": "ok"}}}}},
            "components": {"schemas": {"Todo": {"type": "object"}}}
        });

        let report = assess_parsed(&doc);
        assert_eq!(
            report.completeness,
            COMPLETENESS_WEIGHT
                - MISSING_DESCRIPTION
                - MISSING_SUMMARY
                - MISSING_ERROR_RESPONSE
                - MISSING_EXAMPLES
        );
        // Todo is never referenced
        assert_eq!(report.structure, STRUCTURE_WEIGHT - UNUSED_SCHEMA);
        assert_eq!(report.best_practices, BEST_PRACTICES_WEIGHT);
    }

    #[test]
    fn test_naming_and_version_deductions() {
        let doc = json!({
            "openapi": "2.0",
            "paths": {
                "/v1/a": {"get": {"operationId": "List_A", "responses": {}}},
                "/v1/b": {"get": {"operationId": "get-b", "responses": {}}}
            },
            "components": {"schemas": {"todo_item": {}, "Fine": {}}}
        });

        let report = assess_parsed(&doc);
        assert_eq!(
            report.standards,
            STANDARDS_WEIGHT - WRONG_VERSION_FAMILY - 3 * NAMING_VIOLATION
        );
    }

    #[test]
    fn test_naming_deductions_are_capped() {
        let schemas: serde_json::Map<String, Value> = (0..10)
            .map(|i| (format!("bad_name_{}", i), json!({})))
            .collect();
        let doc = json!({
            "openapi": "3.0.3",
            "paths": {},
            "components": {"schemas": schemas}
        });

        let report = assess_parsed(&doc);
        assert_eq!(report.standards, STANDARDS_WEIGHT - NAMING_CAP);
        assert_eq!(report.structure, STRUCTURE_WEIGHT - UNUSED_SCHEMA_CAP);
    }

    #[test]
    fn test_mutating_operations_without_security() {
        let mut doc = polished();
        doc["paths"]["/todos"]["post"] = json!({
            "operationId": "createTodo",
            "summary": "Create",
            "description": "Creates a todo",
            "requestBody": {"content": {"application/json": {"example": {"title": "x"}}}},
            "responses": {"201": {"description": "created"}, "400": {"description": "bad"}}
        });

        let report = assess_parsed(&doc);
        assert_eq!(report.best_practices, BEST_PRACTICES_WEIGHT - MISSING_SECURITY);

        doc["components"]["securitySchemes"] = json!({"bearer": {"type": "http", "scheme": "bearer"}});
        assert_eq!(assess_parsed(&doc).best_practices, BEST_PRACTICES_WEIGHT);
    }

    #[test]
    fn test_empty_document_stays_in_bounds() {
        let report = assess_parsed(&json!({}));
        assert!(report.total <= 100);
        assert!(!report.passed);
        assert_eq!(report.completeness, COMPLETENESS_WEIGHT - NO_OPERATIONS);
    }

    #[tokio::test]
    async fn test_unparseable_input_scores_zero() {
        let assessor = QualityAssessor::new(Arc::new(OpenApiValidator::new()));
        let report = assessor.assess("openapi: [3.0\n").await;

        assert_eq!(report.total, 0);
        assert!(!report.passed);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].category, QualityCategory::Standards);
        assert_eq!(report.issues[0].severity, Severity::Error);
        assert_eq!(report.suggestions.len(), 1);
    }

    #[tokio::test]
    async fn test_assess_is_deterministic() {
        let assessor = QualityAssessor::new(Arc::new(OpenApiValidator::new()));
        let text = serde_json::to_string(&polished()).unwrap();

        let first = assessor.assess(&text).await;
        let second = assessor.assess(&text).await;
        assert_eq!(first, second);
        assert_eq!(first.total, 100);
    }
}
