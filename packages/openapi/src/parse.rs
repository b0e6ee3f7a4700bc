// ABOUTME: Parsing of YAML or JSON artifacts into a JSON value tree
// ABOUTME: Also provides operation enumeration and JSON-pointer helpers shared by checkers

use serde_json::{Map, Number, Value};

use crate::ValidationIssue;

/// Path-item keys that denote operations
pub const HTTP_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Parse an artifact, picking JSON when it looks like an object literal
pub fn parse_artifact(text: &str) -> Result<Value, ValidationIssue> {
    let trimmed = text.trim_start();
    if trimmed.is_empty() {
        return Err(ValidationIssue::new("Artifact is empty"));
    }

    if trimmed.starts_with('{') {
        return serde_json::from_str::<Value>(text).map_err(|e| ValidationIssue {
            message: format!("Invalid JSON: {}", e),
            path: None,
            line: Some(e.line()),
            column: Some(e.column()),
        });
    }

    let yaml: serde_yaml::Value = serde_yaml::from_str(text).map_err(|e| {
        let location = e.location();
        ValidationIssue {
            message: format!("Invalid YAML: {}", e),
            path: None,
            line: location.as_ref().map(|l| l.line()),
            column: location.as_ref().map(|l| l.column()),
        }
    })?;

    Ok(yaml_to_json(yaml))
}

/// Convert YAML to JSON, stringifying non-string mapping keys (`200:` -> `"200"`)
fn yaml_to_json(value: serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Value::Number(u.into())
            } else {
                n.as_f64()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => {
            Value::Array(items.into_iter().map(yaml_to_json).collect())
        }
        serde_yaml::Value::Mapping(mapping) => {
            let mut map = Map::new();
            for (key, value) in mapping {
                map.insert(yaml_key(key), yaml_to_json(value));
            }
            Value::Object(map)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

fn yaml_key(key: serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Null => "null".to_string(),
        other => serde_json::to_string(&yaml_to_json(other)).unwrap_or_default(),
    }
}

/// Escape one JSON-pointer segment
pub fn escape_pointer_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// An operation located under `paths`
#[derive(Debug, Clone, Copy)]
pub struct Operation<'a> {
    pub path: &'a str,
    pub method: &'a str,
    pub value: &'a Value,
}

impl<'a> Operation<'a> {
    /// JSON pointer to this operation
    pub fn pointer(&self) -> String {
        format!("/paths/{}/{}", escape_pointer_segment(self.path), self.method)
    }

    /// `METHOD /path` label for messages
    pub fn label(&self) -> String {
        format!("{} {}", self.method.to_uppercase(), self.path)
    }

    pub fn is_mutating(&self) -> bool {
        matches!(self.method, "post" | "put" | "patch" | "delete")
    }

    pub fn operation_id(&self) -> Option<&'a str> {
        self.value.get("operationId").and_then(Value::as_str)
    }
}

/// Every operation in document order
pub fn operations(doc: &Value) -> Vec<Operation<'_>> {
    let Some(paths) = doc.get("paths").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut ops = Vec::new();
    for (path, item) in paths {
        let Some(item) = item.as_object() else {
            continue;
        };
        for method in HTTP_METHODS {
            if let Some(value) = item.get(method) {
                ops.push(Operation {
                    path: path.as_str(),
                    method,
                    value,
                });
            }
        }
    }
    ops
}

/// Collect every `$ref` string with the pointer of the object holding it
pub fn collect_refs(value: &Value) -> Vec<(String, String)> {
    let mut refs = Vec::new();
    walk_refs(value, String::new(), &mut refs);
    refs
}

fn walk_refs(value: &Value, pointer: String, refs: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            if let Some(target) = map.get("$ref").and_then(Value::as_str) {
                refs.push((pointer.clone(), target.to_string()));
            }
            for (key, child) in map {
                walk_refs(
                    child,
                    format!("{}/{}", pointer, escape_pointer_segment(key)),
                    refs,
                );
            }
        }
        Value::Array(items) => {
            for (idx, child) in items.iter().enumerate() {
                walk_refs(child, format!("{}/{}", pointer, idx), refs);
            }
        }
        _ => {}
    }
}
