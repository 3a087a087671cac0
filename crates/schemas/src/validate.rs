//! Payload validation and default filling.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::SchemaError;

/// A single schema violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub message: String,
}

/// Outcome of validating one payload. Empty `issues` means valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    /// All issue messages joined with `"; "`.
    pub fn summary(&self) -> String {
        self.issues
            .iter()
            .map(|i| i.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Validate `payload` against `schema`, checking string formats too.
///
/// # Errors
/// [`SchemaError::InvalidSchema`] if `schema` does not compile.
pub fn validate(schema: &Value, payload: &Value) -> Result<ValidationResult, SchemaError> {
    let validator = jsonschema::options()
        .should_validate_formats(true)
        .build(schema)
        .map_err(|e| SchemaError::InvalidSchema(e.to_string()))?;

    let issues = validator
        .iter_errors(payload)
        .map(|e| ValidationIssue { message: e.to_string() })
        .collect();

    Ok(ValidationResult { issues })
}

/// Return `payload` with every missing top-level property that declares a
/// `default` in `schema` filled in. A `null` payload is treated as `{}`.
/// Non-object payloads are returned unchanged.
pub fn apply_defaults(schema: &Value, payload: &Value) -> Value {
    let mut out = match payload {
        Value::Null => Map::new(),
        Value::Object(map) => map.clone(),
        other => return other.clone(),
    };

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, prop) in properties {
            if let Some(default) = prop.get("default") {
                out.entry(name.clone()).or_insert_with(|| default.clone());
            }
        }
    }

    Value::Object(out)
}
