//! JSON-schema validation behind a narrow capability trait.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, RwLock};

use serde_json::{Value, json};
use thiserror::Error;

/// A single schema violation: where it happened and what went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{location}: {message}")]
pub struct ValidationError {
    /// JSON pointer into the validated document (empty for the root).
    pub location: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            message: message.into(),
        }
    }
}

/// Checks a document against a schema.
pub trait Validator: Send + Sync {
    /// Returns the first violation found, if any.
    fn validate(&self, document: &Value, schema: &Value) -> Result<(), ValidationError>;
}

/// Compiles `schema`, reporting a malformed schema as a root-level error.
pub fn compile(schema: &Value) -> Result<jsonschema::Validator, ValidationError> {
    jsonschema::validator_for(schema)
        .map_err(|err| ValidationError::new("", format!("invalid schema: {err}")))
}

/// Default [`Validator`] backed by the `jsonschema` crate.
///
/// Each distinct schema is compiled once and reused for later documents.
#[derive(Default)]
pub struct JsonSchemaValidator {
    compiled: RwLock<HashMap<String, Arc<jsonschema::Validator>>>,
}

impl fmt::Debug for JsonSchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cached = self.compiled.read().map(|cache| cache.len()).unwrap_or_default();
        f.debug_struct("JsonSchemaValidator")
            .field("cached", &cached)
            .finish()
    }
}

impl JsonSchemaValidator {
    pub fn new() -> Self {
        Self::default()
    }

    fn compiled_for(&self, schema: &Value) -> Result<Arc<jsonschema::Validator>, ValidationError> {
        let key = schema.to_string();
        if let Some(hit) = self.compiled.read().ok().and_then(|cache| cache.get(&key).cloned()) {
            return Ok(hit);
        }
        let compiled = Arc::new(compile(schema)?);
        if let Ok(mut cache) = self.compiled.write() {
            cache.insert(key, compiled.clone());
        }
        Ok(compiled)
    }
}

impl Validator for JsonSchemaValidator {
    fn validate(&self, document: &Value, schema: &Value) -> Result<(), ValidationError> {
        let compiled = self.compiled_for(schema)?;
        match compiled.iter_errors(document).next() {
            Some(err) => Err(ValidationError::new(
                err.instance_path.to_string(),
                err.to_string(),
            )),
            None => Ok(()),
        }
    }
}

/// Minimal shape every merged request options object must have.
pub static REQUEST_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "type": "object",
        "properties": {
            "path": { "type": "string", "minLength": 1 },
            "method": { "type": "string", "enum": ["GET", "POST", "PUT", "DELETE", "LIST"] },
            "json": { "type": ["object", "null"] },
            "headers": { "type": "object" }
        },
        "required": ["path", "method"]
    })
});
