//! JSON-Schema (Draft 7) validator.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use jsonschema::error::ValidationErrorKind;
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use sievegate_types::{json_type_name, ErrorKind, ValidationError};

use crate::Validator;

/// Cache key used when a schema carries neither `$id` nor `name`.
const DEFAULT_CACHE_KEY: &str = "default";

/// Validates payloads against JSON Schema Draft 7 documents.
///
/// Compiled validators are cached per schema, keyed by the schema's `$id`
/// (falling back to `name`, then a literal default key). The cache is
/// private to this instance.
pub struct JsonSchemaValidator {
    compiled: RwLock<HashMap<String, Arc<JSONSchema>>>,
}

impl JsonSchemaValidator {
    /// Create a validator with an empty compile cache.
    pub fn new() -> Self {
        Self {
            compiled: RwLock::new(HashMap::new()),
        }
    }

    /// Drop all cached compiled schemas.
    pub async fn clear_cache(&self) {
        self.compiled.write().await.clear();
    }

    async fn compiled_for(&self, schema: &Value) -> Result<Arc<JSONSchema>, ValidationError> {
        let key = cache_key(schema);

        if let Some(compiled) = self.compiled.read().await.get(&key) {
            return Ok(compiled.clone());
        }

        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .should_validate_formats(true)
            .compile(schema)
            .map_err(|e| {
                ValidationError::new(
                    ErrorKind::InvalidSchema,
                    format!("schema definition error: {e}"),
                )
            })?;
        let compiled = Arc::new(compiled);

        debug!(schema = %key, "compiled schema cached");
        self.compiled
            .write()
            .await
            .insert(key, compiled.clone());
        Ok(compiled)
    }
}

impl Default for JsonSchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Validator for JsonSchemaValidator {
    fn name(&self) -> &str {
        "json_schema"
    }

    async fn validate(&self, payload: &Value, schema: &Value) -> Result<(), ValidationError> {
        let compiled = self.compiled_for(schema).await?;

        // Collect every instance error, report the first in iteration order.
        let errors: Vec<ValidationError> = match compiled.validate(payload) {
            Ok(()) => return Ok(()),
            Err(iter) => iter.map(|e| convert_error(&e, schema)).collect(),
        };

        match errors.into_iter().next() {
            Some(error) => Err(error),
            // validate() contract: an Err iterator yields at least one error.
            None => Err(ValidationError::new(
                ErrorKind::ValidationException,
                "validator reported failure without an error",
            )),
        }
    }
}

fn cache_key(schema: &Value) -> String {
    schema
        .get("$id")
        .or_else(|| schema.get("name"))
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_CACHE_KEY)
        .to_string()
}

fn convert_error(error: &jsonschema::ValidationError<'_>, schema: &Value) -> ValidationError {
    let kind = classify(&error.kind);
    let mut converted = ValidationError::new(kind, error.to_string())
        .at(dotted_instance_path(error))
        .actually(Value::String(json_type_name(&error.instance).to_string()));
    if let Some(expected) = expected_type(schema, error) {
        converted = converted.expecting(expected);
    }
    converted
}

fn classify(kind: &ValidationErrorKind) -> ErrorKind {
    match kind {
        ValidationErrorKind::Required { .. } => ErrorKind::MissingField,
        ValidationErrorKind::Type { .. } => ErrorKind::BadType,
        ValidationErrorKind::Enum { .. } | ValidationErrorKind::Constant { .. } => {
            ErrorKind::EnumViolation
        }
        ValidationErrorKind::Pattern { .. } | ValidationErrorKind::Format { .. } => {
            ErrorKind::FormatError
        }
        _ => ErrorKind::SchemaMismatch,
    }
}

/// Dotted, zero-indexed path from the payload root to the offending value.
///
/// A required-property violation is reported by the evaluator at the parent
/// object, so the missing member's own name is appended to the path.
fn dotted_instance_path(error: &jsonschema::ValidationError<'_>) -> String {
    let pointer = error.instance_path.to_string();
    let mut segments: Vec<String> = pointer.split('/').skip(1).map(str::to_string).collect();
    if let ValidationErrorKind::Required { property } = &error.kind {
        if let Some(name) = property.as_str() {
            segments.push(name.to_string());
        }
    }
    sievegate_types::join_field_path(segments)
}

/// The `type` declared by the schema node that produced the error, resolved
/// through the error's schema path.
fn expected_type(schema: &Value, error: &jsonschema::ValidationError<'_>) -> Option<Value> {
    let pointer = error.schema_path.to_string();
    let parent = match pointer.rsplit_once('/') {
        Some((parent, _)) => parent,
        None => "",
    };
    schema.pointer(parent)?.get("type").cloned()
}
