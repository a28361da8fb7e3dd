//! Validation error taxonomy.
//!
//! The set of error kinds is closed: message-level kinds describe defects in
//! the payload itself and produce `INVALID` outcomes, engine-level kinds
//! describe faults in the validation machinery and produce `ERROR` outcomes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Field path reported for document-level errors.
pub const ROOT_PATH: &str = "root";

/// Closed taxonomy of validation error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A required field is absent from the payload.
    MissingField,
    /// A field holds a value of the wrong JSON type.
    BadType,
    /// The raw record value could not be decoded as JSON.
    MalformedJson,
    /// The payload violates the schema in some other structural way.
    SchemaMismatch,
    /// A field holds a value outside its enumerated set.
    EnumViolation,
    /// A field violates a pattern or format constraint.
    FormatError,
    /// The payload carries no schema identifier.
    MissingSchema,
    /// No schema exists under the requested name and version.
    SchemaNotFound,
    /// The schema document itself is malformed.
    InvalidSchema,
    /// A validator failed in an unexpected way.
    ValidationException,
    /// Validation exceeded its per-message budget.
    Timeout,
}

impl ErrorKind {
    /// Stable snake_case name, matching the serialized form and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MissingField => "missing_field",
            ErrorKind::BadType => "bad_type",
            ErrorKind::MalformedJson => "malformed_json",
            ErrorKind::SchemaMismatch => "schema_mismatch",
            ErrorKind::EnumViolation => "enum_violation",
            ErrorKind::FormatError => "format_error",
            ErrorKind::MissingSchema => "missing_schema",
            ErrorKind::SchemaNotFound => "schema_not_found",
            ErrorKind::InvalidSchema => "invalid_schema",
            ErrorKind::ValidationException => "validation_exception",
            ErrorKind::Timeout => "timeout",
        }
    }

    /// Message-level kinds flow as `INVALID` outcomes into quarantine.
    pub fn is_message_level(&self) -> bool {
        matches!(
            self,
            ErrorKind::MissingField
                | ErrorKind::BadType
                | ErrorKind::MalformedJson
                | ErrorKind::SchemaMismatch
                | ErrorKind::EnumViolation
                | ErrorKind::FormatError
                | ErrorKind::MissingSchema
        )
    }

    /// Engine-level kinds produce `ERROR` outcomes and a system-error metric.
    pub fn is_engine_level(&self) -> bool {
        !self.is_message_level()
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single validation failure with enough detail to diagnose and repair
/// the offending payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{kind}: {message} (at {field_path})")]
pub struct ValidationError {
    /// Which class of failure occurred.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Dotted path from the payload root to the offending value, or
    /// [`ROOT_PATH`] for document-level errors.
    pub field_path: String,
    /// What the schema expected at that location, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    /// What the payload actually held, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
}

impl ValidationError {
    /// Create a document-level error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            field_path: ROOT_PATH.to_string(),
            expected: None,
            actual: None,
        }
    }

    /// Anchor the error at a specific field path.
    pub fn at(mut self, field_path: impl Into<String>) -> Self {
        self.field_path = field_path.into();
        self
    }

    /// Attach the schema's expectation at the error location.
    pub fn expecting(mut self, expected: Value) -> Self {
        self.expected = Some(expected);
        self
    }

    /// Attach the value actually observed at the error location.
    pub fn actually(mut self, actual: Value) -> Self {
        self.actual = Some(actual);
        self
    }
}

/// Join instance path segments into a dotted field path.
///
/// Array indices are zero-based and joined like object members, e.g.
/// `user.addresses.0.zip`. An empty segment list is the document root.
pub fn join_field_path<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = segments
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(".");
    if joined.is_empty() {
        ROOT_PATH.to_string()
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kinds_partition_into_message_and_engine_level() {
        let all = [
            ErrorKind::MissingField,
            ErrorKind::BadType,
            ErrorKind::MalformedJson,
            ErrorKind::SchemaMismatch,
            ErrorKind::EnumViolation,
            ErrorKind::FormatError,
            ErrorKind::MissingSchema,
            ErrorKind::SchemaNotFound,
            ErrorKind::InvalidSchema,
            ErrorKind::ValidationException,
            ErrorKind::Timeout,
        ];
        for kind in all {
            assert_ne!(kind.is_message_level(), kind.is_engine_level());
        }
        assert!(ErrorKind::MissingSchema.is_message_level());
        assert!(ErrorKind::Timeout.is_engine_level());
    }

    #[test]
    fn kind_serializes_as_snake_case() {
        assert_eq!(
            serde_json::to_value(ErrorKind::EnumViolation).unwrap(),
            json!("enum_violation")
        );
        let kind: ErrorKind = serde_json::from_value(json!("bad_type")).unwrap();
        assert_eq!(kind, ErrorKind::BadType);
    }

    #[test]
    fn error_defaults_to_root_path() {
        let err = ValidationError::new(ErrorKind::MalformedJson, "unexpected EOF");
        assert_eq!(err.field_path, ROOT_PATH);

        let err = err.at("user.addresses.0.zip").expecting(json!("string"));
        assert_eq!(err.field_path, "user.addresses.0.zip");
        assert_eq!(err.expected, Some(json!("string")));
    }

    #[test]
    fn field_paths_join_with_dots() {
        assert_eq!(join_field_path(["user", "addresses", "0", "zip"]), "user.addresses.0.zip");
        assert_eq!(join_field_path(Vec::<String>::new()), ROOT_PATH);
    }
}
