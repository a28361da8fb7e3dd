//! Validation outcomes produced by the engine and consumed by the router.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorKind, ValidationError};

/// Tri-state classification of a validation attempt.
///
/// Exactly one state holds for every outcome: the message conforms, the
/// message does not conform, or validation could not be performed at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationResult {
    /// The payload conforms to its schema (possibly after remediation).
    Valid,
    /// The payload is structurally non-conformant.
    Invalid,
    /// Validation could not be performed (schema missing, internal fault).
    Error,
}

/// Result of validating one message, with error detail when it failed.
///
/// Outcomes are plain data: message-level failures travel through the
/// pipeline as values and become quarantine records, never panics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// Tri-state classification.
    pub result: ValidationResult,
    /// Error kind, for `Invalid` and `Error` outcomes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Detailed error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Dotted path to the offending field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_path: Option<String>,
    /// Whether auto-remediation was applied before the payload passed.
    #[serde(default)]
    pub remediated: bool,
    /// Additional detail, e.g. the pre-remediation payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ValidationOutcome {
    /// A conformant message.
    pub fn valid() -> Self {
        Self {
            result: ValidationResult::Valid,
            error_kind: None,
            error_message: None,
            field_path: None,
            remediated: false,
            metadata: None,
        }
    }

    /// A message that conforms after a single remediation pass. The
    /// pre-repair payload is preserved under `metadata.original` and the
    /// conformant payload under `metadata.repaired`; sinks publish the
    /// repaired form.
    pub fn valid_remediated(original: Value, repaired: Value) -> Self {
        Self {
            remediated: true,
            metadata: Some(serde_json::json!({ "original": original, "repaired": repaired })),
            ..Self::valid()
        }
    }

    /// The repaired payload of a remediated outcome.
    pub fn repaired_payload(&self) -> Option<&Value> {
        if !self.remediated {
            return None;
        }
        self.metadata.as_ref()?.get("repaired")
    }

    /// A structurally non-conformant message.
    pub fn invalid(error: ValidationError) -> Self {
        Self {
            result: ValidationResult::Invalid,
            error_kind: Some(error.kind),
            error_message: Some(error.message),
            field_path: Some(error.field_path),
            remediated: false,
            metadata: None,
        }
    }

    /// Validation could not be performed.
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            result: ValidationResult::Error,
            error_kind: Some(kind),
            error_message: Some(message.into()),
            field_path: None,
            remediated: false,
            metadata: None,
        }
    }

    /// True for `Valid` outcomes.
    pub fn is_valid(&self) -> bool {
        self.result == ValidationResult::Valid
    }

    /// True for `Invalid` outcomes.
    pub fn is_invalid(&self) -> bool {
        self.result == ValidationResult::Invalid
    }

    /// True for `Error` outcomes.
    pub fn is_error(&self) -> bool {
        self.result == ValidationResult::Error
    }
}
