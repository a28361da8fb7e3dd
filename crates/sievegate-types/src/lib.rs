#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **sievegate-types** – Shared primitive data structures for Sievegate.
//!
//! The crate is dependency-light and sits at the very bottom of the crate
//! graph so that *every* other crate can depend on it without causing cycles.
//! It defines the messages flowing through the gateway, the validation error
//! taxonomy, validation outcomes, and quarantine records. It intentionally
//! makes no assumptions about I/O, stream transports, or storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

mod error;
mod outcome;
mod quarantine;

pub use error::{join_field_path, ErrorKind, ValidationError, ROOT_PATH};
pub use outcome::{ValidationOutcome, ValidationResult};
pub use quarantine::QuarantineRecord;

//─────────────────────────────
//  Messages
//─────────────────────────────

/// Default payload field carrying the schema identifier.
pub const DEFAULT_SCHEMA_FIELD: &str = "_schema";

/// A decoded event pulled from the input stream.
///
/// The `payload` is the unit of validation; the remaining fields are
/// stream provenance carried end-to-end from source to sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Decoded JSON payload (arbitrarily shaped document).
    pub payload: Value,
    /// Source topic.
    pub topic: String,
    /// Source partition.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
    /// Broker-assigned timestamp.
    pub timestamp: DateTime<Utc>,
    /// Message key, when the producer set one.
    pub key: Option<String>,
}

impl Message {
    /// Resolve the schema identifier from the payload.
    ///
    /// Returns `None` when the field is absent, not a string, or empty -
    /// callers treat all three the same way (a `missing_schema` outcome).
    pub fn schema_name<'a>(&'a self, field: &str) -> Option<&'a str> {
        self.payload
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Runtime type name of a JSON value, as reported in validation errors.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Synthesize the pseudo-payload used when a raw record cannot be decoded
/// as JSON. The original bytes are preserved lossily so the record can be
/// inspected and replayed from quarantine.
pub fn deserialization_error_payload(raw: &[u8], error: &str) -> Value {
    serde_json::json!({
        "_deserialization_error": true,
        "_raw_value": String::from_utf8_lossy(raw),
        "_error": error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(payload: Value) -> Message {
        Message {
            payload,
            topic: "raw-events".into(),
            partition: 0,
            offset: 42,
            timestamp: Utc::now(),
            key: None,
        }
    }

    #[test]
    fn schema_name_resolves_non_empty_string() {
        let msg = message(json!({"_schema": "user_event", "user_id": "USER123456"}));
        assert_eq!(msg.schema_name(DEFAULT_SCHEMA_FIELD), Some("user_event"));
    }

    #[test]
    fn schema_name_rejects_missing_empty_and_non_string() {
        assert_eq!(message(json!({})).schema_name(DEFAULT_SCHEMA_FIELD), None);
        assert_eq!(
            message(json!({"_schema": ""})).schema_name(DEFAULT_SCHEMA_FIELD),
            None
        );
        assert_eq!(
            message(json!({"_schema": 7})).schema_name(DEFAULT_SCHEMA_FIELD),
            None
        );
    }

    #[test]
    fn json_type_names_cover_all_kinds() {
        assert_eq!(json_type_name(&Value::Null), "null");
        assert_eq!(json_type_name(&json!(true)), "boolean");
        assert_eq!(json_type_name(&json!(1.5)), "number");
        assert_eq!(json_type_name(&json!("x")), "string");
        assert_eq!(json_type_name(&json!([])), "array");
        assert_eq!(json_type_name(&json!({})), "object");
    }

    #[test]
    fn deserialization_payload_is_lossy_and_marked() {
        let payload = deserialization_error_payload(b"{user_id: USER123", "EOF while parsing");
        assert_eq!(payload["_deserialization_error"], json!(true));
        assert_eq!(payload["_raw_value"], json!("{user_id: USER123"));
        assert_eq!(payload["_error"], json!("EOF while parsing"));
    }

    #[test]
    fn message_round_trips_through_json() {
        let msg = message(json!({"a": [1, 2, {"b": null}]}));
        let encoded = serde_json::to_string(&msg).unwrap();
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }
}
