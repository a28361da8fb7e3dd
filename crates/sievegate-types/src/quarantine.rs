//! Quarantine records: the durable form of a rejected message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorKind;
use crate::outcome::ValidationOutcome;
use crate::Message;

/// A non-conformant message preserved for inspection, repair, and replay.
///
/// The record id is deterministic over the source coordinates, so a retry
/// after a crash between routing and offset commit produces the same id and
/// collapses in the quarantine index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineRecord {
    /// Deterministic identifier, `{topic}-{partition}-{offset}`.
    pub id: String,
    /// The payload as consumed, before any remediation. `Null` when the
    /// payload was externalized to a blob store (see `payload_uri`).
    pub original_payload: Value,
    /// Source topic.
    pub topic: String,
    /// Source partition.
    pub partition: i32,
    /// Source offset.
    pub offset: i64,
    /// Schema the payload was validated against, or `unknown`.
    pub schema_name: String,
    /// Error classification.
    pub error_kind: Option<ErrorKind>,
    /// Detailed error message.
    pub error_message: Option<String>,
    /// Dotted path to the offending field.
    pub field_path: Option<String>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// URI of the externalized payload, for oversized payloads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_uri: Option<String>,
}

impl QuarantineRecord {
    /// Deterministic record id for a source coordinate.
    pub fn record_id(topic: &str, partition: i32, offset: i64) -> String {
        format!("{topic}-{partition}-{offset}")
    }

    /// Build a record from a rejected message and its outcome.
    pub fn from_outcome(message: &Message, outcome: &ValidationOutcome, schema_name: &str) -> Self {
        Self {
            id: Self::record_id(&message.topic, message.partition, message.offset),
            original_payload: message.payload.clone(),
            topic: message.topic.clone(),
            partition: message.partition,
            offset: message.offset,
            schema_name: schema_name.to_string(),
            error_kind: outcome.error_kind,
            error_message: outcome.error_message.clone(),
            field_path: outcome.field_path.clone(),
            created_at: Utc::now(),
            payload_uri: None,
        }
    }

    /// Replace the inline payload with a blob-store URI.
    pub fn externalize(mut self, uri: String) -> Self {
        self.original_payload = Value::Null;
        self.payload_uri = Some(uri);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use serde_json::json;

    fn rejected_message() -> Message {
        Message {
            payload: json!({"_schema": "user_event", "event_type": "purchase"}),
            topic: "raw-events".into(),
            partition: 3,
            offset: 1207,
            timestamp: Utc::now(),
            key: Some("USER123456".into()),
        }
    }

    #[test]
    fn record_id_is_deterministic_over_provenance() {
        let msg = rejected_message();
        let outcome = ValidationOutcome::invalid(
            ValidationError::new(ErrorKind::MissingField, "'user_id' is required").at("user_id"),
        );
        let a = QuarantineRecord::from_outcome(&msg, &outcome, "user_event");
        let b = QuarantineRecord::from_outcome(&msg, &outcome, "user_event");
        assert_eq!(a.id, "raw-events-3-1207");
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn record_preserves_payload_and_error_detail() {
        let msg = rejected_message();
        let outcome = ValidationOutcome::invalid(
            ValidationError::new(ErrorKind::MissingField, "'user_id' is required").at("user_id"),
        );
        let record = QuarantineRecord::from_outcome(&msg, &outcome, "user_event");
        assert_eq!(record.original_payload, msg.payload);
        assert_eq!(record.error_kind, Some(ErrorKind::MissingField));
        assert_eq!(record.field_path.as_deref(), Some("user_id"));
        assert!(record.payload_uri.is_none());
    }

    #[test]
    fn externalize_swaps_payload_for_uri() {
        let msg = rejected_message();
        let outcome = ValidationOutcome::error(ErrorKind::Timeout, "budget exceeded");
        let record = QuarantineRecord::from_outcome(&msg, &outcome, "user_event")
            .externalize("mem://raw-events-3-1207".into());
        assert_eq!(record.original_payload, Value::Null);
        assert_eq!(record.payload_uri.as_deref(), Some("mem://raw-events-3-1207"));
    }
}
