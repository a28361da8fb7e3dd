//! Sink routing: validated stream or quarantine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use sievegate_metrics::MetricsCollector;
use sievegate_stream_core::{
    BlobStore, QuarantineIndex, RecordProducer, StreamError, StreamResult,
};
use sievegate_types::{Message, QuarantineRecord, ValidationOutcome};

use crate::retry::RetryPolicy;

/// Payload attribute used to key validated records when the source message
/// carries no key.
const FALLBACK_KEY_FIELD: &str = "user_id";

/// Where a message ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    /// Published to the validated stream.
    Validated,
    /// Delivered to the quarantine stream and index.
    Quarantined,
}

/// Routes `(message, outcome)` pairs to their sink.
///
/// `VALID` outcomes publish the conformant payload to the validated topic;
/// `INVALID` and `ERROR` outcomes become quarantine records delivered
/// write-through to both the DLQ topic and the quarantine index. Every
/// delivery is acknowledged before `route` returns, so the caller can
/// safely treat a returned target as routed.
pub struct SinkRouter {
    producer: Arc<dyn RecordProducer>,
    index: Arc<dyn QuarantineIndex>,
    blob: Option<Arc<dyn BlobStore>>,
    metrics: Arc<MetricsCollector>,
    validated_topic: String,
    dlq_topic: String,
    blob_threshold: Option<usize>,
    flush_every: usize,
    unflushed: AtomicUsize,
    retry: RetryPolicy,
}

impl SinkRouter {
    /// Build a router over the given sinks.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        producer: Arc<dyn RecordProducer>,
        index: Arc<dyn QuarantineIndex>,
        blob: Option<Arc<dyn BlobStore>>,
        metrics: Arc<MetricsCollector>,
        validated_topic: impl Into<String>,
        dlq_topic: impl Into<String>,
        blob_threshold: Option<usize>,
        flush_every: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            producer,
            index,
            blob,
            metrics,
            validated_topic: validated_topic.into(),
            dlq_topic: dlq_topic.into(),
            blob_threshold,
            flush_every: flush_every.max(1),
            unflushed: AtomicUsize::new(0),
            retry,
        }
    }

    /// Route one message according to its outcome.
    pub async fn route(
        &self,
        message: &Message,
        outcome: &ValidationOutcome,
        schema_name: &str,
    ) -> StreamResult<RouteTarget> {
        if outcome.is_valid() {
            self.publish_validated(message, outcome).await?;
            Ok(RouteTarget::Validated)
        } else {
            self.quarantine(message, outcome, schema_name).await?;
            Ok(RouteTarget::Quarantined)
        }
    }

    /// Flush any buffered sink publishes.
    pub async fn flush(&self) -> StreamResult<()> {
        self.unflushed.store(0, Ordering::Relaxed);
        self.producer.flush().await
    }

    async fn publish_validated(
        &self,
        message: &Message,
        outcome: &ValidationOutcome,
    ) -> StreamResult<()> {
        // A remediated outcome publishes the repaired form; the original is
        // preserved in the outcome metadata.
        let payload = outcome.repaired_payload().unwrap_or(&message.payload);
        let bytes = encode(payload, &self.validated_topic)?;
        let key = partition_key(message, payload);

        self.retry
            .run("validated publish", || {
                self.producer.send(&self.validated_topic, key, &bytes)
            })
            .await?;

        debug!(
            topic = %self.validated_topic,
            offset = message.offset,
            remediated = outcome.remediated,
            "message routed to validated stream"
        );
        Ok(())
    }

    async fn quarantine(
        &self,
        message: &Message,
        outcome: &ValidationOutcome,
        schema_name: &str,
    ) -> StreamResult<()> {
        let mut record = QuarantineRecord::from_outcome(message, outcome, schema_name);

        if let (Some(threshold), Some(blob)) = (self.blob_threshold, self.blob.as_ref()) {
            let payload_bytes = encode(&record.original_payload, &self.dlq_topic)?;
            if payload_bytes.len() > threshold {
                let uri = blob.put(&record.id, &payload_bytes).await?;
                record = record.externalize(uri);
            }
        }

        let bytes = serde_json::to_vec(&record).map_err(|e| StreamError::PublishFailed {
            topic: self.dlq_topic.clone(),
            reason: e.to_string(),
        })?;

        // Write-through: both the DLQ stream and the index must acknowledge
        // before the record counts as routed.
        self.retry
            .run("quarantine publish", || {
                self.producer
                    .send(&self.dlq_topic, message.key.as_deref(), &bytes)
            })
            .await?;
        self.retry
            .run("quarantine index write", || self.index.insert(&record))
            .await?;

        let error_kind = record
            .error_kind
            .map(|k| k.as_str())
            .unwrap_or("unknown");
        self.metrics
            .record_quarantined(&message.topic, schema_name, error_kind);
        info!(
            id = %record.id,
            schema = schema_name,
            error_kind,
            field_path = record.field_path.as_deref().unwrap_or("root"),
            "message quarantined"
        );

        if self.unflushed.fetch_add(1, Ordering::Relaxed) + 1 >= self.flush_every {
            self.flush().await?;
        }
        Ok(())
    }
}

fn encode(payload: &Value, topic: &str) -> StreamResult<Vec<u8>> {
    serde_json::to_vec(payload).map_err(|e| StreamError::PublishFailed {
        topic: topic.to_string(),
        reason: e.to_string(),
    })
}

/// Validated records are partitioned by the source key, falling back to a
/// payload identity attribute so one entity's events stay ordered.
fn partition_key<'a>(message: &'a Message, payload: &'a Value) -> Option<&'a str> {
    message
        .key
        .as_deref()
        .or_else(|| payload.get(FALLBACK_KEY_FIELD).and_then(Value::as_str))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn partition_key_prefers_message_key() {
        let message = Message {
            payload: json!({"user_id": "USER111111"}),
            topic: "raw-events".into(),
            partition: 0,
            offset: 0,
            timestamp: Utc::now(),
            key: Some("explicit".into()),
        };
        assert_eq!(partition_key(&message, &message.payload), Some("explicit"));
    }

    #[test]
    fn partition_key_falls_back_to_payload_identity() {
        let message = Message {
            payload: json!({"user_id": "USER111111"}),
            topic: "raw-events".into(),
            partition: 0,
            offset: 0,
            timestamp: Utc::now(),
            key: None,
        };
        assert_eq!(partition_key(&message, &message.payload), Some("USER111111"));
        assert_eq!(partition_key(&message, &json!({})), None);
    }
}
