//! The stream worker: consume, validate, route, commit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use sievegate_engine::ValidationEngine;
use sievegate_metrics::MetricsCollector;
use sievegate_stream_core::{OffsetMap, RawRecord, RecordConsumer};
use sievegate_types::{
    deserialization_error_payload, ErrorKind, Message, ValidationError, ValidationOutcome,
};

use crate::config::GatewayConfig;
use crate::retry::RetryPolicy;
use crate::router::SinkRouter;

/// Schema label used when no schema identifier could be resolved.
const UNKNOWN_SCHEMA: &str = "unknown";

/// The outer processing loop driving the validation engine.
///
/// At-least-once contract: offsets advance only after every message of a
/// poll cycle has been routed. A crash between routing and commit causes
/// redelivery, which the sinks absorb (deterministic quarantine ids,
/// idempotent downstream consumers).
pub struct StreamWorker {
    consumer: Arc<dyn RecordConsumer>,
    engine: Arc<ValidationEngine>,
    router: Arc<SinkRouter>,
    metrics: Arc<MetricsCollector>,
    schema_field: String,
    max_poll_records: usize,
    poll_timeout: Duration,
    lag_refresh: Duration,
    retry: RetryPolicy,
    shutdown: watch::Receiver<bool>,
}

impl StreamWorker {
    /// Build a worker from configuration and wired components.
    pub fn new(
        config: &GatewayConfig,
        consumer: Arc<dyn RecordConsumer>,
        engine: Arc<ValidationEngine>,
        router: Arc<SinkRouter>,
        metrics: Arc<MetricsCollector>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            consumer,
            engine,
            router,
            metrics,
            schema_field: config.schema_field.clone(),
            max_poll_records: config.max_poll_records,
            poll_timeout: config.poll_timeout(),
            lag_refresh: config.lag_refresh(),
            retry: RetryPolicy::new(config.publish_retry_budget, config.retry_backoff()),
            shutdown,
        }
    }

    /// Run until shutdown is signalled or an infrastructure error outlives
    /// its retry budget. On error the current batch's offsets are *not*
    /// committed, preserving the no-loss invariant.
    pub async fn run(self) -> Result<()> {
        info!("stream worker started");
        let mut last_lag_refresh = Instant::now();

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let records = self
                .retry
                .run("stream poll", || {
                    self.consumer.poll(self.max_poll_records, self.poll_timeout)
                })
                .await
                .context("input stream poll failed")?;

            if last_lag_refresh.elapsed() >= self.lag_refresh {
                self.refresh_lag().await;
                last_lag_refresh = Instant::now();
            }

            if records.is_empty() {
                continue;
            }

            debug!(batch = records.len(), "poll cycle");
            let mut pending = OffsetMap::new();
            let mut interrupted = false;

            for record in records {
                let coordinates = record.coordinates();
                let next_offset = record.offset + 1;

                self.process(record)
                    .await
                    .context("routing failed, batch offsets not committed")?;

                let committed = pending.entry(coordinates).or_insert(next_offset);
                *committed = (*committed).max(next_offset);

                // Shutdown checkpoint between messages: the current message
                // is already routed, so its offset commits below.
                if *self.shutdown.borrow() {
                    interrupted = true;
                    break;
                }
            }

            self.router
                .flush()
                .await
                .context("sink flush failed, batch offsets not committed")?;
            self.retry
                .run("offset commit", || self.consumer.commit(&pending))
                .await
                .context("offset commit failed")?;

            if interrupted {
                break;
            }
        }

        info!("stream worker stopped");
        Ok(())
    }

    /// Decode, classify, validate, and route one record.
    async fn process(&self, record: RawRecord) -> Result<()> {
        let (message, decode_failure) = decode(record);

        let (schema_name, outcome) = if let Some(outcome) = decode_failure {
            self.metrics
                .record_invalid(&message.topic, UNKNOWN_SCHEMA, ErrorKind::MalformedJson.as_str());
            (UNKNOWN_SCHEMA.to_string(), outcome)
        } else {
            match message.schema_name(&self.schema_field) {
                Some(name) => {
                    let name = name.to_string();
                    let outcome = self
                        .engine
                        .validate(
                            &message.payload,
                            &name,
                            sievegate_registry::LATEST_VERSION,
                            &message.topic,
                        )
                        .await;
                    (name, outcome)
                }
                None => {
                    self.metrics.record_invalid(
                        &message.topic,
                        UNKNOWN_SCHEMA,
                        ErrorKind::MissingSchema.as_str(),
                    );
                    let outcome = ValidationOutcome::invalid(ValidationError::new(
                        ErrorKind::MissingSchema,
                        format!("payload has no '{}' field", self.schema_field),
                    ));
                    (UNKNOWN_SCHEMA.to_string(), outcome)
                }
            }
        };

        self.router.route(&message, &outcome, &schema_name).await?;
        Ok(())
    }

    async fn refresh_lag(&self) {
        match self.consumer.lag().await {
            Ok(lags) => {
                for (tp, lag) in lags {
                    self.metrics.set_consumer_lag(&tp.topic, tp.partition, lag);
                }
            }
            Err(e) => warn!(error = %e, "failed to refresh consumer lag"),
        }
    }
}

/// Decode a raw record into a message. Decode failures synthesize a
/// pseudo-payload preserving the raw bytes and produce a pre-made
/// `malformed_json` outcome, so the record still flows to quarantine.
fn decode(record: RawRecord) -> (Message, Option<ValidationOutcome>) {
    let (payload, failure) = match serde_json::from_slice(&record.value) {
        Ok(payload) => (payload, None),
        Err(e) => {
            warn!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                error = %e,
                "failed to decode record value"
            );
            let outcome = ValidationOutcome::invalid(ValidationError::new(
                ErrorKind::MalformedJson,
                e.to_string(),
            ));
            (
                deserialization_error_payload(&record.value, &e.to_string()),
                Some(outcome),
            )
        }
    };

    (
        Message {
            payload,
            topic: record.topic,
            partition: record.partition,
            offset: record.offset,
            timestamp: record.timestamp,
            key: record.key,
        },
        failure,
    )
}
