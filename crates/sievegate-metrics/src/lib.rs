#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **sievegate-metrics** – Prometheus metrics for the validation pipeline.
//!
//! The collector is a lifecycle object, not a process-wide global: it is
//! created once at startup, shared by `Arc`, and owns a private
//! [`prometheus::Registry`] so that tests and embedded deployments can run
//! several pipelines side by side without label collisions.

use anyhow::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use tracing::debug;

/// Validation duration histogram bucket bounds, in seconds.
const DURATION_BUCKETS: [f64; 9] = [0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0];

/// Collects and exposes operational metrics for the gateway.
///
/// Counter conventions follow the pipeline semantics: every valid or
/// invalid verdict also counts as a processed record, quarantine deliveries
/// are counted at the sink, and engine-level faults feed the system error
/// counter.
pub struct MetricsCollector {
    registry: Registry,
    records_processed: IntCounterVec,
    records_valid: IntCounterVec,
    records_invalid: IntCounterVec,
    records_quarantined: IntCounterVec,
    validation_duration: HistogramVec,
    consumer_lag: IntGaugeVec,
    system_errors: IntCounterVec,
}

impl MetricsCollector {
    /// Create a collector with all metric families registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let records_processed = IntCounterVec::new(
            Opts::new(
                "sievegate_records_processed_total",
                "Total number of records processed",
            ),
            &["topic", "schema"],
        )?;
        let records_valid = IntCounterVec::new(
            Opts::new(
                "sievegate_records_valid_total",
                "Total number of valid records",
            ),
            &["topic", "schema"],
        )?;
        let records_invalid = IntCounterVec::new(
            Opts::new(
                "sievegate_records_invalid_total",
                "Total number of invalid records",
            ),
            &["topic", "schema", "error_kind"],
        )?;
        let records_quarantined = IntCounterVec::new(
            Opts::new(
                "sievegate_records_quarantined_total",
                "Total number of quarantined records",
            ),
            &["topic", "schema", "error_kind"],
        )?;
        let validation_duration = HistogramVec::new(
            HistogramOpts::new(
                "sievegate_validation_duration_seconds",
                "Time spent validating messages",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["schema"],
        )?;
        let consumer_lag = IntGaugeVec::new(
            Opts::new("sievegate_kafka_lag", "Input stream consumer lag"),
            &["topic", "partition"],
        )?;
        let system_errors = IntCounterVec::new(
            Opts::new(
                "sievegate_system_errors_total",
                "Total number of system errors",
            ),
            &["kind"],
        )?;

        registry.register(Box::new(records_processed.clone()))?;
        registry.register(Box::new(records_valid.clone()))?;
        registry.register(Box::new(records_invalid.clone()))?;
        registry.register(Box::new(records_quarantined.clone()))?;
        registry.register(Box::new(validation_duration.clone()))?;
        registry.register(Box::new(consumer_lag.clone()))?;
        registry.register(Box::new(system_errors.clone()))?;

        debug!("metrics collector initialized");

        Ok(Self {
            registry,
            records_processed,
            records_valid,
            records_invalid,
            records_quarantined,
            validation_duration,
            consumer_lag,
            system_errors,
        })
    }

    /// Count a processed record.
    pub fn record_processed(&self, topic: &str, schema: &str) {
        self.records_processed
            .with_label_values(&[topic, schema])
            .inc();
    }

    /// Count a valid record. Also counts as processed.
    pub fn record_valid(&self, topic: &str, schema: &str) {
        self.records_valid.with_label_values(&[topic, schema]).inc();
        self.record_processed(topic, schema);
    }

    /// Count an invalid record. Also counts as processed.
    pub fn record_invalid(&self, topic: &str, schema: &str, error_kind: &str) {
        self.records_invalid
            .with_label_values(&[topic, schema, error_kind])
            .inc();
        self.record_processed(topic, schema);
    }

    /// Count a quarantine delivery.
    pub fn record_quarantined(&self, topic: &str, schema: &str, error_kind: &str) {
        self.records_quarantined
            .with_label_values(&[topic, schema, error_kind])
            .inc();
    }

    /// Observe one validation wall-clock duration, in seconds.
    pub fn record_duration(&self, schema: &str, seconds: f64) {
        self.validation_duration
            .with_label_values(&[schema])
            .observe(seconds);
    }

    /// Count an engine-level fault.
    pub fn record_error(&self, kind: &str) {
        self.system_errors.with_label_values(&[kind]).inc();
    }

    /// Update the consumer lag gauge for one partition.
    pub fn set_consumer_lag(&self, topic: &str, partition: i32, lag: i64) {
        self.consumer_lag
            .with_label_values(&[topic, &partition.to_string()])
            .set(lag);
    }

    /// Render all metric families in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Current value of the valid-records counter for a label pair.
    /// Intended for tests and the inspection surface.
    pub fn valid_count(&self, topic: &str, schema: &str) -> u64 {
        self.records_valid.with_label_values(&[topic, schema]).get()
    }

    /// Current value of the invalid-records counter for a label triple.
    pub fn invalid_count(&self, topic: &str, schema: &str, error_kind: &str) -> u64 {
        self.records_invalid
            .with_label_values(&[topic, schema, error_kind])
            .get()
    }

    /// Current value of the quarantined-records counter for a label triple.
    pub fn quarantined_count(&self, topic: &str, schema: &str, error_kind: &str) -> u64 {
        self.records_quarantined
            .with_label_values(&[topic, schema, error_kind])
            .get()
    }

    /// Current value of the system-errors counter for a kind.
    pub fn system_error_count(&self, kind: &str) -> u64 {
        self.system_errors.with_label_values(&[kind]).get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_and_invalid_records_also_count_as_processed() {
        let metrics = MetricsCollector::new().unwrap();

        metrics.record_valid("raw-events", "user_event");
        metrics.record_invalid("raw-events", "user_event", "missing_field");

        assert_eq!(metrics.valid_count("raw-events", "user_event"), 1);
        assert_eq!(
            metrics.invalid_count("raw-events", "user_event", "missing_field"),
            1
        );
        assert_eq!(
            metrics
                .records_processed
                .with_label_values(&["raw-events", "user_event"])
                .get(),
            2
        );
    }

    #[test]
    fn render_exposes_all_families_in_text_format() {
        let metrics = MetricsCollector::new().unwrap();
        metrics.record_valid("raw-events", "user_event");
        metrics.record_duration("user_event", 0.003);
        metrics.set_consumer_lag("raw-events", 2, 17);
        metrics.record_error("schema_not_found");

        let text = metrics.render().unwrap();
        assert!(text.contains("sievegate_records_valid_total"));
        assert!(text.contains("sievegate_validation_duration_seconds_bucket"));
        assert!(text.contains("sievegate_kafka_lag"));
        assert!(text.contains("sievegate_system_errors_total"));
    }

    #[test]
    fn collectors_are_independent() {
        let a = MetricsCollector::new().unwrap();
        let b = MetricsCollector::new().unwrap();
        a.record_valid("raw-events", "user_event");
        assert_eq!(b.valid_count("raw-events", "user_event"), 0);
    }

    #[test]
    fn lag_gauge_tracks_latest_value_per_partition() {
        let metrics = MetricsCollector::new().unwrap();
        metrics.set_consumer_lag("raw-events", 0, 10);
        metrics.set_consumer_lag("raw-events", 0, 3);
        assert_eq!(
            metrics
                .consumer_lag
                .with_label_values(&["raw-events", "0"])
                .get(),
            3
        );
    }
}
