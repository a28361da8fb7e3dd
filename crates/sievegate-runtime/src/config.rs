//! Gateway configuration loading and validation.
//!
//! Configuration is a flat record loaded from a YAML file, overridable
//! through `SIEVEGATE_`-prefixed environment variables. Every field has a
//! development-friendly default so a bare `GatewayConfig::default()` runs
//! against local infrastructure.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Flat configuration record for the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Input stream bootstrap servers.
    pub bootstrap_servers: String,
    /// Topic the raw events are consumed from.
    pub input_topic: String,
    /// Consumer group id.
    pub group_id: String,
    /// Reset policy on unknown offset (`earliest` or `latest`).
    pub auto_offset_reset: String,

    /// Topic conformant events are published to.
    pub validated_topic: String,
    /// Topic quarantined events are published to.
    pub dlq_topic: String,

    /// Upper bound on records per poll cycle.
    pub max_poll_records: usize,
    /// How long a poll waits for the first record, in milliseconds.
    pub poll_timeout_ms: u64,

    /// Directory the schema registry reads from.
    pub schema_directory: PathBuf,
    /// Schema cache TTL, in seconds.
    pub schema_cache_ttl_secs: u64,

    /// Payload field carrying the schema identifier.
    pub schema_field: String,
    /// Whether the remediation hook is offered failed payloads.
    pub enable_auto_remediation: bool,
    /// Per-message validation budget, in seconds.
    pub validation_timeout_secs: u64,

    /// Producer flush granularity for quarantine publishes.
    pub quarantine_batch_size: usize,
    /// Payloads larger than this many serialized bytes are externalized to
    /// the blob store. `None` disables externalization.
    pub blob_threshold_bytes: Option<usize>,

    /// Retry attempts for sink publishes and offset commits.
    pub publish_retry_budget: u32,
    /// Base backoff between retries, in milliseconds (doubles per attempt).
    pub retry_backoff_ms: u64,
    /// How often the consumer lag gauge is refreshed, in seconds.
    pub lag_refresh_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".into(),
            input_topic: "raw-events".into(),
            group_id: "sievegate-validators".into(),
            auto_offset_reset: "earliest".into(),
            validated_topic: "validated-events".into(),
            dlq_topic: "quarantine-dlq".into(),
            max_poll_records: 500,
            poll_timeout_ms: 1000,
            schema_directory: PathBuf::from("./schemas"),
            schema_cache_ttl_secs: 300,
            schema_field: "_schema".into(),
            enable_auto_remediation: false,
            validation_timeout_secs: 5,
            quarantine_batch_size: 100,
            blob_threshold_bytes: None,
            publish_retry_budget: 3,
            retry_backoff_ms: 100,
            lag_refresh_secs: 30,
        }
    }
}

impl GatewayConfig {
    /// Load a configuration from a YAML file and apply environment
    /// overrides. Missing keys fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let mut config: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config.apply_env_overrides();
        config.validate()?;
        debug!(config = ?config, "configuration loaded");
        Ok(config)
    }

    /// Overlay `SIEVEGATE_`-prefixed environment variables onto this
    /// configuration. Unparseable values are logged and skipped.
    pub fn apply_env_overrides(&mut self) {
        override_string("SIEVEGATE_BOOTSTRAP_SERVERS", &mut self.bootstrap_servers);
        override_string("SIEVEGATE_INPUT_TOPIC", &mut self.input_topic);
        override_string("SIEVEGATE_GROUP_ID", &mut self.group_id);
        override_string("SIEVEGATE_VALIDATED_TOPIC", &mut self.validated_topic);
        override_string("SIEVEGATE_DLQ_TOPIC", &mut self.dlq_topic);
        override_string("SIEVEGATE_SCHEMA_FIELD", &mut self.schema_field);
        override_parsed("SIEVEGATE_MAX_POLL_RECORDS", &mut self.max_poll_records);
        override_parsed("SIEVEGATE_SCHEMA_CACHE_TTL_SECS", &mut self.schema_cache_ttl_secs);
        override_parsed(
            "SIEVEGATE_VALIDATION_TIMEOUT_SECS",
            &mut self.validation_timeout_secs,
        );
        override_parsed(
            "SIEVEGATE_ENABLE_AUTO_REMEDIATION",
            &mut self.enable_auto_remediation,
        );
        if let Ok(dir) = std::env::var("SIEVEGATE_SCHEMA_DIRECTORY") {
            self.schema_directory = PathBuf::from(dir);
        }
    }

    /// Reject configurations that cannot drive the pipeline.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.input_topic.is_empty(), "input_topic must not be empty");
        anyhow::ensure!(!self.group_id.is_empty(), "group_id must not be empty");
        anyhow::ensure!(
            !self.validated_topic.is_empty(),
            "validated_topic must not be empty"
        );
        anyhow::ensure!(!self.dlq_topic.is_empty(), "dlq_topic must not be empty");
        anyhow::ensure!(
            self.validated_topic != self.input_topic && self.dlq_topic != self.input_topic,
            "output topics must differ from the input topic"
        );
        anyhow::ensure!(self.max_poll_records > 0, "max_poll_records must be positive");
        anyhow::ensure!(
            self.quarantine_batch_size > 0,
            "quarantine_batch_size must be positive"
        );
        anyhow::ensure!(
            self.validation_timeout_secs > 0,
            "validation_timeout_secs must be positive"
        );
        anyhow::ensure!(
            matches!(self.auto_offset_reset.as_str(), "earliest" | "latest"),
            "auto_offset_reset must be 'earliest' or 'latest'"
        );
        Ok(())
    }

    /// Poll timeout as a [`Duration`].
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Schema cache TTL as a [`Duration`].
    pub fn schema_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.schema_cache_ttl_secs)
    }

    /// Validation budget as a [`Duration`].
    pub fn validation_timeout(&self) -> Duration {
        Duration::from_secs(self.validation_timeout_secs)
    }

    /// Retry backoff base as a [`Duration`].
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Lag refresh interval as a [`Duration`].
    pub fn lag_refresh(&self) -> Duration {
        Duration::from_secs(self.lag_refresh_secs)
    }
}

fn override_string(var: &str, target: &mut String) {
    if let Ok(value) = std::env::var(var) {
        *target = value;
    }
}

fn override_parsed<T: std::str::FromStr>(var: &str, target: &mut T) {
    if let Ok(value) = std::env::var(var) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(%var, %value, "ignoring unparseable environment override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        GatewayConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let config: GatewayConfig =
            serde_yaml::from_str("input_topic: events\nmax_poll_records: 50\n").unwrap();
        assert_eq!(config.input_topic, "events");
        assert_eq!(config.max_poll_records, 50);
        assert_eq!(config.validated_topic, "validated-events");
        assert_eq!(config.schema_cache_ttl_secs, 300);
    }

    #[test]
    fn nonsensical_values_are_rejected() {
        let mut config = GatewayConfig::default();
        config.max_poll_records = 0;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.validated_topic = config.input_topic.clone();
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.auto_offset_reset = "somewhere".into();
        assert!(config.validate().is_err());
    }
}
