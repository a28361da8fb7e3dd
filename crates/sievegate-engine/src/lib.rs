#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **sievegate-engine** – Validation orchestration.
//!
//! The engine ties the schema registry, the validator chain, and the
//! optional remediation hook into one operation: given a payload and a
//! schema coordinate, produce a [`ValidationOutcome`]. The operation never
//! fails - every fault in the machinery (missing schema, broken schema
//! document, validator exception, exceeded time budget) is folded into an
//! `ERROR` outcome and a system-error metric, so the stream worker always
//! has a routable verdict.
//!
//! The engine is re-entrant: `validate` takes `&self` and may be called
//! concurrently from any number of workers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, error, warn};

use sievegate_metrics::MetricsCollector;
use sievegate_registry::{RegistryError, SchemaRegistry};
use sievegate_types::{ErrorKind, ValidationOutcome, ValidationResult};
use sievegate_validate::{Remediator, Validator, ValidatorChain};

/// Default per-message validation budget.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Orchestrates the validation pipeline for one message at a time.
pub struct ValidationEngine {
    registry: Arc<SchemaRegistry>,
    chain: ValidatorChain,
    remediator: Option<Arc<dyn Remediator>>,
    metrics: Arc<MetricsCollector>,
    timeout: Duration,
}

impl ValidationEngine {
    /// Create an engine over a registry and validator chain.
    pub fn new(
        registry: Arc<SchemaRegistry>,
        chain: ValidatorChain,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            registry,
            chain,
            remediator: None,
            metrics,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Enable the remediation hook.
    pub fn with_remediator(mut self, remediator: Arc<dyn Remediator>) -> Self {
        self.remediator = Some(remediator);
        self
    }

    /// Override the per-message validation budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Append a validator to the chain.
    pub fn add_validator(&mut self, validator: Arc<dyn Validator>) {
        self.chain.push(validator);
    }

    /// Remove validators from the chain by name.
    pub fn remove_validator(&mut self, name: &str) -> bool {
        self.chain.remove(name)
    }

    /// Validate a payload against a named, versioned schema.
    ///
    /// Always returns an outcome; faults become `ERROR` outcomes. The
    /// wall-clock duration is observed in the validation histogram on every
    /// path, including timeouts.
    pub async fn validate(
        &self,
        payload: &Value,
        schema_name: &str,
        schema_version: &str,
        topic: &str,
    ) -> ValidationOutcome {
        let started = Instant::now();

        let outcome = match tokio::time::timeout(
            self.timeout,
            self.validate_inner(payload, schema_name, schema_version),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    schema = schema_name,
                    budget_ms = self.timeout.as_millis() as u64,
                    "validation timed out"
                );
                self.metrics.record_error(ErrorKind::Timeout.as_str());
                ValidationOutcome::error(
                    ErrorKind::Timeout,
                    format!("validation exceeded {:?} budget", self.timeout),
                )
            }
        };

        match outcome.result {
            ValidationResult::Valid => {
                debug!(schema = schema_name, "message validated successfully");
                self.metrics.record_valid(topic, schema_name);
            }
            ValidationResult::Invalid => {
                let kind = outcome
                    .error_kind
                    .map(|k| k.as_str())
                    .unwrap_or("unknown");
                warn!(
                    schema = schema_name,
                    error_kind = kind,
                    field_path = outcome.field_path.as_deref().unwrap_or("root"),
                    "validation failed"
                );
                self.metrics.record_invalid(topic, schema_name, kind);
            }
            ValidationResult::Error => {}
        }

        self.metrics
            .record_duration(schema_name, started.elapsed().as_secs_f64());
        outcome
    }

    async fn validate_inner(
        &self,
        payload: &Value,
        schema_name: &str,
        schema_version: &str,
    ) -> ValidationOutcome {
        let schema = match self.registry.get(schema_name, schema_version).await {
            Ok(schema) => schema,
            Err(e @ RegistryError::NotFound { .. }) => {
                error!(schema = schema_name, version = schema_version, "schema not found");
                self.metrics.record_error(ErrorKind::SchemaNotFound.as_str());
                return ValidationOutcome::error(ErrorKind::SchemaNotFound, e.to_string());
            }
            Err(e @ RegistryError::Invalid { .. }) => {
                error!(schema = schema_name, version = schema_version, %e, "schema rejected");
                self.metrics.record_error(ErrorKind::InvalidSchema.as_str());
                return ValidationOutcome::error(ErrorKind::InvalidSchema, e.to_string());
            }
            Err(e) => {
                error!(schema = schema_name, %e, "schema store fault");
                self.metrics
                    .record_error(ErrorKind::ValidationException.as_str());
                return ValidationOutcome::error(ErrorKind::ValidationException, e.to_string());
            }
        };

        let failure = match self.chain.run(payload, &schema).await {
            Ok(()) => return ValidationOutcome::valid(),
            Err(failure) => failure,
        };

        if failure.error.kind.is_engine_level() {
            // The validator itself broke (bad schema compile, internal
            // fault); this is machinery, not data.
            self.metrics.record_error(failure.error.kind.as_str());
            return ValidationOutcome::error(failure.error.kind, failure.error.message);
        }

        if let Some(remediator) = &self.remediator {
            if let Some(repaired) = remediator.try_repair(payload, &failure.error).await {
                // Re-run exactly the validator that rejected the payload,
                // exactly once. A second failure is terminal.
                if failure.validator.validate(&repaired, &schema).await.is_ok() {
                    debug!(
                        schema = schema_name,
                        field_path = %failure.error.field_path,
                        "payload remediated"
                    );
                    return ValidationOutcome::valid_remediated(payload.clone(), repaired);
                }
            }
        }

        ValidationOutcome::invalid(failure.error)
    }
}
