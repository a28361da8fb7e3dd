#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **sievegate-runtime** – Gateway wiring and the stream worker loop.
//!
//! This crate sits above the validation core and coordinates between:
//! - The input stream consumer (partitioned log, manual offset commit)
//! - The validation engine (registry + validator chain + remediation)
//! - The sink router (validated stream, quarantine stream and index)
//! - The metrics collector
//!
//! The [`Gateway`] assembles these from a [`GatewayConfig`] and a set of
//! driver handles, runs the worker as a background task, and provides a
//! graceful, idempotent shutdown path.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use sievegate_engine::ValidationEngine;
use sievegate_metrics::MetricsCollector;
use sievegate_registry::{DirectoryStore, SchemaRegistry};
use sievegate_stream_core::{BlobStore, QuarantineIndex, RecordConsumer, RecordProducer};
use sievegate_validate::{JsonSchemaValidator, Remediator, Validator, ValidatorChain};

mod config;
mod retry;
mod router;
mod worker;

pub use config::GatewayConfig;
pub use retry::RetryPolicy;
pub use router::{RouteTarget, SinkRouter};
pub use worker::StreamWorker;

//─────────────────────────────
//  Driver handles
//─────────────────────────────

/// Transport and sink drivers the gateway runs against.
///
/// Drivers are pooled-connection style handles: shared, internally
/// synchronized, and safe to clone across tasks.
pub struct GatewayDrivers {
    /// Input stream consumer.
    pub consumer: Arc<dyn RecordConsumer>,
    /// Output stream producer (validated and DLQ topics).
    pub producer: Arc<dyn RecordProducer>,
    /// Quarantine index.
    pub index: Arc<dyn QuarantineIndex>,
    /// Optional blob store for oversized payloads.
    pub blob: Option<Arc<dyn BlobStore>>,
    /// Optional remediation hook, only consulted when
    /// `enable_auto_remediation` is set.
    pub remediator: Option<Arc<dyn Remediator>>,
}

//─────────────────────────────
//  Gateway lifecycle
//─────────────────────────────

/// A running schema-enforcement gateway.
pub struct Gateway {
    metrics: Arc<MetricsCollector>,
    registry: Arc<SchemaRegistry>,
    shutdown_tx: watch::Sender<bool>,
    worker: JoinHandle<Result<()>>,
}

impl Gateway {
    /// Wire all components from configuration and start the worker.
    pub fn start(config: GatewayConfig, drivers: GatewayDrivers) -> Result<Self> {
        config.validate().context("invalid gateway configuration")?;

        let metrics = Arc::new(MetricsCollector::new().context("failed to build metrics")?);

        let registry = Arc::new(SchemaRegistry::new(
            Arc::new(DirectoryStore::new(&config.schema_directory)),
            config.schema_cache_ttl(),
        ));

        let chain = ValidatorChain::with(vec![
            Arc::new(JsonSchemaValidator::new()) as Arc<dyn Validator>
        ]);
        let mut engine = ValidationEngine::new(registry.clone(), chain, metrics.clone())
            .with_timeout(config.validation_timeout());
        if config.enable_auto_remediation {
            if let Some(remediator) = drivers.remediator.clone() {
                info!("auto-remediation enabled");
                engine = engine.with_remediator(remediator);
            }
        }
        let engine = Arc::new(engine);

        let retry = RetryPolicy::new(config.publish_retry_budget, config.retry_backoff());
        let router = Arc::new(SinkRouter::new(
            drivers.producer.clone(),
            drivers.index.clone(),
            drivers.blob.clone(),
            metrics.clone(),
            config.validated_topic.clone(),
            config.dlq_topic.clone(),
            config.blob_threshold_bytes,
            config.quarantine_batch_size,
            retry,
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = StreamWorker::new(
            &config,
            drivers.consumer.clone(),
            engine,
            router,
            metrics.clone(),
            shutdown_rx,
        );
        let worker = tokio::spawn(worker.run());

        info!(
            input_topic = %config.input_topic,
            validated_topic = %config.validated_topic,
            dlq_topic = %config.dlq_topic,
            "gateway started"
        );

        Ok(Self {
            metrics,
            registry,
            shutdown_tx,
            worker,
        })
    }

    /// The gateway's metrics collector.
    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    /// The gateway's schema registry.
    pub fn registry(&self) -> Arc<SchemaRegistry> {
        self.registry.clone()
    }

    /// Signal shutdown without waiting. Safe to call any number of times.
    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Signal shutdown and wait for the worker to drain.
    ///
    /// The worker honors the signal before the next poll and between
    /// messages of the current batch; messages already routed have their
    /// offsets committed before it exits.
    pub async fn shutdown(self) -> Result<()> {
        info!("shutting down gateway");
        self.trigger_shutdown();
        self.worker
            .await
            .context("stream worker panicked")??;
        info!("gateway shutdown complete");
        Ok(())
    }

    /// Wait for the worker to exit on its own (fatal infrastructure error
    /// or an external shutdown trigger).
    pub async fn join(self) -> Result<()> {
        self.worker
            .await
            .context("stream worker panicked")?
    }
}
