#![forbid(unsafe_code)]

//! **sievegate-cli** – Command-line interface for the Sievegate gateway.
//!
//! Provides the gateway daemon (worker loop plus a metrics scrape endpoint)
//! and a few one-shot tools for working with schemas and configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sievegate_engine::ValidationEngine;
use sievegate_metrics::MetricsCollector;
use sievegate_registry::{DirectoryStore, SchemaRegistry};
use sievegate_runtime::{Gateway, GatewayConfig, GatewayDrivers};
use sievegate_stream_memory::{MemoryBlobStore, MemoryLog, MemoryQuarantineIndex};
use sievegate_validate::{JsonSchemaValidator, Validator, ValidatorChain};

//─────────────────────────────
//  CLI structure
//─────────────────────────────

#[derive(Parser)]
#[command(name = "sievegate")]
#[command(about = "Sievegate - streaming schema-enforcement gateway")]
#[command(version)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway daemon
    Run {
        /// Address the metrics endpoint listens on
        #[arg(long, default_value = "127.0.0.1:8081")]
        metrics_addr: SocketAddr,
    },
    /// Validate a JSON file against a named schema and print the outcome
    ValidateFile {
        /// Schema name to validate against
        #[arg(long)]
        schema: String,
        /// Schema version
        #[arg(long, default_value = sievegate_registry::LATEST_VERSION)]
        version: String,
        /// Path to the JSON payload
        file: PathBuf,
    },
    /// List schemas available in the schema directory
    ListSchemas,
    /// Load and validate the configuration, then print the effective values
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { metrics_addr } => run_daemon(config, metrics_addr).await,
        Commands::ValidateFile {
            schema,
            version,
            file,
        } => validate_file(config, &schema, &version, &file).await,
        Commands::ListSchemas => list_schemas(config).await,
        Commands::CheckConfig => {
            println!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
    }
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<GatewayConfig> {
    match path {
        Some(path) => GatewayConfig::load(path),
        None => {
            let mut config = GatewayConfig::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
    }
}

//─────────────────────────────
//  Daemon mode
//─────────────────────────────

async fn run_daemon(config: GatewayConfig, metrics_addr: SocketAddr) -> Result<()> {
    // Stream plumbing is pluggable; this binary ships the in-memory
    // drivers for development and demo deployments.
    let log = MemoryLog::new();
    let drivers = GatewayDrivers {
        consumer: Arc::new(log.consumer(config.input_topic.clone(), config.group_id.clone())),
        producer: Arc::new(log.producer()),
        index: Arc::new(MemoryQuarantineIndex::new()),
        blob: Some(Arc::new(MemoryBlobStore::new())),
        remediator: None,
    };

    let gateway = Gateway::start(config, drivers)?;
    let metrics_task = serve_metrics(gateway.metrics(), metrics_addr).await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    gateway.shutdown().await?;
    metrics_task.abort();
    Ok(())
}

async fn serve_metrics(
    metrics: Arc<MetricsCollector>,
    addr: SocketAddr,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(metrics);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics endpoint on {addr}"))?;
    info!(%addr, "metrics endpoint listening");

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!(error = %e, "metrics endpoint terminated");
        }
    }))
}

async fn metrics_handler(State(metrics): State<Arc<MetricsCollector>>) -> impl IntoResponse {
    match metrics.render() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

//─────────────────────────────
//  One-shot tools
//─────────────────────────────

async fn validate_file(
    config: GatewayConfig,
    schema: &str,
    version: &str,
    file: &std::path::Path,
) -> Result<()> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let payload: serde_json::Value = serde_json::from_str(&contents)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;

    let registry = Arc::new(SchemaRegistry::new(
        Arc::new(DirectoryStore::new(&config.schema_directory)),
        config.schema_cache_ttl(),
    ));
    let metrics = Arc::new(MetricsCollector::new()?);
    let chain = ValidatorChain::with(vec![
        Arc::new(JsonSchemaValidator::new()) as Arc<dyn Validator>
    ]);
    let engine = ValidationEngine::new(registry, chain, metrics)
        .with_timeout(config.validation_timeout());

    let outcome = engine.validate(&payload, schema, version, "cli").await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if !outcome.is_valid() {
        std::process::exit(1);
    }
    Ok(())
}

async fn list_schemas(config: GatewayConfig) -> Result<()> {
    let registry = SchemaRegistry::new(
        Arc::new(DirectoryStore::new(&config.schema_directory)),
        config.schema_cache_ttl(),
    );
    let names = registry.list_schemas().await?;
    if names.is_empty() {
        println!(
            "no schemas found in {}",
            config.schema_directory.display()
        );
    } else {
        for name in names {
            println!("{name}");
        }
    }
    Ok(())
}
