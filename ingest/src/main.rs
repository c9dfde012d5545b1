use std::sync::Arc;

use anyhow::{Context, Result};
use logpipe_common::{CertPaths, NodeRuntime, PipelineConfig};
use logpipe_ingest::{run_tailer, IngestionHandler};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = PipelineConfig::from_env();
    let certs = CertPaths::new();

    let runtime = NodeRuntime::new("log-ingest", &certs, Arc::new(IngestionHandler), config.io_poll)
        .context("failed to build ingestion runtime")?;
    runtime
        .listen(&config.ingest_addr)
        .with_context(|| format!("failed to bind ingestion endpoint {}", config.ingest_addr))?;

    tracing::info!(log_file = ?config.log_file, "log ingestion node started");
    run_tailer(&runtime, &config.log_file, config.tail_poll)
}
