use std::{sync::Arc, thread, time::Duration};

use anyhow::{Context, Result};
use logpipe_common::{CertPaths, NodeRuntime, PipelineConfig};
use logpipe_process::{control::run_control_link, LogStore, ProcessingHandler};
use tracing_subscriber::EnvFilter;

const NODE_NAME: &str = "log-process";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = PipelineConfig::from_env();
    let certs = CertPaths::new();

    let store = Arc::new(
        LogStore::open(&config.db_path)
            .with_context(|| format!("failed to open log store {:?}", config.db_path))?,
    );
    let runtime = NodeRuntime::new(
        NODE_NAME,
        &certs,
        Arc::new(ProcessingHandler::new(store)),
        config.io_poll,
    )
    .context("failed to build processing runtime")?;
    runtime
        .listen(&config.process_addr)
        .with_context(|| format!("failed to bind processing endpoint {}", config.process_addr))?;

    // supervisor-triggered reconnects arrive over the control link
    {
        let runtime = runtime.clone();
        let config = config.clone();
        thread::Builder::new()
            .name("control-link".to_string())
            .spawn(move || {
                run_control_link(&config.control_addr, NODE_NAME, || {
                    if let Err(e) =
                        runtime.dial(&config.ingest_addr, config.dial_attempts, config.dial_retry_delay)
                    {
                        tracing::warn!(error = %e, "reconnect failed, self-heal will retry");
                    }
                });
            })
            .context("failed to spawn control link thread")?;
    }

    tracing::info!(server = %config.ingest_addr, "log processing node started");
    if let Err(e) = runtime.dial(&config.ingest_addr, config.dial_attempts, config.dial_retry_delay) {
        tracing::warn!(error = %e, "initial connect failed, self-heal will retry");
    }

    // Self-healing reconnect check, independent of the control signal: a
    // dial against a live channel is a no-op, so this only acts when the
    // outbound connection is actually gone.
    loop {
        thread::sleep(config.self_heal);
        if let Err(e) = runtime.dial(&config.ingest_addr, 1, Duration::ZERO) {
            tracing::debug!(error = %e, "self-heal dial failed, will retry");
        }
    }
}
