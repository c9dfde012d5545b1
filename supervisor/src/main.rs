use anyhow::{Context, Result};
use logpipe_common::{NodeRole, PipelineConfig};
use logpipe_supervisor::{ProcessSpec, Supervisor, SupervisorConfig};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = PipelineConfig::from_env();
    let specs = vec![
        ProcessSpec {
            name:    "log-ingest".to_string(),
            command: config.ingest_command.clone(),
            role:    NodeRole::Server,
        },
        ProcessSpec {
            name:    "log-process".to_string(),
            command: config.process_command.clone(),
            role:    NodeRole::Client,
        },
    ];

    let mut supervisor = Supervisor::new(SupervisorConfig::from_pipeline(&config), specs)
        .context("failed to initialize supervisor")?;
    supervisor.start().context("failed to start the pipeline")?;

    let stop = supervisor.stop_sender();
    ctrlc::set_handler(move || {
        let _ = stop.send(());
    })
    .context("failed to install shutdown handler")?;

    let handle = supervisor
        .spawn_monitor()
        .context("failed to start monitor loop")?;
    handle.join();

    tracing::info!("supervisor stopped");
    Ok(())
}
