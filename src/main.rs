use conflict_repro::{build_client, Config, Orchestrator};
use std::sync::Arc;

const CONFIG_PATH_VAR: &str = "CONFLICT_REPRO_CONFIG";

#[tokio::main]
async fn main() {
    conflict_repro::init_logging();
    conflict_repro::init_metrics();

    tracing::info!("Starting delete_by_query conflict reproduction");

    if let Err(e) = run().await {
        tracing::error!("Reproduction aborted: {:#}", e);
        std::process::exit(1);
    }
}

fn load_config() -> anyhow::Result<Config> {
    match std::env::var(CONFIG_PATH_VAR) {
        Ok(path) => {
            tracing::info!("Loading configuration from {}", path);
            Config::from_file(&path)
        }
        Err(_) => Ok(Config::from_env().unwrap_or_else(|e| {
            tracing::warn!("Ignoring invalid environment configuration: {:#}", e);
            Config::default()
        })),
    }
}

async fn run() -> anyhow::Result<()> {
    let config = load_config()?;
    tracing::info!("Loaded configuration: {:?}", config);

    let client = build_client(&config.cluster)?;
    let orchestrator = Arc::new(Orchestrator::new(config, client));

    let report = orchestrator.run_and_shutdown().await?;

    for worker in &report.harness.workers {
        tracing::debug!(worker = worker.worker, state = ?worker.state, outcome = ?worker.outcome, "Worker result");
    }

    Ok(())
}
