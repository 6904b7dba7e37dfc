use anyhow::{Context, Result};
use bazbeans_agent::agent::NodeAgent;
use bazbeans_agent::management::{self, ShutdownSignal};
use bazbeans_agent::{metrics, probe};
use bazbeans_common::config::BazBeansConfig;
use bazbeans_common::coordinator::RedisCoordinatorClient;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "bazbeans_agent=info".into()),
        )
        .with_target(false)
        .init();

    info!("starting bazbeans-agent v{}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::var("BAZBEANS_CONFIG").ok().map(std::path::PathBuf::from);
    let config = BazBeansConfig::from_file(config_path.as_deref()).context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    info!(node_id = %config.node_id, data_center = %config.data_center, "configuration loaded");
    let config = Arc::new(config);

    let client = Arc::new(
        RedisCoordinatorClient::connect(&config.redis_url)
            .await
            .context("failed to connect to coordinator")?,
    );

    metrics::install(&config.metrics).context("failed to install metrics exporter")?;

    let system_probe = Arc::new(probe::SysinfoProbe::new());
    let agent = Arc::new(NodeAgent::new(config.clone(), client, system_probe));

    let shutdown_flag = agent.shutdown_handle();
    let shutdown_signal = ShutdownSignal::from_flag(shutdown_flag.clone());

    let management_handle = {
        let management_config = config.management_api.clone();
        let shutdown_signal = shutdown_signal.clone();
        tokio::spawn(async move {
            if let Err(err) = management::serve(management_config, shutdown_signal).await {
                error!(error = %err, "management API server exited with error");
            }
        })
    };

    let agent_for_signal = shutdown_flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("received interrupt, initiating graceful shutdown");
            agent_for_signal.store(true, Ordering::SeqCst);
        }
    });

    agent.run().await.context("agent run loop exited with error")?;
    management_handle.abort();

    Ok(())
}
