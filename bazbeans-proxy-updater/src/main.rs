use anyhow::{Context, Result};
use bazbeans_common::coordinator::RedisCoordinatorClient;
use bazbeans_common::resolvers::RegistryResolver;
use bazbeans_proxy_updater::config::ProxyUpdaterConfig;
use bazbeans_proxy_updater::render::{HealthCheckOptions, RenderOptions};
use bazbeans_proxy_updater::ProxyUpdater;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bazbeans_proxy_updater=info".into()),
        )
        .with_target(false)
        .init();

    info!("starting bazbeans-proxy-updater v{}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::var("BAZBEANS_PROXY_CONFIG").ok().map(std::path::PathBuf::from);
    let config = ProxyUpdaterConfig::from_file(config_path.as_deref()).context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    let common = Arc::new(config.common.clone());

    let client = Arc::new(
        RedisCoordinatorClient::connect(&common.redis_url)
            .await
            .context("failed to connect to coordinator")?,
    );

    if common.metrics.enabled {
        let addr: std::net::SocketAddr = common
            .metrics
            .listen_addr
            .parse()
            .with_context(|| format!("invalid metrics listen address '{}'", common.metrics.listen_addr))?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus metrics exporter")?;
        info!(addr = %common.metrics.listen_addr, "metrics server listening");
    }

    let resolver = Arc::new(RegistryResolver::new(client.clone(), common.node_ips_key.clone()));

    let health_check = common.upstream_health_check_comments.then(|| HealthCheckOptions {
        path: config.health_check_path.clone(),
        timeout_secs: config.health_check_timeout_secs,
    });
    let render_opts = RenderOptions::new(config.upstream_name.clone(), common.node_port, health_check);

    let updater = ProxyUpdater::new(
        client,
        common,
        config.upstream_file.clone(),
        config.reload_command.clone(),
        config.validate_command.clone(),
        resolver,
        render_opts,
    );

    if let Err(err) = updater.run().await {
        error!(error = %err, "proxy updater exited with error");
        return Err(err.into());
    }

    Ok(())
}
