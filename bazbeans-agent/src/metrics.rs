use anyhow::{Context, Result};
use bazbeans_common::config::MetricsConfig;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

/// Installs the process-wide Prometheus recorder and binds its scrape
/// endpoint. A no-op if disabled in config.
pub fn install(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        info!("metrics server disabled");
        return Ok(());
    }

    let addr: std::net::SocketAddr = config
        .listen_addr
        .parse()
        .with_context(|| format!("invalid metrics listen address '{}'", config.listen_addr))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install Prometheus metrics exporter")?;

    info!(addr = %config.listen_addr, "metrics server listening");
    Ok(())
}

pub fn record_tick(success: bool) {
    metrics::counter!("bazbeans_agent_ticks_total", "success" => success.to_string()).increment(1);
}

pub fn record_command(kind: &str, success: bool) {
    metrics::counter!(
        "bazbeans_agent_commands_total",
        "kind" => kind.to_string(),
        "success" => success.to_string()
    )
    .increment(1);
}
