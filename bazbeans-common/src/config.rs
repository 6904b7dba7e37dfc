use crate::error::{CoordinatorError, Result};
use crate::secret::Secret;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

fn default_redis_url() -> Secret<String> {
    Secret::new("redis://localhost:6379/0".to_string())
}

fn default_node_id() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-node".to_string())
}

fn default_data_center() -> String {
    "default".to_string()
}
fn default_heartbeat_ttl() -> u64 {
    30
}
fn default_heartbeat_interval() -> u64 {
    10
}
fn default_command_poll_interval() -> u64 {
    5
}
fn default_app_dir() -> String {
    "/opt/app".to_string()
}
fn default_compose_file() -> String {
    "docker-compose.yml".to_string()
}
fn default_node_port() -> u16 {
    8000
}
fn default_pubsub_channel() -> String {
    "bazbeans:lb_events".to_string()
}
fn default_cpu_threshold() -> u8 {
    90
}
fn default_memory_threshold() -> u8 {
    85
}
fn default_allowed_exec_prefixes() -> Vec<String> {
    ["docker", "systemctl", "ls", "cat", "grep", "ps", "netstat"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_nodes_all_key() -> String {
    "bazbeans:nodes:all".to_string()
}
fn default_nodes_active_key() -> String {
    "bazbeans:nodes:active".to_string()
}
fn default_node_ips_key() -> String {
    "bazbeans:node_ips".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagementApiConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_management_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub auth_token: Option<Secret<String>>,
}

fn default_management_listen_addr() -> String {
    "127.0.0.1:9700".to_string()
}

impl Default for ManagementApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_management_listen_addr(),
            auth_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen_addr")]
    pub listen_addr: String,
}

fn default_metrics_listen_addr() -> String {
    "127.0.0.1:9701".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_metrics_listen_addr(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Top-level configuration surface. Every option here has the effect
/// documented in the external-interfaces section of the coordination fabric
/// design: this struct is the single source of truth for defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BazBeansConfig {
    #[serde(default = "default_redis_url")]
    pub redis_url: Secret<String>,
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default = "default_data_center")]
    pub data_center: String,
    #[serde(default = "default_heartbeat_ttl")]
    pub heartbeat_ttl: u64,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
    #[serde(default = "default_command_poll_interval")]
    pub command_poll_interval: u64,
    #[serde(default = "default_app_dir")]
    pub app_dir: String,
    #[serde(default = "default_compose_file")]
    pub compose_file: String,
    #[serde(default = "default_node_port")]
    pub node_port: u16,
    #[serde(default = "default_pubsub_channel")]
    pub pubsub_channel: String,
    #[serde(default = "default_cpu_threshold")]
    pub cpu_threshold: u8,
    #[serde(default = "default_memory_threshold")]
    pub memory_threshold: u8,
    #[serde(default = "default_allowed_exec_prefixes")]
    pub allowed_exec_prefixes: Vec<String>,
    #[serde(default = "default_nodes_all_key")]
    pub nodes_all_key: String,
    #[serde(default = "default_nodes_active_key")]
    pub nodes_active_key: String,
    #[serde(default = "default_node_ips_key")]
    pub node_ips_key: String,
    #[serde(default)]
    pub compose_plugin_enabled: bool,
    #[serde(default)]
    pub upstream_health_check_comments: bool,
    #[serde(default)]
    pub management_api: ManagementApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for BazBeansConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            node_id: default_node_id(),
            data_center: default_data_center(),
            heartbeat_ttl: default_heartbeat_ttl(),
            heartbeat_interval: default_heartbeat_interval(),
            command_poll_interval: default_command_poll_interval(),
            app_dir: default_app_dir(),
            compose_file: default_compose_file(),
            node_port: default_node_port(),
            pubsub_channel: default_pubsub_channel(),
            cpu_threshold: default_cpu_threshold(),
            memory_threshold: default_memory_threshold(),
            allowed_exec_prefixes: default_allowed_exec_prefixes(),
            nodes_all_key: default_nodes_all_key(),
            nodes_active_key: default_nodes_active_key(),
            node_ips_key: default_node_ips_key(),
            compose_plugin_enabled: true,
            upstream_health_check_comments: false,
            management_api: ManagementApiConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl BazBeansConfig {
    /// Load an optional TOML file, then `BAZBEANS_*` environment overrides,
    /// in that precedence order. Fields absent from both sources fall back
    /// to their `#[serde(default = ...)]` functions — there is no synthetic
    /// defaults layer here, since serializing a live `BazBeansConfig` would
    /// run every `Secret` field through its redacting `Serialize` impl and
    /// bake the literal string `"[REDACTED]"` in as the "default".
    pub fn from_file(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("BAZBEANS")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .map_err(|e| CoordinatorError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| CoordinatorError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_ttl == 0 {
            return Err(CoordinatorError::Config("heartbeat_ttl must be > 0".into()));
        }
        if self.heartbeat_interval == 0 {
            return Err(CoordinatorError::Config("heartbeat_interval must be > 0".into()));
        }
        if self.command_poll_interval == 0 {
            return Err(CoordinatorError::Config("command_poll_interval must be > 0".into()));
        }
        if self.cpu_threshold > 100 {
            return Err(CoordinatorError::Config("cpu_threshold must be in [0,100]".into()));
        }
        if self.memory_threshold > 100 {
            return Err(CoordinatorError::Config("memory_threshold must be in [0,100]".into()));
        }
        if self.node_id.trim().is_empty() {
            return Err(CoordinatorError::Config("node_id must not be empty".into()));
        }
        if self.redis_url.expose_secret().trim().is_empty() {
            return Err(CoordinatorError::Config("redis_url must not be empty".into()));
        }
        Ok(())
    }

    pub fn heartbeat_key(&self) -> String {
        format!("bazbeans:node:{}:heartbeat", self.node_id)
    }

    pub fn status_key(&self) -> String {
        format!("bazbeans:node:{}:status", self.node_id)
    }

    pub fn command_queue_key(&self) -> String {
        format!("bazbeans:node:{}:commands", self.node_id)
    }

    pub fn status_key_for(&self, node_id: &str) -> String {
        format!("bazbeans:node:{node_id}:status")
    }

    pub fn heartbeat_key_for(&self, node_id: &str) -> String {
        format!("bazbeans:node:{node_id}:heartbeat")
    }

    pub fn command_queue_key_for(&self, node_id: &str) -> String {
        format!("bazbeans:node:{node_id}:commands")
    }
}

/// A hot-reloadable handle around a config instance, so a future config file
/// watcher can swap configuration without restarting a long-lived daemon.
/// Nothing currently triggers a reload; the seam exists because the agent
/// and proxy updater are both long-lived processes that benefit from it.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<arc_swap::ArcSwap<BazBeansConfig>>,
}

impl ConfigHandle {
    pub fn new(config: BazBeansConfig) -> Self {
        Self {
            inner: Arc::new(arc_swap::ArcSwap::from_pointee(config)),
        }
    }

    pub fn load(&self) -> Arc<BazBeansConfig> {
        self.inner.load_full()
    }

    pub fn replace(&self, config: BazBeansConfig) {
        self.inner.store(Arc::new(config));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        assert!(BazBeansConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_heartbeat_ttl_is_rejected() {
        let mut cfg = BazBeansConfig::default();
        cfg.heartbeat_ttl = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let mut cfg = BazBeansConfig::default();
        cfg.cpu_threshold = 101;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn empty_node_id_is_rejected() {
        let mut cfg = BazBeansConfig::default();
        cfg.node_id = "".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn key_helpers_match_naming_scheme() {
        let mut cfg = BazBeansConfig::default();
        cfg.node_id = "node-7".to_string();
        assert_eq!(cfg.heartbeat_key(), "bazbeans:node:node-7:heartbeat");
        assert_eq!(cfg.status_key(), "bazbeans:node:node-7:status");
        assert_eq!(cfg.command_queue_key(), "bazbeans:node:node-7:commands");
    }

    #[test]
    fn from_file_with_no_sources_yields_documented_redis_url_default() {
        let cfg = BazBeansConfig::from_file(None).unwrap();
        assert_eq!(cfg.redis_url.expose_secret(), "redis://localhost:6379/0");
        assert_eq!(cfg.node_port, default_node_port());
    }

    #[test]
    fn redis_url_never_appears_in_debug_output() {
        let mut cfg = BazBeansConfig::default();
        cfg.redis_url = Secret::new("redis://user:pw@host:6379/0".to_string());
        let debug = format!("{:?}", cfg);
        assert!(!debug.contains("pw@host"));
    }
}
