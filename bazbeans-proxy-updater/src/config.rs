use bazbeans_common::config::BazBeansConfig;
use bazbeans_common::{CoordinatorError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_upstream_name() -> String {
    "app_backend".to_string()
}
fn default_upstream_file() -> String {
    "/etc/nginx/conf.d/upstream.conf".to_string()
}
fn default_reload_command() -> Vec<String> {
    vec!["nginx".to_string(), "-s".to_string(), "reload".to_string()]
}
fn default_validate_command() -> Vec<String> {
    vec!["nginx".to_string(), "-t".to_string()]
}
fn default_health_check_path() -> String {
    "/health".to_string()
}
fn default_health_check_timeout_secs() -> u64 {
    5
}

/// Configuration surface specific to the upstream reconciler. Shares the
/// coordination-fabric settings (`redis_url`, `pubsub_channel`, `node_port`,
/// key overrides, `upstream_health_check_comments`) with the agent via
/// `#[serde(flatten)]` so a single TOML file can drive both processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyUpdaterConfig {
    #[serde(flatten)]
    pub common: BazBeansConfig,

    #[serde(default = "default_upstream_name")]
    pub upstream_name: String,
    #[serde(default = "default_upstream_file")]
    pub upstream_file: String,
    #[serde(default = "default_reload_command")]
    pub reload_command: Vec<String>,
    #[serde(default = "default_validate_command")]
    pub validate_command: Vec<String>,
    #[serde(default = "default_health_check_path")]
    pub health_check_path: String,
    #[serde(default = "default_health_check_timeout_secs")]
    pub health_check_timeout_secs: u64,
}

impl Default for ProxyUpdaterConfig {
    fn default() -> Self {
        Self {
            common: BazBeansConfig::default(),
            upstream_name: default_upstream_name(),
            upstream_file: default_upstream_file(),
            reload_command: default_reload_command(),
            validate_command: default_validate_command(),
            health_check_path: default_health_check_path(),
            health_check_timeout_secs: default_health_check_timeout_secs(),
        }
    }
}

impl ProxyUpdaterConfig {
    /// An optional TOML file, then `BAZBEANS_*` environment overrides — the
    /// same precedence order and prefix the agent uses, so both processes
    /// can be driven from one environment. No synthetic defaults layer:
    /// serializing a live config would route `common.redis_url` through
    /// `Secret`'s redacting `Serialize` impl and bake in `"[REDACTED]"` as
    /// the "default". Gaps fall back to each field's `#[serde(default = ...)]`
    /// function instead.
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
        self.common.validate()?;
        if self.upstream_name.trim().is_empty() {
            return Err(CoordinatorError::Config("upstream_name must not be empty".into()));
        }
        if self.upstream_file.trim().is_empty() {
            return Err(CoordinatorError::Config("upstream_file must not be empty".into()));
        }
        if self.reload_command.is_empty() {
            return Err(CoordinatorError::Config("reload_command must not be empty".into()));
        }
        if self.validate_command.is_empty() {
            return Err(CoordinatorError::Config("validate_command must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        assert!(ProxyUpdaterConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_upstream_name_is_rejected() {
        let mut cfg = ProxyUpdaterConfig::default();
        cfg.upstream_name = "".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn empty_reload_command_is_rejected() {
        let mut cfg = ProxyUpdaterConfig::default();
        cfg.reload_command = vec![];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn from_file_with_no_sources_yields_documented_redis_url_default() {
        let cfg = ProxyUpdaterConfig::from_file(None).unwrap();
        assert_eq!(cfg.common.redis_url.expose_secret(), "redis://localhost:6379/0");
        assert_eq!(cfg.upstream_name, default_upstream_name());
    }
}
