use crate::error::Result;
use crate::probe::{ComposeContainerProbe, ContainerProbe, SystemProbe};
use async_trait::async_trait;
use bazbeans_common::coordinator::CoordinatorClient;
use bazbeans_common::commands::{CommandBus, RecentResults};
use bazbeans_common::config::BazBeansConfig;
use bazbeans_common::events::LoadBalancerNotifier;
use bazbeans_common::plugins::compose::ComposeCommands;
use bazbeans_common::plugins::{CommandHandler, CommandPlugin, HandlerOutput};
use bazbeans_common::registry::NodeRegistry;
use bazbeans_common::resolvers::AutoDetectResolver;
use bazbeans_common::types::{Command, CommandResult, NodeId};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command as ProcessCommand;
use tracing::{info, warn};

/// A user-supplied health check, evaluated after the built-in CPU/memory/
/// container checks, in registration order. The first failure short-circuits
/// the tick, same as the built-in checks.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> std::result::Result<(), String>;
}

/// Runs the agent's main tick loop: heartbeat, self-health (when active),
/// one command drain, sleep. All mutable runtime state lives here; the
/// tick body is strictly sequential, so handlers never need locks over it.
pub struct NodeAgent<C: CoordinatorClient> {
    node_id: NodeId,
    config: Arc<BazBeansConfig>,
    client: Arc<C>,
    registry: NodeRegistry<C>,
    command_bus: CommandBus<C>,
    notifier: LoadBalancerNotifier<C>,
    probe: Arc<dyn SystemProbe>,
    container_probe: Arc<dyn ContainerProbe>,
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
    health_probes: Vec<Arc<dyn HealthProbe>>,
    recent_results: RecentResults,
    is_active: AtomicBool,
    is_frozen: AtomicBool,
    shutdown: Arc<AtomicBool>,
}

impl<C: CoordinatorClient + 'static> NodeAgent<C> {
    pub fn new(config: Arc<BazBeansConfig>, client: Arc<C>, probe: Arc<dyn SystemProbe>) -> Self {
        let node_id = NodeId::from(config.node_id.clone());
        let registry = NodeRegistry::new(client.clone(), config.clone());
        let command_bus = CommandBus::new(client.clone(), config.clone());
        let notifier = LoadBalancerNotifier::new(client.clone(), config.clone());

        let mut handlers: HashMap<String, Arc<dyn CommandHandler>> = HashMap::new();
        if config.compose_plugin_enabled {
            let compose = ComposeCommands::new(config.app_dir.clone(), config.compose_file.clone());
            for (kind, handler) in compose.handlers() {
                handlers.insert(kind, handler);
            }
        }

        let container_probe: Arc<dyn ContainerProbe> =
            Arc::new(ComposeContainerProbe::new(config.app_dir.clone(), config.compose_file.clone()));

        Self {
            node_id,
            config,
            client,
            registry,
            command_bus,
            notifier,
            probe,
            container_probe,
            handlers,
            health_probes: Vec::new(),
            recent_results: RecentResults::default(),
            is_active: AtomicBool::new(false),
            is_frozen: AtomicBool::new(false),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Registers a plugin's handlers, shadowing any built-in of the same
    /// kind (matching the source's "built-ins first, plugins may shadow"
    /// registration order).
    pub fn register_plugin(&mut self, plugin: &dyn CommandPlugin) {
        for (kind, handler) in plugin.handlers() {
            self.handlers.insert(kind, handler);
        }
    }

    pub fn register_health_probe(&mut self, probe: Arc<dyn HealthProbe>) {
        self.health_probes.push(probe);
    }

    /// Overrides the default `docker-compose ps`-backed container probe —
    /// used by hosts that run under a different orchestrator, and by tests
    /// that want to bypass subprocess invocation entirely.
    pub fn set_container_probe(&mut self, probe: Arc<dyn ContainerProbe>) {
        self.container_probe = probe;
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub async fn start(&self) -> Result<()> {
        self.registry.register(&self.node_id).await?;
        self.notifier.notify_registered(&self.node_id).await?;
        self.is_active.store(true, Ordering::SeqCst);

        if let Some(ip) = AutoDetectResolver::detect_local_ip() {
            if let Err(err) = self.registry.register_ip(&self.node_id, &ip).await {
                warn!(error = %err, "failed to self-register IP, continuing");
            }
        } else {
            warn!("could not auto-detect outbound IP, skipping self-registration");
        }

        info!(node_id = %self.node_id, "agent started");
        Ok(())
    }

    /// Runs ticks until `shutdown_handle()` is set, then performs the
    /// graceful shutdown sequence.
    pub async fn run(&self) -> Result<()> {
        self.start().await?;

        while !self.shutdown.load(Ordering::SeqCst) {
            if let Err(err) = self.tick().await {
                warn!(error = %err, "tick failed, retrying next cycle");
            }
            tokio::time::sleep(Duration::from_secs(self.config.command_poll_interval)).await;
        }

        self.shutdown_sequence().await?;
        Ok(())
    }

    /// Runs a single tick (heartbeat, self-health, one command drain).
    /// Public so integration tests and host harnesses can step the loop
    /// deterministically instead of racing the `command_poll_interval` sleep.
    pub async fn tick(&self) -> Result<()> {
        let metrics = self.probe.sample().await;
        let is_frozen = self.is_frozen.load(Ordering::SeqCst);
        let is_active = self.is_active.load(Ordering::SeqCst);
        self.registry.heartbeat(&self.node_id, metrics, is_frozen, is_active).await?;

        if is_active && !is_frozen {
            if let Err(reason) = self.check_self_health(Some(metrics)).await {
                self.freeze(&reason).await?;
            }
        }

        if let Some(command) = self.command_bus.get_command().await? {
            self.dispatch(command).await;
        }

        crate::metrics::record_tick(true);
        Ok(())
    }

    /// CPU threshold, memory threshold, container liveness, then each
    /// registered `HealthProbe`, in that order. First failure wins.
    async fn check_self_health(&self, metrics: Option<bazbeans_common::types::Metrics>) -> std::result::Result<(), String> {
        let metrics = match metrics {
            Some(m) => m,
            None => self.probe.sample().await,
        };

        if metrics.cpu_percent > self.config.cpu_threshold as f64 {
            return Err(format!("High CPU usage: {:.0}%", metrics.cpu_percent));
        }
        if metrics.memory_percent > self.config.memory_threshold as f64 {
            return Err(format!("High memory usage: {:.0}%", metrics.memory_percent));
        }
        self.container_probe.check().await?;
        for probe in &self.health_probes {
            probe.check().await?;
        }
        Ok(())
    }

    async fn freeze(&self, reason: &str) -> Result<()> {
        self.registry.freeze(&self.node_id, reason).await?;
        self.notifier.notify_frozen(&self.node_id, reason).await?;
        self.is_frozen.store(true, Ordering::SeqCst);
        self.is_active.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn unfreeze(&self) -> Result<()> {
        self.registry.unfreeze(&self.node_id).await?;
        self.notifier.notify_unfrozen(&self.node_id).await?;
        self.is_frozen.store(false, Ordering::SeqCst);
        self.is_active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn dispatch(&self, command: Command) {
        let kind = command.kind.clone();
        let outcome = self.run_handler(&kind, &command.args).await;

        let (success, payload, error) = match outcome {
            Ok(value) => (true, value, None),
            Err(message) => (false, Value::Null, Some(message)),
        };

        let field = if success {
            format!("executed_{kind}")
        } else {
            format!("error_{kind}")
        };
        let rendered = if success {
            payload.to_string()
        } else {
            error.clone().unwrap_or_default()
        };
        if let Err(err) = self
            .client
            .hset_many(&self.config.status_key(), &[(field.as_str(), rendered)])
            .await
        {
            warn!(error = %err, kind = %kind, "failed to write command result status");
        }

        crate::metrics::record_command(&kind, success);
        self.recent_results
            .push(CommandResult {
                id: command.id.unwrap_or_else(uuid::Uuid::new_v4),
                kind,
                success,
                payload,
                error,
            })
            .await;
    }

    async fn run_handler(&self, kind: &str, args: &Map<String, Value>) -> HandlerOutput {
        match kind {
            "freeze" => {
                let reason = args
                    .get("reason")
                    .and_then(|v| v.as_str())
                    .unwrap_or("Administrative action")
                    .to_string();
                self.freeze(&reason).await.map_err(|e| e.to_string())?;
                Ok(json!({"frozen": true}))
            }
            "unfreeze" => {
                self.unfreeze().await.map_err(|e| e.to_string())?;
                Ok(json!({"frozen": false}))
            }
            "exec" => self.handle_exec(args).await,
            "deploy_file" => self.handle_deploy_file(args).await,
            "health_check" => {
                let healthy = self.check_self_health(None).await.is_ok();
                Ok(json!({
                    "healthy": healthy,
                    "frozen": self.is_frozen.load(Ordering::SeqCst),
                    "active": self.is_active.load(Ordering::SeqCst),
                }))
            }
            other => match self.handlers.get(other) {
                Some(handler) => handler.handle(args).await,
                None => Err(format!("Unknown command: {other}")),
            },
        }
    }

    async fn handle_exec(&self, args: &Map<String, Value>) -> HandlerOutput {
        let command = args
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "Missing 'command' argument".to_string())?;

        let allowed = self
            .config
            .allowed_exec_prefixes
            .iter()
            .any(|prefix| command.trim_start().starts_with(prefix.as_str()));
        if !allowed {
            return Err("Command not allowed".to_string());
        }

        let mut cmd = ProcessCommand::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.config.app_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        match tokio::time::timeout(Duration::from_secs(30), cmd.output()).await {
            Ok(Ok(output)) => Ok(json!({
                "stdout": String::from_utf8_lossy(&output.stdout),
                "stderr": String::from_utf8_lossy(&output.stderr),
                "returncode": output.status.code().unwrap_or(-1),
                "success": output.status.success(),
            })),
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => Err("Command timed out after 30 seconds".to_string()),
        }
    }

    async fn handle_deploy_file(&self, args: &Map<String, Value>) -> HandlerOutput {
        let rel_path = args.get("path").and_then(|v| v.as_str()).ok_or_else(|| "Missing 'path' argument".to_string())?;
        let content = args.get("content").and_then(|v| v.as_str()).ok_or_else(|| "Missing 'content' argument".to_string())?;

        let normalized = normalize_relative(Path::new(rel_path));
        if normalized.components().next() == Some(Component::ParentDir) {
            return Err("Path traversal not allowed".to_string());
        }

        let full_path = Path::new(&self.config.app_dir).join(&normalized);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| e.to_string())?;
        }
        tokio::fs::write(&full_path, content).await.map_err(|e| e.to_string())?;
        Ok(json!({"path": full_path.to_string_lossy()}))
    }

    async fn shutdown_sequence(&self) -> Result<()> {
        self.registry.remove_from_active(&self.node_id).await?;
        self.registry.update_status(&self.node_id, "stopped", "Graceful shutdown").await?;
        self.notifier.notify_removed(&self.node_id).await?;
        info!(node_id = %self.node_id, "agent shut down gracefully");
        Ok(())
    }
}

/// Lexically normalizes a relative path, collapsing `.` components and
/// preserving leading `..` components so traversal can be detected without
/// touching the filesystem.
fn normalize_relative(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(result.components().next_back(), Some(Component::Normal(_))) {
                    result.pop();
                } else {
                    result.push("..");
                }
            }
            other => result.push(other.as_os_str()),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazbeans_common::testing::FakeCoordinator;
    use std::path::Path;

    struct FixedProbe(bazbeans_common::types::Metrics);

    #[async_trait]
    impl SystemProbe for FixedProbe {
        async fn sample(&self) -> bazbeans_common::types::Metrics {
            self.0
        }
    }

    struct AlwaysHealthy;

    #[async_trait]
    impl ContainerProbe for AlwaysHealthy {
        async fn check(&self) -> std::result::Result<(), String> {
            Ok(())
        }
    }

    fn agent_with_metrics(cpu: f64, mem: f64) -> NodeAgent<FakeCoordinator> {
        let mut config = BazBeansConfig::default();
        config.node_id = "n1".to_string();
        config.cpu_threshold = 50;
        let config = Arc::new(config);
        let client = Arc::new(FakeCoordinator::new());
        let probe: Arc<dyn SystemProbe> = Arc::new(FixedProbe(bazbeans_common::types::Metrics {
            cpu_percent: cpu,
            memory_percent: mem,
            disk_percent: 0.0,
        }));
        let mut agent = NodeAgent::new(config, client, probe);
        agent.set_container_probe(Arc::new(AlwaysHealthy));
        agent
    }

    #[tokio::test]
    async fn high_cpu_triggers_freeze_with_reason() {
        let agent = agent_with_metrics(80.0, 10.0);
        agent.start().await.unwrap();
        agent.tick().await.unwrap();

        let status = agent.registry.get_node_status(&agent.node_id).await.unwrap();
        assert!(status.is_frozen);
        assert!(status.details.starts_with("High CPU usage"));
        assert!(!agent.registry.list_active().await.unwrap().contains(&agent.node_id));
    }

    #[tokio::test]
    async fn cpu_at_threshold_does_not_freeze() {
        let agent = agent_with_metrics(50.0, 10.0);
        agent.start().await.unwrap();
        agent.tick().await.unwrap();
        assert!(agent.registry.list_active().await.unwrap().contains(&agent.node_id));
    }

    #[tokio::test]
    async fn exec_rejects_disallowed_command() {
        let agent = agent_with_metrics(1.0, 1.0);
        let args = serde_json::json!({"command": "rm -rf /"}).as_object().unwrap().clone();
        let result = agent.handle_exec(&args).await;
        assert_eq!(result.unwrap_err(), "Command not allowed");
    }

    #[tokio::test]
    async fn exec_allows_whitelisted_command() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = BazBeansConfig::default();
        config.node_id = "n1".to_string();
        config.app_dir = dir.path().to_string_lossy().to_string();
        let config = Arc::new(config);
        let client = Arc::new(FakeCoordinator::new());
        let probe: Arc<dyn SystemProbe> = Arc::new(FixedProbe(bazbeans_common::types::Metrics::default()));
        let agent = NodeAgent::new(config, client, probe);

        let args = serde_json::json!({"command": "ls ."}).as_object().unwrap().clone();
        let result = agent.handle_exec(&args).await.unwrap();
        assert_eq!(result.get("returncode").and_then(|v| v.as_i64()), Some(0));
    }

    #[tokio::test]
    async fn deploy_file_rejects_path_traversal() {
        let agent = agent_with_metrics(1.0, 1.0);
        let args = serde_json::json!({"path": "../../etc/passwd", "content": "x"})
            .as_object()
            .unwrap()
            .clone();
        let result = agent.handle_deploy_file(&args).await;
        assert_eq!(result.unwrap_err(), "Path traversal not allowed");
    }

    #[tokio::test]
    async fn deploy_file_writes_under_app_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = BazBeansConfig::default();
        config.node_id = "n1".to_string();
        config.app_dir = dir.path().to_string_lossy().to_string();
        let config = Arc::new(config);
        let client = Arc::new(FakeCoordinator::new());
        let probe: Arc<dyn SystemProbe> = Arc::new(FixedProbe(bazbeans_common::types::Metrics::default()));
        let agent = NodeAgent::new(config, client, probe);

        let args = serde_json::json!({"path": "nested/app.conf", "content": "hello"})
            .as_object()
            .unwrap()
            .clone();
        agent.handle_deploy_file(&args).await.unwrap();
        let written = tokio::fs::read_to_string(dir.path().join("nested/app.conf")).await.unwrap();
        assert_eq!(written, "hello");
    }

    #[tokio::test]
    async fn unknown_command_reports_error_without_crashing() {
        let agent = agent_with_metrics(1.0, 1.0);
        agent.start().await.unwrap();
        let result = agent.run_handler("frobnicate", &Map::new()).await;
        assert_eq!(result.unwrap_err(), "Unknown command: frobnicate");
    }

    #[test]
    fn normalize_relative_collapses_dot_segments() {
        assert_eq!(normalize_relative(Path::new("a/./b")), Path::new("a/b"));
        assert_eq!(normalize_relative(Path::new("../a")), Path::new(".."));
    }
}
