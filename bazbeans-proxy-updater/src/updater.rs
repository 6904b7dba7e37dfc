use crate::error::Result;
use crate::reload;
use crate::render::{render_upstream, RenderOptions};
use bazbeans_common::coordinator::CoordinatorClient;
use bazbeans_common::config::BazBeansConfig;
use bazbeans_common::events::EventSubscriber;
use bazbeans_common::resolvers::IpResolver;
use bazbeans_common::types::{Event, NodeId};
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Reconciles the upstream file against the membership event stream. Starts
/// with an empty local snapshot — it does not eagerly read the current
/// active set on startup — so the first event received after (re)start is
/// always treated as a change and triggers a rewrite, which is how a
/// restarted updater picks up membership changes that happened while it was
/// down.
pub struct ProxyUpdater<C: CoordinatorClient> {
    client: Arc<C>,
    config: Arc<BazBeansConfig>,
    upstream_file: PathBuf,
    reload_command: Vec<String>,
    validate_command: Vec<String>,
    resolver: Arc<dyn IpResolver>,
    render_opts: RenderOptions,
    active_nodes: Mutex<HashSet<NodeId>>,
}

impl<C: CoordinatorClient + 'static> ProxyUpdater<C> {
    pub fn new(
        client: Arc<C>,
        config: Arc<BazBeansConfig>,
        upstream_file: impl Into<PathBuf>,
        reload_command: Vec<String>,
        validate_command: Vec<String>,
        resolver: Arc<dyn IpResolver>,
        render_opts: RenderOptions,
    ) -> Self {
        Self {
            client,
            config,
            upstream_file: upstream_file.into(),
            reload_command,
            validate_command,
            resolver,
            render_opts,
            active_nodes: Mutex::new(HashSet::new()),
        }
    }

    pub async fn run(&self) -> Result<()> {
        let subscriber = EventSubscriber::new(self.client.clone(), self.config.clone());
        let mut events = subscriber.events().await?;

        info!(
            upstream = %self.render_opts.upstream_name,
            channel = %self.config.pubsub_channel,
            file = %self.upstream_file.display(),
            "proxy updater listening for membership events"
        );

        while let Some(event) = events.next().await {
            if let Err(err) = self.handle_event(event).await {
                tracing::error!(error = %err, "failed to reconcile upstream config");
            }
        }
        Ok(())
    }

    /// Exposed so tests can drive reconciliation deterministically instead
    /// of racing the subscriber's stream.
    pub async fn handle_event(&self, event: Event) -> Result<()> {
        let incoming: HashSet<NodeId> = event.active_nodes.iter().cloned().collect();
        {
            let mut current = self.active_nodes.lock().await;
            if *current == incoming {
                return Ok(());
            }
            *current = incoming;
        }

        info!(event = %event.event, node_id = %event.node_id, "membership changed, reconciling upstream config");
        self.reconcile(&event.active_nodes).await
    }

    async fn reconcile(&self, active_nodes: &[NodeId]) -> Result<()> {
        let mut resolved = HashMap::new();
        for node_id in active_nodes {
            match self.resolver.resolve(node_id.as_ref()).await {
                Some(ip) => {
                    resolved.insert(node_id.clone(), ip);
                }
                None => warn!(node_id = %node_id, "could not resolve IP for node"),
            }
        }

        let rendered = render_upstream(&self.render_opts, active_nodes, &resolved);
        self.write_upstream_file(&rendered)?;

        match reload::validate_and_reload(&self.validate_command, &self.reload_command).await {
            Ok(()) => {
                metrics::counter!("bazbeans_proxy_updater_reloads_total", "success" => "true").increment(1);
            }
            Err(crate::error::UpdaterError::ValidationFailed) => {
                warn!("validation failed; keeping previous config, new file left on disk for inspection");
                metrics::counter!("bazbeans_proxy_updater_reloads_total", "success" => "false").increment(1);
            }
            Err(err) => {
                metrics::counter!("bazbeans_proxy_updater_reloads_total", "success" => "false").increment(1);
                return Err(err);
            }
        }
        Ok(())
    }

    fn write_upstream_file(&self, contents: &str) -> Result<()> {
        if self.upstream_file.exists() {
            let backup = PathBuf::from(format!("{}.bak", self.upstream_file.display()));
            std::fs::rename(&self.upstream_file, &backup)?;
        }
        std::fs::write(&self.upstream_file, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RenderOptions;
    use bazbeans_common::testing::FakeCoordinator;
    use bazbeans_common::types::EventKind;

    fn event(kind: EventKind, active: &[&str]) -> Event {
        Event {
            event: kind,
            node_id: NodeId::from("a"),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            reason: String::new(),
            active_nodes: active.iter().map(|s| NodeId::from(*s)).collect(),
            data_center: None,
            node_port: None,
        }
    }

    struct StaticIp(String);

    #[async_trait::async_trait]
    impl IpResolver for StaticIp {
        async fn resolve(&self, _node_id: &str) -> Option<String> {
            Some(self.0.clone())
        }
    }

    fn updater_for(dir: &tempfile::TempDir) -> ProxyUpdater<FakeCoordinator> {
        let client = Arc::new(FakeCoordinator::new());
        let config = Arc::new(BazBeansConfig::default());
        let upstream_file = dir.path().join("upstream.conf");
        ProxyUpdater::new(
            client,
            config,
            upstream_file,
            vec!["true".to_string()],
            vec!["true".to_string()],
            Arc::new(StaticIp("10.0.0.1".to_string())),
            RenderOptions::new("app_backend".to_string(), 8000, None),
        )
    }

    #[tokio::test]
    async fn first_event_always_triggers_a_write_even_with_identical_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let updater = updater_for(&dir);
        updater.handle_event(event(EventKind::NodeRegistered, &["a"])).await.unwrap();
        let contents = std::fs::read_to_string(dir.path().join("upstream.conf")).unwrap();
        assert!(contents.contains("server 10.0.0.1:8000;"));
    }

    #[tokio::test]
    async fn identical_snapshot_is_skipped_without_touching_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let updater = updater_for(&dir);
        updater.handle_event(event(EventKind::NodeRegistered, &["a"])).await.unwrap();
        let path = dir.path().join("upstream.conf");
        let first_write = std::fs::metadata(&path).unwrap().modified().unwrap();

        std::thread::sleep(std::time::Duration::from_millis(10));
        updater.handle_event(event(EventKind::NodeRegistered, &["a"])).await.unwrap();
        let second_write = std::fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(first_write, second_write);
    }

    #[tokio::test]
    async fn backup_file_is_created_on_second_distinct_write() {
        let dir = tempfile::tempdir().unwrap();
        let updater = updater_for(&dir);
        updater.handle_event(event(EventKind::NodeRegistered, &["a"])).await.unwrap();
        updater.handle_event(event(EventKind::NodeRemoved, &["a", "b"])).await.unwrap();

        let backup = dir.path().join("upstream.conf.bak");
        assert!(backup.exists());
        let backup_contents = std::fs::read_to_string(&backup).unwrap();
        assert!(backup_contents.contains("# Active nodes: 1"));
    }
}
