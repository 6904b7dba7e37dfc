use crate::error::{coordinator_op, Result};
use bazbeans_common::commands::CommandBus;
use bazbeans_common::coordinator::CoordinatorClient;
use bazbeans_common::registry::NodeRegistry;
use bazbeans_common::secret::Secret;
use bazbeans_common::types::{Command, NodeId, NodeStatus};
use std::collections::HashMap;
use std::sync::Arc;

/// Read-through wrapper over the registry and command bus, scoped to the
/// operator's view: every node in `ALL_NODES`, not just the active set, and
/// every coordinator error collapsed to the single-line CLI message.
pub struct OperatorController<C: CoordinatorClient> {
    registry: NodeRegistry<C>,
    commands: CommandBus<C>,
    redis_url: Secret<String>,
}

impl<C: CoordinatorClient> OperatorController<C> {
    pub fn new(client: Arc<C>, config: Arc<bazbeans_common::config::BazBeansConfig>) -> Self {
        Self {
            registry: NodeRegistry::new(client.clone(), config.clone()),
            commands: CommandBus::new(client, config.clone()),
            redis_url: config.redis_url.clone(),
        }
    }

    fn url(&self) -> String {
        self.redis_url.expose_secret().clone()
    }

    pub async fn all_nodes(&self) -> Result<Vec<NodeId>> {
        coordinator_op(&self.url(), self.registry.list_all().await)
    }

    pub async fn active_nodes(&self) -> Result<Vec<NodeId>> {
        coordinator_op(&self.url(), self.registry.list_active().await)
    }

    pub async fn merged_status(&self, node_id: &NodeId) -> Result<HashMap<String, serde_json::Value>> {
        coordinator_op(&self.url(), self.registry.get_status(node_id).await)
    }

    pub async fn node_status(&self, node_id: &NodeId) -> Result<NodeStatus> {
        coordinator_op(&self.url(), self.registry.get_node_status(node_id).await)
    }

    pub async fn send_command(&self, node_id: &NodeId, command: &Command) -> Result<()> {
        coordinator_op(&self.url(), self.commands.send_command(node_id, command).await)
    }

    /// Broadcasts to every node in `ALL_NODES` (not just `ACTIVE_NODES`),
    /// optionally scoped by datacenter, without regard to `is_frozen` — a
    /// frozen node still receives a broadcast `update`, matching the
    /// coordinator's own `send_command_to_all`.
    pub async fn send_command_to_all(&self, command: &Command, filter_dc: Option<&str>) -> Result<usize> {
        let nodes = self.all_nodes().await?;
        let mut sent = 0;
        for node_id in nodes {
            if let Some(dc) = filter_dc {
                let status = self.node_status(&node_id).await?;
                if status.data_center != dc {
                    continue;
                }
            }
            self.send_command(&node_id, command).await?;
            sent += 1;
        }
        Ok(sent)
    }

    pub async fn cleanup_dead_nodes(&self) -> Result<Vec<NodeId>> {
        coordinator_op(&self.url(), self.registry.cleanup_dead_nodes().await)
    }
}
