use crate::config::BazBeansConfig;
use crate::coordinator::CoordinatorClient;
use crate::error::Result;
use crate::types::{Event, EventKind, NodeId};
use chrono::Utc;
use futures::stream::BoxStream;
use std::sync::Arc;

/// Publishes membership events. Every publish reads the current
/// `ACTIVE_NODES` snapshot first, so subscribers never need a follow-up
/// query to reconcile.
pub struct EventPublisher<C: CoordinatorClient> {
    client: Arc<C>,
    config: Arc<BazBeansConfig>,
}

impl<C: CoordinatorClient> EventPublisher<C> {
    pub fn new(client: Arc<C>, config: Arc<BazBeansConfig>) -> Self {
        Self { client, config }
    }

    pub async fn publish(
        &self,
        event: EventKind,
        node_id: &NodeId,
        reason: &str,
        data_center: Option<String>,
        node_port: Option<u16>,
    ) -> Result<()> {
        let active_nodes = self
            .client
            .smembers(&self.config.nodes_active_key)
            .await?
            .into_iter()
            .map(NodeId)
            .collect();

        let payload = Event {
            event,
            node_id: node_id.clone(),
            timestamp: format!("{}Z", Utc::now().format("%Y-%m-%dT%H:%M:%S%.f")),
            reason: reason.to_string(),
            active_nodes,
            data_center,
            node_port,
        };

        let json = serde_json::to_string(&payload)?;
        self.client.publish(&self.config.pubsub_channel, json).await
    }
}

/// Combines the registry's active-node view with the publisher to notify
/// the proxy updater (and any other subscriber) of lifecycle transitions
/// for this process's own node.
pub struct LoadBalancerNotifier<C: CoordinatorClient> {
    publisher: EventPublisher<C>,
    config: Arc<BazBeansConfig>,
}

impl<C: CoordinatorClient> LoadBalancerNotifier<C> {
    pub fn new(client: Arc<C>, config: Arc<BazBeansConfig>) -> Self {
        Self {
            publisher: EventPublisher::new(client, config.clone()),
            config,
        }
    }

    pub async fn notify_registered(&self, node_id: &NodeId) -> Result<()> {
        self.publisher
            .publish(
                EventKind::NodeRegistered,
                node_id,
                "",
                Some(self.config.data_center.clone()),
                Some(self.config.node_port),
            )
            .await
    }

    pub async fn notify_frozen(&self, node_id: &NodeId, reason: &str) -> Result<()> {
        self.publisher.publish(EventKind::NodeFrozen, node_id, reason, None, None).await
    }

    pub async fn notify_unfrozen(&self, node_id: &NodeId) -> Result<()> {
        self.publisher.publish(EventKind::NodeUnfrozen, node_id, "", None, None).await
    }

    pub async fn notify_removed(&self, node_id: &NodeId) -> Result<()> {
        self.publisher.publish(EventKind::NodeRemoved, node_id, "", None, None).await
    }
}

/// Subscribes to the event channel and parses each message into an `Event`,
/// skipping (and logging) invalid JSON rather than terminating the listen
/// loop — matching the source's `handle_unknown_event`/JSON-decode-error
/// tolerance.
pub struct EventSubscriber<C: CoordinatorClient> {
    client: Arc<C>,
    config: Arc<BazBeansConfig>,
}

impl<C: CoordinatorClient> EventSubscriber<C> {
    pub fn new(client: Arc<C>, config: Arc<BazBeansConfig>) -> Self {
        Self { client, config }
    }

    pub async fn events(&self) -> Result<BoxStream<'static, Event>> {
        use futures::StreamExt;

        let raw = self.client.subscribe(&self.config.pubsub_channel).await?;
        let parsed = raw.filter_map(|payload| async move {
            match serde_json::from_str::<Event>(&payload) {
                Ok(event) => Some(event),
                Err(err) => {
                    tracing::warn!(error = %err, "invalid JSON received on event bus, skipping");
                    None
                }
            }
        });
        Ok(Box::pin(parsed))
    }
}
