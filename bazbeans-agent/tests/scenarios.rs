use async_trait::async_trait;
use bazbeans_agent::agent::NodeAgent;
use bazbeans_agent::probe::{ContainerProbe, SystemProbe};
use bazbeans_common::config::BazBeansConfig;
use bazbeans_common::testing::FakeCoordinator;
use bazbeans_common::types::{Command, Metrics, NodeId};
use serde_json::json;
use std::sync::Arc;

struct FixedProbe(Metrics);

#[async_trait]
impl SystemProbe for FixedProbe {
    async fn sample(&self) -> Metrics {
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

fn low_load_probe() -> Arc<dyn SystemProbe> {
    Arc::new(FixedProbe(Metrics { cpu_percent: 5.0, memory_percent: 5.0, disk_percent: 5.0 }))
}

fn config_for(node_id: &str) -> Arc<BazBeansConfig> {
    let mut config = BazBeansConfig::default();
    config.node_id = node_id.to_string();
    config.compose_plugin_enabled = false;
    Arc::new(config)
}

fn agent_for(node_id: &str, client: Arc<FakeCoordinator>) -> NodeAgent<FakeCoordinator> {
    let config = config_for(node_id);
    let mut agent = NodeAgent::new(config, client, low_load_probe());
    agent.set_container_probe(Arc::new(AlwaysHealthy));
    agent
}

#[tokio::test]
async fn operator_freeze_then_unfreeze_round_trip() {
    let client = Arc::new(FakeCoordinator::new());
    let config = config_for("a");
    let agent = agent_for("a", client.clone());
    agent.start().await.unwrap();

    client
        .rpush(
            &config.command_queue_key(),
            serde_json::to_string(&Command {
                id: None,
                kind: "freeze".to_string(),
                args: json!({"reason": "maintenance"}).as_object().unwrap().clone(),
            })
            .unwrap(),
        )
        .await
        .unwrap();

    agent.tick().await.unwrap();

    use bazbeans_common::coordinator::CoordinatorClient;
    let active: Vec<String> = client.smembers(&config.nodes_active_key).await.unwrap();
    assert!(!active.contains(&"a".to_string()));

    client
        .rpush(
            &config.command_queue_key(),
            serde_json::to_string(&Command {
                id: None,
                kind: "unfreeze".to_string(),
                args: Default::default(),
            })
            .unwrap(),
        )
        .await
        .unwrap();
    agent.tick().await.unwrap();

    let active: Vec<String> = client.smembers(&config.nodes_active_key).await.unwrap();
    assert!(active.contains(&"a".to_string()));
}

#[tokio::test]
async fn stale_node_is_dropped_from_active_on_next_list_active() {
    let client = Arc::new(FakeCoordinator::new());
    let config = config_for("a");
    let agent = agent_for("a", client.clone());
    agent.start().await.unwrap();
    agent.tick().await.unwrap();

    client.expire_now(&config.heartbeat_key_for("a"));

    use bazbeans_common::registry::NodeRegistry;
    let registry = NodeRegistry::new(client.clone(), config.clone());
    let active = registry.list_active().await.unwrap();
    assert!(!active.contains(&NodeId::from("a")));
}

#[tokio::test]
async fn unknown_command_does_not_crash_the_tick() {
    let client = Arc::new(FakeCoordinator::new());
    let config = config_for("a");
    let agent = agent_for("a", client.clone());
    agent.start().await.unwrap();

    client
        .rpush(
            &config.command_queue_key(),
            serde_json::to_string(&Command {
                id: None,
                kind: "reticulate_splines".to_string(),
                args: Default::default(),
            })
            .unwrap(),
        )
        .await
        .unwrap();

    agent.tick().await.unwrap();

    use bazbeans_common::coordinator::CoordinatorClient;
    let error = client.hget(&config.status_key(), "error_reticulate_splines").await.unwrap();
    assert_eq!(error.as_deref(), Some("Unknown command: reticulate_splines"));
}
