use bazbeans_common::config::BazBeansConfig;
use bazbeans_common::coordinator::CoordinatorClient;
use bazbeans_common::testing::FakeCoordinator;
use bazbeans_common::types::{Command, NodeId};
use bazbeans_ctl::controller::OperatorController;
use std::sync::Arc;

fn controller_for(data_center: &str) -> (OperatorController<FakeCoordinator>, Arc<FakeCoordinator>) {
    let client = Arc::new(FakeCoordinator::new());
    let mut config = BazBeansConfig::default();
    config.data_center = data_center.to_string();
    let controller = OperatorController::new(client.clone(), Arc::new(config));
    (controller, client)
}

fn freeze_command(reason: &str) -> Command {
    let mut args = serde_json::Map::new();
    args.insert("reason".to_string(), serde_json::Value::String(reason.to_string()));
    Command { id: None, kind: "freeze".to_string(), args }
}

#[tokio::test]
async fn operator_freeze_is_delivered_to_the_nodes_own_queue() {
    let (controller, client) = controller_for("dc1");
    let node = NodeId::from("n1");

    controller.send_command(&node, &freeze_command("maintenance")).await.unwrap();

    let queued = client.lpop("bazbeans:node:n1:commands").await.unwrap().unwrap();
    let command: Command = serde_json::from_str(&queued).unwrap();
    assert_eq!(command.kind, "freeze");
    assert_eq!(command.args.get("reason").unwrap(), "maintenance");
}

#[tokio::test]
async fn broadcast_update_skips_nodes_outside_the_filtered_datacenter() {
    let (controller, client) = controller_for("dc1");

    client.sadd("bazbeans:nodes:all", "n1").await.unwrap();
    client
        .hset_many("bazbeans:node:n1:status", &[("data_center", "dc1".to_string())])
        .await
        .unwrap();
    client.sadd("bazbeans:nodes:all", "n2").await.unwrap();
    client
        .hset_many("bazbeans:node:n2:status", &[("data_center", "dc2".to_string())])
        .await
        .unwrap();

    let update = Command { id: None, kind: "update".to_string(), args: serde_json::Map::new() };
    let sent = controller.send_command_to_all(&update, Some("dc1")).await.unwrap();

    assert_eq!(sent, 1);
    assert!(client.lpop("bazbeans:node:n1:commands").await.unwrap().is_some());
    assert!(client.lpop("bazbeans:node:n2:commands").await.unwrap().is_none());
}

#[tokio::test]
async fn cleanup_leaves_registered_but_live_nodes_in_active_set() {
    let (controller, client) = controller_for("dc1");
    let alive = NodeId::from("alive");
    let dead = NodeId::from("dead");

    client.sadd("bazbeans:nodes:active", alive.as_ref()).await.unwrap();
    client.setex("bazbeans:node:alive:heartbeat", 30, "{}".to_string()).await.unwrap();
    client.sadd("bazbeans:nodes:active", dead.as_ref()).await.unwrap();

    let cleaned = controller.cleanup_dead_nodes().await.unwrap();

    assert_eq!(cleaned, vec![dead]);
    assert_eq!(controller.active_nodes().await.unwrap(), vec![alive]);
}
