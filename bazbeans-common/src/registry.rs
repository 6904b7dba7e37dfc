use crate::config::BazBeansConfig;
use crate::coordinator::CoordinatorClient;
use crate::error::Result;
use crate::types::{Heartbeat, Metrics, NodeId, NodeStatus};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

/// Maintains `ALL_NODES`, `ACTIVE_NODES`, heartbeat TTLs, status hashes, and
/// the IP mapping. Every operation here is a thin, atomically-pipelined
/// wrapper over the coordinator client; see `SPEC_FULL.md` §4.2.
pub struct NodeRegistry<C: CoordinatorClient> {
    client: Arc<C>,
    config: Arc<BazBeansConfig>,
}

impl<C: CoordinatorClient> NodeRegistry<C> {
    pub fn new(client: Arc<C>, config: Arc<BazBeansConfig>) -> Self {
        Self { client, config }
    }

    fn now_secs() -> f64 {
        Utc::now().timestamp_millis() as f64 / 1000.0
    }

    /// Adds this node to `ALL_NODES` and `ACTIVE_NODES`, writes the initial
    /// status hash. Idempotent: re-registering an already-registered node
    /// just re-asserts the same state.
    pub async fn register(&self, node_id: &NodeId) -> Result<()> {
        self.client.sadd(&self.config.nodes_all_key, node_id.as_ref()).await?;
        self.client.sadd(&self.config.nodes_active_key, node_id.as_ref()).await?;
        self.client
            .hset_many(
                &self.config.status_key_for(node_id.as_ref()),
                &[
                    ("status", "registered".to_string()),
                    ("details", String::new()),
                    ("timestamp", Self::now_secs().to_string()),
                    ("data_center", self.config.data_center.clone()),
                    ("is_frozen", "false".to_string()),
                    ("is_active", "true".to_string()),
                ],
            )
            .await
    }

    pub async fn heartbeat(&self, node_id: &NodeId, metrics: Metrics, is_frozen: bool, is_active: bool) -> Result<()> {
        let record = Heartbeat {
            timestamp: Self::now_secs(),
            node_id: node_id.clone(),
            data_center: self.config.data_center.clone(),
            cpu_percent: metrics.cpu_percent,
            memory_percent: metrics.memory_percent,
            disk_percent: metrics.disk_percent,
            is_frozen,
            is_active,
        };
        let json = serde_json::to_string(&record)?;
        self.client
            .setex(&self.config.heartbeat_key_for(node_id.as_ref()), self.config.heartbeat_ttl, json)
            .await
    }

    /// Atomically removes `node_id` from `ACTIVE_NODES` and marks it frozen.
    pub async fn freeze(&self, node_id: &NodeId, reason: &str) -> Result<()> {
        self.client
            .pipelined_set_move_and_hset(
                Some((&self.config.nodes_active_key, node_id.as_ref())),
                None,
                &self.config.status_key_for(node_id.as_ref()),
                &[
                    ("status", "frozen".to_string()),
                    ("details", reason.to_string()),
                    ("timestamp", Self::now_secs().to_string()),
                    ("is_frozen", "true".to_string()),
                    ("is_active", "false".to_string()),
                ],
            )
            .await
    }

    /// Atomically re-adds `node_id` to `ACTIVE_NODES` and marks it active.
    pub async fn unfreeze(&self, node_id: &NodeId) -> Result<()> {
        self.client
            .pipelined_set_move_and_hset(
                None,
                Some((&self.config.nodes_active_key, node_id.as_ref())),
                &self.config.status_key_for(node_id.as_ref()),
                &[
                    ("status", "active".to_string()),
                    ("details", "Unfrozen".to_string()),
                    ("timestamp", Self::now_secs().to_string()),
                    ("is_frozen", "false".to_string()),
                    ("is_active", "true".to_string()),
                ],
            )
            .await
    }

    /// Returns `ACTIVE_NODES ∩ {nodes with a live heartbeat}`, removing any
    /// member whose heartbeat has expired as a side effect (cleanup on
    /// read — Open Question (a), resolved: yes, at this call site).
    pub async fn list_active(&self) -> Result<Vec<NodeId>> {
        let members = self.client.smembers(&self.config.nodes_active_key).await?;
        let mut active = Vec::with_capacity(members.len());
        for node_id in members {
            if self.client.exists(&self.config.heartbeat_key_for(&node_id)).await? {
                active.push(NodeId(node_id));
            } else {
                self.client.srem(&self.config.nodes_active_key, &node_id).await?;
            }
        }
        Ok(active)
    }

    pub async fn list_all(&self) -> Result<Vec<NodeId>> {
        Ok(self
            .client
            .smembers(&self.config.nodes_all_key)
            .await?
            .into_iter()
            .map(NodeId)
            .collect())
    }

    /// Union of the status hash and the last heartbeat; when there is no
    /// live heartbeat, `status` reports `"NO HEARTBEAT"`.
    pub async fn get_status(&self, node_id: &NodeId) -> Result<HashMap<String, serde_json::Value>> {
        let heartbeat_raw = self.client.get(&self.config.heartbeat_key_for(node_id.as_ref())).await?;
        let mut merged: HashMap<String, serde_json::Value> = HashMap::new();

        let status_hash = self.client.hgetall(&self.config.status_key_for(node_id.as_ref())).await?;
        for (k, v) in status_hash {
            merged.insert(k, serde_json::Value::String(v));
        }

        match heartbeat_raw {
            Some(raw) => {
                let heartbeat: serde_json::Value = serde_json::from_str(&raw)?;
                if let serde_json::Value::Object(map) = heartbeat {
                    for (k, v) in map {
                        merged.insert(k, v);
                    }
                }
            }
            None => {
                merged.insert("status".to_string(), serde_json::Value::String("NO HEARTBEAT".to_string()));
            }
        }

        Ok(merged)
    }

    /// Parsed view of `get_status`, used by callers that want typed fields
    /// rather than the raw merged map (e.g. the health-check handler).
    pub async fn get_node_status(&self, node_id: &NodeId) -> Result<NodeStatus> {
        let raw = self.get_status(node_id).await?;
        let get_str = |k: &str| raw.get(k).and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let get_bool = |k: &str| {
            raw.get(k)
                .map(|v| match v {
                    serde_json::Value::Bool(b) => *b,
                    serde_json::Value::String(s) => s == "true",
                    _ => false,
                })
                .unwrap_or(false)
        };
        Ok(NodeStatus {
            status: get_str("status"),
            details: get_str("details"),
            timestamp: raw.get("timestamp").and_then(|v| v.as_f64()).unwrap_or(0.0),
            data_center: get_str("data_center"),
            is_frozen: get_bool("is_frozen"),
            is_active: get_bool("is_active"),
        })
    }

    pub async fn update_status(&self, node_id: &NodeId, status: &str, details: &str) -> Result<()> {
        self.client
            .hset_many(
                &self.config.status_key_for(node_id.as_ref()),
                &[
                    ("status", status.to_string()),
                    ("details", details.to_string()),
                    ("timestamp", Self::now_secs().to_string()),
                ],
            )
            .await
    }

    /// Bounded scan that only affects `ACTIVE_NODES`, never `ALL_NODES`.
    /// Distinct from the cleanup-on-read performed by `list_active`: this
    /// is the explicit operator-triggered variant (`bazbeans-ctl cleanup`).
    pub async fn cleanup_dead_nodes(&self) -> Result<Vec<NodeId>> {
        let members = self.client.smembers(&self.config.nodes_active_key).await?;
        let mut cleaned = Vec::new();
        for node_id in members {
            if !self.client.exists(&self.config.heartbeat_key_for(&node_id)).await? {
                self.client.srem(&self.config.nodes_active_key, &node_id).await?;
                cleaned.push(NodeId(node_id));
            }
        }
        Ok(cleaned)
    }

    pub async fn register_ip(&self, node_id: &NodeId, ip: &str) -> Result<()> {
        self.client
            .hset_many(&self.config.node_ips_key, &[(node_id.as_ref(), ip.to_string())])
            .await
    }

    pub async fn get_ip(&self, node_id: &NodeId) -> Result<Option<String>> {
        self.client.hget(&self.config.node_ips_key, node_id.as_ref()).await
    }

    pub async fn remove_from_active(&self, node_id: &NodeId) -> Result<()> {
        self.client.srem(&self.config.nodes_active_key, node_id.as_ref()).await
    }
}
