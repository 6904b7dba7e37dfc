use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable opaque node identity. Hostname by default; never interpreted,
/// only compared and used to derive key names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId(s)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Resource metrics sampled by a `SystemProbe` each tick.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
}

/// Heartbeat record written with a TTL equal to `heartbeat_ttl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub timestamp: f64,
    pub node_id: NodeId,
    pub data_center: String,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub is_frozen: bool,
    pub is_active: bool,
}

/// Scalar fields stored in a node's status hash. All values are strings on
/// the wire (matching the coordinator's hash-field contract); this struct is
/// the typed view after parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatus {
    pub status: String,
    pub details: String,
    pub timestamp: f64,
    pub data_center: String,
    pub is_frozen: bool,
    pub is_active: bool,
}

/// A command enqueued for a node. `kind` dispatches to a built-in or
/// plugin-registered handler; `args` is opaque to the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    #[serde(default)]
    pub id: Option<uuid::Uuid>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub args: serde_json::Map<String, serde_json::Value>,
}

/// The result of executing a `Command`, written back to the node's own
/// status hash under `executed_<kind>` / `error_<kind>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub id: uuid::Uuid,
    pub kind: String,
    pub success: bool,
    pub payload: serde_json::Value,
    pub error: Option<String>,
}

/// Membership event kind. Carries the full active-node snapshot at publish
/// time so subscribers never need a follow-up query to reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NodeRegistered,
    NodeRemoved,
    NodeFrozen,
    NodeUnfrozen,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::NodeRegistered => "node_registered",
            EventKind::NodeRemoved => "node_removed",
            EventKind::NodeFrozen => "node_frozen",
            EventKind::NodeUnfrozen => "node_unfrozen",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event: EventKind,
    pub node_id: NodeId,
    pub timestamp: String,
    #[serde(default)]
    pub reason: String,
    pub active_nodes: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_center: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_port: Option<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_display_matches_wire_name() {
        assert_eq!(EventKind::NodeFrozen.to_string(), "node_frozen");
        assert_eq!(EventKind::NodeRegistered.to_string(), "node_registered");
    }

    #[test]
    fn event_round_trips_through_json() {
        let event = Event {
            event: EventKind::NodeRegistered,
            node_id: NodeId::from("node-1"),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            reason: String::new(),
            active_nodes: vec![NodeId::from("node-1")],
            data_center: Some("dc1".to_string()),
            node_port: Some(8000),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"node_registered\""));
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.node_id, event.node_id);
        assert_eq!(back.node_port, Some(8000));
    }

    #[test]
    fn command_parses_arbitrary_args() {
        let raw = r#"{"type":"exec","command":"ls /tmp"}"#;
        let cmd: Command = serde_json::from_str(raw).unwrap();
        assert_eq!(cmd.kind, "exec");
        assert_eq!(cmd.args.get("command").unwrap(), "ls /tmp");
    }
}
