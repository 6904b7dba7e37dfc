use bazbeans_common::types::NodeId;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tabled::Tabled;

#[derive(Tabled)]
pub struct NodeRow {
    #[tabled(rename = "Node")]
    pub node: String,
    #[tabled(rename = "Active")]
    pub active: String,
    #[tabled(rename = "CPU%")]
    pub cpu: String,
    #[tabled(rename = "MEM%")]
    pub mem: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Frozen")]
    pub frozen: String,
    #[tabled(rename = "DataCenter")]
    pub data_center: String,
}

fn field(status: &HashMap<String, Value>, key: &str) -> String {
    match status.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(v) => v.to_string(),
        None => "N/A".to_string(),
    }
}

impl NodeRow {
    pub fn new(node_id: &NodeId, is_active: bool, status: &HashMap<String, Value>) -> Self {
        Self {
            node: node_id.to_string(),
            active: if is_active { "\u{2713}".to_string() } else { "\u{2717}".to_string() },
            cpu: field(status, "cpu_percent"),
            mem: field(status, "memory_percent"),
            status: field(status, "status"),
            frozen: field(status, "is_frozen"),
            data_center: field(status, "data_center"),
        }
    }
}

pub fn print_table(rows: Vec<NodeRow>) {
    println!("{}", tabled::Table::new(rows));
}

pub fn print_nodes_json(rows: &[(NodeId, bool, HashMap<String, Value>)]) {
    let out: Vec<Value> = rows
        .iter()
        .map(|(node_id, is_active, status)| {
            let mut entry = serde_json::Map::new();
            entry.insert("node_id".to_string(), Value::String(node_id.to_string()));
            entry.insert("active".to_string(), Value::Bool(*is_active));
            for (k, v) in status {
                entry.insert(k.clone(), v.clone());
            }
            Value::Object(entry)
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&out).unwrap());
}

pub fn print_status_human(node_id: &str, status: &HashMap<String, Value>) {
    println!("\nNode: {node_id}");
    println!("{}", "=".repeat(50));
    println!("Status: {}", field(status, "status"));
    println!("Data Center: {}", field(status, "data_center"));
    println!("Frozen: {}", field(status, "is_frozen"));
    println!("Active: {}", field(status, "is_active"));

    if let Some(ts) = status.get("timestamp").and_then(|v| v.as_f64()) {
        if let Some(dt) = Utc.timestamp_opt(ts as i64, 0).single() {
            println!("Last Update: {}", dt.format("%Y-%m-%d %H:%M:%S"));
        }
    }

    println!("\nMetrics:");
    println!("  CPU: {}%", field(status, "cpu_percent"));
    println!("  Memory: {}%", field(status, "memory_percent"));
    println!("  Disk: {}%", field(status, "disk_percent"));

    if let Some(Value::String(details)) = status.get("details") {
        if !details.is_empty() {
            println!("\nDetails: {details}");
        }
    }
}

pub fn print_status_json(node_id: &str, status: &HashMap<String, Value>) {
    let mut entry = serde_json::Map::new();
    entry.insert("node_id".to_string(), Value::String(node_id.to_string()));
    for (k, v) in status {
        entry.insert(k.clone(), v.clone());
    }
    println!("{}", serde_json::to_string_pretty(&Value::Object(entry)).unwrap());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_renders_as_na() {
        let status = HashMap::new();
        assert_eq!(field(&status, "cpu_percent"), "N/A");
    }

    #[test]
    fn string_field_is_passed_through_without_quoting() {
        let mut status = HashMap::new();
        status.insert("status".to_string(), Value::String("active".to_string()));
        assert_eq!(field(&status, "status"), "active");
    }

    #[test]
    fn node_row_marks_active_with_checkmark() {
        let row = NodeRow::new(&NodeId::from("n1"), true, &HashMap::new());
        assert_eq!(row.active, "\u{2713}");
    }
}
