use bazbeans_common::NodeId;
use chrono::Utc;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct HealthCheckOptions {
    pub path: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub label: String,
    pub upstream_name: String,
    pub node_port: u16,
    pub health_check: Option<HealthCheckOptions>,
}

impl RenderOptions {
    pub fn new(upstream_name: String, node_port: u16, health_check: Option<HealthCheckOptions>) -> Self {
        let label = if health_check.is_some() {
            "BazBeans Nginx Updater with Health Checks".to_string()
        } else {
            "BazBeans Nginx Updater".to_string()
        };
        Self { label, upstream_name, node_port, health_check }
    }
}

/// Renders the upstream block byte-for-byte per the documented format:
/// header comment, UTC timestamp, `upstream <name> { ... }` with one
/// `server` line per resolvable node in lexicographic `node_id` order,
/// unresolvable nodes left as a comment rather than dropped, and a trailing
/// `least_conn;` before the closing brace.
pub fn render_upstream(
    opts: &RenderOptions,
    active_nodes: &[NodeId],
    resolved_ips: &HashMap<NodeId, String>,
) -> String {
    let mut sorted: Vec<&NodeId> = active_nodes.iter().collect();
    sorted.sort();

    let mut lines = Vec::new();
    lines.push(format!("# Generated by {}", opts.label));
    lines.push(format!("# Updated: {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC")));
    lines.push(format!("upstream {} {{", opts.upstream_name));
    lines.push(format!("    # Active nodes: {}", sorted.len()));

    for node_id in &sorted {
        match resolved_ips.get(*node_id) {
            Some(ip) => {
                lines.push(format!("    server {}:{};", ip, opts.node_port));
                if let Some(hc) = &opts.health_check {
                    lines.push(format!(
                        "    # Health check: curl -f http://{}:{}{}",
                        ip, opts.node_port, hc.path
                    ));
                }
            }
            None => {
                lines.push(format!("    # Could not resolve IP for {}", node_id));
            }
        }
    }

    lines.push("    # Load balancing options".to_string());
    lines.push("    least_conn;".to_string());

    if let Some(hc) = &opts.health_check {
        lines.push(String::new());
        lines.push(
            "    # Health check configuration (requires nginx-plus or third-party module)"
                .to_string(),
        );
        lines.push(format!(
            "    # check interval={}s timeout={}s",
            hc.timeout_secs * 2,
            hc.timeout_secs
        ));
    }

    lines.push("}".to_string());

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_servers_lexicographically_and_counts_active_nodes() {
        let opts = RenderOptions::new("app_backend".to_string(), 8000, None);
        let nodes = vec![NodeId::from("b"), NodeId::from("a")];
        let mut resolved = HashMap::new();
        resolved.insert(NodeId::from("a"), "10.0.0.1".to_string());
        resolved.insert(NodeId::from("b"), "10.0.0.2".to_string());

        let rendered = render_upstream(&opts, &nodes, &resolved);
        let a_pos = rendered.find("server 10.0.0.1:8000;").unwrap();
        let b_pos = rendered.find("server 10.0.0.2:8000;").unwrap();
        assert!(a_pos < b_pos);
        assert!(rendered.contains("# Active nodes: 2"));
        assert!(rendered.contains("upstream app_backend {"));
        assert!(rendered.contains("least_conn;"));
        assert!(rendered.ends_with("}\n"));
    }

    #[test]
    fn unresolvable_node_becomes_a_comment_not_a_dropped_entry() {
        let opts = RenderOptions::new("app_backend".to_string(), 8000, None);
        let nodes = vec![NodeId::from("a")];
        let resolved = HashMap::new();

        let rendered = render_upstream(&opts, &nodes, &resolved);
        assert!(rendered.contains("# Could not resolve IP for a"));
        assert!(!rendered.contains("server "));
    }

    #[test]
    fn health_check_mode_appends_comment_block() {
        let opts = RenderOptions::new(
            "app_backend".to_string(),
            8000,
            Some(HealthCheckOptions { path: "/health".to_string(), timeout_secs: 5 }),
        );
        let nodes = vec![NodeId::from("a")];
        let mut resolved = HashMap::new();
        resolved.insert(NodeId::from("a"), "10.0.0.1".to_string());

        let rendered = render_upstream(&opts, &nodes, &resolved);
        assert!(rendered.contains("# Generated by BazBeans Nginx Updater with Health Checks"));
        assert!(rendered.contains("# Health check: curl -f http://10.0.0.1:8000/health"));
        assert!(rendered.contains("check interval=10s timeout=5s"));
    }
}
