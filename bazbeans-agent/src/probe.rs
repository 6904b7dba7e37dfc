use async_trait::async_trait;
use bazbeans_common::Metrics;
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use sysinfo::System;
use tokio::process::Command;
use tokio::sync::Mutex;

/// Abstracts OS-level metrics collection. The host process may substitute
/// its own implementation (e.g. for containerized environments with their
/// own cgroup accounting); the default wraps `sysinfo`.
#[async_trait]
pub trait SystemProbe: Send + Sync {
    async fn sample(&self) -> Metrics;
}

pub struct SysinfoProbe {
    system: Mutex<System>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        Self { system: Mutex::new(system) }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SystemProbe for SysinfoProbe {
    async fn sample(&self) -> Metrics {
        let mut system = self.system.lock().await;
        system.refresh_cpu_usage();
        // A fresh CPU sample needs a short interval between refreshes to be
        // meaningful; matches the ~1 second blocking sample the original
        // self-health check performs per tick.
        tokio::time::sleep(Duration::from_millis(200)).await;
        system.refresh_cpu_usage();
        system.refresh_memory();

        let cpu_percent = system.global_cpu_usage() as f64;
        let memory_percent = if system.total_memory() > 0 {
            (system.used_memory() as f64 / system.total_memory() as f64) * 100.0
        } else {
            0.0
        };

        Metrics {
            cpu_percent,
            memory_percent,
            disk_percent: disk_percent_for(".").unwrap_or(0.0),
        }
    }
}

fn disk_percent_for(path: &str) -> Option<f64> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    let disk = disks
        .iter()
        .filter(|d| std::path::Path::new(path).starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())?;
    let total = disk.total_space();
    if total == 0 {
        return None;
    }
    let used = total.saturating_sub(disk.available_space());
    Some((used as f64 / total as f64) * 100.0)
}

/// Abstracts the container-liveness leg of self-health, mirroring the
/// `SystemProbe` split above so it can be substituted in tests without
/// shelling out to `docker-compose`.
#[async_trait]
pub trait ContainerProbe: Send + Sync {
    async fn check(&self) -> Result<(), String>;
}

pub struct ComposeContainerProbe {
    app_dir: String,
    compose_file: String,
}

impl ComposeContainerProbe {
    pub fn new(app_dir: impl Into<String>, compose_file: impl Into<String>) -> Self {
        Self { app_dir: app_dir.into(), compose_file: compose_file.into() }
    }
}

#[async_trait]
impl ContainerProbe for ComposeContainerProbe {
    async fn check(&self) -> Result<(), String> {
        check_containers_healthy(&self.app_dir, &self.compose_file).await
    }
}

#[derive(Debug, Deserialize)]
struct ComposeContainer {
    #[serde(rename = "State", alias = "state")]
    state: String,
    #[serde(rename = "Name", alias = "name", default)]
    #[allow(dead_code)]
    name: String,
}

/// Treats any non-`running` container under the configured compose project
/// as a freeze condition, scoped to that project rather than the whole
/// host (see `SPEC_FULL.md` §4.5).
pub async fn check_containers_healthy(app_dir: &str, compose_file: &str) -> Result<(), String> {
    let mut cmd = Command::new("docker-compose");
    cmd.arg("-f")
        .arg(compose_file)
        .arg("ps")
        .arg("--format")
        .arg("json")
        .current_dir(app_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let output = cmd.output().await.map_err(|e| format!("Docker error: {e}"))?;
    if !output.status.success() {
        return Err(format!(
            "Docker error: {}",
            String::from_utf8_lossy(&output.stderr)
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        let container: ComposeContainer = match serde_json::from_str(line) {
            Ok(c) => c,
            Err(_) => continue,
        };
        if !container.state.eq_ignore_ascii_case("running") {
            return Err(format!("Unhealthy containers: {}", container.state));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sysinfo_probe_returns_bounded_percentages() {
        let probe = SysinfoProbe::new();
        let metrics = probe.sample().await;
        assert!(metrics.cpu_percent >= 0.0);
        assert!(metrics.memory_percent >= 0.0 && metrics.memory_percent <= 100.0);
    }
}
