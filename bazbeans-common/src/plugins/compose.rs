//! Example plugin providing docker-compose service management commands,
//! carried forward from the original fleet's `docker_commands.py`. Answers
//! the `start`/`stop`/`restart`/`update`/`pull`/`logs`/`status` CLI verbs
//! that the core protocol leaves as plugin territory — without this plugin
//! registered, those kinds fall through to the agent's normal
//! `"Unknown command: <kind>"` handling.

use super::{CommandHandler, CommandPlugin, HandlerOutput};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command as ProcessCommand;

const EXEC_TIMEOUT: Duration = Duration::from_secs(300);

/// Runs `docker-compose -f <compose_file> <args>` in `app_dir`, capturing
/// stdout/stderr/exit status the same way the `exec` built-in does.
async fn run_compose(app_dir: &str, compose_file: &str, args: &[String]) -> HandlerOutput {
    let mut cmd = ProcessCommand::new("docker-compose");
    cmd.arg("-f")
        .arg(compose_file)
        .args(args)
        .current_dir(app_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let output = tokio::time::timeout(EXEC_TIMEOUT, cmd.output()).await;

    match output {
        Ok(Ok(output)) => Ok(json!({
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
            "returncode": output.status.code().unwrap_or(-1),
            "success": output.status.success(),
        })),
        Ok(Err(err)) => Err(err.to_string()),
        Err(_) => Err("Command timed out after 5 minutes".to_string()),
    }
}

/// Extracts the optional `services` array from a command's args, the way
/// every per-verb handler below folds it into its own `docker-compose`
/// invocation when present.
fn services_from(args: &Map<String, Value>) -> Vec<String> {
    args.get("services")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// Folds a `run_compose` result into one `update` step entry, reporting
/// whether that step succeeded.
fn step_from(label: &str, result: &HandlerOutput) -> (bool, Value) {
    match result {
        Ok(v) => {
            let success = v.get("success").and_then(Value::as_bool).unwrap_or(false);
            (
                success,
                json!({
                    "step": label,
                    "success": success,
                    "output": v.get("stdout").cloned().unwrap_or(Value::Null),
                    "error": v.get("stderr").cloned().unwrap_or(Value::Null),
                }),
            )
        }
        Err(err) => (
            false,
            json!({
                "step": label,
                "success": false,
                "output": Value::Null,
                "error": err,
            }),
        ),
    }
}

#[derive(Clone, Copy)]
enum Verb {
    Start,
    Stop,
    Restart,
    Pull,
    Logs,
    Status,
    Update,
}

struct ComposeHandler {
    app_dir: String,
    compose_file: String,
    verb: Verb,
}

#[async_trait]
impl CommandHandler for ComposeHandler {
    async fn handle(&self, args: &Map<String, Value>) -> HandlerOutput {
        match self.verb {
            Verb::Start => {
                let mut argv = vec!["up".to_string(), "-d".to_string()];
                argv.extend(services_from(args));
                run_compose(&self.app_dir, &self.compose_file, &argv).await
            }
            Verb::Stop => {
                let services = services_from(args);
                let argv = if services.is_empty() {
                    vec!["down".to_string()]
                } else {
                    let mut argv = vec!["stop".to_string()];
                    argv.extend(services);
                    argv
                };
                run_compose(&self.app_dir, &self.compose_file, &argv).await
            }
            Verb::Restart => {
                let mut argv = vec!["restart".to_string()];
                argv.extend(services_from(args));
                run_compose(&self.app_dir, &self.compose_file, &argv).await
            }
            Verb::Pull => {
                let mut argv = vec!["pull".to_string()];
                argv.extend(services_from(args));
                run_compose(&self.app_dir, &self.compose_file, &argv).await
            }
            Verb::Logs => {
                let follow = args.get("follow").and_then(Value::as_bool).unwrap_or(false);
                let tail = args.get("tail").map(|v| v.to_string()).unwrap_or_else(|| "100".to_string());

                let mut argv = vec!["logs".to_string(), "--tail".to_string(), tail];
                if follow {
                    argv.push("--follow".to_string());
                }
                argv.extend(services_from(args));

                if follow {
                    return Ok(json!({
                        "success": true,
                        "message": "Following logs (use docker-compose directly for follow mode)",
                        "command": format!(
                            "cd {} && docker-compose -f {} {}",
                            self.app_dir,
                            self.compose_file,
                            argv.join(" ")
                        ),
                    }));
                }
                run_compose(&self.app_dir, &self.compose_file, &argv).await
            }
            Verb::Status => run_compose(&self.app_dir, &self.compose_file, &["ps".to_string()]).await,
            Verb::Update => {
                let mut steps = Vec::new();

                let pull_result = run_compose(&self.app_dir, &self.compose_file, &["pull".to_string()]).await;
                let (pull_success, pull_step) = step_from("pull", &pull_result);
                steps.push(pull_step);

                if !pull_success {
                    return Ok(json!({
                        "success": false,
                        "message": "Update failed during pull",
                        "steps": steps,
                    }));
                }

                let recreate_argv =
                    vec!["up".to_string(), "-d".to_string(), "--force-recreate".to_string()];
                let recreate_result = run_compose(&self.app_dir, &self.compose_file, &recreate_argv).await;
                let (recreate_success, recreate_step) = step_from("recreate", &recreate_result);
                steps.push(recreate_step);

                if let Some(wait_secs) = args.get("wait_seconds").and_then(Value::as_u64) {
                    tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                    let status_result = run_compose(&self.app_dir, &self.compose_file, &["ps".to_string()]).await;
                    let (_, status_step) = step_from("status_check", &status_result);
                    steps.push(status_step);
                }

                Ok(json!({
                    "success": recreate_success,
                    "message": "Update completed",
                    "steps": steps,
                }))
            }
        }
    }
}

/// Registers `start`, `stop`, `restart`, `update`, `pull`, `logs`, `status`
/// against the configured `compose_file`.
pub struct ComposeCommands {
    app_dir: String,
    compose_file: String,
}

impl ComposeCommands {
    pub fn new(app_dir: impl Into<String>, compose_file: impl Into<String>) -> Self {
        Self {
            app_dir: app_dir.into(),
            compose_file: compose_file.into(),
        }
    }

    fn handler(&self, verb: Verb) -> Arc<dyn CommandHandler> {
        Arc::new(ComposeHandler {
            app_dir: self.app_dir.clone(),
            compose_file: self.compose_file.clone(),
            verb,
        })
    }
}

impl CommandPlugin for ComposeCommands {
    fn handlers(&self) -> Vec<(String, Arc<dyn CommandHandler>)> {
        vec![
            ("start".to_string(), self.handler(Verb::Start)),
            ("stop".to_string(), self.handler(Verb::Stop)),
            ("restart".to_string(), self.handler(Verb::Restart)),
            ("update".to_string(), self.handler(Verb::Update)),
            ("pull".to_string(), self.handler(Verb::Pull)),
            ("logs".to_string(), self.handler(Verb::Logs)),
            ("status".to_string(), self.handler(Verb::Status)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handlers_cover_all_compose_verbs() {
        let plugin = ComposeCommands::new("/opt/app", "docker-compose.yml");
        let kinds: Vec<String> = plugin.handlers().into_iter().map(|(k, _)| k).collect();
        for expected in ["start", "stop", "restart", "update", "pull", "logs", "status"] {
            assert!(kinds.contains(&expected.to_string()), "missing handler for {expected}");
        }
    }

    #[test]
    fn services_from_reads_string_array() {
        let mut args = Map::new();
        args.insert("services".to_string(), json!(["web", "worker"]));
        assert_eq!(services_from(&args), vec!["web".to_string(), "worker".to_string()]);
    }

    #[test]
    fn services_from_is_empty_when_absent() {
        assert!(services_from(&Map::new()).is_empty());
    }

    #[test]
    fn step_from_reports_failure_for_nonzero_exit() {
        let result: HandlerOutput = Ok(json!({"stdout": "", "stderr": "boom", "success": false}));
        let (success, step) = step_from("pull", &result);
        assert!(!success);
        assert_eq!(step["error"], "boom");
    }

    #[test]
    fn step_from_reports_failure_for_process_error() {
        let result: HandlerOutput = Err("docker-compose not found".to_string());
        let (success, step) = step_from("pull", &result);
        assert!(!success);
        assert_eq!(step["error"], "docker-compose not found");
    }
}
