use bazbeans_ctl::cli::{Cli, Commands, OutputFormat};
use bazbeans_ctl::controller::OperatorController;
use bazbeans_ctl::output;
use bazbeans_common::config::BazBeansConfig;
use bazbeans_common::coordinator::RedisCoordinatorClient;
use bazbeans_common::secret::Secret;
use bazbeans_common::types::{Command, NodeId};
use clap::Parser;
use std::sync::Arc;

fn command(kind: &str) -> Command {
    Command {
        id: None,
        kind: kind.to_string(),
        args: serde_json::Map::new(),
    }
}

fn command_with(kind: &str, fields: &[(&str, serde_json::Value)]) -> Command {
    let mut args = serde_json::Map::new();
    for (k, v) in fields {
        args.insert(k.to_string(), v.clone());
    }
    Command {
        id: None,
        kind: kind.to_string(),
        args,
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "bazbeans_ctl=warn".into()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    println!("BazBeans CLI version {}", env!("CARGO_PKG_VERSION"));
    println!("{}", "=".repeat(50));

    if let Err(err) = run(cli).await {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = BazBeansConfig::default();
    config.redis_url = Secret::new(cli.redis_url.clone());
    let config = Arc::new(config);

    let client = Arc::new(
        RedisCoordinatorClient::connect(&config.redis_url)
            .await
            .map_err(|_| {
                bazbeans_ctl::CtlError::CoordinatorUnreachable(config.redis_url.expose_secret().clone())
            })?,
    );
    let controller = OperatorController::new(client, config.clone());
    let default_dc = cli.data_center.clone();

    match cli.command {
        Commands::ListNodes { format } => {
            let all = controller.all_nodes().await?;
            let active: std::collections::HashSet<NodeId> = controller.active_nodes().await?.into_iter().collect();

            let mut rows = Vec::with_capacity(all.len());
            for node_id in &all {
                let status = controller.merged_status(node_id).await?;
                rows.push((node_id.clone(), active.contains(node_id), status));
            }

            match format {
                OutputFormat::Human => {
                    let table_rows = rows
                        .iter()
                        .map(|(id, is_active, status)| output::NodeRow::new(id, *is_active, status))
                        .collect();
                    output::print_table(table_rows);
                }
                OutputFormat::Json => output::print_nodes_json(&rows),
            }
        }
        Commands::Freeze { node_id, reason } => {
            let node_id = NodeId::from(node_id);
            controller
                .send_command(&node_id, &command_with("freeze", &[("reason", reason.into())]))
                .await?;
            println!("Freeze command sent to {node_id}");
        }
        Commands::Unfreeze { node_id } => {
            let node_id = NodeId::from(node_id);
            controller.send_command(&node_id, &command("unfreeze")).await?;
            println!("Unfreeze command sent to {node_id}");
        }
        Commands::Start { node_id } => {
            let node_id = NodeId::from(node_id);
            controller.send_command(&node_id, &command("start")).await?;
            println!("Start command sent to {node_id}");
        }
        Commands::Stop { node_id } => {
            let node_id = NodeId::from(node_id);
            controller.send_command(&node_id, &command("stop")).await?;
            println!("Stop command sent to {node_id}");
        }
        Commands::Restart { node_id } => {
            let node_id = NodeId::from(node_id);
            controller.send_command(&node_id, &command("restart")).await?;
            println!("Restart command sent to {node_id}");
        }
        Commands::Update { dc } => {
            let filter_dc = dc.or(default_dc);
            controller.send_command_to_all(&command("update"), filter_dc.as_deref()).await?;
            match &filter_dc {
                Some(dc) => println!("Update command sent to nodes in datacenter '{dc}'"),
                None => println!("Update command sent to all nodes"),
            }
        }
        Commands::Exec { node_id, command: shell_command } => {
            let node_id = NodeId::from(node_id);
            controller
                .send_command(&node_id, &command_with("exec", &[("command", shell_command.clone().into())]))
                .await?;
            println!("Command sent to {node_id}: {shell_command}");
        }
        Commands::DeployFile { node_id, local_file, remote_path } => {
            let content = match std::fs::read_to_string(&local_file) {
                Ok(content) => content,
                Err(err) => {
                    println!("Error reading file: {err}");
                    return Ok(());
                }
            };
            let node_id = NodeId::from(node_id);
            controller
                .send_command(
                    &node_id,
                    &command_with("deploy_file", &[("path", remote_path.clone().into()), ("content", content.into())]),
                )
                .await?;
            println!("File deployment command sent to {node_id}: {remote_path}");
        }
        Commands::Status { node_id, format } => {
            let status = controller.merged_status(&NodeId::from(node_id.clone())).await?;
            match format {
                OutputFormat::Human => output::print_status_human(&node_id, &status),
                OutputFormat::Json => output::print_status_json(&node_id, &status),
            }
        }
        Commands::Cleanup => {
            let cleaned = controller.cleanup_dead_nodes().await?;
            if cleaned.is_empty() {
                println!("No dead nodes found");
            } else {
                println!("Cleaned up {} dead nodes:", cleaned.len());
                for node in cleaned {
                    println!("  - {node}");
                }
            }
        }
    }

    Ok(())
}
