use clap::{Parser, Subcommand, ValueEnum};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "bazbeans-ctl", version, about = "BazBeans cluster control CLI")]
pub struct Cli {
    /// Redis connection URL
    #[arg(long, env = "BAZBEANS_REDIS_URL", default_value = "redis://localhost:6379/0")]
    pub redis_url: String,

    /// Default datacenter filter for commands that support one
    #[arg(long)]
    pub data_center: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List all nodes with status
    ListNodes {
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
    /// Freeze a node (remove from load balancer)
    Freeze {
        node_id: String,
        #[arg(long, default_value = "Administrative freeze")]
        reason: String,
    },
    /// Unfreeze a node
    Unfreeze { node_id: String },
    /// Start services on node
    Start { node_id: String },
    /// Stop services on node
    Stop { node_id: String },
    /// Restart services on node
    Restart { node_id: String },
    /// Update application on nodes (rolling update)
    Update {
        #[arg(long)]
        dc: Option<String>,
    },
    /// Execute shell command on node
    Exec { node_id: String, command: String },
    /// Deploy file to node
    DeployFile {
        node_id: String,
        local_file: String,
        remote_path: String,
    },
    /// Get detailed status of a node
    Status {
        node_id: String,
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
    /// Clean up dead nodes from active set
    Cleanup,
}
