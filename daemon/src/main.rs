//! Ballot daemon: entry point for running one ballot network node.

use std::path::PathBuf;

use anyhow::Context;
use ballot_node::{init_logging, LogFormat, Node, NodeConfig};
use ballot_types::NodeId;
use clap::Parser;

#[derive(Parser)]
#[command(name = "ballot-daemon", about = "Ballot network node daemon")]
struct Cli {
    /// Host this node listens on and advertises to peers.
    #[arg(long, env = "BALLOT_HOST")]
    host: Option<String>,

    /// Listening port (0 picks an ephemeral port).
    #[arg(long, env = "BALLOT_PORT")]
    port: Option<u16>,

    /// Override the identity derived from the node key.
    #[arg(long, env = "BALLOT_NODE_ID")]
    node_id: Option<String>,

    /// Create a new network with this node as lead validator.
    #[arg(long, env = "BALLOT_BOOTSTRAP")]
    bootstrap: bool,

    /// Peer to join through, as "host:port".
    #[arg(long, env = "BALLOT_PEER")]
    peer: Option<String>,

    /// Maximum number of peer connections.
    #[arg(long, env = "BALLOT_MAX_CONNECTIONS")]
    max_connections: Option<usize>,

    /// Lead validator block period in milliseconds.
    #[arg(long, env = "BALLOT_BLOCK_PERIOD_MS")]
    block_period_ms: Option<u64>,

    /// Head age in milliseconds after which validators elect a new lead.
    #[arg(long, env = "BALLOT_BLOCK_TIMEOUT_MS")]
    block_timeout_ms: Option<u64>,

    /// Hex X25519 secret shared by the members of the network.
    #[arg(long, env = "BALLOT_NETWORK_KEY", hide_env_values = true)]
    network_key: Option<String>,

    /// Elector credentials file (JSON `{public_key, private_key}`).
    #[arg(long, env = "BALLOT_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// Electors batch file registered by a bootstrap node.
    #[arg(long, env = "BALLOT_ELECTORS")]
    electors: Option<PathBuf>,

    /// Log output: "human" or "json".
    #[arg(long, env = "BALLOT_LOG_FORMAT")]
    log_format: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "BALLOT_LOG_LEVEL")]
    log_level: Option<String>,

    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Subcommand.
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Node operations.
    #[command(name = "node")]
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
}

#[derive(clap::Subcommand)]
enum NodeAction {
    /// Run the node until SIGINT or SIGTERM.
    Run,
}

impl Cli {
    /// Layer CLI flags and env vars over `base`.
    fn apply(&self, base: NodeConfig) -> NodeConfig {
        NodeConfig {
            host: self.host.clone().unwrap_or(base.host),
            port: self.port.unwrap_or(base.port),
            node_id: self.node_id.clone().map(NodeId::new).or(base.node_id),
            bootstrap: self.bootstrap || base.bootstrap,
            initial_peer: self.peer.clone().or(base.initial_peer),
            max_connections: self.max_connections.unwrap_or(base.max_connections),
            block_period_ms: self.block_period_ms.unwrap_or(base.block_period_ms),
            block_timeout_ms: self.block_timeout_ms.unwrap_or(base.block_timeout_ms),
            network_key: self.network_key.clone().or(base.network_key),
            credentials_path: self.credentials.clone().or(base.credentials_path),
            electors_path: self.electors.clone().or(base.electors_path),
            log_format: self.log_format.clone().unwrap_or(base.log_format),
            log_level: self.log_level.clone().unwrap_or(base.log_level),
            ..base
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let base = match &cli.config {
        Some(path) => NodeConfig::from_toml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => NodeConfig::default(),
    };
    let config = cli.apply(base);

    let format: LogFormat = config.log_format.parse()?;
    init_logging(format, &config.log_level)?;
    if let Some(path) = &cli.config {
        tracing::info!(path = %path.display(), "loaded config");
    }

    match cli.command {
        Command::Node { action } => match action {
            NodeAction::Run => {
                tracing::info!(
                    host = %config.host,
                    port = config.port,
                    bootstrap = config.bootstrap,
                    peer = config.initial_peer.as_deref().unwrap_or("none"),
                    "starting ballot node"
                );
                let node = Node::new(config)?;
                node.start().await?;

                node.wait_for_signal().await;
                tracing::info!("shutdown signal received, stopping node");
                node.stop().await?;

                tracing::info!("ballot daemon exited cleanly");
            }
        },
    }

    Ok(())
}
