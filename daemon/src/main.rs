//! Push daemon — entry point for running a validator node.

use clap::Parser;
use std::path::PathBuf;

use push_node::{NodeConfig, ValidatorNode};

#[derive(Parser)]
#[command(name = "push-daemon", about = "Push validator node daemon")]
struct Cli {
    /// Path to a TOML configuration file. If provided, file settings are
    /// used as the base; CLI flags and env vars override them.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Hex-encoded 32-byte node key seed.
    #[arg(long, env = "PUSH_KEY_SEED")]
    key_seed: Option<String>,

    /// WebSocket server port.
    #[arg(long, env = "PUSH_WS_PORT")]
    websocket_port: Option<u16>,

    /// Block batch buffer delay in milliseconds.
    #[arg(long, env = "PUSH_BATCH_DELAY_MS")]
    batch_delay_ms: Option<u64>,

    /// Number of attestors per block.
    #[arg(long, env = "PUSH_ATTESTOR_COUNT")]
    attestor_count: Option<usize>,

    /// Minimum healthy archival nodes before the block feed activates.
    #[arg(long, env = "PUSH_MIN_ARCHIVE_NODES")]
    min_archive_nodes: Option<usize>,

    /// Discovery refresh interval in seconds.
    #[arg(long, env = "PUSH_DISCOVERY_REFRESH_SECS")]
    discovery_refresh_secs: Option<u64>,

    /// Per-call peer RPC timeout in milliseconds.
    #[arg(long, env = "PUSH_RPC_TIMEOUT_MS")]
    rpc_timeout_ms: Option<u64>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, default_value = "info", env = "PUSH_LOG_LEVEL")]
    log_level: String,

    /// Subcommand.
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Start the node.
    #[command(name = "node")]
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
}

#[derive(clap::Subcommand)]
enum NodeAction {
    /// Run the node.
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    push_utils::init_tracing();

    let cli = Cli::parse();

    let file_config: Option<NodeConfig> = if let Some(ref config_path) = cli.config {
        match std::fs::read_to_string(config_path) {
            Ok(contents) => match toml::from_str::<NodeConfig>(&contents) {
                Ok(cfg) => {
                    tracing::info!("Loaded config from {}", config_path.display());
                    Some(cfg)
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config file: {e}, using defaults");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {e}, using defaults",
                    config_path.display()
                );
                None
            }
        }
    } else {
        None
    };

    let base = file_config.unwrap_or_default();
    let config = NodeConfig {
        key_seed_hex: cli.key_seed.or(base.key_seed_hex),
        websocket_port: cli.websocket_port.unwrap_or(base.websocket_port),
        batch_delay_ms: cli.batch_delay_ms.unwrap_or(base.batch_delay_ms),
        attestor_count: cli.attestor_count.unwrap_or(base.attestor_count),
        min_archive_nodes: cli.min_archive_nodes.unwrap_or(base.min_archive_nodes),
        discovery_refresh_secs: cli
            .discovery_refresh_secs
            .unwrap_or(base.discovery_refresh_secs),
        rpc_timeout_ms: cli.rpc_timeout_ms.unwrap_or(base.rpc_timeout_ms),
        log_level: cli.log_level,
        ..base
    };

    match cli.command {
        Command::Node { action } => match action {
            NodeAction::Run => {
                tracing::info!(
                    "Starting Push validator node (WS:{}, attestors:{}, min archival:{})",
                    config.websocket_port,
                    config.attestor_count,
                    config.min_archive_nodes,
                );

                let mut node = ValidatorNode::new(config)?;
                node.start()?;

                node.wait_for_signal().await;
                tracing::info!("Shutdown signal received — stopping node");
                node.stop().await?;

                tracing::info!("Push daemon exited cleanly");
            }
        },
    }

    Ok(())
}
