//! relay-hub: WebSocket chat relay server.
//!
//! Serves the chat page on `/` and relays every message received on `/ws`
//! to every connected client.

use anyhow::Result;
use clap::Parser;
use relay_hub::config::RelayConfig;
use relay_hub::server::ServerBuilder;
use tracing_subscriber::EnvFilter;

/// relay-hub: WebSocket chat relay
#[derive(Parser, Debug)]
#[command(name = "relay-hub", version, about = "WebSocket chat relay")]
struct Cli {
    /// HTTP service address (host:port, or :port for every interface)
    #[arg(long)]
    addr: Option<String>,

    /// YAML config file
    #[arg(long)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => RelayConfig::from_yaml_file(path)?,
        None => RelayConfig::default(),
    };
    if let Some(addr) = cli.addr {
        config = config.with_listen_addr(addr);
    }

    if let Err(e) = ServerBuilder::new().with_config(config).serve().await {
        tracing::error!(error = %e, "Error during server run");
        return Err(e);
    }
    Ok(())
}
