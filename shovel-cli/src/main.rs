//! Shovel CLI
//!
//! Command-line interface for talking to running Shovel nodes.

mod commands;
mod config;
mod resolver;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "shovel")]
#[command(about = "Talk to Shovel pipeline nodes", long_about = None)]
struct Cli {
    /// Host the nodes listen on
    #[arg(long, env = "SHOVEL_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Base of the discovery port range
    #[arg(long, env = "SHOVEL_BASE_PORT", default_value_t = 5000)]
    base_port: u16,

    /// Number of ports probed after the base port
    #[arg(long, env = "SHOVEL_PROBE_SPAN", default_value_t = 101)]
    probe_span: u16,

    /// Timeout for each probe, in milliseconds
    #[arg(long, env = "SHOVEL_DISCOVERY_TIMEOUT_MS", default_value_t = 500)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        host: cli.host,
        base_port: cli.base_port,
        probe_span: cli.probe_span,
        probe_timeout: Duration::from_millis(cli.timeout_ms),
    };

    handle_command(cli.command, &config).await
}
