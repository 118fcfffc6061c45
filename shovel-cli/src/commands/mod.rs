//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod clients;
mod send;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Probe the port range and list every node found
    Clients,
    /// Send one command to a node and print its reply
    Send {
        /// Node name, unambiguous name prefix, or port
        client: String,
        /// Command words, e.g. `show pipelines`
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Clients => clients::list_clients(config).await,
        Commands::Send { client, command } => {
            send::send_command(config, &client, &command.join(" ")).await
        }
    }
}
