//! `shovel send <client> <command...>`

use anyhow::{Context, Result};
use colored::*;
use shovel_client::NodeClient;
use shovel_core::protocol::Command;

use crate::config::Config;
use crate::resolver::resolve_node;

/// Resolve the node, send `command` and print the reply
pub async fn send_command(config: &Config, target: &str, command: &str) -> Result<()> {
    if let Err(e) = Command::parse(command) {
        eprintln!("{} {}", "warning:".yellow().bold(), e);
    }

    let peers = if target.parse::<u16>().is_ok() {
        Vec::new()
    } else {
        config.probe_client().scan(config.candidate_ports()).await
    };
    let node = resolve_node(&peers, target)?;

    let response = NodeClient::new(config.host.clone())
        .send(node.port, command)
        .await
        .with_context(|| format!("Failed to reach {} on port {}", node.name, node.port))?;

    println!("{}", format!("{} ({}):", node.name, node.port).bold());
    println!("{}", response);
    Ok(())
}
