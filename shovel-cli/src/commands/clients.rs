//! `shovel clients`

use anyhow::Result;
use colored::*;
use shovel_core::domain::peer::PeerRecord;

use crate::config::Config;

/// Scan the range and print the merged directory
pub async fn list_clients(config: &Config) -> Result<()> {
    let range = config.candidate_ports();
    let peers = config.probe_client().scan(range.clone()).await;

    if peers.is_empty() {
        println!(
            "{}",
            format!(
                "No clients found on {} ports {}-{}.",
                config.host,
                range.start(),
                range.end()
            )
            .yellow()
        );
        return Ok(());
    }

    println!(
        "{}",
        format!("Found {} client(s):", peers.len()).bold()
    );
    println!();
    for peer in &peers {
        print_peer(peer);
    }

    Ok(())
}

fn print_peer(peer: &PeerRecord) {
    println!(
        "  {} {} {}",
        "▸".cyan(),
        peer.name.bold(),
        format!("(id {})", peer.id).dimmed()
    );
    println!("    Port:  {}", peer.port.to_string().green());
}
