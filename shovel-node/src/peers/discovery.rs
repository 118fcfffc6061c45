//! Port claiming and peer discovery
//!
//! Walks the candidate ports in order. Ports answering `show clients` with
//! a peer list belong to running nodes and contribute their directories;
//! the first port that does not answer and can be bound is claimed.

use anyhow::{Result, bail};
use shovel_client::NodeClient;
use shovel_core::domain::peer::PeerRecord;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::PeerDirectory;
use crate::config::NodeConfig;

/// Outcome of a successful discovery
#[derive(Debug)]
pub struct Claim {
    /// Listener bound to the claimed port
    pub listener: TcpListener,
    /// This node's record, with the final (possibly suffixed) name
    pub record: PeerRecord,
}

/// Claims a port, fills `directory` and announces this node to its peers
pub async fn discover(config: &NodeConfig, directory: &PeerDirectory) -> Result<Claim> {
    let client = NodeClient::new(config.host.clone()).with_timeout(config.discovery_timeout);

    let mut claimed = None;
    for port in config.candidate_ports() {
        match client.list_clients(port).await {
            Ok(records) => {
                debug!("Port {} is taken by a node knowing {} peer(s)", port, records.len());
                directory.merge(records);
                continue;
            }
            Err(e) if e.is_unreachable() => debug!("Port {} is silent: {}", port, e),
            Err(e) => debug!("Port {} answered without a peer list: {}", port, e),
        }

        match TcpListener::bind((config.host.as_str(), port)).await {
            Ok(listener) => {
                claimed = Some((port, listener));
                break;
            }
            Err(e) => debug!("Port {} is not bindable: {}", port, e),
        }
    }

    let Some((port, listener)) = claimed else {
        let range = config.candidate_ports();
        bail!(
            "No free port between {} and {} on {}",
            range.start(),
            range.end(),
            config.host
        );
    };

    let name = if directory.contains(&config.name) {
        let renamed = format!("{}-{}", config.name, port);
        warn!("Name '{}' is already taken, using '{}'", config.name, renamed);
        renamed
    } else {
        config.name.clone()
    };

    let record = PeerRecord::new(name, config.id, port);
    directory.insert(record.clone());
    info!("Claimed port {} as '{}'", port, record.name);

    announce(&client, directory, &record).await;

    Ok(Claim { listener, record })
}

/// Sends `welcome` to every other known peer; failures are only logged
async fn announce(client: &NodeClient, directory: &PeerDirectory, record: &PeerRecord) {
    for peer in directory.records() {
        if peer.name == record.name {
            continue;
        }
        match client.welcome(peer.port, record).await {
            Ok(reply) => debug!("{} replied: {}", peer.name, reply.trim()),
            Err(e) => debug!("Could not announce to {} on port {}: {}", peer.name, peer.port, e),
        }
    }
}
