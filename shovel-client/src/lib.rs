//! Shovel TCP Client
//!
//! A small async client for the plaintext command protocol spoken by Shovel
//! nodes. It is used by nodes themselves (discovery probes and `welcome`
//! announcements) and by the `shovel` CLI.
//!
//! Each call opens one connection, writes one command terminated by a
//! newline, half-closes the write side and reads the response until the node
//! closes the connection.
//!
//! # Example
//!
//! ```no_run
//! use shovel_client::NodeClient;
//!
//! # async fn example() -> shovel_client::Result<()> {
//! let client = NodeClient::new("127.0.0.1");
//! let peers = client.list_clients(5001).await?;
//! println!("{} peer(s) known to port 5001", peers.len());
//! # Ok(())
//! # }
//! ```

pub mod error;

pub use error::{ClientError, Result};

use shovel_core::domain::peer::PeerRecord;
use shovel_core::protocol::Command;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Upper bound on a single response body
const MAX_RESPONSE_BYTES: u64 = 16 * 1024 * 1024;

/// Client for the node command protocol
#[derive(Debug, Clone)]
pub struct NodeClient {
    /// Host every node listens on (e.g. "127.0.0.1")
    host: String,
    /// Bound on one whole exchange: connect, write and read
    timeout: Duration,
}

impl NodeClient {
    /// Create a client with a 5 second exchange timeout
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            timeout: Duration::from_secs(5),
        }
    }

    /// Replace the exchange timeout
    ///
    /// Discovery uses a short timeout so probing a silent port stays cheap.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send a raw command line and return the response text
    pub async fn send(&self, port: u16, command: &str) -> Result<String> {
        match tokio::time::timeout(self.timeout, self.exchange(port, command)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout { port }),
        }
    }

    /// Send a parsed command in its wire form
    pub async fn send_command(&self, port: u16, command: &Command) -> Result<String> {
        self.send(port, &command.to_string()).await
    }

    /// Ask a node for its peer directory (`show clients`)
    pub async fn list_clients(&self, port: u16) -> Result<Vec<PeerRecord>> {
        let response = self.send_command(port, &Command::ShowClients).await?;
        serde_json::from_str(&response).map_err(|e| {
            ClientError::ParseError(format!("expected a JSON list of peers: {}", e))
        })
    }

    /// Announce a record to a node (`welcome <json>`)
    pub async fn welcome(&self, port: u16, record: &PeerRecord) -> Result<String> {
        self.send_command(port, &Command::Welcome(record.clone()))
            .await
    }

    /// Probe every port in `ports` and merge the directories that answer
    ///
    /// Ports that do not answer, or answer with something other than a peer
    /// list, are skipped.
    pub async fn scan(&self, ports: impl IntoIterator<Item = u16>) -> Vec<PeerRecord> {
        let mut merged: BTreeMap<String, PeerRecord> = BTreeMap::new();

        for port in ports {
            match self.list_clients(port).await {
                Ok(records) => {
                    debug!("Port {} answered with {} peer(s)", port, records.len());
                    for record in records {
                        merged.insert(record.name.clone(), record);
                    }
                }
                Err(e) => debug!("Port {} skipped: {}", port, e),
            }
        }

        let mut peers: Vec<PeerRecord> = merged.into_values().collect();
        peers.sort_by_key(|p| p.port);
        peers
    }

    async fn exchange(&self, port: u16, command: &str) -> Result<String> {
        let mut stream = TcpStream::connect((self.host.as_str(), port))
            .await
            .map_err(|source| ClientError::Connect { port, source })?;

        stream.write_all(command.trim().as_bytes()).await?;
        stream.write_all(b"\n").await?;
        stream.shutdown().await?;

        let mut buf = Vec::new();
        (&mut stream)
            .take(MAX_RESPONSE_BYTES)
            .read_to_end(&mut buf)
            .await?;

        String::from_utf8(buf)
            .map_err(|e| ClientError::ParseError(format!("response is not UTF-8: {}", e)))
    }
}
