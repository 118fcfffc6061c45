//! Command server
//!
//! Accepts TCP connections on the claimed port. Each connection carries one
//! exchange: the peer writes a command and half-closes, the node writes the
//! response and closes. Connections are handled on their own tasks, bounded
//! by a semaphore.

mod dispatch;
pub mod table;

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::node::Node;

/// Longest command line accepted
const MAX_COMMAND_BYTES: u64 = 64 * 1024;

/// How long shutdown waits for in-flight exchanges
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs the accept loop until `shutdown` is cancelled
pub async fn serve(node: Arc<Node>, listener: TcpListener, shutdown: CancellationToken) {
    let max_connections = node.config().max_connections;
    let semaphore = Arc::new(Semaphore::new(max_connections));
    let read_timeout = node.config().read_timeout;

    loop {
        let permit = tokio::select! {
            _ = shutdown.cancelled() => break,
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let (stream, addr) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            },
        };

        debug!("Connection from {}", addr);
        let node = node.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(&node, stream, read_timeout).await {
                debug!("Connection from {} ended with error: {}", addr, e);
            }
            drop(permit);
        });
    }

    drop(listener);
    info!("Command server stopped accepting connections");

    let in_flight = u32::try_from(max_connections).unwrap_or(u32::MAX);
    if tokio::time::timeout(DRAIN_TIMEOUT, semaphore.acquire_many(in_flight))
        .await
        .is_err()
    {
        warn!("Gave up waiting for in-flight commands");
    }
}

/// Reads one command, answers it and closes the connection
async fn handle_connection(
    node: &Node,
    stream: TcpStream,
    read_timeout: Duration,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader).take(MAX_COMMAND_BYTES);

    let mut raw = Vec::new();
    match tokio::time::timeout(read_timeout, reader.read_until(b'\n', &mut raw)).await {
        Ok(read) => {
            read?;
        }
        Err(_) => {
            debug!("Timed out waiting for a command");
            return Ok(());
        }
    }

    let line = String::from_utf8_lossy(&raw);
    let response = node.handle_command(&line).await;

    writer.write_all(response.as_bytes()).await?;
    writer.shutdown().await
}
