//! Error types for the Shovel client

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to a node
#[derive(Debug, Error)]
pub enum ClientError {
    /// Nothing accepted the connection
    #[error("Unable to connect to port {port}: {source}")]
    Connect {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// The exchange did not finish within the configured timeout
    #[error("Timed out talking to port {port}")]
    Timeout { port: u16 },

    /// Reading or writing the socket failed mid-exchange
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Response was not in the expected shape
    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

impl ClientError {
    /// Check if this error means "nobody is listening there"
    ///
    /// Discovery logs these ports as silent; any other error means something
    /// answered that is not a node.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Timeout { .. })
    }
}
