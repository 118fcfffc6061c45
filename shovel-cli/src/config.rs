//! Configuration module
//!
//! Where the CLI looks for nodes and how long it waits for each one.

use shovel_client::NodeClient;
use std::ops::RangeInclusive;
use std::time::Duration;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Host every node listens on
    pub host: String,
    /// Probing starts at `base_port + 1`
    pub base_port: u16,
    /// How many ports after the base are probed
    pub probe_span: u16,
    /// Bound on one probe
    pub probe_timeout: Duration,
}

impl Config {
    pub fn candidate_ports(&self) -> RangeInclusive<u16> {
        self.base_port.saturating_add(1)..=self.base_port.saturating_add(self.probe_span)
    }

    /// Client used for probing the range
    pub fn probe_client(&self) -> NodeClient {
        NodeClient::new(self.host.clone()).with_timeout(self.probe_timeout)
    }
}
