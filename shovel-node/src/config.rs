//! Node configuration
//!
//! Defines all configurable parameters for a node: its display identity,
//! the port range scanned during discovery, and limits on the command
//! server.

use std::time::Duration;

/// Well-known base of the discovery range; the first candidate is `base + 1`
pub const DEFAULT_BASE_PORT: u16 = 5000;

/// Number of candidate ports probed after the base port
pub const DEFAULT_PROBE_SPAN: u16 = 101;

/// Node configuration
///
/// Timeouts are configurable so tests can run whole meshes on a private
/// port range with short probes.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Display name requested for this node (may gain a `-<port>` suffix)
    pub name: String,

    /// Numeric identity reported in the peer directory
    pub id: u64,

    /// Host the node binds and probes (e.g., "127.0.0.1")
    pub host: String,

    /// Discovery probes `base_port + 1 ..= base_port + probe_span`
    pub base_port: u16,

    /// How many candidate ports discovery may probe
    pub probe_span: u16,

    /// Bound on one discovery probe or announcement
    pub discovery_timeout: Duration,

    /// Maximum number of connections handled concurrently
    pub max_connections: usize,

    /// How long a connection may take to deliver its command
    pub read_timeout: Duration,
}

impl NodeConfig {
    /// Creates a new configuration with defaults
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: 0,
            host: "127.0.0.1".to_string(),
            base_port: DEFAULT_BASE_PORT,
            probe_span: DEFAULT_PROBE_SPAN,
            discovery_timeout: Duration::from_millis(500),
            max_connections: 32,
            read_timeout: Duration::from_secs(10),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Every variable is optional and falls back to the defaults:
    /// - SHOVEL_NAME (default: SmallShovelClient)
    /// - SHOVEL_ID (default: 0)
    /// - SHOVEL_HOST (default: 127.0.0.1)
    /// - SHOVEL_BASE_PORT (default: 5000)
    /// - SHOVEL_PROBE_SPAN (default: 101)
    /// - SHOVEL_DISCOVERY_TIMEOUT_MS (default: 500)
    /// - SHOVEL_MAX_CONNECTIONS (default: 32)
    ///
    /// A variable that is set but does not parse is an error.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("SHOVEL_NAME") {
            config.name = name;
        }
        if let Some(id) = env_parse::<u64>("SHOVEL_ID")? {
            config.id = id;
        }
        if let Ok(host) = std::env::var("SHOVEL_HOST") {
            config.host = host;
        }
        if let Some(port) = env_parse::<u16>("SHOVEL_BASE_PORT")? {
            config.base_port = port;
        }
        if let Some(span) = env_parse::<u16>("SHOVEL_PROBE_SPAN")? {
            config.probe_span = span;
        }
        if let Some(ms) = env_parse::<u64>("SHOVEL_DISCOVERY_TIMEOUT_MS")? {
            config.discovery_timeout = Duration::from_millis(ms);
        }
        if let Some(max) = env_parse::<usize>("SHOVEL_MAX_CONNECTIONS")? {
            config.max_connections = max;
        }

        Ok(config)
    }

    /// Restricts discovery to a different port range
    pub fn with_port_range(mut self, base_port: u16, probe_span: u16) -> Self {
        self.base_port = base_port;
        self.probe_span = probe_span;
        self
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Ports discovery walks, in order
    pub fn candidate_ports(&self) -> std::ops::RangeInclusive<u16> {
        let first = self.base_port.saturating_add(1);
        let last = self.base_port.saturating_add(self.probe_span);
        first..=last
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("name cannot be empty");
        }

        if self.name.chars().any(char::is_whitespace) {
            anyhow::bail!("name cannot contain whitespace: '{}'", self.name);
        }

        if self.host.is_empty() {
            anyhow::bail!("host cannot be empty");
        }

        if self.probe_span == 0 {
            anyhow::bail!("probe_span must be greater than 0");
        }

        if u32::from(self.base_port) + u32::from(self.probe_span) > u32::from(u16::MAX) {
            anyhow::bail!(
                "port range {}+{} exceeds {}",
                self.base_port,
                self.probe_span,
                u16::MAX
            );
        }

        if self.discovery_timeout.is_zero() {
            anyhow::bail!("discovery_timeout must be greater than 0");
        }

        if self.max_connections == 0 {
            anyhow::bail!("max_connections must be greater than 0");
        }

        Ok(())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::new("SmallShovelClient")
    }
}

fn env_parse<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e)),
        Err(_) => Ok(None),
    }
}
