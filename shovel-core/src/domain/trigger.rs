//! Trigger domain types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Raw keyword arguments of a trigger, as typed on the command line or
/// stored in the configuration document.
pub type TriggerArgs = BTreeMap<String, Value>;

/// Firing policy of a schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Cron,
    Interval,
    Monitor,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Cron => "cron",
            TriggerKind::Interval => "interval",
            TriggerKind::Monitor => "monitor",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cron" => Ok(TriggerKind::Cron),
            "interval" => Ok(TriggerKind::Interval),
            "monitor" => Ok(TriggerKind::Monitor),
            other => Err(format!(
                "unsupported trigger type '{}', use 'cron', 'interval' or 'monitor'",
                other
            )),
        }
    }
}

/// System metric sampled by a monitor trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cpu,
    Memory,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Cpu => f.write_str("cpu"),
            Metric::Memory => f.write_str("memory"),
        }
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Metric::Cpu),
            "memory" | "mem" => Ok(Metric::Memory),
            other => Err(format!("unsupported metric '{}'", other)),
        }
    }
}

/// Renders a trigger argument value the way it is typed on the command line
/// (`hour=1`, not `hour="1"`).
pub fn arg_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Renders trigger args as `k=v` pairs in key order
pub fn format_args(args: &TriggerArgs) -> Vec<String> {
    args.iter()
        .map(|(key, value)| format!("{}={}", key, arg_to_string(value)))
        .collect()
}
