//! Log sinks
//!
//! The node writes a line to its sink whenever a command arrives or a
//! monitor trigger fires. Sinks never report failure back to the caller.

use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

/// Destination for node event lines
pub trait LogSink: Send + Sync {
    /// Write one event line
    fn write(&self, line: &str);
}

/// Sink that forwards every line to `tracing` at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn write(&self, line: &str) {
        info!(target: "shovel_node::events", "{}", line);
    }
}

/// Sink that keeps lines in memory
///
/// Handy for embedding a node and inspecting what it reported.
#[derive(Debug, Default, Clone)]
pub struct MemoryLogSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all lines written so far
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LogSink for MemoryLogSink {
    fn write(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_collects_lines() {
        let sink = MemoryLogSink::new();
        let shared: Arc<dyn LogSink> = Arc::new(sink.clone());
        shared.write("Received command: show clients");
        shared.write("second");
        assert_eq!(sink.lines(), vec!["Received command: show clients", "second"]);
    }
}
