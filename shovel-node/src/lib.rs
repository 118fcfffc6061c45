//! Shovel Node
//!
//! A worker process that owns a set of schedulable pipelines, discovers its
//! peers on the local host and answers plaintext commands over TCP.
//!
//! Architecture:
//! - Pipelines: ordered tasks with back-reference parameter passing
//! - Scheduler: cron, interval and sustained-metric triggers
//! - Peers: port claiming, discovery and `welcome` announcements
//! - Server: one command per connection, dispatched by [`node::Node`]
//! - Persistence: JSON snapshot of pipelines and schedules

pub mod config;
pub mod metrics;
pub mod node;
pub mod peers;
pub mod persistence;
pub mod pipeline;
pub mod registry;
pub mod scheduler;
pub mod server;
pub mod sinks;

pub use config::NodeConfig;
pub use node::{Node, NodeBuilder};
pub use persistence::ConfigError;
pub use pipeline::{Pipeline, PipelineError, PipelineRun, TaskInput, TaskResult};
pub use registry::FunctionRegistry;
pub use scheduler::{ScheduleError, ScheduleInfo, Scheduler};
