//! Node composition root
//!
//! A [`Node`] owns the pipeline set, the scheduler, the peer directory and
//! the command server, and coordinates their startup and shutdown.

use anyhow::{Context, Result};
use shovel_core::domain::peer::PeerRecord;
use shovel_core::domain::task::TaskParams;
use shovel_core::domain::trigger::TriggerArgs;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::NodeConfig;
use crate::metrics::{MetricSource, SystemMetrics};
use crate::peers::{self, PeerDirectory};
use crate::pipeline::{Pipeline, PipelineError, PipelineRun, PipelineStore, TaskInput};
use crate::registry::FunctionRegistry;
use crate::scheduler::{ScheduleError, Scheduler};
use crate::server::{self, table};
use crate::sinks::{LogSink, TracingLogSink};

/// Builder for [`Node`]
pub struct NodeBuilder {
    config: NodeConfig,
    registry: FunctionRegistry,
    sink: Arc<dyn LogSink>,
    metrics: Option<Arc<dyn MetricSource>>,
}

impl NodeBuilder {
    pub fn registry(mut self, registry: FunctionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricSource>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Node {
        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(SystemMetrics::new()));
        let pipelines = PipelineStore::new();
        let scheduler = Scheduler::new(pipelines.clone(), metrics, self.sink.clone());
        let identity = PeerRecord::new(self.config.name.clone(), self.config.id, 0);

        Node {
            config: self.config,
            identity: Mutex::new(identity),
            pipelines,
            scheduler,
            directory: PeerDirectory::new(),
            registry: self.registry,
            sink: self.sink,
            shutdown: CancellationToken::new(),
        }
    }
}

/// One worker process
pub struct Node {
    config: NodeConfig,
    identity: Mutex<PeerRecord>,
    pipelines: PipelineStore,
    scheduler: Scheduler,
    directory: PeerDirectory,
    registry: FunctionRegistry,
    sink: Arc<dyn LogSink>,
    shutdown: CancellationToken,
}

impl Node {
    /// Starts a builder with the built-in functions, the `tracing` sink and
    /// `sysinfo` metrics
    pub fn builder(config: NodeConfig) -> NodeBuilder {
        NodeBuilder {
            config,
            registry: FunctionRegistry::with_builtins(),
            sink: Arc::new(TracingLogSink),
            metrics: None,
        }
    }

    pub fn new(config: NodeConfig) -> Self {
        Self::builder(config).build()
    }

    fn identity(&self) -> MutexGuard<'_, PeerRecord> {
        self.identity.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current display name (suffixed after a discovery collision)
    pub fn name(&self) -> String {
        self.identity().name.clone()
    }

    /// Claimed port, or `None` before [`Node::start`]
    pub fn port(&self) -> Option<u16> {
        Some(self.identity().port).filter(|p| *p != 0)
    }

    pub fn record(&self) -> PeerRecord {
        self.identity().clone()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    pub fn pipelines(&self) -> &PipelineStore {
        &self.pipelines
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub(crate) fn log(&self, line: &str) {
        self.sink.write(line);
    }

    pub fn add_pipeline(&self, pipeline: Pipeline) -> Result<(), PipelineError> {
        self.pipelines.insert(pipeline)
    }

    pub fn create_pipeline(&self, name: &str) -> Result<(), PipelineError> {
        self.add_pipeline(Pipeline::new(name))
    }

    /// Drops the pipeline and cancels its schedules
    pub fn remove_pipeline(&self, name: &str) -> Result<(), PipelineError> {
        self.scheduler
            .remove_pipeline(name)
            .ok_or_else(|| PipelineError::NotFound(name.to_string()))?;
        info!("Removed pipeline '{}'", name);
        Ok(())
    }

    pub fn add_task(&self, pipeline: &str, input: TaskInput) -> Result<(), PipelineError> {
        self.pipelines.update(pipeline, |p| p.add_task(input))
    }

    pub fn schedule_pipeline(
        &self,
        pipeline: &str,
        trigger_type: &str,
        args: TriggerArgs,
    ) -> Result<Uuid, ScheduleError> {
        self.scheduler.schedule(pipeline, trigger_type, args)
    }

    /// Cancels every schedule of `pipeline`
    pub fn unschedule_pipeline(&self, pipeline: &str) -> Result<usize, PipelineError> {
        if !self.pipelines.contains(pipeline) {
            return Err(PipelineError::NotFound(pipeline.to_string()));
        }
        Ok(self.scheduler.unschedule(pipeline))
    }

    /// Runs the current snapshot of `name` to completion
    pub async fn run_pipeline(
        &self,
        name: &str,
        params: &[TaskParams],
    ) -> Result<PipelineRun, PipelineError> {
        let pipeline = self
            .pipelines
            .get(name)
            .ok_or_else(|| PipelineError::NotFound(name.to_string()))?;
        Ok(pipeline.execute(params).await)
    }

    /// Markdown table of pipelines and their schedules
    pub fn show_pipelines(&self) -> String {
        table::pipelines_table(&self.pipelines.names(), &self.scheduler.all())
    }

    /// Claims a port, starts the command server and arms the scheduler
    ///
    /// Returns the handle of the server task.
    pub async fn start(self: &Arc<Self>) -> Result<JoinHandle<()>> {
        self.config.validate().context("Invalid node configuration")?;
        info!("Looking for an open port, this may take a moment...");

        let claim = peers::discover(&self.config, &self.directory)
            .await
            .context("Failed to claim a port")?;
        *self.identity() = claim.record.clone();

        let server = tokio::spawn(server::serve(
            self.clone(),
            claim.listener,
            self.shutdown.clone(),
        ));
        self.scheduler.start();

        info!(
            "Node {} listening on {}:{}",
            claim.record.name, self.config.host, claim.record.port
        );
        Ok(server)
    }

    /// Starts the node and waits for `shutdown` or Ctrl+C
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let server = self.start().await?;

        tokio::select! {
            _ = self.shutdown.cancelled() => {
                info!("Shutdown requested");
            }
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => info!("Received Ctrl+C, shutting down node..."),
                    Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
                }
            }
        }

        self.stop();
        if let Err(e) = server.await {
            warn!("Command server task failed: {}", e);
        }
        info!("Node {} has been stopped.", self.name());
        Ok(())
    }

    /// Cancels every schedule and closes the listener
    pub fn stop(&self) {
        self.shutdown.cancel();
        self.scheduler.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
