//! Schedules and their background tasks
//!
//! Every schedule owns a cancellation token. Timer and monitor loops watch
//! their token and exit within one cycle once it is cancelled; executions
//! they already spawned run to completion.
//!
//! Schedules can be registered before [`Scheduler::start`]; they are held
//! and armed when the scheduler starts.

mod monitor;
mod timer;
pub mod trigger;

pub use monitor::MonitorState;
pub use trigger::{MonitorSpec, Trigger};

use shovel_core::domain::trigger::{TriggerArgs, TriggerKind, format_args};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::metrics::MetricSource;
use crate::pipeline::{Pipeline, PipelineStore};
use crate::sinks::LogSink;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("No pipeline with name {0}")]
    PipelineNotFound(String),

    #[error("{0}")]
    UnsupportedTrigger(String),

    #[error("{0} trigger needs at least one argument")]
    MissingArguments(TriggerKind),

    #[error("unknown {trigger} argument '{key}'")]
    UnknownArgument { trigger: TriggerKind, key: String },

    #[error("invalid value for '{key}': {reason}")]
    InvalidArgument { key: String, reason: String },

    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },
}

impl ScheduleError {
    pub(crate) fn invalid(key: &str, reason: &str) -> Self {
        ScheduleError::InvalidArgument {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Read-only view of a registered schedule
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleInfo {
    pub id: Uuid,
    pub pipeline: String,
    pub trigger_type: TriggerKind,
    pub trigger_args: TriggerArgs,
}

impl ScheduleInfo {
    /// `k=v` pairs as shown in `show pipelines`
    pub fn parameters(&self) -> String {
        format_args(&self.trigger_args).join(", ")
    }
}

/// What a firing needs: the pipeline to look up and where to report
#[derive(Clone)]
pub(crate) struct FireContext {
    pub(crate) pipeline: String,
    store: PipelineStore,
    sink: Arc<dyn LogSink>,
}

impl FireContext {
    pub(crate) fn log(&self, line: &str) {
        self.sink.write(line);
    }

    /// Spawns one execution of the current snapshot
    ///
    /// Returns `false` once the pipeline no longer exists.
    pub(crate) fn fire(&self) -> bool {
        let Some(pipeline) = self.store.get(&self.pipeline) else {
            debug!("Pipeline '{}' is gone, stopping its trigger", self.pipeline);
            return false;
        };
        tokio::spawn(async move {
            pipeline.execute(&[]).await;
        });
        true
    }
}

struct ScheduleEntry {
    id: Uuid,
    kind: TriggerKind,
    args: TriggerArgs,
    trigger: Trigger,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct SchedulerState {
    running: bool,
    entries: BTreeMap<String, Vec<ScheduleEntry>>,
}

/// Owns every schedule of a node
pub struct Scheduler {
    store: PipelineStore,
    metrics: Arc<dyn MetricSource>,
    sink: Arc<dyn LogSink>,
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    pub fn new(store: PipelineStore, metrics: Arc<dyn MetricSource>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            store,
            metrics,
            sink,
            state: Mutex::new(SchedulerState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a schedule for `pipeline`, arming it right away when the
    /// scheduler is running
    pub fn schedule(
        &self,
        pipeline: &str,
        trigger_type: &str,
        args: TriggerArgs,
    ) -> Result<Uuid, ScheduleError> {
        if !self.store.contains(pipeline) {
            return Err(ScheduleError::PipelineNotFound(pipeline.to_string()));
        }
        let kind: TriggerKind = trigger_type
            .parse()
            .map_err(ScheduleError::UnsupportedTrigger)?;
        let trigger = Trigger::from_args(kind, &args)?;

        let mut entry = ScheduleEntry {
            id: Uuid::new_v4(),
            kind,
            args,
            trigger,
            cancel: CancellationToken::new(),
            handle: None,
        };
        let id = entry.id;

        let mut state = self.lock();
        // Checked again under the state lock, which `remove_pipeline` holds too
        if !self.store.contains(pipeline) {
            return Err(ScheduleError::PipelineNotFound(pipeline.to_string()));
        }
        if state.running {
            self.arm(pipeline, &mut entry);
        }
        info!(
            "Scheduled '{}' with {} trigger [{}]",
            pipeline,
            kind,
            format_args(&entry.args).join(", ")
        );
        state
            .entries
            .entry(pipeline.to_string())
            .or_default()
            .push(entry);
        Ok(id)
    }

    /// Cancels and removes every schedule of `pipeline`
    pub fn unschedule(&self, pipeline: &str) -> usize {
        let removed = self.lock().entries.remove(pipeline).unwrap_or_default();
        cancel_all(pipeline, &removed)
    }

    /// Drops `pipeline` from the store together with its schedules
    ///
    /// Both happen under the state lock, so no schedule can be registered
    /// for the pipeline in between.
    pub fn remove_pipeline(&self, pipeline: &str) -> Option<Arc<Pipeline>> {
        let mut state = self.lock();
        let removed = self.store.remove(pipeline)?;
        let entries = state.entries.remove(pipeline).unwrap_or_default();
        drop(state);
        cancel_all(pipeline, &entries);
        Some(removed)
    }

    /// Cancels and removes a single schedule, leaving its siblings
    pub fn cancel(&self, id: Uuid) -> bool {
        let mut state = self.lock();
        let mut found = None;
        for (pipeline, entries) in state.entries.iter_mut() {
            if let Some(pos) = entries.iter().position(|e| e.id == id) {
                found = Some((pipeline.clone(), entries.remove(pos)));
                break;
            }
        }

        match found {
            Some((pipeline, entry)) => {
                entry.cancel.cancel();
                if state.entries.get(&pipeline).is_some_and(Vec::is_empty) {
                    state.entries.remove(&pipeline);
                }
                true
            }
            None => false,
        }
    }

    pub fn schedules_for(&self, pipeline: &str) -> Vec<ScheduleInfo> {
        self.lock()
            .entries
            .get(pipeline)
            .map(|entries| entries.iter().map(|e| info_of(pipeline, e)).collect())
            .unwrap_or_default()
    }

    /// Every schedule, grouped by pipeline name
    pub fn all(&self) -> Vec<ScheduleInfo> {
        self.lock()
            .entries
            .iter()
            .flat_map(|(pipeline, entries)| entries.iter().map(move |e| info_of(pipeline, e)))
            .collect()
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Arms every held schedule
    pub fn start(&self) {
        let mut state = self.lock();
        if state.running {
            return;
        }
        state.running = true;

        let mut armed = 0;
        for (pipeline, entries) in state.entries.iter_mut() {
            for entry in entries.iter_mut().filter(|e| e.handle.is_none()) {
                self.arm(pipeline, entry);
                armed += 1;
            }
        }
        info!("Scheduler started with {} schedule(s)", armed);
    }

    /// Cancels every running schedule
    ///
    /// Entries are kept so a later [`Scheduler::start`] re-arms them.
    pub fn stop(&self) {
        let mut state = self.lock();
        if !state.running {
            return;
        }
        state.running = false;

        for entry in state.entries.values_mut().flatten() {
            entry.cancel.cancel();
            entry.cancel = CancellationToken::new();
            entry.handle = None;
        }
        info!("Scheduler stopped");
    }

    /// Cancels and drops every schedule
    pub fn clear(&self) {
        let entries = std::mem::take(&mut self.lock().entries);
        for entry in entries.values().flatten() {
            entry.cancel.cancel();
        }
    }

    fn arm(&self, pipeline: &str, entry: &mut ScheduleEntry) {
        let context = FireContext {
            pipeline: pipeline.to_string(),
            store: self.store.clone(),
            sink: self.sink.clone(),
        };
        let cancel = entry.cancel.clone();

        let handle = match &entry.trigger {
            Trigger::Cron(schedule) => {
                tokio::spawn(timer::run_cron(schedule.clone(), context, cancel))
            }
            Trigger::Interval(period) => {
                tokio::spawn(timer::run_interval(*period, context, cancel))
            }
            Trigger::Monitor(spec) => tokio::spawn(monitor::run_monitor(
                spec.clone(),
                self.metrics.clone(),
                context,
                cancel,
            )),
        };
        entry.handle = Some(handle);
        debug!("Armed {} trigger {} for '{}'", entry.kind, entry.id, pipeline);
    }
}

fn cancel_all(pipeline: &str, entries: &[ScheduleEntry]) -> usize {
    for entry in entries {
        entry.cancel.cancel();
    }
    if !entries.is_empty() {
        info!("Unscheduled {} trigger(s) of '{}'", entries.len(), pipeline);
    }
    entries.len()
}

fn info_of(pipeline: &str, entry: &ScheduleEntry) -> ScheduleInfo {
    ScheduleInfo {
        id: entry.id,
        pipeline: pipeline.to_string(),
        trigger_type: entry.kind,
        trigger_args: entry.args.clone(),
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for entry in self.lock().entries.values().flatten() {
            entry.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Pipeline, TaskInput};
    use crate::registry::FunctionRegistry;
    use crate::sinks::MemoryLogSink;
    use serde_json::{Value, json};
    use shovel_core::domain::trigger::Metric;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    struct ConstantMetric(f64);

    impl MetricSource for ConstantMetric {
        fn sample(&self, _metric: Metric) -> anyhow::Result<f64> {
            Ok(self.0)
        }
    }

    /// Metric that follows a script keyed on elapsed time
    struct ScriptedMetric {
        start: Instant,
    }

    impl MetricSource for ScriptedMetric {
        fn sample(&self, _metric: Metric) -> anyhow::Result<f64> {
            let elapsed = self.start.elapsed().as_secs();
            Ok(match elapsed {
                0..40 => 95.0,
                40..60 => 50.0,
                60..100 => 95.0,
                _ => 50.0,
            })
        }
    }

    fn args(value: Value) -> TriggerArgs {
        serde_json::from_value(value).unwrap()
    }

    /// Store holding a one-task pipeline "P" that bumps the returned counter
    fn counting_store() -> (PipelineStore, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut registry = FunctionRegistry::new();
        let counter = runs.clone();
        registry.register_fn("count", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        });

        let mut pipeline = Pipeline::new("P");
        pipeline
            .add_task(TaskInput::new().function(&registry, "count", Default::default()).unwrap())
            .unwrap();
        let store = PipelineStore::new();
        store.insert(pipeline).unwrap();
        (store, runs)
    }

    fn scheduler(store: &PipelineStore, metrics: Arc<dyn MetricSource>) -> Scheduler {
        Scheduler::new(store.clone(), metrics, Arc::new(MemoryLogSink::new()))
    }

    #[tokio::test]
    async fn test_schedule_validates_pipeline_and_trigger() {
        let (store, _) = counting_store();
        let scheduler = scheduler(&store, Arc::new(ConstantMetric(0.0)));

        assert!(matches!(
            scheduler.schedule("missing", "interval", args(json!({"seconds": 1}))),
            Err(ScheduleError::PipelineNotFound(_))
        ));
        assert!(matches!(
            scheduler.schedule("P", "date", TriggerArgs::new()),
            Err(ScheduleError::UnsupportedTrigger(_))
        ));
        assert!(matches!(
            scheduler.schedule("P", "interval", args(json!({"seconds": 0}))),
            Err(ScheduleError::MissingArguments(TriggerKind::Interval))
        ));
        assert!(scheduler.all().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_fires_each_period_until_unscheduled() {
        let (store, runs) = counting_store();
        let scheduler = scheduler(&store, Arc::new(ConstantMetric(0.0)));
        scheduler
            .schedule("P", "interval", args(json!({"seconds": "10"})))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0, "held until start");

        scheduler.start();
        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        assert_eq!(scheduler.unschedule("P"), 1);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_one_schedule_keeps_siblings() {
        let (store, runs) = counting_store();
        let scheduler = scheduler(&store, Arc::new(ConstantMetric(0.0)));
        scheduler.start();

        let fast = scheduler
            .schedule("P", "interval", args(json!({"seconds": 10})))
            .unwrap();
        scheduler
            .schedule("P", "interval", args(json!({"minutes": 1})))
            .unwrap();
        assert_eq!(scheduler.schedules_for("P").len(), 2);

        assert!(scheduler.cancel(fast));
        assert!(!scheduler.cancel(fast));
        assert_eq!(scheduler.schedules_for("P").len(), 1);

        tokio::time::sleep(Duration::from_secs(65)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_and_start_rearms() {
        let (store, runs) = counting_store();
        let scheduler = scheduler(&store, Arc::new(ConstantMetric(0.0)));
        scheduler
            .schedule("P", "interval", args(json!({"seconds": 10})))
            .unwrap();
        scheduler.start();
        assert!(scheduler.is_running());

        tokio::time::sleep(Duration::from_secs(15)).await;
        scheduler.stop();
        assert!(!scheduler.is_running());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.all().len(), 1);

        scheduler.start();
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_stops_when_pipeline_removed() {
        let (store, runs) = counting_store();
        let scheduler = scheduler(&store, Arc::new(ConstantMetric(0.0)));
        scheduler.start();
        scheduler
            .schedule("P", "interval", args(json!({"seconds": 10})))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(15)).await;
        store.remove("P");
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_pipeline_takes_its_schedules() {
        let (store, _) = counting_store();
        let scheduler = scheduler(&store, Arc::new(ConstantMetric(0.0)));
        scheduler
            .schedule("P", "interval", args(json!({"seconds": 10})))
            .unwrap();

        assert!(scheduler.remove_pipeline("P").is_some());
        assert!(scheduler.all().is_empty());
        assert!(!store.contains("P"));
        assert!(scheduler.remove_pipeline("P").is_none());
        assert!(matches!(
            scheduler.schedule("P", "interval", args(json!({"seconds": 10}))),
            Err(ScheduleError::PipelineNotFound(_))
        ));
    }

    #[test]
    fn test_schedules_never_outlive_their_pipeline() {
        let store = PipelineStore::new();
        let scheduler = scheduler(&store, Arc::new(ConstantMetric(0.0)));

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..500 {
                    let _ = store.insert(Pipeline::new("P"));
                    scheduler.remove_pipeline("P");
                }
            });
            scope.spawn(|| {
                for _ in 0..500 {
                    let _ = scheduler.schedule("P", "interval", args(json!({"seconds": 5})));
                }
            });
        });

        for info in scheduler.all() {
            assert!(store.contains(&info.pipeline), "orphaned schedule {}", info.id);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_fires_once_per_sustained_breach() {
        let (store, runs) = counting_store();
        let sink = MemoryLogSink::new();
        let metrics = Arc::new(ScriptedMetric {
            start: Instant::now(),
        });
        let scheduler = Scheduler::new(store.clone(), metrics, Arc::new(sink.clone()));
        scheduler
            .schedule(
                "P",
                "monitor",
                args(json!({"threshold": "90", "duration": "30", "interval": "5"})),
            )
            .unwrap();
        scheduler.start();

        tokio::time::sleep(Duration::from_secs(45)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(75)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        let lines = sink.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Monitor triggered: cpu usage = 95.0%"), "{}", lines[0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_below_threshold_never_fires() {
        let (store, runs) = counting_store();
        let scheduler = scheduler(&store, Arc::new(ConstantMetric(10.0)));
        scheduler.start();
        scheduler
            .schedule("P", "monitor", args(json!({"duration": 5, "interval": 1})))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_schedule_info_parameters() {
        let info = ScheduleInfo {
            id: Uuid::nil(),
            pipeline: "P".to_string(),
            trigger_type: TriggerKind::Cron,
            trigger_args: args(json!({"hour": "1", "minute": 0})),
        };
        assert_eq!(info.parameters(), "hour=1, minute=0");
    }
}
