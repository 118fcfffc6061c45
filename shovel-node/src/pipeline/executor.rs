//! Pipeline execution
//!
//! Runs every task of a pipeline in order:
//! - resolving `outputs[...]` back-references in the task's parameters
//! - dispatching on the task variant
//! - isolating failures so one broken task never stops the run
//!
//! A run therefore always yields exactly one [`TaskResult`] per task.

use anyhow::{Result, bail};
use serde_json::Value;
use shovel_core::domain::task::TaskParams;
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::params::{flatten_params, resolve_params};
use super::process::{run_script, run_shell};
use super::{Pipeline, Task};
use crate::registry::TaskFunction;

/// Outcome of a single task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskResult {
    Completed(Value),
    Failed { index: usize, cause: String },
}

impl TaskResult {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskResult::Completed(_))
    }

    /// The value later tasks see at `outputs[index]`
    pub fn value(&self) -> Value {
        match self {
            TaskResult::Completed(value) => value.clone(),
            TaskResult::Failed { index, cause } => {
                Value::String(format!("task {} failed: {}", index, cause))
            }
        }
    }
}

/// Results of one pipeline execution
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub pipeline: String,
    pub results: Vec<TaskResult>,
}

impl PipelineRun {
    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| !r.is_success()).count()
    }

    /// Per-task output values as a JSON array
    pub fn outputs(&self) -> Value {
        Value::Array(self.results.iter().map(TaskResult::value).collect())
    }

    /// Summary returned to `run pipeline` callers
    pub fn summary(&self) -> String {
        format!(
            "Pipeline {} executed. Output: {}",
            self.pipeline,
            self.outputs()
        )
    }
}

impl Pipeline {
    /// Executes every task in order
    ///
    /// `params` is index-aligned with the tasks; a missing entry means the
    /// task gets no parameters beyond its own defaults.
    pub async fn execute(&self, params: &[TaskParams]) -> PipelineRun {
        info!("Running pipeline: {}", self.name);

        let mut results = Vec::with_capacity(self.tasks.len());
        let mut outputs: Vec<Value> = Vec::with_capacity(self.tasks.len());

        for (index, task) in self.tasks.iter().enumerate() {
            let given = params.get(index).cloned().unwrap_or_default();

            let result = match run_task(task, given, &outputs).await {
                Ok(value) => {
                    debug!("Task {} of pipeline '{}' completed", index, self.name);
                    TaskResult::Completed(value)
                }
                Err(e) => {
                    warn!("Task {} of pipeline '{}' failed: {:#}", index, self.name, e);
                    TaskResult::Failed {
                        index,
                        cause: format!("{:#}", e),
                    }
                }
            };

            outputs.push(result.value());
            results.push(result);
        }

        let run = PipelineRun {
            pipeline: self.name.clone(),
            results,
        };
        info!(
            "Pipeline '{}' finished: {} task(s), {} failed",
            self.name,
            run.results.len(),
            run.failures()
        );
        run
    }
}

async fn run_task(task: &Task, given: TaskParams, outputs: &[Value]) -> Result<Value> {
    match task {
        Task::Function(function) => {
            let mut merged = function.defaults.clone();
            merged.extend(given);
            let resolved = resolve_params(merged, outputs)?;
            call_isolated(function.function.clone(), resolved).await
        }
        Task::FileScript(path) => {
            let resolved = resolve_params(given, outputs)?;
            let args = flatten_params(&resolved);
            run_script(path, &args).await.map(Value::String)
        }
        Task::ShellCommand { shell, command } => {
            let resolved = resolve_params(given, outputs)?;
            let mut line = command.clone();
            for token in flatten_params(&resolved) {
                line.push(' ');
                line.push_str(&token);
            }
            run_shell(*shell, &line).await.map(Value::String)
        }
    }
}

/// Runs a function on its own task so a panic surfaces as an error
async fn call_isolated(function: Arc<dyn TaskFunction>, params: TaskParams) -> Result<Value> {
    match tokio::spawn(async move { function.call(params).await }).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => bail!("panicked: {}", panic_message(e.into_panic())),
        Err(e) => bail!("{}", e),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => message.to_string(),
            Err(_) => "unknown panic".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::TaskInput;
    use crate::registry::FunctionRegistry;
    use serde_json::json;

    fn registry() -> FunctionRegistry {
        let mut registry = FunctionRegistry::with_builtins();
        registry.register_fn("make_x", |_| Ok(json!({"x": 42})));
        registry.register_fn("double", |params| {
            let n = params
                .get("n")
                .and_then(Value::as_i64)
                .ok_or_else(|| anyhow::anyhow!("n must be an integer"))?;
            Ok(json!(n * 2))
        });
        registry.register_fn("boom", |_| anyhow::bail!("kaboom"));
        registry.register_fn("explode", |params| {
            let picks: Vec<Value> = params.into_iter().map(|(_, v)| v).collect();
            Ok(picks[3].clone())
        });
        registry
    }

    fn params(value: Value) -> TaskParams {
        value.as_object().cloned().unwrap()
    }

    fn func(registry: &FunctionRegistry, name: &str) -> TaskInput {
        TaskInput::new()
            .function(registry, name, TaskParams::new())
            .unwrap()
    }

    #[tokio::test]
    async fn test_back_reference_passes_integer() {
        let registry = registry();
        let mut pipeline = Pipeline::new("P");
        pipeline.add_task(func(&registry, "make_x")).unwrap();
        pipeline.add_task(func(&registry, "double")).unwrap();

        let run = pipeline
            .execute(&[TaskParams::new(), params(json!({"n": r#"outputs[0]["x"]"#}))])
            .await;

        assert_eq!(run.results[0], TaskResult::Completed(json!({"x": 42})));
        assert_eq!(run.results[1], TaskResult::Completed(json!(84)));
    }

    #[tokio::test]
    async fn test_every_task_yields_a_result() {
        let registry = registry();
        let mut pipeline = Pipeline::new("P");
        pipeline.add_task(func(&registry, "boom")).unwrap();
        pipeline.add_task(func(&registry, "sample")).unwrap();
        pipeline.add_task(func(&registry, "double")).unwrap();
        pipeline.add_task(func(&registry, "echo")).unwrap();

        let run = pipeline
            .execute(&[
                TaskParams::new(),
                TaskParams::new(),
                params(json!({"n": "outputs[7]"})),
            ])
            .await;

        assert_eq!(run.results.len(), 4);
        assert_eq!(run.failures(), 2);
        assert_eq!(run.results[0].value(), json!("task 0 failed: kaboom"));
        assert_eq!(run.results[1].value(), json!("Output of task 1"));
        assert!(matches!(run.results[2], TaskResult::Failed { index: 2, .. }));
        assert_eq!(run.results[3], TaskResult::Completed(json!({})));
    }

    #[tokio::test]
    async fn test_panicking_function_becomes_failure() {
        let registry = registry();
        let mut pipeline = Pipeline::new("P");
        pipeline.add_task(func(&registry, "explode")).unwrap();
        pipeline.add_task(func(&registry, "sample")).unwrap();

        let run = pipeline.execute(&[]).await;

        assert_eq!(run.results.len(), 2);
        match &run.results[0] {
            TaskResult::Failed { index: 0, cause } => {
                assert!(cause.starts_with("panicked: index out of bounds"), "{}", cause)
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(run.results[1], TaskResult::Completed(json!("Output of task 1")));
        assert!(run.summary().contains("task 0 failed: panicked"));
    }

    #[tokio::test]
    async fn test_failure_value_is_referencable() {
        let registry = registry();
        let mut pipeline = Pipeline::new("P");
        pipeline.add_task(func(&registry, "boom")).unwrap();
        pipeline.add_task(func(&registry, "echo")).unwrap();

        let run = pipeline
            .execute(&[TaskParams::new(), params(json!({"prev": "outputs[0]"}))])
            .await;

        assert_eq!(
            run.results[1],
            TaskResult::Completed(json!({"prev": "task 0 failed: kaboom"}))
        );
    }

    #[tokio::test]
    async fn test_function_defaults_are_overridden_by_params() {
        let registry = registry();
        let mut pipeline = Pipeline::new("P");
        pipeline
            .add_task(
                TaskInput::new()
                    .function(&registry, "echo", params(json!({"a": 1, "b": 2})))
                    .unwrap(),
            )
            .unwrap();

        let run = pipeline.execute(&[params(json!({"b": 3}))]).await;
        assert_eq!(run.results[0], TaskResult::Completed(json!({"a": 1, "b": 3})));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_task_appends_flattened_params() {
        let mut pipeline = Pipeline::new("P");
        pipeline.add_task(TaskInput::new().shell("sh", "echo")).unwrap();
        pipeline.add_task(TaskInput::new().shell("sh", "exit 4")).unwrap();

        let run = pipeline
            .execute(&[params(json!({"--name": "alpha", "--opt": "k=v"}))])
            .await;

        assert_eq!(run.results[0], TaskResult::Completed(json!("--name alpha --opt=k=v")));
        assert!(matches!(run.results[1], TaskResult::Failed { index: 1, .. }));
    }

    #[tokio::test]
    async fn test_summary_lists_outputs() {
        let registry = registry();
        let mut pipeline = Pipeline::new("P1");
        pipeline.add_task(func(&registry, "sample")).unwrap();

        let run = pipeline.execute(&[]).await;
        assert_eq!(
            run.summary(),
            r#"Pipeline P1 executed. Output: ["Output of task 1"]"#
        );
    }
}
