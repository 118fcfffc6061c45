//! Function registry
//!
//! Function tasks are not serialized as code. Instead every callable a node
//! can run is registered here by name at startup, and pipelines (and the
//! persisted configuration) refer to it by that name.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use shovel_core::domain::task::TaskParams;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A callable usable as a pipeline task
#[async_trait]
pub trait TaskFunction: Send + Sync {
    /// Invoke the function with its resolved keyword parameters
    ///
    /// The returned value becomes the task's output and may be referenced by
    /// later tasks through `outputs[...]`.
    async fn call(&self, params: TaskParams) -> Result<Value>;
}

/// Adapter turning a plain closure into a [`TaskFunction`]
pub struct FnTask<F>(F);

impl<F> FnTask<F>
where
    F: Fn(TaskParams) -> Result<Value> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> TaskFunction for FnTask<F>
where
    F: Fn(TaskParams) -> Result<Value> + Send + Sync,
{
    async fn call(&self, params: TaskParams) -> Result<Value> {
        (self.0)(params)
    }
}

/// Name → callable lookup shared by every pipeline of a node
#[derive(Default, Clone)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, Arc<dyn TaskFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the functions every node ships with
    ///
    /// - `echo`: returns its parameters as an object
    /// - `timestamp`: returns the current UTC time (RFC 3339)
    /// - `sample`: returns a fixed greeting, useful for smoke tests
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_fn("echo", |params| Ok(Value::Object(params)));
        registry.register_fn("timestamp", |_| {
            Ok(Value::String(chrono::Utc::now().to_rfc3339()))
        });
        registry.register_fn("sample", |_| Ok(Value::from("Output of task 1")));
        registry
    }

    /// Register a callable under `name`, replacing any previous entry
    pub fn register(&mut self, name: impl Into<String>, function: Arc<dyn TaskFunction>) {
        self.functions.insert(name.into(), function);
    }

    /// Register a synchronous closure under `name`
    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(TaskParams) -> Result<Value> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(FnTask::new(f)));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskFunction>> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}
