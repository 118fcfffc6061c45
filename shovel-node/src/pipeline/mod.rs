//! Pipelines and tasks
//!
//! A [`Pipeline`] is a named, ordered list of [`Task`]s. Tasks are added
//! through [`TaskInput`], which mirrors the keyword style of the command
//! protocol: exactly one of `function`, `file` or `shell` must be supplied.
//!
//! Pipelines owned by a node live in a [`PipelineStore`] as `Arc` snapshots.
//! Mutations swap in a new snapshot, so an execution in flight keeps the
//! task list it started with.

mod executor;
mod params;
mod process;

pub use executor::{PipelineRun, TaskResult};
pub use params::{BackReference, PathSegment, flatten_params};

use shovel_core::domain::task::{ShellKind, TaskParams, TaskSpec};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use crate::registry::{FunctionRegistry, TaskFunction};

/// Validation errors raised while building pipelines
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Pipeline with name '{0}' already exists.")]
    Duplicate(String),

    #[error("No pipeline with name {0}")]
    NotFound(String),

    #[error("a task needs exactly one of function, file or shell; none given")]
    NoTaskInput,

    #[error("a task needs exactly one of function, file or shell; got {0}")]
    ConflictingTaskInputs(String),

    #[error("Invalid file path: '{0}' is not an existing script file")]
    ScriptNotFound(String),

    #[error(transparent)]
    UnsupportedShell(#[from] shovel_core::domain::task::UnsupportedShell),

    #[error("shell task for '{0}' has no command")]
    MissingCommand(String),

    #[error("no function registered under '{0}'")]
    UnknownFunction(String),

    #[error("task index {index} out of range for pipeline with {len} task(s)")]
    TaskIndexOutOfRange { index: usize, len: usize },
}

/// A registered function together with the defaults captured when the task
/// was added
#[derive(Clone)]
pub struct FunctionTask {
    pub name: String,
    pub function: Arc<dyn TaskFunction>,
    pub defaults: TaskParams,
}

impl std::fmt::Debug for FunctionTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTask")
            .field("name", &self.name)
            .field("defaults", &self.defaults)
            .finish()
    }
}

/// One unit of work
#[derive(Debug, Clone)]
pub enum Task {
    Function(FunctionTask),
    FileScript(PathBuf),
    ShellCommand { shell: ShellKind, command: String },
}

impl Task {
    /// Declarative form, as written to the configuration document
    pub fn to_spec(&self) -> TaskSpec {
        match self {
            Task::Function(f) => TaskSpec::Func {
                name: f.name.clone(),
                defaults: f.defaults.clone(),
            },
            Task::FileScript(path) => TaskSpec::File {
                path: path.to_string_lossy().into_owned(),
            },
            Task::ShellCommand { shell, command } => TaskSpec::Shell {
                shell: *shell,
                command: command.clone(),
            },
        }
    }
}

/// Candidate inputs for a new task
///
/// Built with the chained setters; [`Pipeline::add_task`] validates that
/// exactly one variant was chosen.
#[derive(Debug, Clone, Default)]
pub struct TaskInput {
    function: Option<FunctionTask>,
    file: Option<String>,
    shell: Option<String>,
    command: Option<String>,
}

impl TaskInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a registered function, looked up by name
    pub fn function(
        mut self,
        registry: &FunctionRegistry,
        name: &str,
        defaults: TaskParams,
    ) -> Result<Self, PipelineError> {
        let function = registry
            .get(name)
            .ok_or_else(|| PipelineError::UnknownFunction(name.to_string()))?;
        self.function = Some(FunctionTask {
            name: name.to_string(),
            function,
            defaults,
        });
        Ok(self)
    }

    pub fn file(mut self, path: impl Into<String>) -> Self {
        self.file = Some(path.into());
        self
    }

    pub fn shell(mut self, shell: impl Into<String>, command: impl Into<String>) -> Self {
        self.shell = Some(shell.into());
        self.command = Some(command.into());
        self
    }

    /// Builds input from a persisted spec
    pub fn from_spec(spec: &TaskSpec, registry: &FunctionRegistry) -> Result<Self, PipelineError> {
        match spec {
            TaskSpec::Func { name, defaults } => {
                Self::new().function(registry, name, defaults.clone())
            }
            TaskSpec::File { path } => Ok(Self::new().file(path.clone())),
            TaskSpec::Shell { shell, command } => {
                Ok(Self::new().shell(shell.as_str(), command.clone()))
            }
        }
    }

    fn into_task(self) -> Result<Task, PipelineError> {
        let supplied: Vec<&str> = [
            self.function.as_ref().map(|_| "function"),
            self.file.as_ref().map(|_| "file"),
            self.shell.as_ref().map(|_| "shell"),
        ]
        .into_iter()
        .flatten()
        .collect();

        match supplied.len() {
            0 => return Err(PipelineError::NoTaskInput),
            1 => {}
            _ => return Err(PipelineError::ConflictingTaskInputs(supplied.join(", "))),
        }

        if let Some(function) = self.function {
            return Ok(Task::Function(function));
        }

        if let Some(file) = self.file {
            return validate_script(&file).map(Task::FileScript);
        }

        let shell_name = self.shell.unwrap_or_default();
        let shell: ShellKind = shell_name.parse()?;
        let command = self
            .command
            .filter(|c| !c.trim().is_empty())
            .ok_or(PipelineError::MissingCommand(shell_name))?;
        Ok(Task::ShellCommand { shell, command })
    }
}

/// Expands `~` and checks the script exists as a regular file
fn validate_script(raw: &str) -> Result<PathBuf, PipelineError> {
    let path = expand_home(raw.trim());
    if path.is_file() {
        Ok(path)
    } else {
        Err(PipelineError::ScriptNotFound(raw.to_string()))
    }
}

fn expand_home(raw: &str) -> PathBuf {
    if raw == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(raw));
    }
    match (raw.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => Path::new(raw).to_path_buf(),
    }
}

/// Named, ordered sequence of tasks
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    tasks: Vec<Task>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Validates and appends a task
    pub fn add_task(&mut self, input: TaskInput) -> Result<(), PipelineError> {
        let task = input.into_task()?;
        self.tasks.push(task);
        Ok(())
    }

    /// Removes the task at `index`
    pub fn remove_task(&mut self, index: usize) -> Result<Task, PipelineError> {
        if index >= self.tasks.len() {
            return Err(PipelineError::TaskIndexOutOfRange {
                index,
                len: self.tasks.len(),
            });
        }
        Ok(self.tasks.remove(index))
    }
}

/// Thread-safe map of pipeline name → current snapshot
#[derive(Debug, Clone, Default)]
pub struct PipelineStore {
    inner: Arc<Mutex<BTreeMap<String, Arc<Pipeline>>>>,
}

impl PipelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Arc<Pipeline>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a pipeline, failing if the name is taken
    pub fn insert(&self, pipeline: Pipeline) -> Result<(), PipelineError> {
        let mut map = self.lock();
        if map.contains_key(pipeline.name()) {
            return Err(PipelineError::Duplicate(pipeline.name().to_string()));
        }
        map.insert(pipeline.name().to_string(), Arc::new(pipeline));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Pipeline>> {
        self.lock().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Pipeline>> {
        self.lock().remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn snapshot(&self) -> Vec<Arc<Pipeline>> {
        self.lock().values().cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Applies `f` to a copy of the named pipeline and publishes the copy
    pub fn update<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Pipeline) -> Result<T, PipelineError>,
    ) -> Result<T, PipelineError> {
        let mut map = self.lock();
        let current = map
            .get(name)
            .ok_or_else(|| PipelineError::NotFound(name.to_string()))?;
        let mut next = Pipeline::clone(current);
        let out = f(&mut next)?;
        map.insert(name.to_string(), Arc::new(next));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use std::io::Write;

    fn registry() -> FunctionRegistry {
        FunctionRegistry::with_builtins()
    }

    #[test]
    fn test_add_task_requires_exactly_one_input() {
        let mut pipeline = Pipeline::new("P1");

        let none = pipeline.add_task(TaskInput::new());
        assert!(matches!(none, Err(PipelineError::NoTaskInput)));

        let script = tempfile::NamedTempFile::new().unwrap();
        let both = TaskInput::new()
            .file(script.path().to_string_lossy())
            .shell("bash", "ls");
        assert!(matches!(
            pipeline.add_task(both),
            Err(PipelineError::ConflictingTaskInputs(_))
        ));

        let all = TaskInput::new()
            .function(&registry(), "echo", Map::new())
            .unwrap()
            .file("x.py")
            .shell("sh", "ls");
        match pipeline.add_task(all) {
            Err(PipelineError::ConflictingTaskInputs(which)) => {
                assert_eq!(which, "function, file, shell")
            }
            other => panic!("unexpected: {:?}", other),
        }

        assert!(pipeline.is_empty());
    }

    #[test]
    fn test_add_task_validates_script_path() {
        let mut pipeline = Pipeline::new("P1");
        let missing = pipeline.add_task(TaskInput::new().file("/definitely/not/here.py"));
        assert!(matches!(missing, Err(PipelineError::ScriptNotFound(_))));

        let mut script = tempfile::NamedTempFile::new().unwrap();
        writeln!(script, "print('hi')").unwrap();
        pipeline
            .add_task(TaskInput::new().file(script.path().to_string_lossy()))
            .unwrap();
        assert_eq!(pipeline.len(), 1);
    }

    #[test]
    fn test_add_task_rejects_unsupported_shell() {
        let mut pipeline = Pipeline::new("P1");
        let err = pipeline
            .add_task(TaskInput::new().shell("fish", "ls"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedShell(_)));

        let err = pipeline.add_task(TaskInput::new().shell("bash", "  ")).unwrap_err();
        assert!(matches!(err, PipelineError::MissingCommand(_)));
    }

    #[test]
    fn test_unknown_function_is_rejected() {
        let err = TaskInput::new()
            .function(&registry(), "nope", Map::new())
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownFunction(_)));
    }

    #[test]
    fn test_remove_task_by_index() {
        let mut pipeline = Pipeline::new("P1");
        pipeline.add_task(TaskInput::new().shell("sh", "echo a")).unwrap();
        pipeline.add_task(TaskInput::new().shell("sh", "echo b")).unwrap();

        let removed = pipeline.remove_task(0).unwrap();
        assert!(matches!(removed, Task::ShellCommand { ref command, .. } if command == "echo a"));
        assert_eq!(pipeline.len(), 1);
        assert!(pipeline.remove_task(5).is_err());
    }

    #[test]
    fn test_store_rejects_duplicates_and_swaps_snapshots() {
        let store = PipelineStore::new();
        store.insert(Pipeline::new("P1")).unwrap();
        assert!(matches!(
            store.insert(Pipeline::new("P1")),
            Err(PipelineError::Duplicate(_))
        ));

        let before = store.get("P1").unwrap();
        store
            .update("P1", |p| p.add_task(TaskInput::new().shell("sh", "true")))
            .unwrap();

        assert_eq!(before.len(), 0);
        assert_eq!(store.get("P1").unwrap().len(), 1);
        assert!(matches!(
            store.update("missing", |_| Ok(())),
            Err(PipelineError::NotFound(_))
        ));
    }

    #[test]
    fn test_expand_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/a.py"), home.join("a.py"));
        }
        assert_eq!(expand_home("/tmp/a.py"), PathBuf::from("/tmp/a.py"));
    }
}
