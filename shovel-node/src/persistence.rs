//! Saving and loading a node's pipelines and schedules
//!
//! Function tasks are stored by registered name plus defaults; loading
//! resolves them against the node's registry again.

use chrono::Utc;
use shovel_core::dto::config::{ConfigDocument, PipelineDocument, ScheduleDocument};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::node::Node;
use crate::pipeline::{Pipeline, PipelineError, TaskInput};
use crate::scheduler::ScheduleError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read or write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration document: {0}")]
    Format(#[from] serde_json::Error),

    #[error("pipeline '{pipeline}': {source}")]
    Pipeline {
        pipeline: String,
        #[source]
        source: PipelineError,
    },

    #[error("schedule for '{pipeline}': {source}")]
    Schedule {
        pipeline: String,
        #[source]
        source: ScheduleError,
    },
}

/// Reads a configuration document from disk
pub fn read_document(path: &Path) -> Result<ConfigDocument, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_str(&raw)?)
}

impl Node {
    /// Snapshot of the current pipelines and schedules
    pub fn to_document(&self) -> ConfigDocument {
        let record = self.record();
        let mut document = ConfigDocument::new(record.name, record.id);
        document.saved_at = Some(Utc::now());

        document.pipelines = self
            .pipelines()
            .snapshot()
            .iter()
            .map(|pipeline| PipelineDocument {
                name: pipeline.name().to_string(),
                tasks: pipeline.tasks().iter().map(|t| t.to_spec()).collect(),
            })
            .collect();

        document.schedules = self
            .scheduler()
            .all()
            .into_iter()
            .map(|schedule| ScheduleDocument {
                pipeline: schedule.pipeline,
                trigger_type: schedule.trigger_type.to_string(),
                trigger_args: schedule.trigger_args,
            })
            .collect();

        document
    }

    /// Writes the current state as pretty-printed JSON
    pub fn save_config(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(&self.to_document())?;
        std::fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Replaces every pipeline and schedule with the document's
    ///
    /// Function tasks naming an unregistered function are skipped with a
    /// warning so the rest of the pipeline still loads; any other invalid
    /// task or schedule aborts the load.
    pub fn apply_document(&self, document: &ConfigDocument) -> Result<(), ConfigError> {
        self.scheduler().clear();
        self.pipelines().clear();

        for entry in &document.pipelines {
            let mut pipeline = Pipeline::new(entry.name.clone());
            for spec in &entry.tasks {
                let added = TaskInput::from_spec(spec, self.registry())
                    .and_then(|input| pipeline.add_task(input));
                match added {
                    Ok(()) => {}
                    Err(PipelineError::UnknownFunction(name)) => {
                        warn!(
                            "Skipping task of '{}': function '{}' is not registered",
                            entry.name, name
                        );
                    }
                    Err(source) => {
                        return Err(ConfigError::Pipeline {
                            pipeline: entry.name.clone(),
                            source,
                        });
                    }
                }
            }
            self.add_pipeline(pipeline)
                .map_err(|source| ConfigError::Pipeline {
                    pipeline: entry.name.clone(),
                    source,
                })?;
        }

        for schedule in &document.schedules {
            self.schedule_pipeline(
                &schedule.pipeline,
                &schedule.trigger_type,
                schedule.trigger_args.clone(),
            )
            .map_err(|source| ConfigError::Schedule {
                pipeline: schedule.pipeline.clone(),
                source,
            })?;
        }

        info!(
            "Loaded {} pipeline(s) and {} schedule(s)",
            document.pipelines.len(),
            document.schedules.len()
        );
        Ok(())
    }

    /// Reads `path` and applies it
    pub fn load_config(&self, path: &Path) -> Result<ConfigDocument, ConfigError> {
        let document = read_document(path)?;
        self.apply_document(&document)?;
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::registry::FunctionRegistry;
    use serde_json::json;
    use shovel_core::domain::task::TaskSpec;
    use shovel_core::domain::trigger::TriggerKind;

    fn node() -> Node {
        Node::new(NodeConfig::new("saver"))
    }

    #[test]
    fn test_document_reflects_state() {
        let node = node();
        node.create_pipeline("P1").unwrap();
        node.add_task(
            "P1",
            TaskInput::new()
                .function(node.registry(), "echo", json!({"a": 1}).as_object().cloned().unwrap())
                .unwrap(),
        )
        .unwrap();
        node.add_task("P1", TaskInput::new().shell("bash", "ls -la")).unwrap();
        node.schedule_pipeline(
            "P1",
            "interval",
            serde_json::from_value(json!({"minutes": "5"})).unwrap(),
        )
        .unwrap();

        let document = node.to_document();
        assert_eq!(document.client_name, "saver");
        assert!(document.saved_at.is_some());
        assert_eq!(document.pipelines.len(), 1);
        assert_eq!(document.pipelines[0].tasks.len(), 2);
        assert!(matches!(
            &document.pipelines[0].tasks[0],
            TaskSpec::Func { name, .. } if name == "echo"
        ));
        assert_eq!(document.schedules[0].trigger_type, TriggerKind::Interval.as_str());
        assert_eq!(document.schedules[0].trigger_args["minutes"], json!("5"));
    }

    #[test]
    fn test_unregistered_function_is_skipped() {
        let raw = json!({
            "client_name": "loader",
            "pipelines": [{"name": "P1", "tasks": [
                {"task_type": "func", "name": "missing"},
                {"task_type": "func", "name": "sample"}
            ]}]
        });
        let document: ConfigDocument = serde_json::from_value(raw).unwrap();

        let node = Node::builder(NodeConfig::new("loader"))
            .registry(FunctionRegistry::with_builtins())
            .build();
        node.apply_document(&document).unwrap();
        assert_eq!(node.pipelines().get("P1").unwrap().len(), 1);
    }

    #[test]
    fn test_bad_schedule_aborts_load() {
        let raw = json!({
            "client_name": "loader",
            "pipelines": [{"name": "P1", "tasks": []}],
            "schedules": [{"pipeline": "P1", "trigger_type": "date", "trigger_args": {}}]
        });
        let document: ConfigDocument = serde_json::from_value(raw).unwrap();
        let err = node().apply_document(&document).unwrap_err();
        assert!(matches!(err, ConfigError::Schedule { .. }));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = read_document(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
