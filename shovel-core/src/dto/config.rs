//! Persisted node configuration

use serde::{Deserialize, Serialize};

use crate::domain::task::TaskSpec;
use crate::domain::trigger::TriggerArgs;

/// Declarative snapshot of a node: identity, pipelines and schedules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    pub client_name: String,
    #[serde(default)]
    pub client_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub pipelines: Vec<PipelineDocument>,
    #[serde(default)]
    pub schedules: Vec<ScheduleDocument>,
}

/// A pipeline and its ordered tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDocument {
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

/// One schedule bound to a pipeline
///
/// `trigger_type` stays a plain string so a document naming an unknown
/// trigger still loads far enough to report which schedule is wrong.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDocument {
    pub pipeline: String,
    pub trigger_type: String,
    #[serde(default)]
    pub trigger_args: TriggerArgs,
}

impl ConfigDocument {
    pub fn new(client_name: impl Into<String>, client_id: u64) -> Self {
        Self {
            client_name: client_name.into(),
            client_id,
            saved_at: None,
            pipelines: Vec::new(),
            schedules: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::ShellKind;

    #[test]
    fn test_document_parses_minimal_form() {
        let doc: ConfigDocument = serde_json::from_str(r#"{"client_name": "worker"}"#).unwrap();
        assert_eq!(doc.client_name, "worker");
        assert_eq!(doc.client_id, 0);
        assert!(doc.pipelines.is_empty());
        assert!(doc.schedules.is_empty());
    }

    #[test]
    fn test_document_full_form() {
        let raw = r#"{
            "client_name": "worker",
            "client_id": 7,
            "saved_at": "2026-01-02T03:04:05Z",
            "pipelines": [
                {"name": "P1", "tasks": [
                    {"task_type": "shell", "shell": "bash", "command": "ls"},
                    {"task_type": "file", "path": "/opt/job.py"}
                ]}
            ],
            "schedules": [
                {"pipeline": "P1", "trigger_type": "cron", "trigger_args": {"hour": "1", "minute": 0}}
            ]
        }"#;
        let doc: ConfigDocument = serde_json::from_str(raw).unwrap();
        assert_eq!(doc.client_id, 7);
        assert!(doc.saved_at.is_some());
        assert_eq!(doc.pipelines[0].tasks.len(), 2);
        assert_eq!(
            doc.pipelines[0].tasks[0],
            TaskSpec::Shell {
                shell: ShellKind::Bash,
                command: "ls".to_string()
            }
        );
        assert_eq!(doc.schedules[0].trigger_args.len(), 2);
    }
}
