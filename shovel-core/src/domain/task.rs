//! Task domain types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Keyword parameters handed to a single task.
pub type TaskParams = Map<String, Value>;

/// Shells a shell-command task may run through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellKind {
    Powershell,
    Bash,
    Sh,
    Cmd,
}

impl ShellKind {
    pub const ALL: [ShellKind; 4] = [
        ShellKind::Powershell,
        ShellKind::Bash,
        ShellKind::Sh,
        ShellKind::Cmd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShellKind::Powershell => "powershell",
            ShellKind::Bash => "bash",
            ShellKind::Sh => "sh",
            ShellKind::Cmd => "cmd",
        }
    }
}

impl fmt::Display for ShellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a shell name is not one of [`ShellKind::ALL`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported shell '{0}', expected one of: powershell, bash, sh, cmd")]
pub struct UnsupportedShell(pub String);

impl FromStr for ShellKind {
    type Err = UnsupportedShell;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ShellKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnsupportedShell(s.to_string()))
    }
}

/// Declarative description of a task
///
/// This is the persisted form of a task. Function tasks are stored by their
/// registered name only; the node resolves the name against its function
/// registry when the document is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task_type", rename_all = "lowercase")]
pub enum TaskSpec {
    Func {
        name: String,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        defaults: TaskParams,
    },
    File {
        path: String,
    },
    Shell {
        shell: ShellKind,
        command: String,
    },
}

impl TaskSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            TaskSpec::Func { .. } => "func",
            TaskSpec::File { .. } => "file",
            TaskSpec::Shell { .. } => "shell",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_kind_parse_is_case_insensitive() {
        assert_eq!("Bash".parse::<ShellKind>().unwrap(), ShellKind::Bash);
        assert_eq!("POWERSHELL".parse::<ShellKind>().unwrap(), ShellKind::Powershell);
        assert!("zsh".parse::<ShellKind>().is_err());
    }

    #[test]
    fn test_task_spec_tagging() {
        let spec = TaskSpec::Shell {
            shell: ShellKind::Sh,
            command: "echo hi".to_string(),
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"task_type": "shell", "shell": "sh", "command": "echo hi"})
        );

        let func: TaskSpec =
            serde_json::from_str(r#"{"task_type": "func", "name": "echo"}"#).unwrap();
        assert_eq!(func.kind(), "func");
    }
}
