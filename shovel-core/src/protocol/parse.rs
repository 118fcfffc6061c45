//! Command line parser

use thiserror::Error;

use super::{Command, TaskAddition, UpdateAction};
use crate::domain::peer::PeerRecord;

/// Reasons a command line could not be parsed
///
/// The `Display` text of each variant is the exact response a node sends
/// back to the peer that issued the command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid command.")]
    Empty,

    #[error("Unknown command.")]
    Unknown,

    /// A recognised verb followed by a sub-form it does not support
    #[error("Unknown command part: {0}")]
    UnknownPart(String),

    #[error("Incomplete command: missing {0}")]
    Incomplete(&'static str),

    #[error("Invalid welcome record: {0}")]
    InvalidWelcome(String),
}

pub(super) fn parse_command(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(verb) = tokens.first() else {
        return Err(ParseError::Empty);
    };

    match verb.to_ascii_lowercase().as_str() {
        "welcome" => parse_welcome(line, verb),
        "show" => match tokens.get(1) {
            None => Err(ParseError::Unknown),
            Some(part) if part.eq_ignore_ascii_case("clients") => Ok(Command::ShowClients),
            Some(part) if part.eq_ignore_ascii_case("pipelines") => Ok(Command::ShowPipelines),
            Some(part) => Err(ParseError::UnknownPart(part.to_string())),
        },
        "run" => pipeline_target(&tokens).map(Command::RunPipeline),
        "create" => pipeline_target(&tokens).map(Command::CreatePipeline),
        "remove" => pipeline_target(&tokens).map(Command::RemovePipeline),
        "update" => {
            let name = pipeline_target(&tokens)?;
            let action = parse_update_action(&tokens[3..])?;
            Ok(Command::UpdatePipeline { name, action })
        }
        "shutdown" => Ok(Command::Shutdown),
        _ => Err(ParseError::Unknown),
    }
}

/// The JSON payload is taken verbatim after the verb, since it may contain
/// whitespace.
fn parse_welcome(line: &str, verb: &str) -> Result<Command, ParseError> {
    let payload = line[verb.len()..].trim();
    if payload.is_empty() {
        return Err(ParseError::Unknown);
    }
    serde_json::from_str::<PeerRecord>(payload)
        .map(Command::Welcome)
        .map_err(|e| ParseError::InvalidWelcome(e.to_string()))
}

/// Parses `<verb> pipeline <name>` and returns the name
fn pipeline_target(tokens: &[&str]) -> Result<String, ParseError> {
    match tokens.get(1) {
        None => Err(ParseError::Unknown),
        Some(noun) if noun.eq_ignore_ascii_case("pipeline") => tokens
            .get(2)
            .map(|name| name.to_string())
            .ok_or(ParseError::Incomplete("pipeline name")),
        Some(noun) => Err(ParseError::UnknownPart(noun.to_string())),
    }
}

fn parse_update_action(tokens: &[&str]) -> Result<UpdateAction, ParseError> {
    let Some(action) = tokens.first() else {
        return Err(ParseError::Incomplete("update action"));
    };

    match action.to_ascii_lowercase().as_str() {
        "schedule" => {
            let trigger_type = tokens
                .get(1)
                .ok_or(ParseError::Incomplete("trigger type"))?
                .to_string();
            let args = tokens[2..].iter().map(|t| t.to_string()).collect();
            Ok(UpdateAction::Schedule { trigger_type, args })
        }
        "unschedule" => Ok(UpdateAction::Unschedule),
        "add_task" => parse_task_addition(&tokens[1..]).map(UpdateAction::AddTask),
        _ => Err(ParseError::UnknownPart(action.to_string())),
    }
}

fn parse_task_addition(tokens: &[&str]) -> Result<TaskAddition, ParseError> {
    let Some(kind) = tokens.first() else {
        return Err(ParseError::Incomplete("task type"));
    };

    match kind.to_ascii_lowercase().as_str() {
        "file" => {
            let path = tokens[1..].join(" ");
            if path.is_empty() {
                return Err(ParseError::Incomplete("file path"));
            }
            Ok(TaskAddition::File(path))
        }
        "shell" => {
            let shell = tokens
                .get(1)
                .ok_or(ParseError::Incomplete("shell kind"))?
                .to_string();
            let command = tokens[2..].join(" ");
            if command.is_empty() {
                return Err(ParseError::Incomplete("shell command"));
            }
            Ok(TaskAddition::Shell { shell, command })
        }
        "func" => tokens
            .get(1)
            .map(|name| TaskAddition::Func(name.to_string()))
            .ok_or(ParseError::Incomplete("function name")),
        _ => Err(ParseError::UnknownPart(kind.to_string())),
    }
}
