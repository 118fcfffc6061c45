//! Plaintext command protocol
//!
//! Nodes talk to each other (and the CLI talks to nodes) with one
//! whitespace-tokenized command per TCP connection. This module turns a raw
//! command line into a [`Command`] once, so the node can dispatch with a
//! single `match` instead of re-inspecting tokens.
//!
//! The [`Display`](std::fmt::Display) impl renders a command back into its
//! wire form, which is what senders put on the socket.

mod parse;

pub use parse::ParseError;

use std::fmt;

use crate::domain::peer::PeerRecord;

/// A parsed protocol command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `welcome <json>`: merge one peer record into the directory
    Welcome(PeerRecord),
    /// `show clients`
    ShowClients,
    /// `show pipelines`
    ShowPipelines,
    /// `run pipeline <name>`
    RunPipeline(String),
    /// `create pipeline <name>`
    CreatePipeline(String),
    /// `remove pipeline <name>`
    RemovePipeline(String),
    /// `update pipeline <name> ...`
    UpdatePipeline { name: String, action: UpdateAction },
    /// `shutdown`
    Shutdown,
}

/// What an `update pipeline` command changes
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    /// `schedule <trigger> k=v...`
    ///
    /// Arguments are kept as raw tokens so a failed attempt can be echoed
    /// back exactly as it was typed.
    Schedule {
        trigger_type: String,
        args: Vec<String>,
    },
    /// `unschedule`
    Unschedule,
    /// `add_task <kind> ...`
    AddTask(TaskAddition),
}

/// Task supplied through `update pipeline <name> add_task`
#[derive(Debug, Clone, PartialEq)]
pub enum TaskAddition {
    /// `add_task file <path>` (the path may contain spaces)
    File(String),
    /// `add_task shell <kind> <command...>`
    Shell { shell: String, command: String },
    /// `add_task func <registered name>`
    Func(String),
}

impl Command {
    /// Parses one raw command line
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        parse::parse_command(line)
    }
}

impl std::str::FromStr for Command {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::parse(s)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Welcome(record) => {
                let json = serde_json::to_string(record).map_err(|_| fmt::Error)?;
                write!(f, "welcome {}", json)
            }
            Command::ShowClients => f.write_str("show clients"),
            Command::ShowPipelines => f.write_str("show pipelines"),
            Command::RunPipeline(name) => write!(f, "run pipeline {}", name),
            Command::CreatePipeline(name) => write!(f, "create pipeline {}", name),
            Command::RemovePipeline(name) => write!(f, "remove pipeline {}", name),
            Command::UpdatePipeline { name, action } => {
                write!(f, "update pipeline {} ", name)?;
                match action {
                    UpdateAction::Schedule { trigger_type, args } => {
                        write!(f, "schedule {}", trigger_type)?;
                        for arg in args {
                            write!(f, " {}", arg)?;
                        }
                        Ok(())
                    }
                    UpdateAction::Unschedule => f.write_str("unschedule"),
                    UpdateAction::AddTask(TaskAddition::File(path)) => {
                        write!(f, "add_task file {}", path)
                    }
                    UpdateAction::AddTask(TaskAddition::Shell { shell, command }) => {
                        write!(f, "add_task shell {} {}", shell, command)
                    }
                    UpdateAction::AddTask(TaskAddition::Func(name)) => {
                        write!(f, "add_task func {}", name)
                    }
                }
            }
            Command::Shutdown => f.write_str("shutdown"),
        }
    }
}
