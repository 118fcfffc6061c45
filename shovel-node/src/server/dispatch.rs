//! Command dispatch
//!
//! Turns one raw command line into one response string. Parsing happens
//! once in `shovel-core`; everything here is a single match over the
//! resulting [`Command`].

use serde_json::Value;
use shovel_core::domain::peer::PeerRecord;
use shovel_core::domain::trigger::TriggerArgs;
use shovel_core::protocol::{Command, TaskAddition, UpdateAction};
use tracing::{debug, info, warn};

use crate::node::Node;
use crate::pipeline::{PipelineError, TaskInput};

impl Node {
    /// Handles one command line and returns the response text
    pub async fn handle_command(&self, line: &str) -> String {
        let line = line.trim();
        self.log(&format!("Received command: {}", line));

        match Command::parse(line) {
            Ok(command) => self.dispatch(command).await,
            Err(e) => {
                debug!("Rejected command '{}': {}", line, e);
                e.to_string()
            }
        }
    }

    async fn dispatch(&self, command: Command) -> String {
        match command {
            Command::Welcome(record) => self.welcome(record),
            Command::ShowClients => match serde_json::to_string(&self.directory().records()) {
                Ok(json) => json,
                Err(e) => format!("Unable to list clients: {}", e),
            },
            Command::ShowPipelines => self.show_pipelines(),
            Command::RunPipeline(name) => match self.run_pipeline(&name, &[]).await {
                Ok(run) => run.summary(),
                Err(e) => e.to_string(),
            },
            Command::CreatePipeline(name) => match self.create_pipeline(&name) {
                Ok(()) => self.show_pipelines(),
                Err(PipelineError::Duplicate(_)) => {
                    format!("Pipeline with name {} already exists", name)
                }
                Err(e) => e.to_string(),
            },
            Command::RemovePipeline(name) => match self.remove_pipeline(&name) {
                Ok(()) => format!("{} removed from {}", name, self.name()),
                Err(e) => e.to_string(),
            },
            Command::UpdatePipeline { name, action } => {
                if !self.pipelines().contains(&name) {
                    return PipelineError::NotFound(name).to_string();
                }
                self.update_pipeline(&name, action)
            }
            Command::Shutdown => {
                info!("Shutting down by remote request");
                let reply = format!("Shutting down {}.", self.name());
                self.stop();
                reply
            }
        }
    }

    fn welcome(&self, record: PeerRecord) -> String {
        let reply = format!("Welcomed {}.", record.name);
        let (name, port) = (record.name.clone(), record.port);
        match self.directory().admit(record) {
            Ok(()) => info!("Welcomed {} on port {}", name, port),
            Err(existing) => warn!(
                "Ignoring welcome from {} on port {}: name already held by port {}",
                name, port, existing.port
            ),
        }
        reply
    }

    fn update_pipeline(&self, name: &str, action: UpdateAction) -> String {
        match action {
            UpdateAction::Schedule { trigger_type, args } => {
                let scheduled = parse_trigger_args(&args)
                    .and_then(|parsed| {
                        self.schedule_pipeline(name, &trigger_type, parsed)
                            .map_err(|e| e.to_string())
                    });
                match scheduled {
                    Ok(_) => format!("Scheduled {}", name),
                    Err(reason) => {
                        warn!("Unable to schedule '{}': {}", name, reason);
                        let attempted: Vec<String> = std::iter::once(trigger_type)
                            .chain(args)
                            .map(|token| format!("    - {}", token))
                            .collect();
                        format!(
                            "Unable to schedule {} with triggers:\n{}",
                            name,
                            attempted.join("\n")
                        )
                    }
                }
            }
            UpdateAction::Unschedule => match self.unschedule_pipeline(name) {
                Ok(_) => format!("{} has been unscheduled.", name),
                Err(e) => e.to_string(),
            },
            UpdateAction::AddTask(addition) => self.add_task_from_command(name, addition),
        }
    }

    fn add_task_from_command(&self, name: &str, addition: TaskAddition) -> String {
        let (input, confirmation) = match addition {
            TaskAddition::File(path) => {
                let confirmation = format!("{} added {} to tasks", name, path);
                (Ok(TaskInput::new().file(path)), confirmation)
            }
            TaskAddition::Shell { shell, command } => {
                let confirmation = format!("{} added {} command to tasks", name, shell);
                (Ok(TaskInput::new().shell(shell, command)), confirmation)
            }
            TaskAddition::Func(function) => {
                let confirmation = format!("{} added func {} to tasks", name, function);
                (
                    TaskInput::new().function(self.registry(), &function, Default::default()),
                    confirmation,
                )
            }
        };

        match input.and_then(|input| self.add_task(name, input)) {
            Ok(()) => confirmation,
            Err(e) => e.to_string(),
        }
    }
}

/// Splits `k=v` tokens into trigger args; values stay strings
fn parse_trigger_args(tokens: &[String]) -> Result<TriggerArgs, String> {
    tokens
        .iter()
        .map(|token| match token.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                Ok((key.to_string(), Value::String(value.to_string())))
            }
            _ => Err(format!("expected key=value, got '{}'", token)),
        })
        .collect()
}
