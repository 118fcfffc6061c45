//! Shovel Node binary
//!
//! Starts one worker: loads its configuration, claims a port in the
//! discovery range, serves commands and runs scheduled pipelines until a
//! `shutdown` command or Ctrl+C.

use anyhow::{Context, Result, bail};
use clap::Parser;
use shovel_core::domain::task::TaskParams;
use shovel_core::dto::config::ConfigDocument;
use shovel_node::persistence::read_document;
use shovel_node::{FunctionRegistry, Node, NodeConfig, Pipeline, TaskInput};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "shovel-node")]
#[command(about = "Shovel pipeline worker", long_about = None)]
struct Args {
    /// Display name of this node
    #[arg(long, env = "SHOVEL_NAME")]
    name: Option<String>,

    /// Configuration document to load pipelines and schedules from
    #[arg(long, env = "SHOVEL_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind and probe
    #[arg(long)]
    host: Option<String>,

    /// Base of the discovery port range
    #[arg(long)]
    base_port: Option<u16>,

    /// Write the configuration document back on shutdown
    #[arg(long, requires = "config")]
    save_on_exit: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shovel_node=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let document = match &args.config {
        Some(path) => Some(
            read_document(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
        ),
        None => None,
    };

    let config = load_config(&args, document.as_ref())?;
    info!("Starting Shovel node '{}'", config.name);

    let node = Arc::new(
        Node::builder(config)
            .registry(FunctionRegistry::with_builtins())
            .build(),
    );

    match &document {
        Some(document) => node
            .apply_document(document)
            .context("Failed to apply config file")?,
        None => seed_sample_pipeline(&node)?,
    }

    node.clone().run().await?;

    if args.save_on_exit {
        if let Some(path) = &args.config {
            node.save_config(path)
                .with_context(|| format!("Failed to save config to {}", path.display()))?;
        }
    }

    Ok(())
}

/// Resolves settings from the environment, then the command line
///
/// The name comes from `--name`/`SHOVEL_NAME`, falling back to the config
/// document; one of them is required.
fn load_config(args: &Args, document: Option<&ConfigDocument>) -> Result<NodeConfig> {
    let mut config = NodeConfig::from_env()?;

    config.name = match (&args.name, document) {
        (Some(name), _) => name.clone(),
        (None, Some(document)) => {
            config.id = document.client_id;
            document.client_name.clone()
        }
        (None, None) => bail!("Must specify client name or config file."),
    };
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(base_port) = args.base_port {
        config.base_port = base_port;
    }

    config.validate()?;
    Ok(config)
}

/// Pipeline every fresh node starts with: one `sample` task, weekdays at 01:00
fn seed_sample_pipeline(node: &Node) -> Result<()> {
    let mut pipeline = Pipeline::new("P1");
    pipeline.add_task(TaskInput::new().function(node.registry(), "sample", TaskParams::new())?)?;
    node.add_pipeline(pipeline)?;

    let trigger = serde_json::from_value(serde_json::json!({
        "hour": "1",
        "minute": "0",
        "day_of_week": "mon-fri"
    }))?;
    node.schedule_pipeline("P1", "cron", trigger)?;
    Ok(())
}
