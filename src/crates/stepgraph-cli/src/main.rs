//! # stepgraph
//!
//! Chat with the research workflow and inspect checkpoint history.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stepgraph_cli::{build_graph, chat, history, CliConfig};
use stepgraph_core::CheckpointConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stepgraph")]
#[command(about = "stepgraph - Human-in-the-loop research workflow", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, env = "STEPGRAPH_CONFIG", default_value = "stepgraph.toml")]
    config: PathBuf,

    /// Directory for checkpoint files (overrides the config file)
    #[arg(long, global = true)]
    checkpoint_dir: Option<PathBuf>,

    /// Checkpoint namespace (overrides the config file)
    #[arg(long, global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask questions and answer the workflow's confirmations
    Chat {
        /// Thread to continue (a new one is created when omitted)
        #[arg(long)]
        thread: Option<String>,
    },

    /// List the checkpoints of a thread
    History {
        /// Thread ID
        #[arg(long)]
        thread: String,
    },
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = CliConfig::load(&cli.config)?
        .with_checkpoint_dir(cli.checkpoint_dir)
        .with_namespace(cli.namespace);
    init_tracing(&config.log_level);
    match &config.source {
        Some(path) => tracing::debug!(path = %path.display(), "Loaded config"),
        None => tracing::debug!(
            path = %cli.config.display(),
            "Config file not found, using defaults"
        ),
    }

    let graph = build_graph(&config)?;

    match cli.command {
        Commands::Chat { thread } => {
            let thread = thread.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let lineage = CheckpointConfig::new(thread).with_checkpoint_ns(config.namespace.clone());
            println!("Thread: {}", lineage);

            let stdin = std::io::stdin();
            chat::run_chat(&graph, &lineage, stdin.lock(), std::io::stdout()).await
        }
        Commands::History { thread } => {
            let lineage = CheckpointConfig::new(thread).with_checkpoint_ns(config.namespace.clone());
            history::print_history(&graph, &lineage, std::io::stdout()).await
        }
    }
}
