//! # stepgraph-cli
//!
//! Terminal front-end for the research workflow: an interactive chat loop that
//! answers interrupts from stdin, and a history view of a thread's checkpoints.
//! Checkpoints are written to disk, so a conversation can be resumed by
//! passing the same `--thread` after a restart.

pub mod chat;
pub mod config;
pub mod history;

use anyhow::Result;
use std::sync::Arc;
use stepgraph_checkpoint::FileCheckpointSaver;
use stepgraph_core::CompiledGraph;
use stepgraph_prebuilt::{build_research_graph, StaticSearcher, TemplateGenerator};

pub use config::{CliConfig, SearchConfig};

/// Build the research workflow over the configured document set and checkpoint directory
pub fn build_graph(config: &CliConfig) -> Result<CompiledGraph> {
    let searcher = StaticSearcher::new(config.search.documents.clone())
        .with_max_results(config.search.max_results);

    let mut graph = build_research_graph(Arc::new(searcher), Arc::new(TemplateGenerator::default()))?;
    graph.with_max_steps(config.max_steps);

    let saver = FileCheckpointSaver::new(&config.checkpoint_dir);
    Ok(graph.compile(Arc::new(saver))?)
}
