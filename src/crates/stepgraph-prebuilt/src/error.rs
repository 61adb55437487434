//! Error types for the prebuilt research workflow
//!
//! Collaborator failures surface from inside a node as
//! [`NodeOutcome::Failed`](stepgraph_core::NodeOutcome::Failed), which aborts
//! the superstep and leaves the lineage at its last checkpoint.

use thiserror::Error;

/// Result type for prebuilt operations
pub type Result<T> = std::result::Result<T, ResearchError>;

#[derive(Error, Debug)]
pub enum ResearchError {
    /// The search collaborator failed
    #[error("Search failed: {0}")]
    Search(String),

    /// The text generator failed
    #[error("Generation failed: {0}")]
    Generation(String),

    /// A node read a channel that holds no value
    #[error("Channel '{0}' has no value")]
    MissingChannel(&'static str),

    /// Graph construction or execution error
    #[error("Graph error: {0}")]
    Graph(#[from] stepgraph_core::GraphError),
}
