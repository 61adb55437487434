//! Error types for graph definition and execution
//!
//! Everything that can go wrong while building or running a graph surfaces as a
//! [`GraphError`]. Definition problems are grouped under
//! [`GraphError::Definition`] so callers can tell "fix your graph" apart from
//! "this run failed".
//!
//! # Error Hierarchy
//!
//! ```text
//! GraphError
//! ├── Definition       - Graph structure errors, raised while building
//! ├── NodeExecution    - A node returned Failed; the superstep was aborted
//! ├── UnknownChannel   - A delta wrote an undeclared channel
//! ├── Stalled          - Only blocked deferred nodes remain in the frontier
//! ├── RecursionLimit   - max_steps supersteps ran without the run finishing
//! ├── ResumeMismatch   - Resume ids do not match the pending interrupts
//! ├── NoCheckpoint     - Continue/resume on a thread with no history
//! ├── ThreadBusy       - Another run is active on the same lineage
//! ├── InvalidInput     - Caller input has the wrong shape
//! ├── Checkpoint       - Persistence errors
//! └── Serialization    - JSON errors
//! ```
//!
//! Suspension is deliberately absent: a node asking for human input returns
//! [`NodeOutcome::Suspended`](crate::node::NodeOutcome::Suspended) and the run
//! surfaces it as [`StepOutput::Interrupt`](crate::stream::StepOutput::Interrupt).
//!
//! # Retrying
//!
//! Errors raised during a superstep never write a checkpoint, so the latest
//! checkpoint of the thread stays valid. A [`GraphError::NodeExecution`] can be
//! retried by streaming the thread again with
//! [`RunInput::Continue`](crate::stream::RunInput::Continue):
//!
//! ```rust,no_run
//! use stepgraph_core::{CompiledGraph, GraphError, RunInput};
//! use stepgraph_checkpoint::CheckpointConfig;
//!
//! # async fn example(graph: CompiledGraph) -> Result<(), GraphError> {
//! let config = CheckpointConfig::new("thread-1");
//! match graph.invoke(RunInput::Continue, &config).await {
//!     Err(e) if e.is_retryable() => {
//!         graph.invoke(RunInput::Continue, &config).await?;
//!     }
//!     other => {
//!         other?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use stepgraph_checkpoint::CheckpointError;
use thiserror::Error;

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Problems with the shape of a graph, detected while it is being built.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphDefinitionError {
    /// A node with this name already exists, or the name is reserved
    #[error("Node '{0}' is already defined")]
    DuplicateNode(String),

    /// An edge references a node that was never added
    #[error("Edge references undeclared node '{0}'")]
    UnknownNode(String),

    /// `__start__` has no outgoing edge, so nothing would ever run
    #[error("Graph has no edge leaving '__start__'")]
    NoEntryEdge,

    /// A channel with this name is already declared
    #[error("Channel '{0}' is already declared")]
    DuplicateChannel(String),
}

/// Main error type for graph operations
#[derive(Error, Debug)]
pub enum GraphError {
    /// Graph structure is invalid
    #[error("Graph definition error: {0}")]
    Definition(#[from] GraphDefinitionError),

    /// A node returned a failure; nothing from its superstep was committed
    #[error("Node '{node}' failed at step {step}: {error}")]
    NodeExecution {
        /// Name of the node that failed
        node: String,
        /// Lineage step the aborted superstep would have produced
        step: i64,
        /// Error message reported by the node
        error: String,
    },

    /// A delta wrote a channel that was never declared
    #[error("Node '{node}' wrote undeclared channel '{channel}'")]
    UnknownChannel { node: String, channel: String },

    /// Every node left in the frontier is a deferred node still waiting on an in-edge
    #[error("Run stalled at step {step}: deferred nodes {blocked:?} can never become ready")]
    Stalled { step: i64, blocked: Vec<String> },

    /// The run did not finish within the configured number of supersteps
    #[error("Recursion limit of {limit} supersteps reached without finishing")]
    RecursionLimit { limit: usize },

    /// Resume ids do not match the interrupts the thread is waiting on
    #[error("Resume ids {unknown:?} do not match pending interrupts {pending:?}")]
    ResumeMismatch {
        unknown: Vec<String>,
        pending: Vec<String>,
    },

    /// There is no checkpoint to continue or resume from
    #[error("No checkpoint found for '{0}'")]
    NoCheckpoint(String),

    /// Another run holds the lineage
    #[error("Thread '{0}' already has an active run")]
    ThreadBusy(String),

    /// Caller input could not be interpreted
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Checkpoint persistence failed
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// JSON serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GraphError {
    /// Create a node execution error
    pub fn node_execution(node: impl Into<String>, step: i64, error: impl Into<String>) -> Self {
        Self::NodeExecution {
            node: node.into(),
            step,
            error: error.into(),
        }
    }

    /// Create an unknown channel error
    pub fn unknown_channel(node: impl Into<String>, channel: impl Into<String>) -> Self {
        Self::UnknownChannel {
            node: node.into(),
            channel: channel.into(),
        }
    }

    /// Whether re-running the thread with `RunInput::Continue` can succeed.
    ///
    /// Only node failures qualify: the superstep is rolled back and re-entered
    /// from the last checkpoint.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NodeExecution { .. })
    }
}
