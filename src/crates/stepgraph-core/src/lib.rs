//! # stepgraph-core - Superstep workflow execution
//!
//! Runs a declared directed graph of asynchronous steps over shared state, with
//! fan-out/fan-in parallelism, human-in-the-loop suspension and durable resume.
//!
//! ## Core Concepts
//!
//! - [`StateGraph`] - Builder: channels with reducers, nodes, edges
//! - [`Step`] / [`NodeOutcome`] - A node's behavior and its tagged result
//!   (`Completed`, `Suspended`, `Failed`)
//! - [`StateStore`] - Applies the deltas of a superstep in node-name order
//! - [`CompiledGraph`] - Streams runs, resumes interrupts, exposes history
//!
//! ## Execution Model
//!
//! Execution proceeds in supersteps. All ready nodes of the frontier run
//! concurrently against the same state snapshot; their deltas are applied
//! together at the barrier and a checkpoint is written. A node declared with
//! [`NodeMode::Deferred`] waits until every node with an edge into it has
//! completed, which turns it into a join point for branches of different
//! lengths.
//!
//! ```text
//! superstep 0:  trim
//! superstep 1:  search          gen_backstory
//! superstep 2:  confirm_docs    confirm_backstory   ← both suspend, run hands back control
//! superstep 2:  confirm_docs    confirm_backstory   ← re-entered with resume values
//! superstep 3:  pruning         answer (blocked: pruning not yet completed)
//! superstep 4:  answer
//! ```
//!
//! ## Persistence
//!
//! Checkpoints are written through any
//! [`CheckpointSaver`](stepgraph_checkpoint::CheckpointSaver); see the
//! `stepgraph-checkpoint` crate for the in-memory and file backends.

pub mod builder;
pub mod compiled;
pub mod error;
pub mod executor;
pub mod graph;
pub mod interrupt;
pub mod node;
pub mod state;
pub mod stream;

pub use builder::StateGraph;
pub use compiled::{CompiledGraph, StateSnapshot};
pub use error::{GraphDefinitionError, GraphError, Result};
pub use executor::{ExecutorConfig, DEFAULT_MAX_STEPS};
pub use graph::{Graph, NodeId, NodeMode, NodeOptions, NodeSpec, END, START};
pub use interrupt::{match_resume, Interrupt, InterruptStatus, ResumeCommand, ResumePlan};
pub use node::{FnStep, NodeError, NodeOutcome, Step, StepContext, Suspend};
pub use state::{ChannelRegistry, ChannelSpec, Reducer, State, StateDelta, StateStore};
pub use stream::{RunInput, RunOutcome, RunStream, StepOutput, INTERRUPT};

// Re-exported so callers can name lineages without a direct dependency
pub use stepgraph_checkpoint::CheckpointConfig;
