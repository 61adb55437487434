//! Executable graphs
//!
//! A [`CompiledGraph`] is cheap to clone and safe to share between tasks. Every
//! run call names a lineage through a [`CheckpointConfig`]; different lineages
//! run independently, a second concurrent run on the same lineage fails with
//! [`GraphError::ThreadBusy`](crate::GraphError::ThreadBusy).
//!
//! # Human-in-the-loop round trip
//!
//! ```rust,no_run
//! use stepgraph_core::{CompiledGraph, ResumeCommand, RunInput, RunOutcome, StateDelta};
//! use stepgraph_checkpoint::CheckpointConfig;
//! use serde_json::json;
//!
//! # async fn example(graph: CompiledGraph) -> Result<(), Box<dyn std::error::Error>> {
//! let config = CheckpointConfig::new("thread-1").with_checkpoint_ns("para");
//! let input = StateDelta::new().set("question", json!("who was Ada Lovelace?"));
//!
//! let mut outcome = graph.invoke(RunInput::State(input), &config).await?;
//! while let RunOutcome::Interrupted(interrupts) = outcome {
//!     let command: ResumeCommand = interrupts
//!         .iter()
//!         .map(|i| (i.interrupt_id.clone(), json!("y")))
//!         .collect();
//!     outcome = graph.invoke(RunInput::Resume(command), &config).await?;
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::executor::{Engine, ExecutorConfig, RunLoop, SuperstepResult};
use crate::graph::{Graph, NodeId};
use crate::interrupt::Interrupt;
use crate::state::State;
use crate::stream::{RunInput, RunOutcome, RunStream, StepOutput};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use stepgraph_checkpoint::{Checkpoint, CheckpointConfig, CheckpointSaver, CheckpointSource};
use std::collections::BTreeSet;
use std::sync::Arc;

/// A validated graph bound to a checkpointer
#[derive(Clone)]
pub struct CompiledGraph {
    engine: Arc<Engine>,
}

impl std::fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("nodes", &self.engine.graph.node_count())
            .field("config", &self.engine.config)
            .finish()
    }
}

impl CompiledGraph {
    pub(crate) fn new(
        graph: Graph,
        checkpointer: Arc<dyn CheckpointSaver>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            engine: Arc::new(Engine::new(graph, checkpointer, config)),
        }
    }

    #[cfg(test)]
    pub(crate) fn engine(&self) -> Arc<Engine> {
        Arc::clone(&self.engine)
    }

    pub fn graph(&self) -> &Graph {
        &self.engine.graph
    }

    pub fn config(&self) -> ExecutorConfig {
        self.engine.config
    }

    pub fn checkpointer(&self) -> Arc<dyn CheckpointSaver> {
        Arc::clone(&self.engine.saver)
    }

    /// Run the lineage named by `config`, yielding per-node updates.
    ///
    /// The stream ends after the last superstep, after an
    /// [`StepOutput::Interrupt`], or after the first error.
    pub fn stream(&self, input: RunInput, config: &CheckpointConfig) -> RunStream {
        let engine = Arc::clone(&self.engine);
        let config = config.clone();

        Box::pin(async_stream::stream! {
            let mut run = match RunLoop::start(engine, config, input).await {
                Ok(run) => run,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            loop {
                match run.superstep().await {
                    Ok(Some(SuperstepResult::Committed(writes))) => {
                        for (node, delta) in writes {
                            yield Ok(StepOutput::Update { node, delta });
                        }
                    }
                    Ok(Some(SuperstepResult::Suspended(interrupts))) => {
                        yield Ok(StepOutput::Interrupt(interrupts));
                        break;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        })
    }

    /// Run to completion or suspension and return the outcome
    pub async fn invoke(&self, input: RunInput, config: &CheckpointConfig) -> Result<RunOutcome> {
        let mut stream = self.stream(input, config);
        while let Some(output) = stream.next().await {
            if let StepOutput::Interrupt(interrupts) = output? {
                return Ok(RunOutcome::Interrupted(interrupts));
            }
        }
        drop(stream);

        let state = self
            .engine
            .saver
            .get_latest(config)
            .await?
            .map(|checkpoint| State::from(checkpoint.channel_values))
            .unwrap_or_default();
        Ok(RunOutcome::Completed(state))
    }

    /// Snapshot of the latest checkpoint of a lineage
    pub async fn get_state(&self, config: &CheckpointConfig) -> Result<Option<StateSnapshot>> {
        Ok(self
            .engine
            .saver
            .get_latest(config)
            .await?
            .map(StateSnapshot::from))
    }

    /// Every checkpoint of a lineage, oldest first
    pub async fn get_state_history(&self, config: &CheckpointConfig) -> Result<Vec<StateSnapshot>> {
        let mut history = self.engine.saver.list_history(config).await?;
        let mut snapshots = Vec::new();
        while let Some(checkpoint) = history.next().await {
            snapshots.push(StateSnapshot::from(checkpoint?));
        }
        Ok(snapshots)
    }
}

/// Read-only view of one checkpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub values: State,
    /// Nodes scheduled for the next superstep
    pub next: BTreeSet<NodeId>,
    pub completed: BTreeSet<NodeId>,
    pub interrupts: Vec<Interrupt>,
    pub step: i64,
    pub source: Option<CheckpointSource>,
    pub checkpoint_id: String,
    pub created_at: DateTime<Utc>,
}

impl StateSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.next.is_empty() && self.interrupts.is_empty()
    }
}

impl From<Checkpoint> for StateSnapshot {
    fn from(checkpoint: Checkpoint) -> Self {
        Self {
            values: State::from(checkpoint.channel_values),
            next: checkpoint.frontier,
            completed: checkpoint.completed,
            interrupts: checkpoint.pending_interrupts,
            step: checkpoint.step,
            source: checkpoint.metadata.source,
            checkpoint_id: checkpoint.id,
            created_at: checkpoint.ts,
        }
    }
}
