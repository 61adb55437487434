//! StateGraph builder API
//!
//! [`StateGraph`] collects channels, nodes and edges and compiles them, together
//! with a checkpointer, into an executable [`CompiledGraph`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use stepgraph_core::{NodeOutcome, Reducer, RunInput, StateDelta, StateGraph, StepContext, END, START};
//! use stepgraph_checkpoint::CheckpointConfig;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut graph = StateGraph::new();
//! graph.add_channel("log", Reducer::Append)?;
//!
//! graph.add_node("a", |_ctx: StepContext| {
//!     Box::pin(async move { NodeOutcome::completed(StateDelta::new().set("log", json!(1))) })
//! })?;
//! graph.add_node("b", |_ctx: StepContext| {
//!     Box::pin(async move { NodeOutcome::completed(StateDelta::new().set("log", json!(2))) })
//! })?;
//! graph.add_deferred_node("join", |ctx: StepContext| {
//!     Box::pin(async move {
//!         let seen = ctx.state().get_array("log").len();
//!         NodeOutcome::completed(StateDelta::new().set("log", json!(seen)))
//!     })
//! })?;
//!
//! graph.add_edge(START, "a")?;
//! graph.add_edge(START, "b")?;
//! graph.add_edge("a", "join")?;
//! graph.add_edge("b", "join")?;
//! graph.add_edge("join", END)?;
//!
//! let compiled = graph.compile_in_memory()?;
//! let outcome = compiled
//!     .invoke(RunInput::State(Default::default()), &CheckpointConfig::new("thread-1"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::compiled::CompiledGraph;
use crate::error::Result;
use crate::executor::ExecutorConfig;
use crate::graph::{Graph, NodeId, NodeOptions};
use crate::node::{FnStep, NodeOutcome, Step, StepContext};
use crate::state::Reducer;
use futures::future::BoxFuture;
use serde_json::Value;
use stepgraph_checkpoint::{CheckpointSaver, InMemoryCheckpointSaver};
use std::sync::Arc;

/// Builder for executable graphs
#[derive(Debug, Clone, Default)]
pub struct StateGraph {
    graph: Graph,
    config: ExecutorConfig,
}

impl StateGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a channel with no default
    pub fn add_channel(&mut self, name: impl Into<String>, reducer: Reducer) -> Result<&mut Self> {
        self.graph.channels_mut().declare(name, reducer, None)?;
        Ok(self)
    }

    /// Declare a channel whose default is seeded into every fresh thread
    pub fn add_channel_with_default(
        &mut self,
        name: impl Into<String>,
        reducer: Reducer,
        default: Value,
    ) -> Result<&mut Self> {
        self.graph
            .channels_mut()
            .declare(name, reducer, Some(default))?;
        Ok(self)
    }

    /// Add a normal node backed by an async closure
    pub fn add_node<F>(&mut self, name: impl Into<NodeId>, step: F) -> Result<&mut Self>
    where
        F: Fn(StepContext) -> BoxFuture<'static, NodeOutcome> + Send + Sync + 'static,
    {
        self.add_node_with(name, step, NodeOptions::new())
    }

    /// Add a deferred (barrier join) node backed by an async closure
    pub fn add_deferred_node<F>(&mut self, name: impl Into<NodeId>, step: F) -> Result<&mut Self>
    where
        F: Fn(StepContext) -> BoxFuture<'static, NodeOutcome> + Send + Sync + 'static,
    {
        self.add_node_with(name, step, NodeOptions::deferred())
    }

    /// Add a node backed by an async closure with explicit mode and metadata
    pub fn add_node_with<F>(
        &mut self,
        name: impl Into<NodeId>,
        step: F,
        options: NodeOptions,
    ) -> Result<&mut Self>
    where
        F: Fn(StepContext) -> BoxFuture<'static, NodeOutcome> + Send + Sync + 'static,
    {
        self.add_step(name, Arc::new(FnStep(step)), options)
    }

    /// Add a node backed by any [`Step`] implementation
    pub fn add_step(
        &mut self,
        name: impl Into<NodeId>,
        step: Arc<dyn Step>,
        options: NodeOptions,
    ) -> Result<&mut Self> {
        self.graph.add_node(name, step, options)?;
        Ok(self)
    }

    /// Add a directed edge; `source` may be [`START`](crate::START), `target` may be [`END`](crate::END)
    pub fn add_edge(
        &mut self,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
    ) -> Result<&mut Self> {
        self.graph.add_edge(source, target)?;
        Ok(self)
    }

    /// Maximum supersteps per run call
    pub fn with_max_steps(&mut self, max_steps: usize) -> &mut Self {
        self.config.max_steps = max_steps;
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Validate and freeze the graph, persisting runs through `checkpointer`
    pub fn compile(self, checkpointer: Arc<dyn CheckpointSaver>) -> Result<CompiledGraph> {
        self.graph.validate()?;
        tracing::debug!(
            nodes = self.graph.node_count(),
            channels = self.graph.channels().len(),
            max_steps = self.config.max_steps,
            "Compiled graph"
        );
        Ok(CompiledGraph::new(self.graph, checkpointer, self.config))
    }

    /// Compile with a fresh [`InMemoryCheckpointSaver`]
    pub fn compile_in_memory(self) -> Result<CompiledGraph> {
        self.compile(Arc::new(InMemoryCheckpointSaver::new()))
    }
}
