//! Core graph data structures
//!
//! A [`Graph`] is pure data: named nodes with their step and execution mode,
//! directed edges between them, and the channels the nodes may write. It is
//! assembled through [`StateGraph`](crate::builder::StateGraph) and frozen when
//! compiled.
//!
//! # Graph Structure
//!
//! ```text
//!            __start__
//!                │
//!              trim
//!             ╱    ╲
//!        search    gen_backstory
//!           │            │
//!     confirm_docs  confirm_backstory
//!           │            │
//!        pruning         │
//!             ╲         ╱
//!              answer            (deferred: waits for both branches)
//!                │
//!             __end__
//! ```
//!
//! A [`NodeMode::Deferred`] node only becomes ready once every node with an edge
//! into it has completed, which makes it a barrier join for fan-out branches of
//! different lengths. Cycles are allowed; a run is bounded by its step limit.

use crate::error::GraphDefinitionError;
use crate::node::Step;
use crate::state::ChannelRegistry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Unique identifier for a node
pub type NodeId = String;

/// Virtual entry node; its successors form the first frontier
pub const START: &str = "__start__";

/// Virtual terminal node; reaching it schedules nothing further
pub const END: &str = "__end__";

/// When a node in the frontier may run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeMode {
    /// Runs in the superstep after any predecessor schedules it
    #[default]
    Normal,
    /// Waits until every in-edge source has completed
    Deferred,
}

/// Options for [`StateGraph::add_node_with`](crate::builder::StateGraph::add_node_with)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeOptions {
    pub mode: NodeMode,
    /// Opaque to the engine, e.g. `{"category": "docs"}`
    pub metadata: HashMap<String, Value>,
}

impl NodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deferred() -> Self {
        Self::new().with_mode(NodeMode::Deferred)
    }

    pub fn with_mode(mut self, mode: NodeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A node: its name, behavior, mode and metadata
#[derive(Clone)]
pub struct NodeSpec {
    pub name: NodeId,
    pub step: Arc<dyn Step>,
    pub mode: NodeMode,
    pub metadata: Arc<HashMap<String, Value>>,
}

impl std::fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeSpec")
            .field("name", &self.name)
            .field("step", &"<step>")
            .field("mode", &self.mode)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Nodes, edges and channels of a workflow
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: BTreeMap<NodeId, NodeSpec>,
    /// source -> targets
    edges: BTreeMap<NodeId, BTreeSet<NodeId>>,
    /// target -> sources
    in_edges: BTreeMap<NodeId, BTreeSet<NodeId>>,
    channels: ChannelRegistry,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Names must be unique and may not be `START` or `END`.
    pub fn add_node(
        &mut self,
        name: impl Into<NodeId>,
        step: Arc<dyn Step>,
        options: NodeOptions,
    ) -> Result<(), GraphDefinitionError> {
        let name = name.into();
        if name == START || name == END || self.nodes.contains_key(&name) {
            return Err(GraphDefinitionError::DuplicateNode(name));
        }
        self.nodes.insert(
            name.clone(),
            NodeSpec {
                name,
                step,
                mode: options.mode,
                metadata: Arc::new(options.metadata),
            },
        );
        Ok(())
    }

    /// Add a directed edge. `source` may be `START`, `target` may be `END`;
    /// every other endpoint must already be a node.
    pub fn add_edge(
        &mut self,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
    ) -> Result<(), GraphDefinitionError> {
        let source = source.into();
        let target = target.into();

        if source != START && !self.nodes.contains_key(&source) {
            return Err(GraphDefinitionError::UnknownNode(source));
        }
        if target != END && !self.nodes.contains_key(&target) {
            return Err(GraphDefinitionError::UnknownNode(target));
        }

        self.edges
            .entry(source.clone())
            .or_default()
            .insert(target.clone());
        self.in_edges.entry(target).or_default().insert(source);
        Ok(())
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    pub fn channels_mut(&mut self) -> &mut ChannelRegistry {
        &mut self.channels
    }

    pub fn node(&self, name: &str) -> Option<&NodeSpec> {
        self.nodes.get(name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeSpec> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Targets of the edges leaving `node`, in name order
    pub fn successors(&self, node: &str) -> impl Iterator<Item = &NodeId> {
        self.edges.get(node).into_iter().flatten()
    }

    /// Sources of the edges entering `node`, in name order
    pub fn predecessors(&self, node: &str) -> impl Iterator<Item = &NodeId> {
        self.in_edges.get(node).into_iter().flatten()
    }

    /// Whether `node` may run given the set of completed nodes.
    ///
    /// Normal nodes are always ready once scheduled; deferred nodes need every
    /// in-edge source to be in `completed`.
    pub fn is_ready(&self, node: &str, completed: &BTreeSet<NodeId>) -> bool {
        match self.nodes.get(node).map(|spec| spec.mode) {
            Some(NodeMode::Deferred) => self.predecessors(node).all(|p| completed.contains(p)),
            _ => true,
        }
    }

    /// Check the graph can run at all
    pub fn validate(&self) -> Result<(), GraphDefinitionError> {
        if self.successors(START).next().is_none() {
            return Err(GraphDefinitionError::NoEntryEdge);
        }
        Ok(())
    }
}
