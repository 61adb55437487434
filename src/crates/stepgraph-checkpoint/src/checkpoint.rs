//! Core checkpoint data structures for run persistence and resume
//!
//! A [`Checkpoint`] is an immutable snapshot of a run's progress after a superstep:
//! the channel values, the set of completed nodes, the frontier still to run, and
//! anything the run is waiting on (pending interrupts and the writes of siblings
//! that finished before a suspension).
//!
//! # Lineage
//!
//! Checkpoints are grouped into lineages identified by a [`CheckpointConfig`]
//! (`thread_id` + `checkpoint_ns`). Inside a lineage every checkpoint has a unique,
//! strictly increasing `step`:
//!
//! ```text
//! step -1  Input      state = defaults + input, frontier = successors(START)
//! step  0  Loop       after superstep 0 committed
//! step  1  Interrupt  superstep 1 suspended, frontier unchanged, interrupts pending
//! step  2  Loop       superstep 1 committed after resume
//! ```
//!
//! Checkpoints are never mutated once stored. Resuming always reads the latest one.
//!
//! # Example
//!
//! ```rust
//! use stepgraph_checkpoint::{Checkpoint, CheckpointMetadata, CheckpointSource};
//! use std::collections::BTreeMap;
//! use serde_json::json;
//!
//! let mut values = BTreeMap::new();
//! values.insert("question".to_string(), json!("why is the sky blue?"));
//!
//! let checkpoint = Checkpoint::new(-1, values)
//!     .with_frontier(["trim".to_string()])
//!     .with_metadata(CheckpointMetadata::new().with_source(CheckpointSource::Input));
//!
//! assert!(!checkpoint.is_terminal());
//! assert!(!checkpoint.is_suspended());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use uuid::Uuid;

/// Checkpoint ID type
pub type CheckpointId = String;

/// Channel values captured by a checkpoint, ordered by channel name.
pub type ChannelValues = BTreeMap<String, serde_json::Value>;

/// An interrupt raised by a node and not yet resolved.
///
/// Stored with the checkpoint so a suspended run can be resumed from another process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingInterrupt {
    /// Identity the caller uses to address the resume value
    pub interrupt_id: String,
    /// Node that suspended
    pub node: String,
    /// Caller-visible payload (e.g. a question to ask the user)
    pub payload: serde_json::Value,
}

impl PendingInterrupt {
    /// Create a pending interrupt with a fresh identity
    pub fn new(node: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            interrupt_id: Uuid::new_v4().to_string(),
            node: node.into(),
            payload,
        }
    }
}

/// Delta of a node that completed in a superstep that a sibling suspended.
///
/// Replayed on resume instead of re-invoking the node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingWrite {
    pub node: String,
    pub delta: ChannelValues,
}

impl PendingWrite {
    pub fn new(node: impl Into<String>, delta: ChannelValues) -> Self {
        Self {
            node: node.into(),
            delta,
        }
    }
}

/// Metadata source type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// Written when a run starts from caller input
    Input,
    /// Written after a committed superstep
    Loop,
    /// Written when a superstep suspended on one or more interrupts
    Interrupt,
}

/// Metadata associated with a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CheckpointMetadata {
    /// The source of the checkpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<CheckpointSource>,

    /// ID of the checkpoint this one was derived from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CheckpointId>,

    /// Nodes whose deltas were committed to produce this checkpoint
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub writes: Vec<String>,

    /// Additional custom metadata
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl CheckpointMetadata {
    /// Create a new checkpoint metadata
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the source
    pub fn with_source(mut self, source: CheckpointSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the parent checkpoint
    pub fn with_parent(mut self, parent_id: CheckpointId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Set the nodes whose writes were committed
    pub fn with_writes(mut self, writes: Vec<String>) -> Self {
        self.writes = writes;
        self
    }

    /// Add custom metadata
    pub fn with_extra(mut self, key: String, value: serde_json::Value) -> Self {
        self.extra.insert(key, value);
        self
    }
}

/// Snapshot of a run at a given step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    /// The version of the checkpoint format (currently 1)
    pub v: i32,

    /// Unique ID of the checkpoint
    pub id: CheckpointId,

    /// The timestamp of the checkpoint
    pub ts: DateTime<Utc>,

    /// Position in the lineage; strictly increasing, -1 for the first input checkpoint
    pub step: i64,

    /// Channel values after the step
    pub channel_values: ChannelValues,

    /// Nodes that have completed so far in the current run
    pub completed: BTreeSet<String>,

    /// Nodes eligible for the next superstep
    pub frontier: BTreeSet<String>,

    /// Interrupts waiting for a resume value
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_interrupts: Vec<PendingInterrupt>,

    /// Writes of nodes that completed in the suspended superstep
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_writes: Vec<PendingWrite>,

    #[serde(default)]
    pub metadata: CheckpointMetadata,
}

impl Checkpoint {
    /// Current checkpoint format version
    pub const CURRENT_VERSION: i32 = 1;

    /// Create a checkpoint at `step` with the given channel values
    pub fn new(step: i64, channel_values: ChannelValues) -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            id: Uuid::new_v4().to_string(),
            ts: Utc::now(),
            step,
            channel_values,
            completed: BTreeSet::new(),
            frontier: BTreeSet::new(),
            pending_interrupts: Vec::new(),
            pending_writes: Vec::new(),
            metadata: CheckpointMetadata::default(),
        }
    }

    /// Create an empty checkpoint at `step`
    pub fn empty(step: i64) -> Self {
        Self::new(step, ChannelValues::new())
    }

    pub fn with_completed(mut self, completed: impl IntoIterator<Item = String>) -> Self {
        self.completed = completed.into_iter().collect();
        self
    }

    pub fn with_frontier(mut self, frontier: impl IntoIterator<Item = String>) -> Self {
        self.frontier = frontier.into_iter().collect();
        self
    }

    pub fn with_pending_interrupts(mut self, interrupts: Vec<PendingInterrupt>) -> Self {
        self.pending_interrupts = interrupts;
        self
    }

    pub fn with_pending_writes(mut self, writes: Vec<PendingWrite>) -> Self {
        self.pending_writes = writes;
        self
    }

    pub fn with_metadata(mut self, metadata: CheckpointMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// The run recorded by this checkpoint has nothing left to do
    pub fn is_terminal(&self) -> bool {
        self.frontier.is_empty() && self.pending_interrupts.is_empty()
    }

    /// The run recorded by this checkpoint is waiting on resume values
    pub fn is_suspended(&self) -> bool {
        !self.pending_interrupts.is_empty()
    }
}

/// Identifies a checkpoint lineage
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CheckpointConfig {
    /// Thread ID for grouping related checkpoints
    pub thread_id: String,

    /// Checkpoint namespace inside the thread
    #[serde(default)]
    pub checkpoint_ns: String,
}

impl CheckpointConfig {
    /// Create a configuration for `thread_id` in the default (empty) namespace
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            checkpoint_ns: String::new(),
        }
    }

    /// Set the checkpoint namespace
    pub fn with_checkpoint_ns(mut self, checkpoint_ns: impl Into<String>) -> Self {
        self.checkpoint_ns = checkpoint_ns.into();
        self
    }

    pub(crate) fn validate(&self) -> crate::Result<()> {
        if self.thread_id.is_empty() {
            return Err(crate::CheckpointError::Invalid(
                "thread_id is required".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Display for CheckpointConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.checkpoint_ns.is_empty() {
            write!(f, "{}", self.thread_id)
        } else {
            write!(f, "{}/{}", self.thread_id, self.checkpoint_ns)
        }
    }
}
