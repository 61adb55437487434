//! # stepgraph-checkpoint - Durable progress for graph runs
//!
//! Checkpoint data model and storage backends used by `stepgraph-core` to persist
//! a run after every superstep and to resume it later, possibly in another
//! process.
//!
//! ## Core Concepts
//!
//! - [`Checkpoint`] - Immutable snapshot: channel values, completed nodes, frontier,
//!   pending interrupts and pending writes
//! - [`CheckpointConfig`] - Identifies a lineage (`thread_id` + `checkpoint_ns`)
//! - [`CheckpointSaver`] - Append-only storage trait: `put`, `get_latest`, `list_history`
//!
//! ## Backends
//!
//! - [`InMemoryCheckpointSaver`] - Tests and single-process use
//! - [`FileCheckpointSaver`] - JSON-lines files, survives restarts
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   stepgraph-core executor               │
//! │   put() after each superstep            │
//! │   get_latest() at run start             │
//! └───────────────────┬─────────────────────┘
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │   CheckpointSaver (this crate)          │
//! └──────────┬───────────────────┬──────────┘
//!            ▼                   ▼
//!   ┌────────────────┐   ┌────────────────┐
//!   │   In-Memory    │   │  JSON-lines    │
//!   └────────────────┘   └────────────────┘
//! ```

pub mod checkpoint;
pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

// Re-export main types
pub use checkpoint::{
    ChannelValues, Checkpoint, CheckpointConfig, CheckpointId, CheckpointMetadata,
    CheckpointSource, PendingInterrupt, PendingWrite,
};
pub use error::{CheckpointError, Result};
pub use file::FileCheckpointSaver;
pub use memory::InMemoryCheckpointSaver;
pub use traits::{CheckpointSaver, CheckpointStream};
