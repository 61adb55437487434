//! Storage backend abstraction for checkpoints
//!
//! [`CheckpointSaver`] is the only interface the executor uses to persist and
//! recover progress. Implementations must be append-only per lineage and must
//! reject a checkpoint whose `step` is not strictly after the latest stored one,
//! which is how two loops racing on the same thread are detected:
//!
//! ```text
//! loop A: get_latest -> step 4 ... put(step 5)  ok
//! loop B: get_latest -> step 4 ... put(step 5)  Conflict { step: 5, latest: 5 }
//! ```
//!
//! The check and the append must be atomic with respect to every writer the
//! backend claims to coordinate. Both built-in backends coordinate writers that
//! share a saver instance; see [`FileCheckpointSaver`](crate::FileCheckpointSaver)
//! for writers in separate processes.

use crate::{
    checkpoint::{Checkpoint, CheckpointConfig},
    error::Result,
};
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;

/// Type alias for async stream of checkpoints
pub type CheckpointStream = Pin<Box<dyn Stream<Item = Result<Checkpoint>> + Send + 'static>>;

/// Core trait for implementing checkpoint storage backends
///
/// ## Thread Safety
///
/// Implementations must be thread-safe (`Send + Sync`) to support
/// concurrent graph executions on different threads.
///
/// ## Example: Custom Backend
///
/// ```rust,no_run
/// use stepgraph_checkpoint::{Checkpoint, CheckpointConfig, CheckpointSaver, CheckpointStream, Result};
/// use async_trait::async_trait;
///
/// struct NullSaver;
///
/// #[async_trait]
/// impl CheckpointSaver for NullSaver {
///     async fn put(&self, _config: &CheckpointConfig, _checkpoint: Checkpoint) -> Result<()> {
///         Ok(())
///     }
///
///     async fn get_latest(&self, _config: &CheckpointConfig) -> Result<Option<Checkpoint>> {
///         Ok(None)
///     }
///
///     async fn list_history(&self, _config: &CheckpointConfig) -> Result<CheckpointStream> {
///         Ok(Box::pin(futures::stream::empty()))
///     }
/// }
/// ```
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Append a checkpoint to the lineage identified by `config`
    ///
    /// # Errors
    ///
    /// - [`CheckpointError::Conflict`](crate::CheckpointError::Conflict) if the lineage
    ///   already holds a checkpoint at or after `checkpoint.step`
    /// - [`CheckpointError::Invalid`](crate::CheckpointError::Invalid) if `thread_id` is empty
    async fn put(&self, config: &CheckpointConfig, checkpoint: Checkpoint) -> Result<()>;

    /// Fetch the most recently stored checkpoint of the lineage
    async fn get_latest(&self, config: &CheckpointConfig) -> Result<Option<Checkpoint>>;

    /// All checkpoints of the lineage in ascending step order
    async fn list_history(&self, config: &CheckpointConfig) -> Result<CheckpointStream>;

    /// Fetch the checkpoint stored at `step`, if any
    async fn get(&self, config: &CheckpointConfig, step: i64) -> Result<Option<Checkpoint>> {
        let mut history = self.list_history(config).await?;
        while let Some(checkpoint) = history.next().await {
            let checkpoint = checkpoint?;
            if checkpoint.step == step {
                return Ok(Some(checkpoint));
            }
        }
        Ok(None)
    }

    /// Delete all checkpoints associated with a thread, in every namespace
    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let _ = thread_id;
        Ok(())
    }
}
