//! In-memory checkpoint storage for development and testing
//!
//! [`InMemoryCheckpointSaver`] keeps every lineage in a `tokio::sync::RwLock`
//! protected map. Cloning the saver shares the storage, so a test can hand one
//! clone to a compiled graph and inspect the history through another.
//!
//! Data is lost when the process exits; use
//! [`FileCheckpointSaver`](crate::file::FileCheckpointSaver) to resume across
//! process boundaries.

use crate::{
    checkpoint::{Checkpoint, CheckpointConfig},
    error::{CheckpointError, Result},
    traits::{CheckpointSaver, CheckpointStream},
};
use async_trait::async_trait;
use futures::stream;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Thread-safe in-memory checkpoint storage
type CheckpointStorage = Arc<RwLock<HashMap<CheckpointConfig, Vec<Checkpoint>>>>;

/// In-memory checkpoint saver implementation
///
/// # Example
///
/// ```rust
/// use stepgraph_checkpoint::{Checkpoint, CheckpointConfig, CheckpointSaver, InMemoryCheckpointSaver};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let saver = InMemoryCheckpointSaver::new();
///     let config = CheckpointConfig::new("thread-1");
///
///     saver.put(&config, Checkpoint::empty(-1)).await?;
///     assert_eq!(saver.get_latest(&config).await?.map(|c| c.step), Some(-1));
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryCheckpointSaver {
    storage: CheckpointStorage,
}

impl InMemoryCheckpointSaver {
    /// Create a new in-memory checkpoint saver
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get the number of lineages being tracked
    pub async fn lineage_count(&self) -> usize {
        self.storage.read().await.len()
    }

    /// Get the total number of checkpoints across all lineages
    pub async fn checkpoint_count(&self) -> usize {
        self.storage
            .read()
            .await
            .values()
            .map(|entries| entries.len())
            .sum()
    }

    /// Clear all checkpoints (useful for testing)
    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }
}

impl Default for InMemoryCheckpointSaver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointSaver for InMemoryCheckpointSaver {
    async fn put(&self, config: &CheckpointConfig, checkpoint: Checkpoint) -> Result<()> {
        config.validate()?;

        let mut storage = self.storage.write().await;
        let entries = storage.entry(config.clone()).or_default();

        if let Some(latest) = entries.last() {
            if checkpoint.step <= latest.step {
                return Err(CheckpointError::Conflict {
                    thread_id: config.thread_id.clone(),
                    checkpoint_ns: config.checkpoint_ns.clone(),
                    step: checkpoint.step,
                    latest: latest.step,
                });
            }
        }

        entries.push(checkpoint);
        Ok(())
    }

    async fn get_latest(&self, config: &CheckpointConfig) -> Result<Option<Checkpoint>> {
        config.validate()?;

        let storage = self.storage.read().await;
        Ok(storage
            .get(config)
            .and_then(|entries| entries.last())
            .cloned())
    }

    async fn list_history(&self, config: &CheckpointConfig) -> Result<CheckpointStream> {
        config.validate()?;

        let storage = self.storage.read().await;
        let results: Vec<Result<Checkpoint>> = storage
            .get(config)
            .map(|entries| entries.iter().cloned().map(Ok).collect())
            .unwrap_or_default();

        Ok(Box::pin(stream::iter(results)))
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let mut storage = self.storage.write().await;
        storage.retain(|config, _| config.thread_id != thread_id);
        Ok(())
    }
}
