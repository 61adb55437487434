//! Error types for checkpoint operations

use thiserror::Error;

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur during checkpoint operations
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Checkpoint not found
    #[error("Checkpoint not found: {0}")]
    NotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid checkpoint or configuration
    #[error("Invalid checkpoint: {0}")]
    Invalid(String),

    /// A checkpoint with the same or a later step already exists for the lineage.
    ///
    /// Raised when two run loops write the same thread concurrently.
    #[error("Checkpoint conflict on thread '{thread_id}' (ns '{checkpoint_ns}'): step {step} is not after latest step {latest}")]
    Conflict {
        thread_id: String,
        checkpoint_ns: String,
        step: i64,
        latest: i64,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
