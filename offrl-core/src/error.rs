//! Errors in the library.
use thiserror::Error;

/// Errors in the library.
#[derive(Error, Debug)]
pub enum OffrlError {
    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),

    /// Sampling was requested from a replay buffer holding no transitions.
    #[error("Replay buffer is empty")]
    EmptyReplayBuffer,

    /// Transitions were pushed into a replay buffer built with zero capacity.
    #[error("Replay buffer has zero capacity")]
    ZeroCapacity,

    /// A batch pushed into a replay buffer is longer than its capacity.
    #[error("Batch of {batch_size} transitions exceeds replay buffer capacity {capacity}")]
    BatchTooLarge {
        /// Number of transitions in the pushed batch.
        batch_size: usize,
        /// Capacity of the replay buffer.
        capacity: usize,
    },

    /// Columns of a transition dataset have inconsistent lengths.
    #[error("Dataset shape error: {0}")]
    DatasetShapeError(String),
}
