//! Replay buffer interface for reinforcement learning.
//!
//! Replay buffers store transitions collected from environments, or loaded
//! from a static dataset, and generate batches for training agents.
use anyhow::Result;

/// Interface for buffers that store experiences from environments.
///
/// This trait defines the basic operations for storing experiences in a buffer.
/// It is used by [`Trainer`](crate::Trainer) to push transitions produced
/// by a [`StepProcessor`](crate::StepProcessor).
pub trait ExperienceBufferBase {
    /// The type of items stored in the buffer.
    type Item;

    /// Pushes a new experience into the buffer.
    fn push(&mut self, tr: Self::Item) -> Result<()>;

    /// Returns the current number of experiences in the buffer.
    fn len(&self) -> usize;
}

/// Interface for replay buffers that generate batches for training.
///
/// This trait is independent of [`ExperienceBufferBase`] and focuses solely
/// on the batch generation process. Agents only see this side of the buffer.
pub trait ReplayBufferBase {
    /// Configuration parameters for the replay buffer.
    type Config: Clone;

    /// The type of batch generated for training.
    type Batch;

    /// Builds a new replay buffer from the given configuration.
    fn build(config: &Self::Config) -> Self;

    /// Constructs a batch of `size` experiences for training.
    ///
    /// Returns an error if sampling failed, for example if the buffer is empty.
    fn batch(&mut self, size: usize) -> Result<Self::Batch>;
}
