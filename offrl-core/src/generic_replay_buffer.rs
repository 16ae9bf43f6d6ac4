//! Generic implementation of replay buffers.
//!
//! The replay buffer stores transitions in fixed, preallocated storage per field.
//! Once the capacity is reached, new transitions overwrite the oldest ones.
//! Batches are sampled uniformly with replacement from the valid entries.
//!
//! * [`SimpleReplayBuffer`]: the circular replay buffer
//! * [`GenericTransitionBatch`]: a batch of transitions with arbitrary observation
//!   and action batch types implementing [`BatchBase`]
//! * [`SimpleStepProcessor`]: converts environment steps to transitions
//!
//! ```ignore
//! use offrl_core::generic_replay_buffer::{
//!     SimpleReplayBuffer, SimpleReplayBufferConfig, SimpleStepProcessor,
//!     SimpleStepProcessorConfig,
//! };
//!
//! let config = SimpleReplayBufferConfig::default().capacity(100_000).seed(42);
//! let mut buffer = SimpleReplayBuffer::<ObsBatch, ActBatch>::build(&config);
//! let mut processor = SimpleStepProcessor::<MyEnv, ObsBatch, ActBatch>::build(
//!     &SimpleStepProcessorConfig::default(),
//! );
//! ```
mod base;
mod batch;
mod config;
mod step_proc;
pub use base::SimpleReplayBuffer;
pub use batch::{BatchBase, GenericTransitionBatch};
pub use config::SimpleReplayBufferConfig;
pub use step_proc::{SimpleStepProcessor, SimpleStepProcessorConfig};
