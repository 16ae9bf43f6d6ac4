#![warn(missing_docs)]
//! Core components for offline and online reinforcement learning.
//!
//! This crate defines the traits and generic building blocks shared by the agents
//! in `offrl-candle-agent`:
//!
//! * [`Env`], [`Policy`], [`Agent`] and [`Configurable`] describe the interaction
//!   between environments and trainable policies.
//! * [`generic_replay_buffer`] provides a circular replay buffer with uniform sampling
//!   and a step processor turning environment steps into transitions.
//! * [`dataset`] holds static transition sets used for offline training.
//! * [`Trainer`] runs online (environment rollout) and offline (batch iteration)
//!   training loops with periodic evaluation and checkpointing.
//! * [`record`] provides records and recorders for training metrics.
pub mod dataset;
pub mod error;
pub mod generic_replay_buffer;
pub mod record;

mod base;
pub use base::{
    Act, Agent, Configurable, Env, ExperienceBufferBase, Info, Obs, Policy, ReplayBufferBase,
    Step, StepProcessor, TransitionBatch,
};

mod trainer;
pub use trainer::{Sampler, Trainer, TrainerConfig};

mod evaluator;
pub use evaluator::{DefaultEvaluator, Evaluator};
