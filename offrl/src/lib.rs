//! Offline and online reinforcement learning in Rust.
//!
//! The workspace consists of the following crates:
//!
//! * `offrl-core` provides basic traits and functions generic to environments and
//!   reinforcement learning (RL) agents, including the replay buffer, static transition
//!   datasets and the trainer of online and offline training loops.
//! * `offrl-candle-agent` includes RL agents based on
//!   [candle](https://crates.io/crates/candle-core): soft actor-critic (SAC),
//!   SAC with conservative Q-learning (CQL) and behavior cloning (BC).
//! * `offrl-tensorboard` has `TensorboardRecorder` struct to write records which can be
//!   shown in Tensorboard. It is based on [tensorboard-rs](https://crates.io/crates/tensorboard-rs).
//! * `offrl` (this crate) has environments and a collection of examples.
//!
//! The examples train agents on [`env::pendulum::Pendulum`]:
//!
//! * `sac_pendulum` trains a SAC agent online.
//! * `collect_pendulum` trains a SAC agent online, then collects a dataset with it.
//! * `sac_off_pendulum`, `cql_pendulum` and `bc_pendulum` train agents with the dataset.
pub mod env;
