//! Pendulum swing-up task.
//!
//! The dynamics follow the classic gym `Pendulum-v1`. The observation is
//! `[cos(theta), sin(theta), theta_dot]` and the action is a torque normalized
//! to `[-1, 1]`, which is scaled by [`PendulumConfig::max_torque`] in the environment.
//! Episodes are never terminated and truncated after [`PendulumConfig::max_steps`] steps.
//!
//! ```ignore
//! let config = PendulumConfig::default();
//! let mut env = Pendulum::build(&config, 0)?;
//! let obs = env.reset(None)?;
//! let (step, _) = env.step(&PendulumAct(vec![0.5]))?;
//! ```
mod base;
mod batch;
mod config;
pub use base::{Pendulum, PendulumAct, PendulumObs, RandomPolicy, ACT_DIM, OBS_DIM};
pub use batch::{collect_dataset, ActBatch, ObsBatch, PendulumConverter};
pub use config::PendulumConfig;
