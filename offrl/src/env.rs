//! Environments.
pub mod pendulum;
