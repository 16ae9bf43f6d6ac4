//! Soft actor-critic with conservative Q-learning (CQL), for offline training.
mod base;
mod config;
mod lagrange;
pub use base::Cql;
pub use config::CqlConfig;
pub use lagrange::LagrangeMultiplier;
