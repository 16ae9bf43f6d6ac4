//! Behavior cloning (BC) agent.
mod base;
mod config;
mod model;

pub use base::Bc;
pub use config::{BcActionType, BcConfig};
pub use model::BcModel;
