//! Soft actor-critic (SAC) agent.
//!
//! The critic target is `reward_scale * r + gamma * (1 - is_terminated) * (min_j Q'_j(s', a') - alpha * log pi(a'|s'))`,
//! where `a'` is sampled from the current policy. The critics, the actor and
//! the entropy coefficient are updated in this order, followed by Polyak averaging
//! of the target critics.
mod base;
mod config;
mod ent_coef;
pub use base::Sac;
pub use config::SacConfig;
pub use ent_coef::{EntCoef, EntCoefMode};
