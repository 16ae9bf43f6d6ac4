//! Static transition datasets for offline training.
//!
//! A [`TransitionDataset`] holds a fixed-size set of transitions as plain `f32`
//! columns. It is persisted with bincode and turned into a [`SimpleReplayBuffer`]
//! by [`TransitionDataset::create_replay_buffer`], from which agents sample
//! uniform random batches during offline training.
use crate::{
    error::OffrlError,
    generic_replay_buffer::{
        BatchBase, GenericTransitionBatch, SimpleReplayBuffer, SimpleReplayBufferConfig,
    },
    ExperienceBufferBase, ReplayBufferBase,
};
use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

/// Conversion of rows of a [`TransitionDataset`] into batch types of an agent.
pub trait DatasetConverter {
    /// Batch of observations.
    type ObsBatch: BatchBase;

    /// Batch of actions.
    type ActBatch: BatchBase;

    /// Converts row-major observations of shape `[n, obs_dim]` into [`Self::ObsBatch`].
    fn convert_observation_batch(&self, data: &[f32], shape: [usize; 2])
        -> Result<Self::ObsBatch>;

    /// Converts row-major actions of shape `[n, act_dim]` into [`Self::ActBatch`].
    fn convert_action_batch(&self, data: &[f32], shape: [usize; 2]) -> Result<Self::ActBatch>;
}

/// A fixed-size collection of transitions.
///
/// Observations and actions are stored row-major. Flags are `0` or `1`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TransitionDataset {
    obs_dim: usize,
    act_dim: usize,
    observations: Vec<f32>,
    actions: Vec<f32>,
    next_observations: Vec<f32>,
    rewards: Vec<f32>,
    terminals: Vec<i8>,
    timeouts: Vec<i8>,
}

impl TransitionDataset {
    /// Creates an empty dataset.
    pub fn new(obs_dim: usize, act_dim: usize) -> Self {
        Self {
            obs_dim,
            act_dim,
            observations: vec![],
            actions: vec![],
            next_observations: vec![],
            rewards: vec![],
            terminals: vec![],
            timeouts: vec![],
        }
    }

    /// Returns the number of transitions.
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    /// Returns `true` if the dataset has no transitions.
    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Dimension of observation vectors.
    pub fn obs_dim(&self) -> usize {
        self.obs_dim
    }

    /// Dimension of action vectors.
    pub fn act_dim(&self) -> usize {
        self.act_dim
    }

    /// Rewards of all transitions.
    pub fn rewards(&self) -> &[f32] {
        &self.rewards
    }

    fn check_dim(&self, name: &str, v: &[f32], dim: usize) -> Result<()> {
        if v.len() != dim {
            return Err(OffrlError::DatasetShapeError(format!(
                "{} has length {}, expected {}",
                name,
                v.len(),
                dim
            ))
            .into());
        }
        Ok(())
    }

    /// Appends a transition.
    pub fn push_transition(
        &mut self,
        obs: &[f32],
        act: &[f32],
        next_obs: &[f32],
        reward: f32,
        is_terminated: bool,
        is_truncated: bool,
    ) -> Result<()> {
        self.check_dim("obs", obs, self.obs_dim)?;
        self.check_dim("act", act, self.act_dim)?;
        self.check_dim("next_obs", next_obs, self.obs_dim)?;
        self.observations.extend_from_slice(obs);
        self.actions.extend_from_slice(act);
        self.next_observations.extend_from_slice(next_obs);
        self.rewards.push(reward);
        self.terminals.push(is_terminated as i8);
        self.timeouts.push(is_truncated as i8);
        Ok(())
    }

    /// Appends the transitions of a trajectory.
    ///
    /// `observations` has one more frame than `actions` and `rewards`;
    /// consecutive frames form `(obs, next_obs)`. If `is_terminated` is `true`,
    /// the last transition is marked as terminal, otherwise as truncated.
    /// Nothing is appended if any frame has a wrong dimension.
    pub fn push_trajectory(
        &mut self,
        observations: &[Vec<f32>],
        actions: &[Vec<f32>],
        rewards: &[f32],
        is_terminated: bool,
    ) -> Result<()> {
        let n = actions.len();
        if rewards.len() != n || observations.len() != n + 1 {
            return Err(OffrlError::DatasetShapeError(format!(
                "trajectory with {} observations, {} actions and {} rewards",
                observations.len(),
                n,
                rewards.len()
            ))
            .into());
        }
        for (t, obs) in observations.iter().enumerate() {
            self.check_dim(&format!("observations[{}]", t), obs, self.obs_dim)?;
        }
        for (t, act) in actions.iter().enumerate() {
            self.check_dim(&format!("actions[{}]", t), act, self.act_dim)?;
        }

        for t in 0..n {
            let is_last = t + 1 == n;
            self.push_transition(
                &observations[t],
                &actions[t],
                &observations[t + 1],
                rewards[t],
                is_last && is_terminated,
                is_last && !is_terminated,
            )?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let n = self.len();
        let consistent = self.observations.len() == n * self.obs_dim
            && self.next_observations.len() == n * self.obs_dim
            && self.actions.len() == n * self.act_dim
            && self.terminals.len() == n
            && self.timeouts.len() == n;
        if !consistent {
            return Err(OffrlError::DatasetShapeError(
                "columns have inconsistent lengths".to_string(),
            )
            .into());
        }
        Ok(())
    }

    /// Loads a dataset from a bincode file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(&path)?;
        let dataset: Self = bincode::deserialize_from(BufReader::new(file))?;
        dataset.validate()?;
        info!(
            "Load dataset of {} transitions from {:?}",
            dataset.len(),
            path.as_ref()
        );
        Ok(dataset)
    }

    /// Saves the dataset as a bincode file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(&path)?;
        bincode::serialize_into(BufWriter::new(file), self)?;
        info!(
            "Save dataset of {} transitions to {:?}",
            self.len(),
            path.as_ref()
        );
        Ok(())
    }

    /// Creates a replay buffer holding all transitions of the dataset.
    ///
    /// The capacity of the buffer equals the number of transitions, so that
    /// batches are sampled uniformly from the whole dataset.
    pub fn create_replay_buffer<T: DatasetConverter>(
        &self,
        converter: &T,
        seed: u64,
    ) -> Result<SimpleReplayBuffer<T::ObsBatch, T::ActBatch>> {
        self.validate()?;
        if self.is_empty() {
            return Err(OffrlError::EmptyReplayBuffer.into());
        }
        let n = self.len();

        let mut replay_buffer = SimpleReplayBuffer::build(&SimpleReplayBufferConfig {
            capacity: n,
            seed,
        });

        let batch = GenericTransitionBatch {
            obs: converter.convert_observation_batch(&self.observations, [n, self.obs_dim])?,
            act: converter.convert_action_batch(&self.actions, [n, self.act_dim])?,
            next_obs: converter
                .convert_observation_batch(&self.next_observations, [n, self.obs_dim])?,
            reward: self.rewards.clone(),
            is_terminated: self.terminals.clone(),
            is_truncated: self.timeouts.clone(),
            ix_sample: None,
        };
        replay_buffer.push(batch)?;

        info!("In replay buffer:");
        info!("{} transitions", replay_buffer.len());
        info!("{} terminated flags", replay_buffer.num_terminated_flags());
        info!("{} truncated flags", replay_buffer.num_truncated_flags());
        info!("{} reward sum", replay_buffer.sum_rewards());

        Ok(replay_buffer)
    }
}
