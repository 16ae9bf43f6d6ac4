use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Pendulum`](super::Pendulum).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct PendulumConfig {
    /// The number of steps after which an episode is truncated.
    pub max_steps: usize,

    /// Maximum torque, applied when the action is `1.0`.
    pub max_torque: f32,

    /// Maximum angular velocity.
    pub max_speed: f32,

    /// Time step of the simulation.
    pub dt: f32,

    /// Gravity.
    pub g: f32,

    /// Mass of the pendulum.
    pub m: f32,

    /// Length of the pendulum.
    pub l: f32,
}

impl Default for PendulumConfig {
    fn default() -> Self {
        Self {
            max_steps: 200,
            max_torque: 2.0,
            max_speed: 8.0,
            dt: 0.05,
            g: 10.0,
            m: 1.0,
            l: 1.0,
        }
    }
}

impl PendulumConfig {
    /// Sets the number of steps of an episode.
    pub fn max_steps(mut self, v: usize) -> Self {
        self.max_steps = v;
        self
    }

    /// Sets gravity.
    pub fn g(mut self, v: f32) -> Self {
        self.g = v;
        self
    }

    /// Loads [`PendulumConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ = path.as_ref().to_owned();
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of pendulum from {:?}", path_);
        Ok(b)
    }

    /// Saves [`PendulumConfig`] to YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ = path.as_ref().to_owned();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of pendulum into {:?}", path_);
        Ok(())
    }
}
