//! Configuration of behavior cloning (BC) agent.
use crate::{model::SubModel1, opt::OptimizerConfig, Device};
use anyhow::Result;
use candle_core::Tensor;
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fmt::Debug,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// How the output of the policy network is interpreted.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub enum BcActionType {
    /// Logits over actions, trained with the cross-entropy against action indices.
    /// The sampled action is the argmax.
    Discrete,

    /// Actions themselves, regressed onto dataset actions with the mean squared error.
    Continuous,
}

/// Configuration of [`Bc`](super::Bc) agent.
#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub struct BcConfig<P>
where
    P: SubModel1<Output = Tensor>,
    P::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
{
    /// Configuration of the policy network.
    pub policy_config: Option<P::Config>,

    /// Optimizer of the policy network.
    #[serde(default)]
    pub opt_config: OptimizerConfig,

    pub action_type: BcActionType,

    pub batch_size: usize,

    pub device: Option<Device>,
}

impl<P> Clone for BcConfig<P>
where
    P: SubModel1<Output = Tensor>,
    P::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
{
    fn clone(&self) -> Self {
        Self {
            policy_config: self.policy_config.clone(),
            opt_config: self.opt_config.clone(),
            action_type: self.action_type,
            batch_size: self.batch_size,
            device: self.device,
        }
    }
}

impl<P> Default for BcConfig<P>
where
    P: SubModel1<Output = Tensor>,
    P::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
{
    fn default() -> Self {
        Self {
            policy_config: None,
            opt_config: OptimizerConfig::default(),
            action_type: BcActionType::Continuous,
            batch_size: 128,
            device: None,
        }
    }
}

impl<P> BcConfig<P>
where
    P: SubModel1<Output = Tensor>,
    P::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
{
    pub fn policy_config(mut self, v: P::Config) -> Self {
        self.policy_config = Some(v);
        self
    }

    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    pub fn action_type(mut self, v: BcActionType) -> Self {
        self.action_type = v;
        self
    }

    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    pub fn device(mut self, device: candle_core::Device) -> Self {
        self.device = Some(device.into());
        self
    }

    /// Loads [`BcConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ = path.as_ref().to_owned();
        let rdr = BufReader::new(File::open(path)?);
        let config = serde_yaml::from_reader(rdr)?;
        info!("Load config of BC agent from {:?}", path_);
        Ok(config)
    }

    /// Saves [`BcConfig`] to YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ = path.as_ref().to_owned();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of BC agent into {:?}", path_);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        mlp::{Mlp, MlpConfig},
        Activation,
    };
    use tempdir::TempDir;

    #[test]
    fn test_serde_bc_config() -> Result<()> {
        let config = BcConfig::<Mlp>::default()
            .policy_config(MlpConfig::new(3, vec![64, 64], 4, Activation::None))
            .opt_config(OptimizerConfig::Adam { lr: 1e-3 })
            .action_type(BcActionType::Discrete)
            .device(candle_core::Device::Cpu);

        let dir = TempDir::new("bc_config")?;
        let path = dir.path().join("bc_config.yaml");
        config.save(&path)?;
        let config_ = BcConfig::<Mlp>::load(&path)?;
        assert_eq!(config, config_);
        assert_eq!(config_.action_type, BcActionType::Discrete);

        Ok(())
    }
}
