//! Configuration of CQL agent.
use crate::{
    model::{SubModel1, SubModel2},
    sac::EntCoefMode,
    util::{actor::GaussianActorConfig, critic::MultiCriticConfig, OutDim},
    Device,
};
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

/// Configuration of [`Cql`](super::Cql).
#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub struct CqlConfig<Q, P>
where
    Q: SubModel2<Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
    P: SubModel1<Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim + Debug + PartialEq + Clone,
{
    /// Configuration of the actor model.
    pub actor_config: GaussianActorConfig<P::Config>,

    /// Configuration of the critic model.
    pub critic_config: MultiCriticConfig<Q::Config>,

    /// Discount factor.
    pub gamma: f64,

    /// How to update entropy coefficient.
    pub ent_coef_mode: EntCoefMode,

    /// Number of parameter updates per optimization step.
    pub n_updates_per_opt: usize,

    /// Batch size for training.
    pub batch_size: usize,

    /// Scale of rewards.
    pub reward_scale: f32,

    /// Number of sampled actions per state for the conservative penalty.
    pub n_action_samples: usize,

    /// Temperature of the log-sum-exp over action values.
    pub temp: f64,

    /// Weight of the conservative penalty.
    pub min_q_weight: f64,

    /// If `true`, action values of sampled actions are corrected with their log densities.
    pub importance_sample: bool,

    /// If `true`, the weight of the penalty is tuned with a Lagrange multiplier.
    pub lagrange: bool,

    /// Threshold of the gap between out-of-distribution and dataset action values,
    /// used in the Lagrange mode.
    pub target_action_gap: f64,

    /// Learning rate of the Lagrange multiplier.
    pub alpha_prime_lr: f64,

    /// If `true`, the entropy term is included in the critic target.
    pub backup_entropy: bool,

    /// If `true`, the critic target takes the maximum over `n_action_samples` next actions.
    pub max_target_backup: bool,

    /// Lower bound of the gap, before averaging over the batch.
    pub clip_diff_min: Option<f64>,

    /// Upper bound of the gap, before averaging over the batch.
    pub clip_diff_max: Option<f64>,

    /// If `2` or more, statistics of the parameters are recorded.
    pub record_verbose_level: usize,

    /// Device for actor/critic models.
    pub device: Option<Device>,
}

impl<Q, P> Clone for CqlConfig<Q, P>
where
    Q: SubModel2<Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
    P: SubModel1<Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim + Debug + PartialEq + Clone,
{
    fn clone(&self) -> Self {
        Self {
            actor_config: self.actor_config.clone(),
            critic_config: self.critic_config.clone(),
            gamma: self.gamma,
            ent_coef_mode: self.ent_coef_mode.clone(),
            n_updates_per_opt: self.n_updates_per_opt,
            batch_size: self.batch_size,
            reward_scale: self.reward_scale,
            n_action_samples: self.n_action_samples,
            temp: self.temp,
            min_q_weight: self.min_q_weight,
            importance_sample: self.importance_sample,
            lagrange: self.lagrange,
            target_action_gap: self.target_action_gap,
            alpha_prime_lr: self.alpha_prime_lr,
            backup_entropy: self.backup_entropy,
            max_target_backup: self.max_target_backup,
            clip_diff_min: self.clip_diff_min,
            clip_diff_max: self.clip_diff_max,
            record_verbose_level: self.record_verbose_level,
            device: self.device,
        }
    }
}

impl<Q, P> Default for CqlConfig<Q, P>
where
    Q: SubModel2<Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
    P: SubModel1<Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim + Debug + PartialEq + Clone,
{
    fn default() -> Self {
        Self {
            actor_config: Default::default(),
            critic_config: Default::default(),
            gamma: 0.99,
            ent_coef_mode: EntCoefMode::default(),
            n_updates_per_opt: 1,
            batch_size: 128,
            reward_scale: 1.0,
            n_action_samples: 10,
            temp: 1.0,
            min_q_weight: 5.0,
            importance_sample: true,
            lagrange: false,
            target_action_gap: 1.0,
            alpha_prime_lr: 0.0003,
            backup_entropy: false,
            max_target_backup: false,
            clip_diff_min: None,
            clip_diff_max: None,
            record_verbose_level: 0,
            device: None,
        }
    }
}

impl<Q, P> CqlConfig<Q, P>
where
    Q: SubModel2<Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
    P: SubModel1<Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim + Debug + PartialEq + Clone,
{
    /// Configuration of actor.
    pub fn actor_config(mut self, actor_config: GaussianActorConfig<P::Config>) -> Self {
        self.actor_config = actor_config;
        self
    }

    /// Configuration of critic.
    pub fn critic_config(mut self, critic_config: MultiCriticConfig<Q::Config>) -> Self {
        self.critic_config = critic_config;
        self
    }

    /// Discount factor.
    pub fn discount_factor(mut self, v: f64) -> Self {
        self.gamma = v;
        self
    }

    /// SAC-alpha.
    pub fn ent_coef_mode(mut self, v: EntCoefMode) -> Self {
        self.ent_coef_mode = v;
        self
    }

    /// Sets the numper of parameter update steps per optimization step.
    pub fn n_updates_per_opt(mut self, v: usize) -> Self {
        self.n_updates_per_opt = v;
        self
    }

    /// Batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Reward scale.
    pub fn reward_scale(mut self, v: f32) -> Self {
        self.reward_scale = v;
        self
    }

    /// Number of sampled actions per state.
    pub fn n_action_samples(mut self, v: usize) -> Self {
        self.n_action_samples = v;
        self
    }

    /// Temperature of the log-sum-exp.
    pub fn temp(mut self, v: f64) -> Self {
        self.temp = v;
        self
    }

    /// Weight of the conservative penalty.
    pub fn min_q_weight(mut self, v: f64) -> Self {
        self.min_q_weight = v;
        self
    }

    /// Importance sampling of action values.
    pub fn importance_sample(mut self, v: bool) -> Self {
        self.importance_sample = v;
        self
    }

    /// Enables the Lagrange mode with the given threshold of the gap.
    pub fn lagrange(mut self, target_action_gap: f64) -> Self {
        self.lagrange = true;
        self.target_action_gap = target_action_gap;
        self
    }

    /// Learning rate of the Lagrange multiplier.
    pub fn alpha_prime_lr(mut self, v: f64) -> Self {
        self.alpha_prime_lr = v;
        self
    }

    /// Entropy term in the critic target.
    pub fn backup_entropy(mut self, v: bool) -> Self {
        self.backup_entropy = v;
        self
    }

    /// Maximum over sampled next actions in the critic target.
    pub fn max_target_backup(mut self, v: bool) -> Self {
        self.max_target_backup = v;
        self
    }

    /// Bounds of the gap.
    pub fn clip_diff(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.clip_diff_min = min;
        self.clip_diff_max = max;
        self
    }

    /// Verbose level of records.
    pub fn record_verbose_level(mut self, v: usize) -> Self {
        self.record_verbose_level = v;
        self
    }

    /// Device.
    pub fn device(mut self, device: candle_core::Device) -> Self {
        self.device = Some(device.into());
        self
    }

    /// Constructs [`CqlConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ = path.as_ref().to_owned();
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of CQL agent from {:?}", path_);
        Ok(b)
    }

    /// Saves [`CqlConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ = path.as_ref().to_owned();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of CQL agent into {:?}", path_);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        mlp::{Mlp, Mlp2, MlpConfig},
        Activation,
    };
    use tempdir::TempDir;

    #[test]
    fn test_serde_cql_config() -> Result<()> {
        let actor_config = GaussianActorConfig::default()
            .policy_config(MlpConfig::new(3, vec![64, 64], 1, Activation::None));
        let critic_config = MultiCriticConfig::default()
            .q_config(MlpConfig::new(4, vec![64, 64], 1, Activation::None));
        let config = CqlConfig::<Mlp, Mlp2>::default()
            .actor_config(actor_config)
            .critic_config(critic_config)
            .lagrange(10.0)
            .clip_diff(Some(-200.0), None)
            .device(candle_core::Device::Cpu);

        let dir = TempDir::new("cql_config")?;
        let path = dir.path().join("cql_config.yaml");
        config.save(&path)?;
        let config_ = CqlConfig::<Mlp, Mlp2>::load(&path)?;
        assert_eq!(config, config_);
        assert!(config_.lagrange);
        assert_eq!(config_.n_action_samples, 10);
        assert_eq!(config_.clip_diff_max, None);

        Ok(())
    }
}
