//! Critic for agents with continuous action.
use crate::{
    model::SubModel2,
    opt::{Optimizer, OptimizerConfig},
    util::track_with_replace_substring,
};
use anyhow::{Context, Result};
use candle_core::{DType::F32, Device, Tensor, D};
use candle_nn::{VarBuilder, VarMap};
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::{Path, PathBuf},
};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`MultiCritic`].
pub struct MultiCriticConfig<Q> {
    /// The number of critic networks.
    pub n_nets: usize,

    /// Configuration of critic networks.
    pub q_config: Option<Q>,

    /// Configuration of the optimizer.
    pub opt_config: OptimizerConfig,

    /// Soft update coefficient.
    pub tau: f64,
}

impl<Q> Default for MultiCriticConfig<Q> {
    fn default() -> Self {
        Self {
            n_nets: 2,
            q_config: None,
            opt_config: OptimizerConfig::Adam { lr: 0.0003 },
            tau: 0.005,
        }
    }
}

impl<Q> MultiCriticConfig<Q>
where
    Q: DeserializeOwned + Serialize,
{
    /// Sets the numver of critic networks.
    pub fn n_nets(mut self, v: usize) -> Self {
        self.n_nets = v;
        self
    }

    /// Sets configurations for action-value function.
    pub fn q_config(mut self, v: Q) -> Self {
        self.q_config = Some(v);
        self
    }

    /// Sets optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Sets soft update parameter tau.
    pub fn tau(mut self, v: f64) -> Self {
        self.tau = v;
        self
    }

    /// Constructs [`MultiCriticConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`MultiCriticConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Critic for agents with continuous action.
///
/// It takes observations and actions as inputs and outputs action values.
///
/// This struct has multiple q functions and corresponding target networks.
/// Variables of the `i`-th network are prefixed with `critic{i}`, and those of
/// its target with `critic_tgt{i}`.
pub struct MultiCritic<Q>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + Clone,
{
    tau: f64,
    varmap: VarMap,
    varmap_tgt: VarMap,
    qs: Vec<Q>,
    qs_tgt: Vec<Q>,
    opt: Optimizer, // no optimizer required for target networks
}

impl<Q> MultiCritic<Q>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + Clone,
{
    /// Constructs [`MultiCritic`].
    ///
    /// Target networks are initialized with the parameters of the critics.
    pub fn build(config: MultiCriticConfig<Q::Config>, device: Device) -> Result<MultiCritic<Q>> {
        let q_config = config.q_config.context("q_config is not set.")?;
        let n_nets = config.n_nets;

        let (varmap, qs) = Self::build_critic_networks(&q_config, &device, n_nets, "critic")?;
        let (varmap_tgt, qs_tgt) =
            Self::build_critic_networks(&q_config, &device, n_nets, "critic_tgt")?;

        // Optimizer, shared with critic networks
        let opt = config.opt_config.build(varmap.all_vars())?;

        track_with_replace_substring(&varmap_tgt, &varmap, 1.0, ("critic", "critic_tgt"))?;

        Ok(Self {
            tau: config.tau,
            varmap,
            varmap_tgt,
            qs,
            qs_tgt,
            opt,
        })
    }

    fn build_critic_networks(
        q_config: &Q::Config,
        device: &Device,
        n_nets: usize,
        prefix: &str,
    ) -> Result<(VarMap, Vec<Q>)> {
        let varmap = VarMap::new();
        let qs = (0..n_nets)
            .map(|ix| {
                let vb = VarBuilder::from_varmap(&varmap, F32, device)
                    .set_prefix(format!("{}{}", prefix, ix));
                Q::build(vb, q_config.clone())
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((varmap, qs))
    }

    /// The number of critics.
    pub fn n_nets(&self) -> usize {
        self.qs.len()
    }

    /// Updates target networks with Polyak averaging.
    pub fn soft_update(&mut self) -> Result<()> {
        track_with_replace_substring(
            &self.varmap_tgt,
            &self.varmap,
            self.tau,
            ("critic", "critic_tgt"),
        )
    }

    fn forward_all(qs: &[Q], obs: &Tensor, act: &Tensor) -> Result<Vec<Tensor>> {
        qs.iter()
            .map(|q| -> Result<Tensor> { Ok(q.forward(obs, act)?.squeeze(D::Minus1)?) })
            .collect()
    }

    fn min(qvals: &[Tensor]) -> Result<Tensor> {
        Ok(Tensor::stack(qvals, 0)?.min(0)?)
    }

    /// Returns action values of all critics, each of which has shape `[batch_size]`.
    pub fn qvals(&self, obs: &Tensor, act: &Tensor) -> Result<Vec<Tensor>> {
        Self::forward_all(&self.qs, obs, act)
    }

    /// Returns minimum action values over critics.
    pub fn qvals_min(&self, obs: &Tensor, act: &Tensor) -> Result<Tensor> {
        Self::min(&self.qvals(obs, act)?)
    }

    /// Returns minimum action values over target critics.
    pub fn qvals_min_tgt(&self, obs: &Tensor, act: &Tensor) -> Result<Tensor> {
        Self::min(&Self::forward_all(&self.qs_tgt, obs, act)?)
    }

    /// Flattens `obs` of shape `[batch_size, obs_dim]` and `act` of shape
    /// `[batch_size, n, act_dim]` into `[batch_size * n, ...]`, repeating observations.
    fn flatten_multi(obs: &Tensor, act: &Tensor) -> Result<(Tensor, Tensor, usize, usize)> {
        let (batch_size, n, act_dim) = act.dims3()?;
        let obs_dim = obs.dims2()?.1;
        let obs = obs
            .unsqueeze(1)?
            .repeat((1, n, 1))?
            .reshape((batch_size * n, obs_dim))?;
        let act = act.reshape((batch_size * n, act_dim))?;
        Ok((obs, act, batch_size, n))
    }

    /// Returns action values of all critics for `n` actions per observation.
    ///
    /// `act` has shape `[batch_size, n, act_dim]`. Each of the returned tensors
    /// has shape `[batch_size, n]`.
    pub fn qvals_multi(&self, obs: &Tensor, act: &Tensor) -> Result<Vec<Tensor>> {
        let (obs, act, batch_size, n) = Self::flatten_multi(obs, act)?;
        Self::forward_all(&self.qs, &obs, &act)?
            .into_iter()
            .map(|q| -> Result<Tensor> { Ok(q.reshape((batch_size, n))?) })
            .collect()
    }

    /// Returns minimum action values over target critics for `n` actions per observation,
    /// with shape `[batch_size, n]`.
    pub fn qvals_multi_min_tgt(&self, obs: &Tensor, act: &Tensor) -> Result<Tensor> {
        let (obs, act, batch_size, n) = Self::flatten_multi(obs, act)?;
        Ok(self.qvals_min_tgt(&obs, &act)?.reshape((batch_size, n))?)
    }

    /// Backward step for all variables in critic networks.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        self.opt.backward_step(loss)
    }

    /// Returns statistics of the parameters of the critics, excluding targets.
    pub fn param_stats(&self) -> Result<offrl_core::record::Record> {
        crate::util::param_stats(&self.varmap)
    }

    /// Makes the `i`-th critic and its target output `values[i]` for any input,
    /// with zero weights and biases set to the value.
    #[cfg(test)]
    pub(crate) fn fill_constant(&self, values: &[f32]) -> Result<()> {
        for (varmap, prefix) in [(&self.varmap, "critic"), (&self.varmap_tgt, "critic_tgt")].iter() {
            for (k, v) in super::lock(varmap)?.iter() {
                let ix = values
                    .iter()
                    .enumerate()
                    .position(|(i, _)| k.starts_with(&format!("{}{}.", prefix, i)))
                    .with_context(|| format!("No value for {}", k))?;
                let t = match k.ends_with("bias") {
                    true => v.as_tensor().ones_like()?.affine(values[ix] as f64, 0.0)?,
                    false => v.as_tensor().zeros_like()?,
                };
                v.set(&t)?;
            }
        }
        Ok(())
    }

    /// Save variables to prefix + ".pt" and + ".tgt.pt".
    pub fn save<T: AsRef<Path>>(&self, prefix: T) -> Result<(PathBuf, PathBuf)> {
        let mut path = PathBuf::from(prefix.as_ref());
        path.set_extension("pt");
        self.varmap.save(&path.as_path())?;
        info!("Save critics to {:?}", path);

        let mut path_tgt = PathBuf::from(prefix.as_ref());
        path_tgt.set_extension("tgt.pt");
        self.varmap_tgt.save(&path_tgt.as_path())?;
        info!("Save target critics to {:?}", path_tgt);

        Ok((path, path_tgt))
    }

    /// Load variables from prefix + ".pt" and + ".tgt.pt".
    pub fn load<T: AsRef<Path>>(&mut self, prefix: T) -> Result<()> {
        let mut path = PathBuf::from(prefix.as_ref());
        path.set_extension("pt");
        self.varmap.load(&path.as_path())?;
        info!("Load critics from {:?}", path);

        let mut path_tgt = PathBuf::from(prefix.as_ref());
        path_tgt.set_extension("tgt.pt");
        self.varmap_tgt.load(&path_tgt.as_path())?;
        info!("Load target critics from {:?}", path_tgt);

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

    fn critic(tau: f64) -> Result<MultiCritic<Mlp>> {
        let config = MultiCriticConfig::default()
            .q_config(MlpConfig::new(5, vec![16, 16], 1, Activation::None))
            .tau(tau);
        MultiCritic::build(config, Device::Cpu)
    }

    #[test]
    fn test_target_is_initialized_with_critic() -> Result<()> {
        let critic = critic(0.005)?;
        let obs = Tensor::randn(0f32, 1f32, (4, 3), &Device::Cpu)?;
        let act = Tensor::randn(0f32, 1f32, (4, 2), &Device::Cpu)?;
        let q = critic.qvals_min(&obs, &act)?.to_vec1::<f32>()?;
        let q_tgt = critic.qvals_min_tgt(&obs, &act)?.to_vec1::<f32>()?;
        assert_eq!(q, q_tgt);
        assert_eq!(critic.qvals(&obs, &act)?.len(), 2);

        Ok(())
    }

    #[test]
    fn test_soft_update() -> Result<()> {
        let obs = Tensor::randn(0f32, 1f32, (8, 3), &Device::Cpu)?;
        let act = Tensor::randn(0f32, 1f32, (8, 2), &Device::Cpu)?;

        for tau in [0.0, 1.0].iter() {
            let mut critic = critic(*tau)?;
            let q_tgt0 = critic.qvals_min_tgt(&obs, &act)?.to_vec1::<f32>()?;

            // Move critics away from targets
            let loss = critic.qvals_min(&obs, &act)?.sqr()?.mean_all()?;
            critic.backward_step(&loss)?;
            let q = critic.qvals_min(&obs, &act)?.to_vec1::<f32>()?;
            assert_ne!(q, q_tgt0);

            critic.soft_update()?;
            let q_tgt1 = critic.qvals_min_tgt(&obs, &act)?.to_vec1::<f32>()?;
            match *tau == 0.0 {
                true => assert_eq!(q_tgt1, q_tgt0),
                false => assert_eq!(q_tgt1, q),
            }
        }

        Ok(())
    }

    #[test]
    fn test_qvals_multi() -> Result<()> {
        let critic = critic(0.005)?;
        let (batch_size, n) = (4, 10);
        let obs = Tensor::randn(0f32, 1f32, (batch_size, 3), &Device::Cpu)?;
        let act = Tensor::rand(-1f32, 1f32, (batch_size, n, 2), &Device::Cpu)?;

        let qs = critic.qvals_multi(&obs, &act)?;
        assert_eq!(qs.len(), 2);
        assert_eq!(qs[0].dims(), &[batch_size, n]);
        assert_eq!(
            critic.qvals_multi_min_tgt(&obs, &act)?.dims(),
            &[batch_size, n]
        );

        // Agrees with single-action evaluation
        let q_multi = qs[0].to_vec2::<f32>()?;
        for j in 0..n {
            let act_j = act.narrow(1, j, 1)?.squeeze(1)?;
            let q_j = critic.qvals(&obs, &act_j)?[0].to_vec1::<f32>()?;
            for i in 0..batch_size {
                assert!((q_multi[i][j] - q_j[i]).abs() < 1e-5);
            }
        }

        Ok(())
    }

    #[test]
    fn test_fill_constant() -> Result<()> {
        let critic = critic(0.005)?;
        critic.fill_constant(&[1.5, -0.5])?;
        let obs = Tensor::randn(0f32, 1f32, (4, 3), &Device::Cpu)?;
        let act = Tensor::randn(0f32, 1f32, (4, 2), &Device::Cpu)?;
        let qs = critic.qvals(&obs, &act)?;
        assert_eq!(qs[0].to_vec1::<f32>()?, vec![1.5; 4]);
        assert_eq!(qs[1].to_vec1::<f32>()?, vec![-0.5; 4]);
        assert_eq!(critic.qvals_min_tgt(&obs, &act)?.to_vec1::<f32>()?, vec![-0.5; 4]);

        Ok(())
    }

    #[test]
    fn test_save_load() -> Result<()> {
        let dir = TempDir::new("multi_critic")?;
        let mut critic1 = critic(1.0)?;
        let mut critic2 = critic(1.0)?;
        let obs = Tensor::randn(0f32, 1f32, (4, 3), &Device::Cpu)?;
        let act = Tensor::randn(0f32, 1f32, (4, 2), &Device::Cpu)?;

        // Targets differ from critics after an update
        let loss = critic1.qvals_min(&obs, &act)?.sqr()?.mean_all()?;
        critic1.backward_step(&loss)?;

        let (path, path_tgt) = critic1.save(dir.path().join("critic"))?;
        assert!(path.exists() && path_tgt.exists());
        critic2.load(dir.path().join("critic"))?;

        assert_eq!(
            critic1.qvals_min(&obs, &act)?.to_vec1::<f32>()?,
            critic2.qvals_min(&obs, &act)?.to_vec1::<f32>()?
        );
        assert_eq!(
            critic1.qvals_min_tgt(&obs, &act)?.to_vec1::<f32>()?,
            critic2.qvals_min_tgt(&obs, &act)?.to_vec1::<f32>()?
        );
        assert_ne!(
            critic2.qvals_min(&obs, &act)?.to_vec1::<f32>()?,
            critic2.qvals_min_tgt(&obs, &act)?.to_vec1::<f32>()?
        );

        Ok(())
    }
}
