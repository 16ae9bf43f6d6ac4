//! Actor with Gaussian policy.
use crate::{
    model::SubModel1,
    opt::{Optimizer, OptimizerConfig},
    util::{log_jacobian_tanh, OutDim},
};
use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{VarBuilder, VarMap};
use log::info;
use offrl_core::record::Record;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::{Path, PathBuf},
};

/// Log density of the standard normal distribution, summed over the last axis.
fn normal_logp(z: &Tensor) -> Result<Tensor> {
    let tmp: Tensor = ((-0.5 * (2.0 * std::f64::consts::PI).ln()) - (0.5 * z.powf(2.0)?)?)?;
    Ok(tmp.sum(D::Minus1)?)
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`GaussianActor`].
pub struct GaussianActorConfig<P: OutDim> {
    /// Configuration of the policy network.
    pub policy_config: Option<P>,

    /// Configuration of the optimizer.
    pub opt_config: OptimizerConfig,

    /// Lower bound of log standard deviation.
    pub min_log_std: f64,

    /// Upper bound of log standard deviation.
    pub max_log_std: f64,
}

impl<P: OutDim> Default for GaussianActorConfig<P> {
    fn default() -> Self {
        Self {
            policy_config: None,
            opt_config: OptimizerConfig::Adam { lr: 0.0003 },
            min_log_std: -20.0,
            max_log_std: 2.0,
        }
    }
}

impl<P> GaussianActorConfig<P>
where
    P: DeserializeOwned + Serialize + OutDim,
{
    /// Sets the minimum value of log std.
    pub fn min_log_std(mut self, v: f64) -> Self {
        self.min_log_std = v;
        self
    }

    /// Sets the maximum value of log std.
    pub fn max_log_std(mut self, v: f64) -> Self {
        self.max_log_std = v;
        self
    }

    /// Sets configurations for policy function.
    pub fn policy_config(mut self, v: P) -> Self {
        self.policy_config = Some(v);
        self
    }

    /// Sets output dimension of the model.
    pub fn out_dim(mut self, v: i64) -> Self {
        if let Some(pi_config) = &mut self.policy_config {
            pi_config.set_out_dim(v);
        }
        self
    }

    /// Sets optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Loads [`GaussianActorConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`GaussianActorConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Actor with tanh-squashed Gaussian policy.
///
/// The policy network outputs the mean and the log standard deviation of
/// a Gaussian distribution of pre-squashed actions `u`. Actions are `a = tanh(u)`.
/// The log standard deviation is clamped to `[min_log_std, max_log_std]`.
pub struct GaussianActor<P>
where
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    device: Device,
    varmap: VarMap,

    // Dimension of the action vector.
    out_dim: i64,

    policy: P,
    opt: Optimizer,

    min_log_std: f64,
    max_log_std: f64,
}

impl<P> GaussianActor<P>
where
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    /// Constructs [`GaussianActor`].
    pub fn build(config: GaussianActorConfig<P::Config>, device: Device) -> Result<Self> {
        let policy_config = config.policy_config.context("policy_config is not set.")?;
        let out_dim = policy_config.get_out_dim();
        let varmap = VarMap::new();
        let policy = {
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device).set_prefix("actor");
            P::build(vb, policy_config)?
        };
        let opt = config.opt_config.build(varmap.all_vars())?;

        Ok(Self {
            device,
            out_dim,
            varmap,
            opt,
            policy,
            min_log_std: config.min_log_std,
            max_log_std: config.max_log_std,
        })
    }

    /// Dimension of actions.
    pub fn out_dim(&self) -> usize {
        self.out_dim as _
    }

    /// Returns the mean and the clamped log standard deviation given observations.
    ///
    /// The shape of the both tensors is `(batch_size, action_dimension)`.
    pub fn forward(&self, obs: &Tensor) -> Result<(Tensor, Tensor)> {
        let (mean, log_std) = self.policy.forward(obs)?;
        let log_std = log_std.clamp(self.min_log_std, self.max_log_std)?;
        debug_assert_eq!(mean.dims().len(), 2);
        debug_assert_eq!(mean.dims()[1], self.out_dim as usize);
        debug_assert_eq!(log_std.dims(), mean.dims());
        Ok((mean, log_std))
    }

    /// Samples actions.
    ///
    /// If `train` is `true`, actions are sampled from the squashed Gaussian distribution.
    /// Otherwise, `tanh(mean)` is returned.
    pub fn sample(&self, obs: &Tensor, train: bool) -> Result<Tensor> {
        let (mean, log_std) = self.forward(obs)?;
        let a = match train {
            true => {
                let z = mean.randn_like(0., 1.)?;
                ((log_std.exp()? * z)? + mean)?.tanh()?
            }
            false => mean.tanh()?,
        };
        Ok(a.detach())
    }

    /// Returns reparameterized actions and their log probabilities.
    ///
    /// The shapes of the returned tensors are `[batch_size, action_dimension]`
    /// and `[batch_size]`. Gradients flow through both of them into the policy network.
    pub fn action_logp(&self, obs: &Tensor) -> Result<(Tensor, Tensor)> {
        let (mean, log_std) = self.forward(obs)?;
        let z = mean.randn_like(0., 1.)?;
        let u = ((log_std.exp()? * &z)? + mean)?;
        let a = u.tanh()?;

        // Gaussian density of u, with the change of variables for tanh
        let logp = ((normal_logp(&z)? - log_std.sum(D::Minus1)?)? - log_jacobian_tanh(&u)?)?;

        Ok((a, logp))
    }

    /// Samples `n` actions per observation.
    ///
    /// The shapes of the returned tensors are `[batch_size, n, action_dimension]`
    /// and `[batch_size, n]`.
    pub fn action_logp_repeated(&self, obs: &Tensor, n: usize) -> Result<(Tensor, Tensor)> {
        let (batch_size, obs_dim) = obs.dims2()?;
        let obs = obs
            .unsqueeze(1)?
            .repeat((1, n, 1))?
            .reshape((batch_size * n, obs_dim))?;
        let (a, logp) = self.action_logp(&obs)?;
        let a = a.reshape((batch_size, n, self.out_dim as usize))?;
        let logp = logp.reshape((batch_size, n))?;
        Ok((a, logp))
    }

    /// Applies a backward step pass on the policy network.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        self.opt.backward_step(loss)
    }

    /// Returns the device of the actor.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Returns statistics of the parameters.
    pub fn param_stats(&self) -> Result<Record> {
        crate::util::param_stats(&self.varmap)
    }

    /// Save variables to prefix + ".pt".
    pub fn save(&self, prefix: impl AsRef<Path>) -> Result<PathBuf> {
        let mut path = PathBuf::from(prefix.as_ref());
        path.set_extension("pt");
        self.varmap.save(&path.as_path())?;
        info!("Save actor parameters to {:?}", path);

        Ok(path)
    }

    /// Load variables from prefix + ".pt".
    pub fn load(&mut self, prefix: impl AsRef<Path>) -> Result<()> {
        let mut path = PathBuf::from(prefix.as_ref());
        path.set_extension("pt");
        self.varmap.load(&path.as_path())?;
        info!("Load actor parameters from {:?}", path);

        Ok(())
    }
}
