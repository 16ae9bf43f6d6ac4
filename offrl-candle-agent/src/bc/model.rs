use super::BcActionType;
use crate::{
    model::SubModel1,
    opt::{Optimizer, OptimizerConfig},
};
use anyhow::Result;
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{
    loss::{cross_entropy, mse},
    VarBuilder, VarMap,
};
use log::info;
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

/// Policy network of behavior cloning with the head determined by [`BcActionType`].
///
/// For continuous actions the network output is the action and the loss is the
/// mean squared error to dataset actions. For discrete actions the output is a
/// vector of logits, the loss is the cross-entropy to dataset action indices and
/// the action is the argmax.
pub struct BcModel<P>
where
    P: SubModel1<Input = Tensor, Output = Tensor>,
    P::Config: DeserializeOwned + Serialize + Clone,
{
    varmap: VarMap,
    policy: P,
    action_type: BcActionType,
    opt: Optimizer,
}

impl<P> BcModel<P>
where
    P: SubModel1<Input = Tensor, Output = Tensor>,
    P::Config: DeserializeOwned + Serialize + Clone,
{
    pub fn build(
        policy_config: P::Config,
        opt_config: &OptimizerConfig,
        action_type: BcActionType,
        device: &Device,
    ) -> Result<Self> {
        let varmap = VarMap::new();
        let policy = P::build(
            VarBuilder::from_varmap(&varmap, DType::F32, device),
            policy_config,
        )?;
        let opt = opt_config.build(varmap.all_vars())?;

        Ok(Self {
            varmap,
            policy,
            action_type,
            opt,
        })
    }

    /// Returns actions for a batch of observations, detached from the computation graph.
    ///
    /// Discrete actions are returned as `i64` indices of shape `[batch_size]`.
    pub fn act(&self, obs: &Tensor) -> Result<Tensor> {
        let out = self.policy.forward(obs)?.detach();
        match self.action_type {
            BcActionType::Continuous => Ok(out),
            BcActionType::Discrete => Ok(out.argmax(D::Minus1)?.to_dtype(DType::I64)?),
        }
    }

    /// Returns the loss of the policy on dataset actions.
    ///
    /// Discrete actions may have shape `[batch_size]` or `[batch_size, 1]` and any dtype.
    pub fn loss(&self, obs: &Tensor, act: &Tensor) -> Result<Tensor> {
        let out = self.policy.forward(obs)?;
        match self.action_type {
            BcActionType::Continuous => Ok(mse(&out, act)?),
            BcActionType::Discrete => {
                let target = act.flatten_all()?.to_dtype(DType::U32)?;
                Ok(cross_entropy(&out, &target)?)
            }
        }
    }

    /// Takes a gradient step on the loss and returns its value before the step.
    pub fn update(&mut self, obs: &Tensor, act: &Tensor) -> Result<f32> {
        let loss = self.loss(obs, act)?;
        self.opt.backward_step(&loss)?;
        Ok(loss.to_scalar::<f32>()?)
    }

    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.varmap.save(&path)?;
        info!("Save BC policy to {:?}", path.as_ref());
        Ok(())
    }

    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.varmap.load(&path)?;
        info!("Load BC policy from {:?}", path.as_ref());
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

    fn model(out_dim: i64, action_type: BcActionType) -> Result<BcModel<Mlp>> {
        let config = MlpConfig::new(3, vec![8], out_dim, Activation::None);
        BcModel::build(config, &OptimizerConfig::default(), action_type, &Device::Cpu)
    }

    #[test]
    fn test_continuous_loss() -> Result<()> {
        let model = model(2, BcActionType::Continuous)?;
        let obs = Tensor::randn(0f32, 1f32, (5, 3), &Device::Cpu)?;
        let act = Tensor::rand(-1f32, 1f32, (5, 2), &Device::Cpu)?;

        let out = model.act(&obs)?.to_vec2::<f32>()?;
        let target = act.to_vec2::<f32>()?;
        let expected = out
            .iter()
            .flatten()
            .zip(target.iter().flatten())
            .map(|(o, t)| (o - t).powi(2))
            .sum::<f32>()
            / 10.0;
        let loss = model.loss(&obs, &act)?.to_scalar::<f32>()?;
        assert!((loss - expected).abs() < 1e-5);

        Ok(())
    }

    #[test]
    fn test_discrete_head() -> Result<()> {
        let model = model(2, BcActionType::Discrete)?;

        // Zero weights, output logits [0, ln 3], so that the probabilities are [0.25, 0.75]
        for (k, v) in model.varmap.data().lock().map_err(|e| anyhow::anyhow!("{}", e))?.iter() {
            let t = match k.ends_with("bias") && v.dims() == [2] {
                true => Tensor::new(&[0f32, 3f32.ln()], &Device::Cpu)?,
                false => v.as_tensor().zeros_like()?,
            };
            v.set(&t)?;
        }

        let obs = Tensor::randn(0f32, 1f32, (4, 3), &Device::Cpu)?;
        let act = model.act(&obs)?;
        assert_eq!(act.dtype(), DType::I64);
        assert_eq!(act.to_vec1::<i64>()?, vec![1; 4]);

        // Dataset actions are class indices stored as f32
        let target = Tensor::new(&[[1f32], [0.], [1.], [1.]], &Device::Cpu)?;
        let loss = model.loss(&obs, &target)?.to_scalar::<f32>()?;
        let expected = -(3.0 * 0.75f32.ln() + 0.25f32.ln()) / 4.0;
        assert!((loss - expected).abs() < 1e-5);

        Ok(())
    }
}
