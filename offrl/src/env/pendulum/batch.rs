//! Batches of observations and actions of [`Pendulum`] stored in replay buffers.
use super::{Pendulum, PendulumAct, PendulumObs};
use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
use log::info;
use offrl_candle_agent::TensorBatch;
use offrl_core::{
    dataset::{DatasetConverter, TransitionDataset},
    generic_replay_buffer::BatchBase,
    Env, Policy,
};
use std::convert::TryFrom;

/// Implements [`BatchBase`] and conversions for a newtype of [`TensorBatch`].
macro_rules! tensor_batch_newtype {
    ($ident:ident, $item:ty) => {
        impl BatchBase for $ident {
            fn new(capacity: usize) -> Self {
                Self(TensorBatch::new(capacity))
            }

            fn push(&mut self, ix: usize, data: Self) -> Result<()> {
                self.0.push(ix, data.0)
            }

            fn sample(&self, ixs: &[usize]) -> Result<Self> {
                Ok(Self(self.0.sample(ixs)?))
            }
        }

        impl From<TensorBatch> for $ident {
            fn from(b: TensorBatch) -> Self {
                Self(b)
            }
        }

        impl TryFrom<$item> for $ident {
            type Error = anyhow::Error;

            fn try_from(item: $item) -> Result<Self> {
                let t = Tensor::try_from(item)?;
                Ok(Self(TensorBatch::from_tensor(t)))
            }
        }

        impl TryFrom<$ident> for Tensor {
            type Error = anyhow::Error;

            fn try_from(b: $ident) -> Result<Self> {
                Tensor::try_from(b.0)
            }
        }
    };
}

/// Batch of observations.
#[derive(Clone, Debug)]
pub struct ObsBatch(pub TensorBatch);

tensor_batch_newtype!(ObsBatch, PendulumObs);

/// Batch of actions.
#[derive(Clone, Debug)]
pub struct ActBatch(pub TensorBatch);

tensor_batch_newtype!(ActBatch, PendulumAct);

/// Converts rows of a [`TransitionDataset`] into [`ObsBatch`] and [`ActBatch`] on CPU.
#[derive(Clone, Debug, Default)]
pub struct PendulumConverter;

impl PendulumConverter {
    fn tensor_batch(data: &[f32], shape: [usize; 2]) -> Result<TensorBatch> {
        let t = Tensor::from_slice(data, (shape[0], shape[1]), &Device::Cpu)?;
        Ok(TensorBatch::from_tensor(t))
    }
}

impl DatasetConverter for PendulumConverter {
    type ObsBatch = ObsBatch;
    type ActBatch = ActBatch;

    fn convert_observation_batch(&self, data: &[f32], shape: [usize; 2]) -> Result<ObsBatch> {
        Ok(Self::tensor_batch(data, shape)?.into())
    }

    fn convert_action_batch(&self, data: &[f32], shape: [usize; 2]) -> Result<ActBatch> {
        Ok(Self::tensor_batch(data, shape)?.into())
    }
}

/// Collects `n_transitions` transitions by running `policy` in `env`.
///
/// Actions are stored as given by the policy, normalized to `[-1, 1]`.
pub fn collect_dataset<P: Policy<Pendulum>>(
    env: &mut Pendulum,
    policy: &mut P,
    n_transitions: usize,
) -> Result<TransitionDataset> {
    let mut dataset = TransitionDataset::new(super::OBS_DIM, super::ACT_DIM);
    let mut obs = env.reset(None)?;

    for _ in 0..n_transitions {
        let act = policy.sample(&obs)?;
        let (step, _) = env.step_with_reset(&act)?;
        dataset.push_transition(
            &obs.0,
            &act.0,
            &step.obs.0,
            step.reward[0],
            step.is_terminated[0] == 1,
            step.is_truncated[0] == 1,
        )?;
        obs = match step.is_done() {
            true => step.init_obs.context("init_obs is not set")?,
            false => step.obs,
        };
    }
    info!("Collected {} transitions", dataset.len());

    Ok(dataset)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::env::pendulum::{PendulumConfig, OBS_DIM};
    use offrl_core::{ReplayBufferBase, TransitionBatch};
    use std::convert::TryInto;

    /// Applies a constant torque.
    struct ConstantPolicy(f32);

    impl Policy<Pendulum> for ConstantPolicy {
        fn sample(&mut self, _obs: &PendulumObs) -> Result<PendulumAct> {
            Ok(PendulumAct(vec![self.0]))
        }
    }

    #[test]
    fn test_collect_dataset() -> Result<()> {
        let config = PendulumConfig::default().max_steps(20);
        let mut env = Pendulum::build(&config, 0)?;
        let dataset = collect_dataset(&mut env, &mut ConstantPolicy(0.5), 50)?;
        assert_eq!(dataset.len(), 50);
        assert!(dataset.rewards().iter().all(|r| *r <= 0.0));

        let mut buffer = dataset.create_replay_buffer(&PendulumConverter, 42)?;
        assert_eq!(buffer.num_truncated_flags(), 2);
        assert_eq!(buffer.num_terminated_flags(), 0);

        let batch = buffer.batch(8)?;
        assert_eq!(batch.len(), 8);
        let (obs, act, next_obs, ..) = batch.unpack();
        let obs: Tensor = obs.try_into()?;
        let act: Tensor = act.try_into()?;
        let next_obs: Tensor = next_obs.try_into()?;
        assert_eq!(obs.dims(), &[8, OBS_DIM]);
        assert_eq!(next_obs.dims(), &[8, OBS_DIM]);
        assert_eq!(act.flatten_all()?.to_vec1::<f32>()?, vec![0.5; 8]);

        Ok(())
    }

    #[test]
    fn test_obs_batch() -> Result<()> {
        let mut batch = ObsBatch::new(4);
        batch.push(0, ObsBatch::try_from(PendulumObs(vec![1.0, 0.0, 0.5]))?)?;
        batch.push(1, ObsBatch::try_from(PendulumObs(vec![0.0, 1.0, -0.5]))?)?;
        let t = Tensor::try_from(batch.sample(&[1, 0])?)?;
        assert_eq!(
            t.to_vec2::<f32>()?,
            vec![vec![0.0, 1.0, -0.5], vec![1.0, 0.0, 0.5]]
        );

        Ok(())
    }
}
