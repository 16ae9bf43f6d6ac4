//! Generic implementation of step processing.
use super::{BatchBase, GenericTransitionBatch};
use crate::{Env, Step, StepProcessor};
use anyhow::{Context, Result};
use std::{convert::TryFrom, default::Default, marker::PhantomData};

/// Configuration of [`SimpleStepProcessor`].
#[derive(Clone, Debug, Default)]
pub struct SimpleStepProcessorConfig {}

/// Converts environment steps into single-transition batches
/// with 1-step TD backup.
///
/// The processor keeps the previous observation to form the transition
/// `(o_t, a_t, o_t+1, r_t)`. When an episode ends, the previous observation
/// is replaced by [`Step::init_obs`].
///
/// * `E` - The environment type
/// * `O` - The observation batch type, converted from `E::Obs`
/// * `A` - The action batch type, converted from `E::Act`
///
/// Conversions are fallible, since batch types commonly allocate tensors.
pub struct SimpleStepProcessor<E, O, A> {
    prev_obs: Option<O>,
    phantom: PhantomData<(E, A)>,
}

impl<E, O, A> StepProcessor<E> for SimpleStepProcessor<E, O, A>
where
    E: Env,
    O: BatchBase + TryFrom<E::Obs, Error = anyhow::Error>,
    A: BatchBase + TryFrom<E::Act, Error = anyhow::Error>,
{
    type Config = SimpleStepProcessorConfig;
    type Output = GenericTransitionBatch<O, A>;

    fn build(_config: &Self::Config) -> Self {
        Self {
            prev_obs: None,
            phantom: PhantomData,
        }
    }

    /// Resets the processor with an initial observation.
    fn reset(&mut self, init_obs: E::Obs) -> Result<()> {
        self.prev_obs = Some(O::try_from(init_obs)?);
        Ok(())
    }

    /// Processes a step from the environment into a transition.
    ///
    /// Returns an error if [`StepProcessor::reset`] has not been called or
    /// if the step ends an episode without an initial observation.
    fn process(&mut self, step: Step<E>) -> Result<Self::Output> {
        let is_done = step.is_done();
        let next_obs = O::try_from(step.obs.clone())?;
        let obs = self
            .prev_obs
            .replace(O::try_from(step.obs)?)
            .context("prev_obs is not set. Forgot to call reset()?")?;

        if is_done {
            let init_obs = step
                .init_obs
                .context("init_obs is not set at the end of an episode")?;
            self.prev_obs.replace(O::try_from(init_obs)?);
        }

        Ok(GenericTransitionBatch {
            obs,
            act: A::try_from(step.act)?,
            next_obs,
            reward: step.reward,
            is_terminated: step.is_terminated,
            is_truncated: step.is_truncated,
            ix_sample: None,
        })
    }
}
