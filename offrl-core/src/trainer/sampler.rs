//! Samples transitions from an environment and pushes them into a replay buffer.
use crate::{
    record::{Record, RecordValue},
    Env, ExperienceBufferBase, Policy, StepProcessor,
};
use anyhow::{Context, Result};
use std::time::{Duration, SystemTime};

/// Interacts with an environment with a policy and produces transitions.
///
/// It also keeps track of environment steps per second (fps) and
/// the return of the running episode.
pub struct Sampler<E, P>
where
    E: Env,
    P: StepProcessor<E>,
{
    env: E,
    prev_obs: Option<E::Obs>,
    step_processor: P,
    n_env_steps_for_fps: usize,
    time: Duration,
    episode_return: f32,
}

impl<E, P> Sampler<E, P>
where
    E: Env,
    P: StepProcessor<E>,
{
    /// Creates a sampler.
    pub fn new(env: E, step_processor: P) -> Self {
        Self {
            env,
            prev_obs: None,
            step_processor,
            n_env_steps_for_fps: 0,
            time: Duration::new(0, 0),
            episode_return: 0.0,
        }
    }

    /// Samples an action with the policy, applies it to the environment,
    /// and pushes the resulting transition into the buffer.
    ///
    /// The returned record includes `"episode_return"` when an episode ends.
    pub fn sample_and_push<A, B>(&mut self, policy: &mut A, buffer: &mut B) -> Result<Record>
    where
        A: Policy<E>,
        B: ExperienceBufferBase<Item = P::Output>,
    {
        let now = SystemTime::now();

        // Reset environment if required
        if self.prev_obs.is_none() {
            let init_obs = self.env.reset(None)?;
            self.step_processor.reset(init_obs.clone())?;
            self.prev_obs = Some(init_obs);
        }

        // Sample an action and apply it to the environment
        let prev_obs = self.prev_obs.as_ref().context("prev_obs is not set")?;
        let act = policy.sample(prev_obs)?;
        let (step, mut record) = self.env.step_with_reset(&act)?;
        let is_done = step.is_done();
        self.episode_return += step.reward[0];

        // Update previous observation
        self.prev_obs = match is_done {
            true => Some(step.init_obs.clone().context("Failed to unwrap init_obs")?),
            false => Some(step.obs.clone()),
        };

        // Produce and push transition
        let transition = self.step_processor.process(step)?;
        buffer.push(transition)?;

        if is_done {
            record.insert("episode_return", RecordValue::Scalar(self.episode_return));
            self.episode_return = 0.0;
        }

        self.time += now.elapsed()?;
        self.n_env_steps_for_fps += 1;

        Ok(record)
    }

    /// Returns environment steps per second, then resets the internal counter.
    pub fn fps(&mut self) -> f32 {
        let fps = self.n_env_steps_for_fps as f32 / self.time.as_secs_f32().max(f32::EPSILON);
        self.n_env_steps_for_fps = 0;
        self.time = Duration::new(0, 0);
        fps
    }
}
