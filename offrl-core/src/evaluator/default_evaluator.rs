//! Default implementation of the [`Evaluator`] trait.
use super::Evaluator;
use crate::{record::Record, Env, Policy};
use anyhow::{anyhow, Result};

/// Runs a fixed number of episodes and returns the average return.
///
/// The environment is reset with [`Env::reset_with_index`], given the index
/// of the episode, so that evaluations are comparable across training.
///
/// ```ignore
/// let mut evaluator = DefaultEvaluator::<Pendulum>::new(&config, 0, 5)?;
/// let record = evaluator.evaluate(&mut agent)?;
/// println!("Average return: {}", record.get_scalar("Episode return")?);
/// ```
pub struct DefaultEvaluator<E: Env> {
    n_episodes: usize,
    env: E,
}

impl<E: Env> Evaluator<E> for DefaultEvaluator<E> {
    fn evaluate<P: Policy<E>>(&mut self, policy: &mut P) -> Result<Record> {
        let mut r_total = 0f32;

        for ix in 0..self.n_episodes {
            let mut prev_obs = self.env.reset_with_index(ix)?;

            loop {
                let act = policy.sample(&prev_obs)?;
                let (step, _) = self.env.step(&act)?;
                r_total += step.reward[0];
                if step.is_done() {
                    break;
                }
                prev_obs = step.obs;
            }
        }

        Ok(Record::from_scalar(
            "Episode return",
            r_total / self.n_episodes as f32,
        ))
    }
}

impl<E: Env> DefaultEvaluator<E> {
    /// Constructs a [`DefaultEvaluator`].
    ///
    /// * `config` - Configuration of the environment
    /// * `seed` - Random seed of the environment
    /// * `n_episodes` - Number of episodes per evaluation, at least one
    pub fn new(config: &E::Config, seed: i64, n_episodes: usize) -> Result<Self> {
        if n_episodes == 0 {
            return Err(anyhow!("DefaultEvaluator needs at least one episode"));
        }
        Ok(Self {
            n_episodes,
            env: E::build(config, seed)?,
        })
    }
}
