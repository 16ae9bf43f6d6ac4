//! Train [`Agent`].
mod config;
mod sampler;
use std::{
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use crate::{
    record::{Record, RecordValue::Scalar, Recorder},
    Agent, Env, Evaluator, ExperienceBufferBase, ReplayBufferBase, StepProcessor,
};
use anyhow::Result;
pub use config::TrainerConfig;
use log::info;
pub use sampler::Sampler;

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Manages training loop and related objects.
///
/// # Online training loop
///
/// [`Trainer::train()`] looks like following:
///
/// 0. Given an agent implementing [`Agent`] and a recorder implementing [`Recorder`].
/// 1. Initialize the objects used in the training loop, involving instances of [`Env`],
///    [`StepProcessor`], [`Sampler`].
///    * Reset a counter of the environment steps: `env_steps = 0`
///    * Reset a counter of the optimization steps: `opt_steps = 0`
/// 2. Reset [`Env`].
/// 3. Do an environment step and push a transition to the replay buffer.
/// 4. `env_steps += 1`
/// 5. If `env_steps >= warmup_period` and `env_steps % opt_interval == 0`:
///     1. Do an optimization step for the agent with transition batches
///        sampled from the replay buffer.
///     2. `opt_steps += 1`
///     3. Post-process the optimization step (see below).
///     4. If `opt_steps == max_opts`, finish training loop.
/// 6. Back to step 3.
///
/// # Offline training loop
///
/// [`Trainer::train_offline()`] skips environment steps. The agent is optimized
/// with batches sampled from a replay buffer filled in advance, typically with
/// [`TransitionDataset::create_replay_buffer`], until `opt_steps == max_opts`.
///
/// # Post-processing of an optimization step
///
/// * If `opt_steps % record_compute_cost_interval == 0`, optimization steps per second
///   is added to the record as `"opt_steps_per_sec"` (and `"fps"` in online training).
/// * If `opt_steps % eval_interval == 0`, the agent is evaluated in evaluation mode
///   and the result is added to the record as `"eval_reward"`. If the result is the best
///   so far, the parameters of the agent are saved in `(model_dir)/best`.
/// * If `opt_steps % save_interval == 0`, the parameters of the agent are saved in
///   `(model_dir)/(opt_steps)`.
/// * If `opt_steps % flush_record_interval == 0`, stored records are flushed.
///
/// # Interaction of objects
///
/// In [`Trainer::train()`] method, objects interact as shown below:
///
/// ```mermaid
/// graph LR
///     A[Agent]-->|Env::Act|B[Env]
///     B -->|Env::Obs|A
///     B -->|"Step&lt;E: Env&gt;"|C[StepProcessor]
///     C -->|ReplayBufferBase::Item|D[ReplayBufferBase]
///     D -->|TransitionBatch|A
/// ```
///
/// [`Trainer::train()`]: Trainer::train
/// [`Trainer::train_offline()`]: Trainer::train_offline
/// [`TransitionDataset::create_replay_buffer`]: crate::dataset::TransitionDataset::create_replay_buffer
pub struct Trainer {
    /// Where to save the trained model.
    model_dir: Option<String>,

    /// Interval of optimization in environment steps.
    opt_interval: usize,

    /// Interval of recording computational cost in optimization steps.
    record_compute_cost_interval: usize,

    /// Interval of recording agent information in optimization steps.
    record_agent_info_interval: usize,

    /// Interval of flushing records in optimization steps.
    flush_records_interval: usize,

    /// Interval of evaluation in optimization steps.
    eval_interval: usize,

    /// Interval of saving the model in optimization steps.
    save_interval: usize,

    /// The maximal number of optimization steps.
    max_opts: usize,

    /// Warmup period, for filling replay buffer, in environment steps.
    warmup_period: usize,

    /// Optimization steps for computing optimization steps per second.
    opt_steps_for_ops: usize,

    /// Timer for computing for optimization steps per second.
    timer_for_ops: Duration,

    /// The best evaluation result so far.
    max_eval_reward: f32,

    env_steps: usize,
    opt_steps: usize,
}

fn is_multiple(step: usize, interval: usize) -> bool {
    interval > 0 && step % interval == 0
}

impl Trainer {
    /// Constructs a trainer.
    pub fn build(config: TrainerConfig) -> Self {
        Self {
            model_dir: config.model_dir,
            opt_interval: config.opt_interval.max(1),
            record_compute_cost_interval: config.record_compute_cost_interval,
            record_agent_info_interval: config.record_agent_info_interval,
            flush_records_interval: config.flush_record_interval,
            eval_interval: config.eval_interval,
            save_interval: config.save_interval,
            max_opts: config.max_opts,
            warmup_period: config.warmup_period,
            opt_steps_for_ops: 0,
            timer_for_ops: Duration::new(0, 0),
            max_eval_reward: f32::MIN,
            env_steps: 0,
            opt_steps: 0,
        }
    }

    /// Number of environment steps done in online training.
    pub fn env_steps(&self) -> usize {
        self.env_steps
    }

    /// Number of optimization steps done.
    pub fn opt_steps(&self) -> usize {
        self.opt_steps
    }

    fn save_model<E, R, A>(agent: &A, model_dir: PathBuf) -> Result<()>
    where
        E: Env,
        R: ReplayBufferBase,
        A: Agent<E, R>,
    {
        std::fs::create_dir_all(&model_dir)?;
        agent.save_params(&model_dir)?;
        info!("Saved the model in {:?}", &model_dir);
        Ok(())
    }

    fn save_best_model<E, R, A>(&self, agent: &A) -> Result<()>
    where
        E: Env,
        R: ReplayBufferBase,
        A: Agent<E, R>,
    {
        match &self.model_dir {
            Some(model_dir) => {
                Self::save_model::<E, R, A>(agent, Path::new(model_dir).join("best"))
            }
            None => Ok(()),
        }
    }

    fn save_model_with_steps<E, R, A>(&self, agent: &A) -> Result<()>
    where
        E: Env,
        R: ReplayBufferBase,
        A: Agent<E, R>,
    {
        match &self.model_dir {
            Some(model_dir) => Self::save_model::<E, R, A>(
                agent,
                Path::new(model_dir).join(format!("{}", self.opt_steps)),
            ),
            None => Ok(()),
        }
    }

    /// Returns optimization steps per second, then reset the internal counter.
    fn opt_steps_per_sec(&mut self) -> f32 {
        let osps =
            self.opt_steps_for_ops as f32 / self.timer_for_ops.as_secs_f32().max(f32::EPSILON);
        self.opt_steps_for_ops = 0;
        self.timer_for_ops = Duration::new(0, 0);
        osps
    }

    /// Performs an optimization step, with the record of the agent
    /// at every `record_agent_info_interval` steps.
    fn opt_step<E, R, A>(&mut self, agent: &mut A, buffer: &mut R) -> Result<Record>
    where
        E: Env,
        R: ReplayBufferBase,
        A: Agent<E, R>,
    {
        let timer = SystemTime::now();
        let record = if is_multiple(self.opt_steps + 1, self.record_agent_info_interval) {
            agent.opt_with_record(buffer)?
        } else {
            agent.opt(buffer)?;
            Record::empty()
        };
        self.opt_steps += 1;
        self.timer_for_ops += timer.elapsed()?;
        self.opt_steps_for_ops += 1;
        Ok(record)
    }

    /// Evaluation and checkpointing after an optimization step.
    fn post_process<E, R, A, D>(
        &mut self,
        agent: &mut A,
        evaluator: &mut D,
        record: &mut Record,
    ) -> Result<()>
    where
        E: Env,
        R: ReplayBufferBase,
        A: Agent<E, R>,
        D: Evaluator<E>,
    {
        if is_multiple(self.opt_steps, self.record_compute_cost_interval) {
            record.insert("opt_steps_per_sec", Scalar(self.opt_steps_per_sec()));
        }

        if is_multiple(self.opt_steps, self.eval_interval) {
            info!("Starts evaluation of the trained model");
            agent.eval();
            let record_eval = evaluator.evaluate(agent);
            agent.train();
            let eval_reward = record_eval?.get_scalar_without_key().unwrap_or(f32::MIN);
            info!("Evaluation reward at {} steps: {}", self.opt_steps, eval_reward);
            record.insert("eval_reward", Scalar(eval_reward));

            // Save the best model up to the current iteration
            if eval_reward > self.max_eval_reward {
                self.max_eval_reward = eval_reward;
                self.save_best_model::<E, R, A>(agent)?;
            }
        }

        if is_multiple(self.opt_steps, self.save_interval) {
            self.save_model_with_steps::<E, R, A>(agent)?;
        }

        Ok(())
    }

    /// Performs a training step.
    ///
    /// First, it performes an environment step once and pushes a transition
    /// into the given buffer with [`Sampler`]. Then, if the warmup period has passed
    /// and the number of environment steps reaches the optimization interval
    /// `opt_interval`, performes an optimization step.
    ///
    /// The second return value in the tuple is if an optimization step is done (`true`).
    pub fn train_step<E, P, A, R>(
        &mut self,
        agent: &mut A,
        buffer: &mut R,
        sampler: &mut Sampler<E, P>,
    ) -> Result<(Record, bool)>
    where
        E: Env,
        P: StepProcessor<E>,
        A: Agent<E, R>,
        R: ExperienceBufferBase<Item = P::Output> + ReplayBufferBase,
    {
        // Sample transition and push it into the replay buffer
        let record = sampler.sample_and_push(agent, buffer)?;
        self.env_steps += 1;

        if self.env_steps < self.warmup_period || self.env_steps % self.opt_interval != 0 {
            Ok((record, false))
        } else {
            let record_agent = self.opt_step::<E, R, A>(agent, buffer)?;
            Ok((record.merge(record_agent), true))
        }
    }

    /// Trains the agent online.
    ///
    /// Transitions are produced by interaction of the agent and `env`,
    /// processed by `step_proc` and pushed into `buffer`.
    pub fn train<E, P, A, R, D>(
        &mut self,
        env: E,
        step_proc: P,
        agent: &mut A,
        buffer: &mut R,
        recorder: &mut Box<dyn Recorder>,
        evaluator: &mut D,
    ) -> Result<()>
    where
        E: Env,
        P: StepProcessor<E>,
        A: Agent<E, R>,
        R: ExperienceBufferBase<Item = P::Output> + ReplayBufferBase,
        D: Evaluator<E>,
    {
        let mut sampler = Sampler::new(env, step_proc);
        agent.train();

        if self.max_opts == 0 {
            return Ok(());
        }

        loop {
            let (mut record, is_opt) = self.train_step::<E, P, A, R>(agent, buffer, &mut sampler)?;

            if is_opt {
                if is_multiple(self.opt_steps, self.record_compute_cost_interval) {
                    record.insert("fps", Scalar(sampler.fps()));
                }
                self.post_process::<E, R, A, D>(agent, evaluator, &mut record)?;
            }

            // Store record to the recorder
            if !record.is_empty() {
                recorder.store(record);
            }

            if is_opt {
                if is_multiple(self.opt_steps, self.flush_records_interval) {
                    recorder.flush(self.opt_steps as _);
                }

                if self.opt_steps >= self.max_opts {
                    break;
                }
            }
        }

        Ok(())
    }

    /// Trains the agent offline, with batches sampled from `buffer`.
    ///
    /// No environment interaction happens except for evaluation.
    pub fn train_offline<E, A, R, D>(
        &mut self,
        agent: &mut A,
        buffer: &mut R,
        recorder: &mut Box<dyn Recorder>,
        evaluator: &mut D,
    ) -> Result<()>
    where
        E: Env,
        A: Agent<E, R>,
        R: ReplayBufferBase,
        D: Evaluator<E>,
    {
        agent.train();

        while self.opt_steps < self.max_opts {
            let mut record = self.opt_step::<E, R, A>(agent, buffer)?;
            self.post_process::<E, R, A, D>(agent, evaluator, &mut record)?;

            if !record.is_empty() {
                recorder.store(record);
            }

            if is_multiple(self.opt_steps, self.flush_records_interval) {
                recorder.flush(self.opt_steps as _);
            }
        }

        Ok(())
    }
}
