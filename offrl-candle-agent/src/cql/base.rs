use super::{CqlConfig, LagrangeMultiplier};
use crate::{
    model::{SubModel1, SubModel2},
    sac::EntCoef,
    util::{
        actor::GaussianActor, critic::MultiCritic, log_sum_exp, OutDim, TransitionTensors,
    },
};
use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
use candle_nn::loss::mse;
use log::trace;
use offrl_core::{
    record::{Record, RecordValue},
    Agent, Configurable, Env, Policy, ReplayBufferBase, TransitionBatch,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    convert::{TryFrom, TryInto},
    fmt::Debug,
    fs,
    marker::PhantomData,
    path::{Path, PathBuf},
};

/// Losses and statistics of an update of the critics.
struct CriticLosses {
    /// Total loss of the critics, including the conservative penalties.
    loss: Tensor,

    /// Sum of the TD losses over critics.
    loss_td: f32,

    /// Gaps between out-of-distribution and dataset action values, one per critic.
    gaps: Vec<Tensor>,

    /// Sum of the conservative penalties over critics.
    penalty: f32,
}

/// Soft actor critic agent with conservative Q-learning (CQL).
///
/// The critic loss of SAC is augmented with a penalty on
/// `logsumexp_a Q(s, a) - Q(s, a_data)`, where the log-sum-exp is estimated with
/// uniformly random actions and actions sampled from the policy at `s` and `s'`.
/// Per update, the entropy coefficient, the actor, the critics and the target critics
/// are updated in this order. The losses of the actor and the entropy coefficient
/// are computed with the critics before the update.
pub struct Cql<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    R: ReplayBufferBase,
    E::Obs: TryInto<Tensor, Error = anyhow::Error>,
    E::Act: TryFrom<Tensor, Error = anyhow::Error>,
    Q::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + Debug + PartialEq + Clone,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: TryInto<Tensor, Error = anyhow::Error>,
    <R::Batch as TransitionBatch>::ActBatch: TryInto<Tensor, Error = anyhow::Error>,
{
    critic: MultiCritic<Q>,
    actor: GaussianActor<P>,
    ent_coef: EntCoef,
    lagrange: Option<LagrangeMultiplier>,
    gamma: f64,
    n_updates_per_opt: usize,
    batch_size: usize,
    reward_scale: f32,
    n_action_samples: usize,
    temp: f64,
    min_q_weight: f64,
    importance_sample: bool,
    target_action_gap: f64,
    backup_entropy: bool,
    max_target_backup: bool,
    clip_diff_min: Option<f64>,
    clip_diff_max: Option<f64>,
    record_verbose_level: usize,
    train: bool,
    device: Device,
    phantom: PhantomData<(E, R)>,
}

impl<E, Q, P, R> Cql<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    R: ReplayBufferBase,
    E::Obs: TryInto<Tensor, Error = anyhow::Error>,
    E::Act: TryFrom<Tensor, Error = anyhow::Error>,
    Q::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + Debug + PartialEq + Clone,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: TryInto<Tensor, Error = anyhow::Error>,
    <R::Batch as TransitionBatch>::ActBatch: TryInto<Tensor, Error = anyhow::Error>,
{
    /// Samples actions at `s'` for the critic target with their log probabilities.
    ///
    /// With the maximum target backup, `n_action_samples` actions are sampled per state and
    /// the shapes are `[batch_size, n, act_dim]` and `[batch_size, n]`.
    fn next_actions(&self, batch: &TransitionTensors) -> Result<(Tensor, Tensor)> {
        match self.max_target_backup {
            true => self
                .actor
                .action_logp_repeated(&batch.next_obs, self.n_action_samples),
            false => self.actor.action_logp(&batch.next_obs),
        }
    }

    /// Returns the critic target, detached from the computation graph.
    ///
    /// `alpha * logp` is subtracted from the target action values if `backup_entropy` is set.
    /// With the maximum target backup, the maximum over the sampled actions is taken after that.
    fn target(
        &self,
        batch: &TransitionTensors,
        next_a: &Tensor,
        next_logp: &Tensor,
    ) -> Result<Tensor> {
        let next_q = match self.max_target_backup {
            true => self.critic.qvals_multi_min_tgt(&batch.next_obs, next_a)?,
            false => self.critic.qvals_min_tgt(&batch.next_obs, next_a)?,
        };
        let next_q = match self.backup_entropy {
            true => (next_q - self.ent_coef.alpha()?.broadcast_mul(next_logp)?)?,
            false => next_q,
        };
        let next_v = match self.max_target_backup {
            true => next_q.max(1)?,
            false => next_q,
        };
        let reward = batch.reward.affine(self.reward_scale as f64, 0.0)?;
        let tgt = (reward + (&batch.gamma_not_terminated * next_v)?)?;

        Ok(tgt.detach())
    }

    /// Returns `mean(clamp(temp * logsumexp(cat / temp) - Q(s, a_data)))` for each critic.
    ///
    /// `qs_data` are the action values of the dataset actions, each of shape `[batch_size]`.
    fn gaps(&self, batch: &TransitionTensors, qs_data: &[Tensor]) -> Result<Vec<Tensor>> {
        let (batch_size, _) = batch.obs.dims2()?;
        let act_dim = self.actor.out_dim();
        let n = self.n_action_samples;

        // Policy actions at s and s', both evaluated at s
        let (curr_a, curr_logp) = self.actor.action_logp_repeated(&batch.obs, n)?;
        let (next_a, next_logp) = self.actor.action_logp_repeated(&batch.next_obs, n)?;
        let (curr_a, curr_logp) = (curr_a.detach(), curr_logp.detach());
        let (next_a, next_logp) = (next_a.detach(), next_logp.detach());
        let rand_a = Tensor::rand(-1f32, 1f32, (batch_size, n, act_dim), &self.device)?;

        let qs_rand = self.critic.qvals_multi(&batch.obs, &rand_a)?;
        let qs_curr = self.critic.qvals_multi(&batch.obs, &curr_a)?;
        let qs_next = self.critic.qvals_multi(&batch.obs, &next_a)?;

        qs_data
            .iter()
            .zip(qs_rand.iter().zip(qs_curr.iter().zip(qs_next.iter())))
            .map(|(q_data, (q_rand, (q_curr, q_next)))| {
                self.gap(q_data, q_rand, q_curr, &curr_logp, q_next, &next_logp)
            })
            .collect()
    }

    /// Returns the gap of a critic from its action values.
    ///
    /// `q_data` has shape `[batch_size]` and the others `[batch_size, n]`. `q_rand` are
    /// the values of uniformly random actions on `[-1, 1]^act_dim`.
    fn gap(
        &self,
        q_data: &Tensor,
        q_rand: &Tensor,
        q_curr: &Tensor,
        curr_logp: &Tensor,
        q_next: &Tensor,
        next_logp: &Tensor,
    ) -> Result<Tensor> {
        let cat = match self.importance_sample {
            true => {
                // Log density of the uniform distribution
                let rand_logp = self.actor.out_dim() as f64 * 0.5f64.ln();
                Tensor::cat(
                    &[
                        q_rand.affine(1.0, -rand_logp)?,
                        (q_next - next_logp)?,
                        (q_curr - curr_logp)?,
                    ],
                    1,
                )?
            }
            false => Tensor::cat(
                &[
                    q_rand.clone(),
                    q_data.unsqueeze(1)?,
                    q_next.clone(),
                    q_curr.clone(),
                ],
                1,
            )?,
        };
        let ood = (log_sum_exp(&(cat / self.temp)?, 1)? * self.temp)?;
        let diff = (ood - q_data)?;
        let diff = match (self.clip_diff_min, self.clip_diff_max) {
            (None, None) => diff,
            (min, max) => diff.clamp(
                min.unwrap_or(f64::NEG_INFINITY),
                max.unwrap_or(f64::INFINITY),
            )?,
        };
        Ok(diff.mean_all()?)
    }

    fn critic_losses(&self, batch: &TransitionTensors) -> Result<CriticLosses> {
        let (next_a, next_logp) = self.next_actions(batch)?;
        let tgt = self.target(batch, &next_a, &next_logp)?;
        let qs = self.critic.qvals(&batch.obs, &batch.act)?;
        let losses_td = qs
            .iter()
            .map(|q| -> Result<Tensor> { Ok(mse(q, &tgt)?) })
            .collect::<Result<Vec<_>>>()?;
        let gaps = self.gaps(batch, &qs)?;

        // Weight of the penalties
        let weight = match &self.lagrange {
            None => Tensor::new(&[self.min_q_weight as f32], &self.device)?,
            Some(lagrange) => (lagrange.alpha_prime()? * self.min_q_weight)?,
        };
        let offset = match &self.lagrange {
            None => 0.0,
            Some(_) => self.target_action_gap,
        };
        let penalties = gaps
            .iter()
            .map(|gap| -> Result<Tensor> { Ok(weight.broadcast_mul(&(gap - offset)?)?.squeeze(0)?) })
            .collect::<Result<Vec<_>>>()?;

        let loss_td = Tensor::stack(&losses_td, 0)?.sum_all()?;
        let penalty = Tensor::stack(&penalties, 0)?.sum_all()?;

        Ok(CriticLosses {
            loss: (&loss_td + &penalty)?,
            loss_td: loss_td.to_scalar::<f32>()?,
            gaps,
            penalty: penalty.to_scalar::<f32>()?,
        })
    }

    fn update(&mut self, batch: &TransitionTensors) -> Result<Record> {
        trace!("critic_losses()");
        let critic_losses = self.critic_losses(batch)?;

        trace!("update_actor()");
        let (a, logp) = self.actor.action_logp(&batch.obs)?;
        let qval = self.critic.qvals_min(&batch.obs, &a)?;
        let loss_actor = (self.ent_coef.alpha()?.broadcast_mul(&logp)? - qval)?.mean_all()?;
        let loss_alpha = self.ent_coef.update(&logp)?;
        self.actor.backward_step(&loss_actor)?;

        trace!("update_critic()");
        let loss_alpha_prime = match &mut self.lagrange {
            None => None,
            Some(lagrange) => Some(lagrange.update(
                &critic_losses.gaps,
                self.min_q_weight,
                self.target_action_gap,
            )?),
        };
        self.critic.backward_step(&critic_losses.loss)?;

        trace!("soft_update()");
        self.critic.soft_update()?;

        let gap = Tensor::stack(&critic_losses.gaps, 0)?
            .mean_all()?
            .to_scalar::<f32>()?;
        let mut record = Record::from_slice(&[
            ("loss_critic", RecordValue::Scalar(critic_losses.loss_td)),
            ("loss_actor", RecordValue::Scalar(loss_actor.to_scalar::<f32>()?)),
            ("cql_penalty", RecordValue::Scalar(critic_losses.penalty)),
            ("cql_gap", RecordValue::Scalar(gap)),
        ]);
        if let Some(loss_alpha) = loss_alpha {
            record.insert("loss_alpha", RecordValue::Scalar(loss_alpha));
        }
        if let Some(loss_alpha_prime) = loss_alpha_prime {
            record.insert("loss_alpha_prime", RecordValue::Scalar(loss_alpha_prime));
        }

        Ok(record)
    }

    fn opt_(&mut self, buffer: &mut R) -> Result<Record> {
        let mut records = vec![];

        for _ in 0..self.n_updates_per_opt {
            trace!("batch()");
            let batch = buffer.batch(self.batch_size)?;
            let batch = TransitionTensors::from_batch(batch, self.gamma, &self.device)?;
            records.push(self.update(&batch)?);
        }

        // Average over updates
        let n = records.len() as f32;
        let mut record = Record::empty();
        for r in records.iter() {
            for (k, v) in r.iter() {
                if let RecordValue::Scalar(v) = v {
                    let sum = record.get_scalar(k).unwrap_or(0.0);
                    record.insert(k.clone(), RecordValue::Scalar(sum + v / n));
                }
            }
        }
        record.insert(
            "ent_coef",
            RecordValue::Scalar(self.ent_coef.alpha_scalar()?),
        );
        if let Some(lagrange) = &self.lagrange {
            record.insert(
                "alpha_prime",
                RecordValue::Scalar(lagrange.alpha_prime_scalar()?),
            );
        }
        if self.record_verbose_level >= 2 {
            record = record
                .merge(self.actor.param_stats()?)
                .merge(self.critic.param_stats()?);
        }

        Ok(record)
    }
}

impl<E, Q, P, R> Policy<E> for Cql<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    R: ReplayBufferBase,
    E::Obs: TryInto<Tensor, Error = anyhow::Error>,
    E::Act: TryFrom<Tensor, Error = anyhow::Error>,
    Q::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + Debug + PartialEq + Clone,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: TryInto<Tensor, Error = anyhow::Error>,
    <R::Batch as TransitionBatch>::ActBatch: TryInto<Tensor, Error = anyhow::Error>,
{
    fn sample(&mut self, obs: &E::Obs) -> Result<E::Act> {
        let obs: Tensor = obs.clone().try_into()?;
        let obs = obs.to_device(&self.device)?;
        let act = self.actor.sample(&obs, self.train)?;
        E::Act::try_from(act)
    }
}

impl<E, Q, P, R> Configurable for Cql<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    R: ReplayBufferBase,
    E::Obs: TryInto<Tensor, Error = anyhow::Error>,
    E::Act: TryFrom<Tensor, Error = anyhow::Error>,
    Q::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + Debug + PartialEq + Clone,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: TryInto<Tensor, Error = anyhow::Error>,
    <R::Batch as TransitionBatch>::ActBatch: TryInto<Tensor, Error = anyhow::Error>,
{
    type Config = CqlConfig<Q, P>;

    /// Constructs [`Cql`] agent.
    fn build(config: Self::Config) -> Result<Self> {
        let device: Device = config
            .device
            .context("No device is given for CQL agent")?
            .try_into()?;
        let actor = GaussianActor::build(config.actor_config, device.clone())?;
        let critic = MultiCritic::build(config.critic_config, device.clone())?;
        let ent_coef = EntCoef::new(config.ent_coef_mode, actor.out_dim(), device.clone())?;
        let lagrange = match config.lagrange {
            true => Some(LagrangeMultiplier::new(config.alpha_prime_lr, &device)?),
            false => None,
        };

        Ok(Cql {
            critic,
            actor,
            ent_coef,
            lagrange,
            gamma: config.gamma,
            n_updates_per_opt: config.n_updates_per_opt,
            batch_size: config.batch_size,
            reward_scale: config.reward_scale,
            n_action_samples: config.n_action_samples,
            temp: config.temp,
            min_q_weight: config.min_q_weight,
            importance_sample: config.importance_sample,
            target_action_gap: config.target_action_gap,
            backup_entropy: config.backup_entropy,
            max_target_backup: config.max_target_backup,
            clip_diff_min: config.clip_diff_min,
            clip_diff_max: config.clip_diff_max,
            record_verbose_level: config.record_verbose_level,
            train: false,
            device,
            phantom: PhantomData,
        })
    }
}

impl<E, Q, P, R> Agent<E, R> for Cql<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    R: ReplayBufferBase,
    E::Obs: TryInto<Tensor, Error = anyhow::Error>,
    E::Act: TryFrom<Tensor, Error = anyhow::Error>,
    Q::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + Debug + PartialEq + Clone,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: TryInto<Tensor, Error = anyhow::Error>,
    <R::Batch as TransitionBatch>::ActBatch: TryInto<Tensor, Error = anyhow::Error>,
{
    fn train(&mut self) {
        self.train = true;
    }

    fn eval(&mut self) {
        self.train = false;
    }

    fn is_train(&self) -> bool {
        self.train
    }

    fn opt_with_record(&mut self, buffer: &mut R) -> Result<Record> {
        self.opt_(buffer)
    }

    /// Saves the files of [`Sac`](crate::sac::Sac), and `alpha_prime.pt` in the Lagrange mode.
    fn save_params(&self, path: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(path)?;
        let actor_path = self.actor.save(path.join("actor"))?;
        let (critic_path, critic_tgt_path) = self.critic.save(path.join("critic"))?;
        let ent_coef_path = path.join("ent_coef.pt");
        self.ent_coef.save(&ent_coef_path)?;
        let mut paths = vec![actor_path, critic_path, critic_tgt_path, ent_coef_path];

        if let Some(lagrange) = &self.lagrange {
            let alpha_prime_path = path.join("alpha_prime.pt");
            lagrange.save(&alpha_prime_path)?;
            paths.push(alpha_prime_path);
        }

        Ok(paths)
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.actor.load(path.join("actor"))?;
        self.critic.load(path.join("critic"))?;
        self.ent_coef.load(path.join("ent_coef.pt"))?;
        if let Some(lagrange) = &mut self.lagrange {
            lagrange.load(path.join("alpha_prime.pt"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        mlp::{Mlp, Mlp2, MlpConfig},
        sac::EntCoefMode,
        testing::{test_buffer, TestBuffer, TestEnv, TestObs, ACT_DIM, OBS_DIM},
        util::{actor::GaussianActorConfig, critic::MultiCriticConfig, gamma_not_terminated},
        Activation,
    };
    use tempdir::TempDir;

    type TestCql = Cql<TestEnv, Mlp, Mlp2, TestBuffer>;

    fn config() -> CqlConfig<Mlp, Mlp2> {
        let in_dim = OBS_DIM as i64;
        let out_dim = ACT_DIM as i64;
        let actor_config = GaussianActorConfig::default()
            .policy_config(MlpConfig::new(in_dim, vec![32, 32], out_dim, Activation::None));
        let critic_config = MultiCriticConfig::default().q_config(MlpConfig::new(
            in_dim + out_dim,
            vec![32, 32],
            1,
            Activation::None,
        ));
        CqlConfig::default()
            .actor_config(actor_config)
            .critic_config(critic_config)
            .batch_size(16)
            .device(candle_core::Device::Cpu)
    }

    fn batch(buffer: &mut TestBuffer, size: usize) -> Result<TransitionTensors> {
        let batch = buffer.batch(size)?;
        assert_eq!(batch.len(), size);
        TransitionTensors::from_batch(batch, 0.99, &Device::Cpu)
    }

    /// Random observations and actions with the given rewards, discounted with `gamma = 0.9`.
    fn transitions(reward: &[f32], is_terminated: &[i8]) -> Result<TransitionTensors> {
        let device = Device::Cpu;
        let n = reward.len();
        Ok(TransitionTensors {
            obs: Tensor::randn(0f32, 1f32, (n, OBS_DIM), &device)?,
            act: Tensor::rand(-1f32, 1f32, (n, ACT_DIM), &device)?,
            next_obs: Tensor::randn(0f32, 1f32, (n, OBS_DIM), &device)?,
            reward: Tensor::from_slice(reward, (n,), &device)?,
            gamma_not_terminated: gamma_not_terminated(0.9, is_terminated, &device)?,
        })
    }

    fn scalar(t: &Tensor) -> Result<f32> {
        Ok(t.to_scalar::<f32>()?)
    }

    /// `temp * ln(sum(exp(x / temp)))`
    fn soft_max(xs: &[f32], temp: f32) -> f32 {
        temp * xs.iter().map(|x| (x / temp).exp()).sum::<f32>().ln()
    }

    #[test]
    fn test_gaps_with_constant_critics() -> Result<()> {
        let mut buffer = test_buffer(64, 1.0)?;
        let batch = batch(&mut buffer, 16)?;

        // Without importance sampling, all of the 3n + 1 action values are equal
        let config = config().importance_sample(false).n_action_samples(4).temp(0.5);
        let agent = TestCql::build(config)?;
        agent.critic.fill_constant(&[1.0, -2.0])?;
        let qs = agent.critic.qvals(&batch.obs, &batch.act)?;
        let gaps = agent.gaps(&batch, &qs)?;
        assert_eq!(gaps.len(), 2);
        for gap in gaps.iter() {
            assert_eq!(gap.dims(), &[] as &[usize]);
            assert!((scalar(gap)? - 0.5 * 13f32.ln()).abs() < 1e-4);
        }

        // Clipping
        let config = config()
            .importance_sample(false)
            .n_action_samples(4)
            .temp(0.5)
            .clip_diff(Some(-0.1), Some(0.5));
        let agent = TestCql::build(config)?;
        agent.critic.fill_constant(&[1.0, -2.0])?;
        let qs = agent.critic.qvals(&batch.obs, &batch.act)?;
        for gap in agent.gaps(&batch, &qs)?.iter() {
            assert!((scalar(gap)? - 0.5).abs() < 1e-6);
        }

        Ok(())
    }

    #[test]
    fn test_gap_importance_sampling() -> Result<()> {
        let device = Device::Cpu;
        let q_data = [0.5f32, -1.0];
        let q_rand = [[0.1f32, 0.4], [-0.3, 0.2]];
        let q_curr = [[1.0f32, 0.8], [0.0, -0.5]];
        let curr_logp = [[-0.2f32, 0.6], [1.1, -0.4]];
        let q_next = [[0.7f32, 0.3], [-0.6, 0.9]];
        let next_logp = [[0.0f32, -1.3], [0.5, 0.2]];
        let t1 = |v: &[f32]| Tensor::from_slice(v, (2,), &device);
        let t2 = |v: &[[f32; 2]; 2]| Tensor::new(v, &device);

        for temp in [1.0f32, 0.5].iter() {
            let agent = TestCql::build(config().temp(*temp as f64))?;
            let gap = agent.gap(
                &t1(&q_data[..])?,
                &t2(&q_rand)?,
                &t2(&q_curr)?,
                &t2(&curr_logp)?,
                &t2(&q_next)?,
                &t2(&next_logp)?,
            )?;

            // Action dimension is 1, so the uniform density on [-1, 1] is 0.5
            let expected = (0..2)
                .map(|i| {
                    let mut xs = vec![];
                    for j in 0..2 {
                        xs.push(q_rand[i][j] - 0.5f32.ln());
                        xs.push(q_curr[i][j] - curr_logp[i][j]);
                        xs.push(q_next[i][j] - next_logp[i][j]);
                    }
                    soft_max(&xs, *temp) - q_data[i]
                })
                .sum::<f32>()
                / 2.0;
            assert!((scalar(&gap)? - expected).abs() < 1e-4);
        }

        Ok(())
    }

    #[test]
    fn test_target() -> Result<()> {
        let reward = [1.0f32, -1.0, 0.5, 2.0];
        let is_terminated = [0i8, 1, 0, 1];
        let batch = transitions(&reward, &is_terminated)?;
        let not_done = |i: usize| (1 - is_terminated[i]) as f32;

        // Minimum of the target critics, without the entropy term
        let agent = TestCql::build(config().discount_factor(0.9).reward_scale(2.0))?;
        agent.critic.fill_constant(&[1.5, 0.5])?;
        let (next_a, next_logp) = agent.next_actions(&batch)?;
        assert_eq!(next_a.dims(), &[4, ACT_DIM]);
        let tgt = agent.target(&batch, &next_a, &next_logp)?.to_vec1::<f32>()?;
        for i in 0..4 {
            let expected = 2.0 * reward[i] + 0.9 * not_done(i) * 0.5;
            assert!((tgt[i] - expected).abs() < 1e-5);
        }

        // The entropy term is subtracted with backup_entropy
        let config = config()
            .discount_factor(0.9)
            .ent_coef_mode(EntCoefMode::Fix(0.2))
            .backup_entropy(true);
        let agent = TestCql::build(config)?;
        agent.critic.fill_constant(&[1.5, 0.5])?;
        let next_logp = [0.3f32, -0.7, 1.2, 0.0];
        let next_logp_t = Tensor::from_slice(&next_logp, (4,), &Device::Cpu)?;
        let tgt = agent.target(&batch, &next_a, &next_logp_t)?.to_vec1::<f32>()?;
        for i in 0..4 {
            let expected = reward[i] + 0.9 * not_done(i) * (0.5 - 0.2 * next_logp[i]);
            assert!((tgt[i] - expected).abs() < 1e-5);
        }

        Ok(())
    }

    #[test]
    fn test_max_target_backup() -> Result<()> {
        let reward = [1.0f32, -1.0, 0.5, 2.0];
        let is_terminated = [0i8, 1, 0, 0];
        let batch = transitions(&reward, &is_terminated)?;
        let n = 5;
        let next_logp = Tensor::randn(0f32, 1f32, (4, n), &Device::Cpu)?;
        let logp = next_logp.to_vec2::<f32>()?;

        for backup_entropy in [false, true].iter() {
            let config = config()
                .discount_factor(0.9)
                .ent_coef_mode(EntCoefMode::Fix(0.2))
                .n_action_samples(n)
                .max_target_backup(true)
                .backup_entropy(*backup_entropy);
            let agent = TestCql::build(config)?;
            let (next_a, _) = agent.next_actions(&batch)?;
            assert_eq!(next_a.dims(), &[4, n, ACT_DIM]);

            let q = agent
                .critic
                .qvals_multi_min_tgt(&batch.next_obs, &next_a)?
                .to_vec2::<f32>()?;
            let tgt = agent.target(&batch, &next_a, &next_logp)?.to_vec1::<f32>()?;
            for i in 0..4 {
                let next_v = (0..n)
                    .map(|j| match *backup_entropy {
                        true => q[i][j] - 0.2 * logp[i][j],
                        false => q[i][j],
                    })
                    .fold(f32::NEG_INFINITY, f32::max);
                let expected = reward[i] + 0.9 * (1 - is_terminated[i]) as f32 * next_v;
                assert!((tgt[i] - expected).abs() < 1e-5);
            }
        }

        Ok(())
    }

    #[test]
    fn test_penalty_weight() -> Result<()> {
        let mut buffer = test_buffer(64, 1.0)?;
        let batch = batch(&mut buffer, 16)?;
        let agent = TestCql::build(config().min_q_weight(2.0))?;
        let losses = agent.critic_losses(&batch)?;
        let gap_sum: f32 = losses
            .gaps
            .iter()
            .map(|gap| gap.to_scalar::<f32>())
            .collect::<candle_core::Result<Vec<_>>>()?
            .iter()
            .sum();
        assert!((losses.penalty - 2.0 * gap_sum).abs() < 1e-4);

        Ok(())
    }

    #[test]
    fn test_opt_records() -> Result<()> {
        let mut buffer = test_buffer(64, 1.0)?;
        let mut agent = TestCql::build(config().n_updates_per_opt(2))?;
        agent.train();
        let record = agent.opt_with_record(&mut buffer)?;
        for key in [
            "loss_critic",
            "loss_actor",
            "loss_alpha",
            "ent_coef",
            "cql_penalty",
            "cql_gap",
        ]
        .iter()
        {
            assert!(record.get_scalar(key)?.is_finite());
        }
        assert!(record.get("alpha_prime").is_none());

        // Lagrange mode with the maximum target backup
        let config = config().lagrange(1.0).max_target_backup(true).backup_entropy(true);
        let mut agent = TestCql::build(config)?;
        agent.train();
        let record = agent.opt_with_record(&mut buffer)?;
        assert!(record.get_scalar("loss_alpha_prime")?.is_finite());
        assert!(record.get_scalar("alpha_prime")? > 0.0);

        Ok(())
    }

    #[test]
    fn test_save_load_params() -> Result<()> {
        let dir = TempDir::new("cql")?;
        let mut buffer = test_buffer(64, 1.0)?;
        let mut agent1 = TestCql::build(config().lagrange(1.0))?;
        let mut agent2 = TestCql::build(config().lagrange(1.0))?;
        agent1.train();
        agent1.opt(&mut buffer)?;

        let paths = agent1.save_params(dir.path())?;
        assert_eq!(paths.len(), 5);
        assert!(dir.path().join("alpha_prime.pt").exists());

        agent2.load_params(dir.path())?;
        let obs = TestObs(vec![0.3; OBS_DIM]);
        agent1.eval();
        agent2.eval();
        assert_eq!(agent1.sample(&obs)?.0, agent2.sample(&obs)?.0);

        Ok(())
    }
}
