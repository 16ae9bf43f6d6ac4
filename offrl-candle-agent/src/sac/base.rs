use super::{EntCoef, SacConfig};
use crate::{
    model::{SubModel1, SubModel2},
    util::{
        actor::GaussianActor, critic::MultiCritic, smooth_l1_loss, CriticLoss, OutDim,
        TransitionTensors,
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

/// Soft actor critic (SAC) agent.
///
/// The same agent is trained online with [`Trainer::train`] or with a static
/// dataset with [`Trainer::train_offline`].
///
/// [`Trainer::train`]: offrl_core::Trainer::train
/// [`Trainer::train_offline`]: offrl_core::Trainer::train_offline
pub struct Sac<E, Q, P, R>
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
    gamma: f64,
    n_updates_per_opt: usize,
    batch_size: usize,
    reward_scale: f32,
    critic_loss: CriticLoss,
    record_verbose_level: usize,
    train: bool,
    device: Device,
    phantom: PhantomData<(E, R)>,
}

impl<E, Q, P, R> Sac<E, Q, P, R>
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
    /// Returns the critic target, detached from the computation graph.
    ///
    /// `reward_scale * r + gamma * (1 - terminated) * (min Q_tgt(s', a') - alpha * logp(a'))`,
    /// where `next_a` and `next_logp` are sampled from the policy at `s'`.
    fn target(
        &self,
        batch: &TransitionTensors,
        next_a: &Tensor,
        next_logp: &Tensor,
    ) -> Result<Tensor> {
        let next_q = self.critic.qvals_min_tgt(&batch.next_obs, next_a)?;
        let next_v = (next_q - self.ent_coef.alpha()?.broadcast_mul(next_logp)?)?;
        let reward = batch.reward.affine(self.reward_scale as f64, 0.0)?;
        let tgt = (reward + (&batch.gamma_not_terminated * next_v)?)?;

        Ok(tgt.detach())
    }

    fn update_critic(&mut self, batch: &TransitionTensors) -> Result<f32> {
        let (next_a, next_logp) = self.actor.action_logp(&batch.next_obs)?;
        let tgt = self.target(batch, &next_a, &next_logp)?;

        let preds = self.critic.qvals(&batch.obs, &batch.act)?;
        let losses = preds
            .iter()
            .map(|pred| -> Result<Tensor> {
                match self.critic_loss {
                    CriticLoss::Mse => Ok(mse(pred, &tgt)?),
                    CriticLoss::SmoothL1 => smooth_l1_loss(pred, &tgt),
                }
            })
            .collect::<Result<Vec<_>>>()?;
        let loss = Tensor::stack(&losses, 0)?.sum_all()?;

        self.critic.backward_step(&loss)?;

        Ok(loss.to_scalar::<f32>()?)
    }

    /// Updates the actor, then the entropy coefficient with the same samples.
    fn update_actor(&mut self, obs: &Tensor) -> Result<(f32, Option<f32>)> {
        let (a, logp) = self.actor.action_logp(obs)?;
        let qval = self.critic.qvals_min(obs, &a)?;
        let loss = (self.ent_coef.alpha()?.broadcast_mul(&logp)? - qval)?.mean_all()?;

        self.actor.backward_step(&loss)?;
        let loss_alpha = self.ent_coef.update(&logp)?;

        Ok((loss.to_scalar::<f32>()?, loss_alpha))
    }

    fn opt_(&mut self, buffer: &mut R) -> Result<Record> {
        let mut loss_critic = 0f32;
        let mut loss_actor = 0f32;
        let mut loss_alpha = None;

        for _ in 0..self.n_updates_per_opt {
            trace!("batch()");
            let batch = buffer.batch(self.batch_size)?;
            let batch = TransitionTensors::from_batch(batch, self.gamma, &self.device)?;

            trace!("update_critic()");
            loss_critic += self.update_critic(&batch)?;

            trace!("update_actor()");
            let (loss_actor_, loss_alpha_) = self.update_actor(&batch.obs)?;
            loss_actor += loss_actor_;
            if let Some(l) = loss_alpha_ {
                loss_alpha = Some(loss_alpha.unwrap_or(0f32) + l);
            }

            trace!("soft_update()");
            self.critic.soft_update()?;
        }

        let n = self.n_updates_per_opt as f32;
        let mut record = Record::from_slice(&[
            ("loss_critic", RecordValue::Scalar(loss_critic / n)),
            ("loss_actor", RecordValue::Scalar(loss_actor / n)),
            ("ent_coef", RecordValue::Scalar(self.ent_coef.alpha_scalar()?)),
        ]);
        if let Some(loss_alpha) = loss_alpha {
            record.insert("loss_alpha", RecordValue::Scalar(loss_alpha / n));
        }
        if self.record_verbose_level >= 2 {
            record = record
                .merge(self.actor.param_stats()?)
                .merge(self.critic.param_stats()?);
        }

        Ok(record)
    }
}

impl<E, Q, P, R> Policy<E> for Sac<E, Q, P, R>
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
    /// Samples an action.
    ///
    /// In training mode, the action is sampled from the squashed Gaussian policy.
    /// Otherwise, `tanh(mean)` is returned.
    fn sample(&mut self, obs: &E::Obs) -> Result<E::Act> {
        let obs: Tensor = obs.clone().try_into()?;
        let obs = obs.to_device(&self.device)?;
        let act = self.actor.sample(&obs, self.train)?;
        E::Act::try_from(act)
    }
}

impl<E, Q, P, R> Configurable for Sac<E, Q, P, R>
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
    type Config = SacConfig<Q, P>;

    /// Constructs [`Sac`] agent.
    fn build(config: Self::Config) -> Result<Self> {
        let device: Device = config
            .device
            .context("No device is given for SAC agent")?
            .try_into()?;
        let actor = GaussianActor::build(config.actor_config, device.clone())?;
        let critic = MultiCritic::build(config.critic_config, device.clone())?;
        let ent_coef = EntCoef::new(config.ent_coef_mode, actor.out_dim(), device.clone())?;

        Ok(Sac {
            critic,
            actor,
            ent_coef,
            gamma: config.gamma,
            n_updates_per_opt: config.n_updates_per_opt,
            batch_size: config.batch_size,
            reward_scale: config.reward_scale,
            critic_loss: config.critic_loss,
            record_verbose_level: config.record_verbose_level,
            train: false,
            device,
            phantom: PhantomData,
        })
    }
}

impl<E, Q, P, R> Agent<E, R> for Sac<E, Q, P, R>
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

    /// Saves `actor.pt`, `critic.pt`, `critic.tgt.pt` and `ent_coef.pt`.
    fn save_params(&self, path: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(path)?;
        let actor_path = self.actor.save(path.join("actor"))?;
        let (critic_path, critic_tgt_path) = self.critic.save(path.join("critic"))?;
        let ent_coef_path = path.join("ent_coef.pt");
        self.ent_coef.save(&ent_coef_path)?;

        Ok(vec![actor_path, critic_path, critic_tgt_path, ent_coef_path])
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.actor.load(path.join("actor"))?;
        self.critic.load(path.join("critic"))?;
        self.ent_coef.load(path.join("ent_coef.pt"))?;
        Ok(())
    }
}
