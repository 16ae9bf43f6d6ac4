//! Behavior cloning (BC) agent implemented with candle.
use super::{BcConfig, BcModel};
use crate::model::SubModel1;
use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
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

/// Behavior cloning (BC) agent.
///
/// The policy network `P` is fit to the actions of a dataset with supervised
/// learning, see [`BcModel`]. Actions are deterministic in both training and
/// evaluation mode.
pub struct Bc<E, P, R>
where
    P: SubModel1<Input = Tensor, Output = Tensor>,
    P::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
{
    model: BcModel<P>,
    batch_size: usize,
    device: Device,
    train: bool,
    phantom: PhantomData<(E, R)>,
}

impl<E, P, R> Policy<E> for Bc<E, P, R>
where
    E: Env,
    P: SubModel1<Input = Tensor, Output = Tensor>,
    E::Obs: TryInto<Tensor, Error = anyhow::Error>,
    E::Act: TryFrom<Tensor, Error = anyhow::Error>,
    P::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
{
    fn sample(&mut self, obs: &E::Obs) -> Result<E::Act> {
        let obs: Tensor = obs.clone().try_into()?;
        let act = self.model.act(&obs.to_device(&self.device)?)?;
        E::Act::try_from(act)
    }
}

impl<E, P, R> Configurable for Bc<E, P, R>
where
    E: Env,
    P: SubModel1<Input = Tensor, Output = Tensor>,
    E::Obs: TryInto<Tensor, Error = anyhow::Error>,
    E::Act: TryFrom<Tensor, Error = anyhow::Error>,
    P::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
{
    type Config = BcConfig<P>;

    fn build(config: Self::Config) -> Result<Self> {
        let device: Device = config
            .device
            .context("No device is given for BC agent")?
            .try_into()?;
        let policy_config = config
            .policy_config
            .context("policy_config is not set for BC agent")?;
        let model = BcModel::build(
            policy_config,
            &config.opt_config,
            config.action_type,
            &device,
        )?;

        Ok(Self {
            model,
            batch_size: config.batch_size,
            device,
            train: false,
            phantom: PhantomData,
        })
    }
}

impl<E, P, R> Agent<E, R> for Bc<E, P, R>
where
    E: Env,
    P: SubModel1<Input = Tensor, Output = Tensor>,
    R: ReplayBufferBase,
    E::Obs: TryInto<Tensor, Error = anyhow::Error>,
    E::Act: TryFrom<Tensor, Error = anyhow::Error>,
    P::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
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
        trace!("batch()");
        let (obs, act, ..) = buffer.batch(self.batch_size)?.unpack();
        let obs: Tensor = obs.try_into()?;
        let act: Tensor = act.try_into()?;

        let loss = self
            .model
            .update(&obs.to_device(&self.device)?, &act.to_device(&self.device)?)?;

        Ok(Record::from_slice(&[("loss", RecordValue::Scalar(loss))]))
    }

    /// Saves `policy_model.pt` in the directory.
    fn save_params(&self, path: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(path)?;
        let path = path.join("policy_model.pt");
        self.model.save(&path)?;
        Ok(vec![path])
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.model.load(path.join("policy_model.pt"))
    }
}
