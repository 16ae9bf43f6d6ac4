//! A tiny environment and replay buffer for testing agents.
use crate::TensorBatch;
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use offrl_core::{
    generic_replay_buffer::{
        GenericTransitionBatch, SimpleReplayBuffer, SimpleReplayBufferConfig,
    },
    record::Record,
    Act, Env, ExperienceBufferBase, Obs, ReplayBufferBase, Step,
};
use std::convert::TryFrom;

pub const OBS_DIM: usize = 3;
pub const ACT_DIM: usize = 1;

#[derive(Clone, Debug)]
pub struct TestObs(pub Vec<f32>);

impl Obs for TestObs {
    fn len(&self) -> usize {
        1
    }
}

impl TryFrom<TestObs> for Tensor {
    type Error = anyhow::Error;

    fn try_from(obs: TestObs) -> Result<Self> {
        Ok(Tensor::from_vec(obs.0, (1, OBS_DIM), &Device::Cpu)?)
    }
}

#[derive(Clone, Debug)]
pub struct TestAct(pub Vec<f32>);

impl Act for TestAct {}

impl TryFrom<Tensor> for TestAct {
    type Error = anyhow::Error;

    fn try_from(t: Tensor) -> Result<Self> {
        Ok(Self(t.flatten_all()?.to_dtype(DType::F32)?.to_vec1::<f32>()?))
    }
}

/// Observations are constant, episodes last for 5 steps.
pub struct TestEnv {
    t: usize,
}

impl TestEnv {
    fn obs(&self) -> TestObs {
        TestObs(vec![self.t as f32 * 0.1; OBS_DIM])
    }
}

impl Env for TestEnv {
    type Config = ();
    type Obs = TestObs;
    type Act = TestAct;
    type Info = ();

    fn build(_config: &Self::Config, _seed: i64) -> Result<Self> {
        Ok(Self { t: 0 })
    }

    fn step(&mut self, a: &Self::Act) -> Result<(Step<Self>, Record)> {
        self.t += 1;
        let is_truncated = (self.t >= 5) as i8;
        let step = Step::new(
            self.obs(),
            a.clone(),
            vec![-a.0[0].abs()],
            vec![0],
            vec![is_truncated],
            (),
            None,
        );
        Ok((step, Record::empty()))
    }

    fn reset(&mut self, _is_done: Option<&Vec<i8>>) -> Result<Self::Obs> {
        self.t = 0;
        Ok(self.obs())
    }

    fn step_with_reset(&mut self, a: &Self::Act) -> Result<(Step<Self>, Record)> {
        let (mut step, record) = self.step(a)?;
        if step.is_done() {
            step.init_obs = Some(self.reset(None)?);
        }
        Ok((step, record))
    }

    fn reset_with_index(&mut self, _ix: usize) -> Result<Self::Obs> {
        self.reset(None)
    }
}

pub type TestBuffer = SimpleReplayBuffer<TensorBatch, TensorBatch>;

/// Builds a buffer of `n` random transitions with the given constant reward.
///
/// Every 10th transition is terminal.
pub fn test_buffer(n: usize, reward: f32) -> Result<TestBuffer> {
    let device = Device::Cpu;
    let config = SimpleReplayBufferConfig::default().capacity(n).seed(42);
    let mut buffer = TestBuffer::build(&config);
    let batch = GenericTransitionBatch {
        obs: TensorBatch::from_tensor(Tensor::randn(0f32, 1f32, (n, OBS_DIM), &device)?),
        act: TensorBatch::from_tensor(Tensor::rand(-1f32, 1f32, (n, ACT_DIM), &device)?),
        next_obs: TensorBatch::from_tensor(Tensor::randn(0f32, 1f32, (n, OBS_DIM), &device)?),
        reward: vec![reward; n],
        is_terminated: (0..n).map(|i| (i % 10 == 9) as i8).collect(),
        is_truncated: vec![0; n],
        ix_sample: None,
    };
    buffer.push(batch)?;
    Ok(buffer)
}
