use super::PendulumConfig;
use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use offrl_core::{
    record::{Record, RecordValue},
    Act, Env, Obs, Policy, Step,
};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::{convert::TryFrom, f32::consts::PI};

/// Dimension of observations.
pub const OBS_DIM: usize = 3;

/// Dimension of actions.
pub const ACT_DIM: usize = 1;

/// Observation of [`Pendulum`], `[cos(theta), sin(theta), theta_dot]`.
#[derive(Clone, Debug, PartialEq)]
pub struct PendulumObs(pub Vec<f32>);

impl Obs for PendulumObs {
    fn len(&self) -> usize {
        1
    }
}

/// Converts to a tensor of shape `[1, OBS_DIM]`.
impl TryFrom<PendulumObs> for Tensor {
    type Error = anyhow::Error;

    fn try_from(obs: PendulumObs) -> Result<Self> {
        Ok(Tensor::from_vec(obs.0, (1, OBS_DIM), &Device::Cpu)?)
    }
}

/// Action of [`Pendulum`], the torque normalized to `[-1, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct PendulumAct(pub Vec<f32>);

impl Act for PendulumAct {}

impl TryFrom<Tensor> for PendulumAct {
    type Error = anyhow::Error;

    fn try_from(t: Tensor) -> Result<Self> {
        let t = t.to_device(&Device::Cpu)?.flatten_all()?.to_dtype(DType::F32)?;
        Ok(Self(t.to_vec1::<f32>()?))
    }
}

/// Converts to a tensor of shape `[1, ACT_DIM]`.
impl TryFrom<PendulumAct> for Tensor {
    type Error = anyhow::Error;

    fn try_from(act: PendulumAct) -> Result<Self> {
        Ok(Tensor::from_vec(act.0, (1, ACT_DIM), &Device::Cpu)?)
    }
}

fn angle_normalize(x: f32) -> f32 {
    (x + PI).rem_euclid(2.0 * PI) - PI
}

/// Pendulum swing-up environment.
pub struct Pendulum {
    config: PendulumConfig,
    rng: SmallRng,
    th: f32,
    thdot: f32,
    t: usize,
}

impl Pendulum {
    fn obs(&self) -> PendulumObs {
        PendulumObs(vec![self.th.cos(), self.th.sin(), self.thdot])
    }

    fn reset_state(&mut self) -> PendulumObs {
        self.th = self.rng.gen_range(-PI..PI);
        self.thdot = self.rng.gen_range(-1f32..1f32);
        self.t = 0;
        self.obs()
    }

    /// Returns the angle and the angular velocity of the pendulum.
    pub fn state(&self) -> (f32, f32) {
        (self.th, self.thdot)
    }
}

impl Env for Pendulum {
    type Config = PendulumConfig;
    type Obs = PendulumObs;
    type Act = PendulumAct;
    type Info = ();

    fn build(config: &Self::Config, seed: i64) -> Result<Self> {
        let mut env = Self {
            config: config.clone(),
            rng: SmallRng::seed_from_u64(seed as _),
            th: 0.0,
            thdot: 0.0,
            t: 0,
        };
        env.reset_state();
        Ok(env)
    }

    /// Applies the torque `a * max_torque`, clipped to `[-max_torque, max_torque]`.
    ///
    /// The returned record has the applied torque as `"torque"`.
    fn step(&mut self, a: &Self::Act) -> Result<(Step<Self>, Record)> {
        let PendulumConfig {
            max_steps,
            max_torque,
            max_speed,
            dt,
            g,
            m,
            l,
        } = self.config;
        let a0 = a.0.first().context("Empty action for Pendulum")?;
        let u = (a0 * max_torque).clamp(-max_torque, max_torque);
        let (th, thdot) = (self.th, self.thdot);

        let cost = angle_normalize(th).powi(2) + 0.1 * thdot.powi(2) + 0.001 * u.powi(2);
        let thdot = thdot + (3.0 * g / (2.0 * l) * th.sin() + 3.0 / (m * l * l) * u) * dt;
        let thdot = thdot.clamp(-max_speed, max_speed);
        self.th = th + thdot * dt;
        self.thdot = thdot;
        self.t += 1;

        let is_truncated = (self.t >= max_steps) as i8;
        let step = Step::new(
            self.obs(),
            a.clone(),
            vec![-cost],
            vec![0],
            vec![is_truncated],
            (),
            None,
        );
        let record = Record::from_slice(&[("torque", RecordValue::Scalar(u))]);

        Ok((step, record))
    }

    fn reset(&mut self, is_done: Option<&Vec<i8>>) -> Result<Self::Obs> {
        let is_done = match is_done {
            None => true,
            Some(v) => *v.first().context("Empty is_done flags for Pendulum")? == 1,
        };
        match is_done {
            true => Ok(self.reset_state()),
            false => Ok(self.obs()),
        }
    }

    fn step_with_reset(&mut self, a: &Self::Act) -> Result<(Step<Self>, Record)> {
        let (mut step, record) = self.step(a)?;
        if step.is_done() {
            step.init_obs = Some(self.reset_state());
        }
        Ok((step, record))
    }

    /// Resets the environment with the random state determined by `ix`.
    fn reset_with_index(&mut self, ix: usize) -> Result<Self::Obs> {
        self.rng = SmallRng::seed_from_u64(ix as _);
        Ok(self.reset_state())
    }
}

/// Samples actions uniformly from `[-1, 1]`.
///
/// Used for filling replay buffers or collecting datasets without a trained agent.
pub struct RandomPolicy {
    rng: SmallRng,
}

impl RandomPolicy {
    /// Constructs a [`RandomPolicy`] with the given random seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl Policy<Pendulum> for RandomPolicy {
    fn sample(&mut self, _obs: &PendulumObs) -> Result<PendulumAct> {
        Ok(PendulumAct(vec![self.rng.gen_range(-1f32..1f32); ACT_DIM]))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::convert::TryInto;

    #[test]
    fn test_episode_is_truncated() -> Result<()> {
        let config = PendulumConfig::default().max_steps(10);
        let mut env = Pendulum::build(&config, 0)?;
        let obs = env.reset(None)?;
        assert_eq!(obs.0.len(), OBS_DIM);

        for t in 1..=10 {
            let (step, _) = env.step_with_reset(&PendulumAct(vec![0.0]))?;
            assert_eq!(step.is_terminated, vec![0]);
            assert!(step.reward[0] <= 0.0);
            if t < 10 {
                assert!(!step.is_done());
                assert!(step.init_obs.is_none());
            } else {
                assert_eq!(step.is_truncated, vec![1]);
                assert!(step.init_obs.is_some());
            }
        }

        Ok(())
    }

    #[test]
    fn test_dynamics() -> Result<()> {
        let mut env = Pendulum::build(&PendulumConfig::default(), 0)?;
        env.th = 0.0;
        env.thdot = 0.0;

        // Upright and at rest without torque: no cost and no motion
        let (step, _) = env.step(&PendulumAct(vec![0.0]))?;
        assert_eq!(step.reward, vec![0.0]);
        assert_eq!(step.obs.0, vec![1.0, 0.0, 0.0]);

        // Positive torque accelerates the pendulum, clipped at max_torque
        let (step, record) = env.step(&PendulumAct(vec![5.0]))?;
        assert_eq!(record.get_scalar("torque")?, 2.0);
        let expected_thdot = 3.0 / 1.0 * 2.0 * 0.05;
        assert!((step.obs.0[2] - expected_thdot).abs() < 1e-6);
        assert!((step.reward[0] + 0.001 * 4.0).abs() < 1e-6);

        Ok(())
    }

    #[test]
    fn test_empty_inputs() -> Result<()> {
        let mut env = Pendulum::build(&PendulumConfig::default(), 0)?;
        assert!(env.step(&PendulumAct(vec![])).is_err());
        assert!(env.step_with_reset(&PendulumAct(vec![])).is_err());
        assert!(env.reset(Some(&vec![])).is_err());

        // Not done, the state is kept
        let (th, thdot) = env.state();
        let obs = env.reset(Some(&vec![0]))?;
        assert_eq!(obs.0, vec![th.cos(), th.sin(), thdot]);

        Ok(())
    }

    #[test]
    fn test_reset_with_index() -> Result<()> {
        let config = PendulumConfig::default();
        let mut env1 = Pendulum::build(&config, 0)?;
        let mut env2 = Pendulum::build(&config, 1)?;
        assert_eq!(env1.reset_with_index(3)?, env2.reset_with_index(3)?);
        assert_ne!(env1.reset_with_index(3)?, env1.reset_with_index(4)?);

        Ok(())
    }

    #[test]
    fn test_random_policy() -> Result<()> {
        let mut env = Pendulum::build(&PendulumConfig::default(), 0)?;
        let obs = env.reset(None)?;
        let mut policy = RandomPolicy::new(42);
        for _ in 0..10 {
            let a = policy.sample(&obs)?;
            assert_eq!(a.0.len(), ACT_DIM);
            assert!(a.0[0].abs() <= 1.0);
        }

        Ok(())
    }

    #[test]
    fn test_angle_normalize() {
        assert!((angle_normalize(2.0 * PI + 0.5) - 0.5).abs() < 1e-5);
        assert!((angle_normalize(-0.5) + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_conversions() -> Result<()> {
        let t: Tensor = PendulumObs(vec![1.0, 0.0, 0.5]).try_into()?;
        assert_eq!(t.dims(), &[1, OBS_DIM]);
        let act = PendulumAct::try_from(Tensor::new(&[[0.25f32]], &Device::Cpu)?)?;
        assert_eq!(act, PendulumAct(vec![0.25]));

        Ok(())
    }
}
