//! Utilities.
use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, Tensor, Var, D};
use candle_nn::VarMap;
use log::trace;
use offrl_core::{
    record::{Record, RecordValue},
    TransitionBatch,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, convert::TryInto, sync::MutexGuard};
pub mod actor;
pub mod critic;

/// Critic loss type.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum CriticLoss {
    /// Mean squared error.
    Mse,

    /// Smooth L1 loss.
    SmoothL1,
}

fn lock(varmap: &VarMap) -> Result<MutexGuard<HashMap<String, Var>>> {
    varmap
        .data()
        .lock()
        .map_err(|e| anyhow!("Failed to lock VarMap: {}", e))
}

/// Apply soft update on variables.
///
/// Variables are identified by their names.
///
/// dest = tau * src + (1.0 - tau) * dest
pub fn track(dest: &VarMap, src: &VarMap, tau: f64) -> Result<()> {
    track_with_replace_substring(dest, src, tau, ("", ""))
}

/// Apply soft update on variables, where the name of a source variable is
/// that of the destination with `ss_dest` replaced by `ss_src`.
///
/// It is used when the source and target networks are built with different prefixes,
/// like `critic0` and `critic_tgt0`.
pub fn track_with_replace_substring(
    dest: &VarMap,
    src: &VarMap,
    tau: f64,
    (ss_src, ss_dest): (&str, &str),
) -> Result<()> {
    trace!("track(tau = {})", tau);
    let dest = lock(dest)?;
    let src = lock(src)?;

    for (k_dest, v_dest) in dest.iter() {
        let k_src = match ss_dest.is_empty() {
            true => k_dest.clone(),
            false => k_dest.replace(ss_dest, ss_src),
        };
        let v_src = src
            .get(&k_src)
            .with_context(|| format!("Variable {} is not found in source", k_src))?;
        let t_src = v_src.as_tensor();
        let t_dest = v_dest.as_tensor();
        let t_dest = ((tau * t_src)? + (1.0 - tau) * t_dest)?;
        v_dest.set(&t_dest)?;
    }

    Ok(())
}

/// Interface for handling output dimensions.
pub trait OutDim {
    /// Returns the output dimension.
    fn get_out_dim(&self) -> i64;

    /// Sets the  output dimension.
    fn set_out_dim(&mut self, v: i64);
}

/// See <https://pytorch.org/docs/stable/generated/torch.nn.SmoothL1Loss.html>.
pub fn smooth_l1_loss(x: &Tensor, y: &Tensor) -> Result<Tensor> {
    let d = (x - y)?.abs()?;
    let m1 = d.lt(1.0)?.to_dtype(DType::F32)?;
    let m2 = (1.0 - &m1)?;
    Ok((((0.5 * m1)? * d.powf(2.0))? + (m2 * (d - 0.5)?)?)?.mean_all()?)
}

/// Returns the standard deviation of a tensor.
pub fn std(t: &Tensor) -> Result<f32> {
    Ok(t
        .broadcast_sub(&t.mean_all()?)?
        .powf(2f64)?
        .mean_all()?
        .sqrt()?
        .to_vec0::<f32>()?)
}

/// Returns the mean and standard deviation of the parameters.
pub fn param_stats(varmap: &VarMap) -> Result<Record> {
    let mut record = Record::empty();

    for (k, v) in lock(varmap)?.iter() {
        let m: f32 = v.mean_all()?.to_vec0()?;
        record.insert(format!("{}_mean", &k), RecordValue::Scalar(m));
        record.insert(format!("{}_std", &k), RecordValue::Scalar(std(v.as_tensor())?));
    }

    Ok(record)
}

/// Returns `gamma * (1 - is_terminated)`.
///
/// Truncation does not stop bootstrapping, so `is_truncated` is not used here.
pub fn gamma_not_terminated(gamma: f64, is_terminated: &[i8], device: &Device) -> Result<Tensor> {
    let v = is_terminated
        .iter()
        .map(|e| (gamma * (1 - *e) as f64) as f32)
        .collect::<Vec<_>>();
    Ok(Tensor::from_slice(&v[..], (v.len(),), device)?)
}

/// Converts rewards into a tensor of shape `[batch_size]`.
pub fn reward(reward: &[f32], device: &Device) -> Result<Tensor> {
    Ok(Tensor::from_slice(reward, (reward.len(),), device)?)
}

/// Tensors of a batch of transitions, placed on a device.
pub struct TransitionTensors {
    /// Observations, `[batch_size, obs_dim]`.
    pub obs: Tensor,

    /// Actions, `[batch_size, act_dim]`.
    pub act: Tensor,

    /// Next observations, `[batch_size, obs_dim]`.
    pub next_obs: Tensor,

    /// Rewards, `[batch_size]`.
    pub reward: Tensor,

    /// `gamma * (1 - is_terminated)`, `[batch_size]`.
    pub gamma_not_terminated: Tensor,
}

impl TransitionTensors {
    /// Converts a batch of transitions.
    pub fn from_batch<B>(batch: B, gamma: f64, device: &Device) -> Result<Self>
    where
        B: TransitionBatch,
        B::ObsBatch: TryInto<Tensor, Error = anyhow::Error>,
        B::ActBatch: TryInto<Tensor, Error = anyhow::Error>,
    {
        let (obs, act, next_obs, reward_, is_terminated, _, _) = batch.unpack();
        let obs: Tensor = obs.try_into()?;
        let act: Tensor = act.try_into()?;
        let next_obs: Tensor = next_obs.try_into()?;

        Ok(Self {
            obs: obs.to_device(device)?,
            act: act.to_device(device)?,
            next_obs: next_obs.to_device(device)?,
            reward: reward(&reward_, device)?,
            gamma_not_terminated: gamma_not_terminated(gamma, &is_terminated, device)?,
        })
    }
}

/// `softplus(x) = ln(1 + exp(x))`, computed as `relu(x) + ln(1 + exp(-|x|))`.
pub fn softplus(x: &Tensor) -> Result<Tensor> {
    let t = (x.abs()?.neg()?.exp()? + 1.0)?.log()?;
    Ok((x.relu()? + t)?)
}

/// Returns `sum_i log(1 - tanh(u_i)^2)` over the last axis.
///
/// It is computed as `2 * (ln 2 - u - softplus(-2u))`, which stays finite
/// for large `|u|` where `1 - tanh(u)^2` underflows.
pub fn log_jacobian_tanh(u: &Tensor) -> Result<Tensor> {
    let sp = softplus(&(u * -2.0)?)?;
    let t = ((std::f64::consts::LN_2 - u)? - sp)?;
    Ok((t * 2.0)?.sum(D::Minus1)?)
}

/// Returns `log(sum(exp(xs)))` along axis `dim`, with the axis removed.
///
/// The maximum along the axis is subtracted before exponentiation.
pub fn log_sum_exp(xs: &Tensor, dim: usize) -> Result<Tensor> {
    let max = xs.max_keepdim(dim)?.detach();
    let sum = xs.broadcast_sub(&max)?.exp()?.sum_keepdim(dim)?;
    Ok((sum.log()? + max)?.squeeze(dim)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_nn::Init;

    fn varmap_with(values: &[f32]) -> Result<VarMap> {
        let vm = VarMap::new();
        let init = Init::Randn {
            mean: 0.0,
            stdev: 1.0,
        };
        vm.get((values.len(),), "var1", init, DType::F32, &Device::Cpu)?;
        let t = Tensor::from_slice(values, (values.len(),), &Device::Cpu)?;
        lock(&vm)?.get("var1").context("var1")?.set(&t)?;
        Ok(vm)
    }

    fn values(vm: &VarMap) -> Result<Vec<f32>> {
        Ok(lock(vm)?
            .get("var1")
            .context("var1")?
            .as_tensor()
            .to_vec1::<f32>()?)
    }

    #[test]
    fn test_track() -> Result<()> {
        let src = [1.0f32, 2.0, 3.0];
        let dest = [4.0f32, 5.0, 6.0];

        // tau = 0 leaves the destination unchanged
        let vm_src = varmap_with(&src)?;
        let vm_dest = varmap_with(&dest)?;
        track(&vm_dest, &vm_src, 0.0)?;
        assert_eq!(values(&vm_dest)?, dest.to_vec());

        // tau = 1 copies the source
        track(&vm_dest, &vm_src, 1.0)?;
        assert_eq!(values(&vm_dest)?, src.to_vec());

        // Polyak averaging
        let vm_dest = varmap_with(&dest)?;
        track(&vm_dest, &vm_src, 0.7)?;
        for ((v, s), d) in values(&vm_dest)?.iter().zip(src.iter()).zip(dest.iter()) {
            assert!((v - (0.7 * s + 0.3 * d)).abs() < 1e-6);
        }

        Ok(())
    }

    #[test]
    fn test_track_with_replace_substring() -> Result<()> {
        let device = Device::Cpu;
        let vm_src = VarMap::new();
        let vm_dest = VarMap::new();
        vm_src.get(2, "critic0.w", Init::Const(1.0), DType::F32, &device)?;
        vm_dest.get(2, "critic_tgt0.w", Init::Const(0.0), DType::F32, &device)?;
        track_with_replace_substring(&vm_dest, &vm_src, 1.0, ("critic", "critic_tgt"))?;
        let v = lock(&vm_dest)?
            .get("critic_tgt0.w")
            .context("critic_tgt0.w")?
            .as_tensor()
            .to_vec1::<f32>()?;
        assert_eq!(v, vec![1.0, 1.0]);

        Ok(())
    }

    #[test]
    fn test_log_jacobian_tanh() -> Result<()> {
        let u = [-3.0f32, -0.5, 0.0, 0.1, 2.0];
        let t = Tensor::from_slice(&u, (1, 5), &Device::Cpu)?;
        let lj: f32 = log_jacobian_tanh(&t)?.to_vec1::<f32>()?[0];
        let expected: f32 = u.iter().map(|u| (1.0 - u.tanh().powi(2)).ln()).sum();
        assert!((lj - expected).abs() < 1e-4);

        // Finite where 1 - tanh(u)^2 underflows in f32
        let t = Tensor::from_slice(&[50f32, -50.0], (2, 1), &Device::Cpu)?;
        let lj = log_jacobian_tanh(&t)?.to_vec1::<f32>()?;
        for v in lj {
            assert!(v.is_finite());
            assert!((v - 2.0 * (std::f32::consts::LN_2 - 50.0)).abs() < 1e-3);
        }

        Ok(())
    }

    #[test]
    fn test_log_sum_exp() -> Result<()> {
        let xs = Tensor::from_slice(&[1f32, 2.0, 3.0, 1000.0, 1000.0, 0.0], (2, 3), &Device::Cpu)?;
        let lse = log_sum_exp(&xs, 1)?.to_vec1::<f32>()?;
        let expected0 = (1f32.exp() + 2f32.exp() + 3f32.exp()).ln();
        assert!((lse[0] - expected0).abs() < 1e-5);
        assert!((lse[1] - (1000.0 + 2f32.ln())).abs() < 1e-3);

        Ok(())
    }

    #[test]
    fn test_smooth_l1_loss() -> Result<()> {
        let x = Tensor::from_slice(&[0f32, 0.0], (2,), &Device::Cpu)?;
        let y = Tensor::from_slice(&[0.5f32, 3.0], (2,), &Device::Cpu)?;
        let loss = smooth_l1_loss(&x, &y)?.to_scalar::<f32>()?;
        assert!((loss - (0.125 + 2.5) / 2.0).abs() < 1e-6);

        Ok(())
    }

    #[test]
    fn test_gamma_not_terminated() -> Result<()> {
        let t = gamma_not_terminated(0.5, &[0, 1, 0], &Device::Cpu)?;
        assert_eq!(t.to_vec1::<f32>()?, vec![0.5, 0.0, 0.5]);
        Ok(())
    }
}
