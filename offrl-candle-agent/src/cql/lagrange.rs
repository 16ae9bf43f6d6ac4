//! Lagrange multiplier of the conservative penalty.
use crate::opt::{Optimizer, OptimizerConfig};
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{init::Init, VarBuilder, VarMap};
use log::info;
use std::path::Path;

const MAX_ALPHA_PRIME: f64 = 1e6;

/// Weight `alpha' = clamp(exp(log_alpha'), 0, 1e6)` of the conservative penalty.
///
/// `log_alpha'` is initialized to `1.0`. It is trained to minimize
/// `-0.5 * sum_j alpha' * min_q_weight * (gap_j - target_action_gap)`, so that
/// `alpha'` increases while the gaps of the critics exceed the threshold.
pub struct LagrangeMultiplier {
    varmap: VarMap,
    log_alpha_prime: Tensor,
    opt: Optimizer,
}

impl LagrangeMultiplier {
    /// Constructs [`LagrangeMultiplier`].
    pub fn new(lr: f64, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let log_alpha_prime = vb.get_with_hints(1, "log_alpha_prime", Init::Const(1.0))?;
        let opt = OptimizerConfig::Adam { lr }.build(varmap.all_vars())?;

        Ok(Self {
            varmap,
            log_alpha_prime,
            opt,
        })
    }

    fn alpha_prime_(&self) -> Result<Tensor> {
        Ok(self.log_alpha_prime.exp()?.clamp(0.0, MAX_ALPHA_PRIME)?)
    }

    /// Returns `alpha'`, detached from the computation graph.
    ///
    /// The shape of the tensor is `[1]`.
    pub fn alpha_prime(&self) -> Result<Tensor> {
        Ok(self.alpha_prime_()?.detach())
    }

    /// Returns `alpha'` as a scalar.
    pub fn alpha_prime_scalar(&self) -> Result<f32> {
        Ok(self.alpha_prime()?.to_vec1::<f32>()?[0])
    }

    /// Updates `log_alpha'` given the gaps of the critics and returns the loss.
    pub fn update(&mut self, gaps: &[Tensor], min_q_weight: f64, target_action_gap: f64) -> Result<f32> {
        let alpha_prime = self.alpha_prime_()?;
        let penalties = gaps
            .iter()
            .map(|gap| -> Result<Tensor> {
                let gap = (gap.detach() - target_action_gap)?;
                Ok((alpha_prime.broadcast_mul(&gap)? * min_q_weight)?)
            })
            .collect::<Result<Vec<_>>>()?;
        let loss = (Tensor::cat(&penalties, 0)?.sum_all()? * -0.5)?;
        self.opt.backward_step(&loss)?;

        Ok(loss.to_scalar::<f32>()?)
    }

    /// Save the parameter into a file.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.varmap.save(&path)?;
        info!("Save Lagrange multiplier to {:?}", path.as_ref());
        Ok(())
    }

    /// Load the parameter from a file.
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.varmap.load(&path)?;
        info!("Load Lagrange multiplier from {:?}", path.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lagrange_multiplier() -> Result<()> {
        let device = Device::Cpu;
        let mut lm = LagrangeMultiplier::new(0.01, &device)?;
        let alpha_prime0 = lm.alpha_prime_scalar()?;
        assert!((alpha_prime0 - std::f32::consts::E).abs() < 1e-5);

        // Gaps above the threshold increase alpha'
        let gaps = vec![Tensor::new(3f32, &device)?, Tensor::new(5f32, &device)?];
        let loss = lm.update(&gaps, 5.0, 1.0)?;
        let expected = -0.5 * alpha_prime0 * 5.0 * (2.0 + 4.0);
        assert!((loss - expected).abs() < 1e-3);
        assert!(lm.alpha_prime_scalar()? > alpha_prime0);

        // Gaps below the threshold decrease alpha'
        let mut lm = LagrangeMultiplier::new(0.01, &device)?;
        let gaps = vec![Tensor::new(0f32, &device)?, Tensor::new(0f32, &device)?];
        lm.update(&gaps, 5.0, 1.0)?;
        assert!(lm.alpha_prime_scalar()? < alpha_prime0);

        Ok(())
    }
}
