//! Entropy coefficient of SAC.
use crate::opt::{Optimizer, OptimizerConfig};
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{init::Init, VarBuilder, VarMap};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Mode of the entropy coefficient of SAC.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum EntCoefMode {
    /// Use a constant as alpha.
    Fix(f64),

    /// Automatic tuning.
    Auto {
        /// Target entropy. If `None`, `-action_dimension` is used.
        target_entropy: Option<f64>,

        /// Learning rate.
        lr: f64,
    },
}

impl Default for EntCoefMode {
    fn default() -> Self {
        Self::Auto {
            target_entropy: None,
            lr: 0.0003,
        }
    }
}

/// The entropy coefficient of SAC.
///
/// `log_alpha` is initialized to `0` in the automatic tuning mode.
pub struct EntCoef {
    varmap: VarMap,
    log_alpha: Tensor,
    target_entropy: Option<f64>,
    opt: Option<Optimizer>,
}

impl EntCoef {
    /// Constructs an instance of `EntCoef`.
    ///
    /// `act_dim` is used to compute the default target entropy.
    pub fn new(mode: EntCoefMode, act_dim: usize, device: Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let (log_alpha, target_entropy, opt) = match mode {
            EntCoefMode::Fix(alpha) => {
                let init = Init::Const(alpha.ln());
                let log_alpha = vb.get_with_hints(1, "log_alpha", init)?;
                (log_alpha, None, None)
            }
            EntCoefMode::Auto { target_entropy, lr } => {
                let init = Init::Const(0.0);
                let log_alpha = vb.get_with_hints(1, "log_alpha", init)?;
                let opt = OptimizerConfig::Adam { lr }.build(varmap.all_vars())?;
                let target_entropy = target_entropy.unwrap_or(-(act_dim as f64));
                (log_alpha, Some(target_entropy), Some(opt))
            }
        };

        Ok(Self {
            varmap,
            log_alpha,
            opt,
            target_entropy,
        })
    }

    /// Returns the entropy coefficient, detached from the computation graph.
    ///
    /// The shape of the tensor is `[1]`.
    pub fn alpha(&self) -> Result<Tensor> {
        Ok(self.log_alpha.detach().exp()?)
    }

    /// Returns the entropy coefficient as a scalar.
    pub fn alpha_scalar(&self) -> Result<f32> {
        Ok(self.alpha()?.to_vec1::<f32>()?[0])
    }

    /// Updates the parameter given log probabilities of sampled actions.
    ///
    /// The loss is `mean(alpha * (-logp - target_entropy))`, where `logp` is detached.
    /// Returns the loss, or `None` if alpha is fixed.
    pub fn update(&mut self, logp: &Tensor) -> Result<Option<f32>> {
        match (&self.target_entropy, &mut self.opt) {
            (Some(target_entropy), Some(opt)) => {
                let entropy_gap = ((logp.detach() + *target_entropy)? * -1.0)?;
                let loss = self
                    .log_alpha
                    .exp()?
                    .broadcast_mul(&entropy_gap)?
                    .mean_all()?;
                opt.backward_step(&loss)?;
                Ok(Some(loss.to_scalar::<f32>()?))
            }
            _ => Ok(None),
        }
    }

    /// Save the parameter into a file.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.varmap.save(&path)?;
        info!("Save entropy coefficient to {:?}", path.as_ref());
        Ok(())
    }

    /// Load the parameter from a file.
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.varmap.load(&path)?;
        info!("Load entropy coefficient from {:?}", path.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fixed_alpha() -> Result<()> {
        let mut ent_coef = EntCoef::new(EntCoefMode::Fix(0.2), 2, Device::Cpu)?;
        assert!((ent_coef.alpha_scalar()? - 0.2).abs() < 1e-6);
        let logp = Tensor::new(&[1f32, 2.0], &Device::Cpu)?;
        assert_eq!(ent_coef.update(&logp)?, None);
        assert!((ent_coef.alpha_scalar()? - 0.2).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_auto_alpha() -> Result<()> {
        let mut ent_coef = EntCoef::new(EntCoefMode::default(), 2, Device::Cpu)?;
        assert_eq!(ent_coef.alpha_scalar()?, 1.0);

        // Entropy (-logp = -5) is below the target (-2), so alpha increases
        let logp = Tensor::new(&[5f32, 5.0], &Device::Cpu)?;
        let loss = ent_coef.update(&logp)?;
        assert_eq!(loss, Some(-3.0));
        assert!(ent_coef.alpha_scalar()? > 1.0);

        // Entropy above the target decreases alpha
        let mut ent_coef = EntCoef::new(EntCoefMode::default(), 2, Device::Cpu)?;
        let logp = Tensor::new(&[-5f32, -5.0], &Device::Cpu)?;
        ent_coef.update(&logp)?;
        assert!(ent_coef.alpha_scalar()? < 1.0);

        Ok(())
    }
}
