//! RL agents implemented with [candle](https://crates.io/crates/candle-core).
//!
//! * [`sac::Sac`] - Soft actor-critic, trained online or with a static dataset.
//! * [`cql::Cql`] - Soft actor-critic with conservative Q-learning for offline training.
//! * [`bc::Bc`] - Behavior cloning.
pub mod bc;
pub mod cql;
pub mod mlp;
pub mod model;
pub mod opt;
pub mod sac;
mod tensor_batch;
#[cfg(test)]
mod testing;
pub mod util;
use anyhow::Result;
use candle_core::{DeviceLocation, Tensor};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
pub use tensor_batch::TensorBatch;

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq)]
/// Device for using candle.
///
/// This enum is added because [`candle_core::Device`] does not support serialization.
pub enum Device {
    /// The main CPU device.
    Cpu,

    /// The main GPU device.
    Cuda(usize),
}

impl From<candle_core::Device> for Device {
    fn from(device: candle_core::Device) -> Self {
        match device.location() {
            DeviceLocation::Cuda { gpu_id } => Self::Cuda(gpu_id),
            _ => Self::Cpu,
        }
    }
}

impl TryFrom<Device> for candle_core::Device {
    type Error = candle_core::Error;

    fn try_from(device: Device) -> Result<Self, Self::Error> {
        match device {
            Device::Cpu => Ok(candle_core::Device::Cpu),
            Device::Cuda(n) => candle_core::Device::new_cuda(n),
        }
    }
}

/// Activation function applied to the output of a network.
#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq)]
pub enum Activation {
    /// Identity.
    None,

    /// ReLU.
    ReLU,

    /// Hyperbolic tangent, for bounded continuous actions.
    Tanh,

    /// Sigmoid.
    Sigmoid,
}

impl Default for Activation {
    fn default() -> Self {
        Self::None
    }
}

impl Activation {
    /// Applies the activation function.
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        Ok(match self {
            Self::None => xs.clone(),
            Self::ReLU => xs.relu()?,
            Self::Tanh => xs.tanh()?,
            Self::Sigmoid => candle_nn::ops::sigmoid(xs)?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_activation() -> Result<()> {
        let xs = Tensor::new(&[-1f32, 0.0, 2.0], &candle_core::Device::Cpu)?;
        assert_eq!(
            Activation::ReLU.forward(&xs)?.to_vec1::<f32>()?,
            vec![0.0, 0.0, 2.0]
        );
        assert_eq!(Activation::None.forward(&xs)?.to_vec1::<f32>()?, vec![-1.0, 0.0, 2.0]);
        let ys = Activation::Tanh.forward(&xs)?.to_vec1::<f32>()?;
        assert!(ys.iter().all(|y| y.abs() < 1.0));
        assert_eq!(
            Device::from(candle_core::Device::Cpu),
            Device::Cpu
        );
        Ok(())
    }
}
