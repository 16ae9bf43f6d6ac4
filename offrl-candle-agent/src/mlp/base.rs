use super::{create_linear_layers, mlp_forward, MlpConfig};
use crate::model::{SubModel1, SubModel2};
use anyhow::Result;
use candle_core::{Device, Tensor, D};
use candle_nn::{Linear, VarBuilder};

/// Multilayer perceptron with ReLU activation function.
///
/// As [`SubModel2`], the two inputs are concatenated along the last axis,
/// which is used for critics taking observations and actions.
pub struct Mlp {
    config: MlpConfig,
    device: Device,
    layers: Vec<Linear>,
}

impl Mlp {
    fn _build(vs: VarBuilder, config: MlpConfig) -> Result<Self> {
        let device = vs.device().clone();
        let layers = create_linear_layers("mlp", vs, &config, Some(config.out_dim))?;

        Ok(Self {
            config,
            device,
            layers,
        })
    }
}

impl SubModel1 for Mlp {
    type Config = MlpConfig;
    type Input = Tensor;
    type Output = Tensor;

    fn forward(&self, xs: &Self::Input) -> Result<Tensor> {
        let xs = xs.to_device(&self.device)?;
        mlp_forward(xs, &self.layers, &self.config.activation_out)
    }

    fn build(vs: VarBuilder, config: Self::Config) -> Result<Self> {
        Self::_build(vs, config)
    }
}

impl SubModel2 for Mlp {
    type Config = MlpConfig;
    type Input1 = Tensor;
    type Input2 = Tensor;
    type Output = Tensor;

    fn forward(&self, input1: &Self::Input1, input2: &Self::Input2) -> Result<Tensor> {
        let input1 = input1.to_device(&self.device)?;
        let input2 = input2.to_device(&self.device)?;
        let input = Tensor::cat(&[input1, input2], D::Minus1)?;
        mlp_forward(input, &self.layers, &self.config.activation_out)
    }

    fn build(vs: VarBuilder, config: Self::Config) -> Result<Self> {
        Self::_build(vs, config)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Activation;
    use candle_core::DType;
    use candle_nn::VarMap;

    #[test]
    fn test_mlp_shapes() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let config = MlpConfig::new(5, vec![8, 8], 1, Activation::None);
        let mlp = <Mlp as SubModel2>::build(vb, config)?;

        let obs = Tensor::zeros((4, 3), DType::F32, &Device::Cpu)?;
        let act = Tensor::zeros((4, 2), DType::F32, &Device::Cpu)?;
        let q = SubModel2::forward(&mlp, &obs, &act)?;
        assert_eq!(q.dims(), &[4, 1]);

        // 3 layers, each with weight and bias
        assert_eq!(varmap.all_vars().len(), 6);

        Ok(())
    }

    #[test]
    fn test_mlp_tanh_output() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let config = MlpConfig::new(3, vec![16], 2, Activation::Tanh);
        let mlp = <Mlp as SubModel1>::build(vb, config)?;

        let xs = Tensor::randn(0f32, 10f32, (8, 3), &Device::Cpu)?;
        let ys = SubModel1::forward(&mlp, &xs)?;
        assert_eq!(ys.dims(), &[8, 2]);
        let max = ys.abs()?.flatten_all()?.max(0)?.to_scalar::<f32>()?;
        assert!(max <= 1.0);

        Ok(())
    }
}
