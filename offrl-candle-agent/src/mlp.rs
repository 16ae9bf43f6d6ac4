//! Multilayer perceptron.
mod base;
mod config;
mod mlp2;
use crate::Activation;
use anyhow::Result;
pub use base::Mlp;
use candle_core::Tensor;
use candle_nn::{linear, Linear, Module, VarBuilder};
pub use config::MlpConfig;
pub use mlp2::Mlp2;

/// Returns linear layers `in_dim -> units[0] -> ... -> units[n-1]`,
/// followed by `units[n-1] -> out_dim` if `out_dim` is given.
fn create_linear_layers(
    prefix: &str,
    vs: VarBuilder,
    config: &MlpConfig,
    out_dim: Option<i64>,
) -> Result<Vec<Linear>> {
    let mut dims = vec![config.in_dim];
    dims.extend(config.units.iter());
    if let Some(out_dim) = out_dim {
        dims.push(out_dim);
    }
    let vs = vs.pp(prefix);

    dims.windows(2)
        .enumerate()
        .map(|(i, w)| -> Result<Linear> {
            Ok(linear(w[0] as _, w[1] as _, vs.pp(format!("ln{}", i)))?)
        })
        .collect()
}

/// Applies layers with ReLU between them and `final_act` after the last one.
fn mlp_forward(xs: Tensor, layers: &[Linear], final_act: &Activation) -> Result<Tensor> {
    let n_layers = layers.len();
    let mut xs = xs;

    for (i, layer) in layers.iter().enumerate() {
        xs = layer.forward(&xs)?;
        if i + 1 < n_layers {
            xs = xs.relu()?;
        }
    }

    final_act.forward(&xs)
}
