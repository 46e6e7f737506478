//! Fully connected network and tensor conversion helpers.

use crate::error::{Result, TscError};
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::relu;

/// Layer sizes of an [`Mlp`].
#[derive(Debug, Clone, PartialEq)]
pub struct MlpConfig {
    pub input: usize,
    pub hidden: Vec<usize>,
    pub output: usize,
}

impl MlpConfig {
    pub fn new(input: usize, hidden: Vec<usize>, output: usize) -> Self {
        Self {
            input,
            hidden,
            output,
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Mlp<B> {
        let mut sizes = Vec::with_capacity(self.hidden.len() + 2);
        sizes.push(self.input);
        sizes.extend(self.hidden.iter().copied());
        sizes.push(self.output);

        let layers = sizes
            .windows(2)
            .map(|w| LinearConfig::new(w[0], w[1]).init(device))
            .collect();

        Mlp { layers }
    }
}

/// ReLU hidden layers followed by a linear output layer.
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    layers: Vec<Linear<B>>,
}

impl<B: Backend> Mlp<B> {
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let last = self.layers.len().saturating_sub(1);
        let mut x = input;
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(x);
            if i < last {
                x = relu(x);
            }
        }
        x
    }

    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }
}

/// Stack equal-length rows into a `[rows, cols]` tensor.
pub fn rows_to_tensor<B: Backend>(rows: &[Vec<f32>], device: &B::Device) -> Tensor<B, 2> {
    let n = rows.len();
    let d = rows.first().map(|r| r.len()).unwrap_or(0);
    let flat: Vec<f32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
    Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([n, d])
}

/// Column tensor `[n, 1]` from a slice.
pub fn column_tensor<B: Backend>(values: &[f32], device: &B::Device) -> Tensor<B, 2> {
    Tensor::<B, 1>::from_floats(values, device).reshape([values.len(), 1])
}

/// Split a `[rows, cols]` tensor back into rows.
pub fn tensor_to_rows<B: Backend>(tensor: Tensor<B, 2>) -> Result<Vec<Vec<f32>>> {
    let [n, d] = tensor.dims();
    let data = tensor.into_data();
    let flat = data
        .as_slice::<f32>()
        .map_err(|e| TscError::network(format!("{:?}", e)))?;
    Ok(flat.chunks(d.max(1)).take(n).map(|c| c.to_vec()).collect())
}

/// Scalar value of a single-element tensor.
pub fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f32 {
    tensor.into_scalar().elem::<f32>()
}
