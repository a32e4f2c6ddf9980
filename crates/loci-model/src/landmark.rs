//! Landmark regression network.

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation::sigmoid,
};
use loci_core::LociError;

use crate::blocks::{global_average_pool, ConvBlock, ConvBlockConfig};
use crate::io::tensor_to_values;
use crate::ports::{LandmarkPrediction, LandmarkPredictor};

/// Strided convolution encoder with a 9-value regression head.
///
/// Output layout is `[ac(3), nose(3), top(3)]`. The AC triple goes through a
/// sigmoid so it reads as a fraction of the input grid.
#[derive(Module, Debug)]
pub struct LandmarkNetwork<B: Backend> {
    encoder: Vec<ConvBlock<B>>,
    head: Linear<B>,
    input_size: usize,
}

#[derive(Config, Debug)]
pub struct LandmarkNetworkConfig {
    #[config(default = "vec![16, 32, 64, 128]")]
    pub channels: Vec<usize>,
    /// Edge length of the cubic input grid.
    #[config(default = 64)]
    pub input_size: usize,
}

impl LandmarkNetworkConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> LandmarkNetwork<B> {
        let mut encoder = Vec::with_capacity(self.channels.len());
        let mut in_channels = 1;
        for &out_channels in &self.channels {
            encoder.push(
                ConvBlockConfig::new(in_channels, out_channels)
                    .with_stride(2)
                    .init(device),
            );
            in_channels = out_channels;
        }

        LandmarkNetwork {
            encoder,
            head: LinearConfig::new(in_channels, 9).init(device),
            input_size: self.input_size,
        }
    }
}

impl<B: Backend> LandmarkNetwork<B> {
    /// `[N, 1, S, S, S] -> [N, 9]`
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 2> {
        let mut x = x;
        for block in &self.encoder {
            x = block.forward(x);
        }
        let raw = self.head.forward(global_average_pool(x));

        let [n, _] = raw.dims();
        let ac = sigmoid(raw.clone().slice([0..n, 0..3]));
        let directions = raw.slice([0..n, 3..9]);
        Tensor::cat(vec![ac, directions], 1)
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }
}

impl<B: Backend> LandmarkPredictor<B> for LandmarkNetwork<B> {
    fn predict(&self, input: Tensor<B, 5>) -> loci_core::Result<LandmarkPrediction> {
        let s = self.input_size;
        let dims = input.dims();
        if dims != [1, 1, s, s, s] {
            return Err(LociError::shape_mismatch(&[1, 1, s, s, s], &dims));
        }

        let values: Vec<f64> = tensor_to_values(self.forward(input))?
            .into_iter()
            .map(f64::from)
            .collect();
        tracing::debug!(?values, "landmark network output");

        match values.as_slice() {
            [a0, a1, a2, n0, n1, n2, t0, t1, t2] => Ok(LandmarkPrediction {
                ac: [*a0, *a1, *a2],
                nose: [*n0, *n1, *n2],
                top: [*t0, *t1, *t2],
            }),
            other => Err(LociError::shape_mismatch(&[9], &[other.len()])),
        }
    }
}
