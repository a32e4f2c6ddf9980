//! AD-pattern decomposition network.

use burn::{
    nn::{
        conv::{Conv3d, Conv3dConfig},
        Linear, LinearConfig, PaddingConfig3d,
    },
    prelude::*,
    tensor::activation::sigmoid,
};
use loci_core::LociError;

use crate::blocks::{global_average_pool, ConvBlock, ConvBlockConfig, UpBlock, UpBlockConfig};
use crate::io::tensor_to_scalar;
use crate::ports::{Decomposition, DecompositionPredictor};

/// Encoder-decoder producing the stripped image, the stripped AD component
/// and a voxelwise AD probability map, with a scalar AD probability and
/// ADAD score read from the bottleneck.
#[derive(Module, Debug)]
pub struct DecomposeNetwork<B: Backend> {
    stem: ConvBlock<B>,
    down1: ConvBlock<B>,
    down2: ConvBlock<B>,
    up2: UpBlock<B>,
    up1: UpBlock<B>,
    maps: Conv3d<B>,
    scores: Linear<B>,
}

#[derive(Config, Debug)]
pub struct DecomposeNetworkConfig {
    #[config(default = "[16, 32, 64]")]
    pub channels: [usize; 3],
}

impl DecomposeNetworkConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DecomposeNetwork<B> {
        let [c0, c1, c2] = self.channels;
        DecomposeNetwork {
            stem: ConvBlockConfig::new(1, c0).init(device),
            down1: ConvBlockConfig::new(c0, c1).with_stride(2).init(device),
            down2: ConvBlockConfig::new(c1, c2).with_stride(2).init(device),
            up2: UpBlockConfig::new(c2, c1, c1).init(device),
            up1: UpBlockConfig::new(c1, c0, c0).init(device),
            maps: Conv3dConfig::new([c0, 3], [3, 3, 3])
                .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
                .init(device),
            scores: LinearConfig::new(c2, 2).init(device),
        }
    }
}

impl<B: Backend> DecomposeNetwork<B> {
    /// Returns the `[N, 3, D, H, W]` maps and `[N, 2]` scores. Spatial dims
    /// must be divisible by 4.
    pub fn forward(&self, x: Tensor<B, 5>) -> (Tensor<B, 5>, Tensor<B, 2>) {
        let x0 = self.stem.forward(x);
        let x1 = self.down1.forward(x0.clone());
        let x2 = self.down2.forward(x1.clone());

        let scores = self.scores.forward(global_average_pool(x2.clone()));

        let y = self.up2.forward(x2, x1);
        let y = self.up1.forward(y, x0);
        (self.maps.forward(y), scores)
    }
}

impl<B: Backend> DecompositionPredictor<B> for DecomposeNetwork<B> {
    fn predict(&self, input: Tensor<B, 5>) -> loci_core::Result<Decomposition<B>> {
        let dims = input.dims();
        if dims[0] != 1 || dims[1] != 1 || dims[2..].iter().any(|&n| n == 0 || n % 4 != 0) {
            return Err(LociError::domain(format!(
                "decomposition input must be [1, 1, Z, Y, X] with axes divisible by 4, got {:?}",
                dims
            )));
        }

        let (maps, scores) = self.forward(input);
        let [_, _, d, h, w] = maps.dims();
        let channel = |i: usize| maps.clone().slice([0..1, i..i + 1, 0..d, 0..h, 0..w]);

        Ok(Decomposition {
            stripped_image: channel(0),
            stripped_component: channel(1),
            ad_probability_map: sigmoid(channel(2)),
            ad_probability: tensor_to_scalar(sigmoid(scores.clone().slice([0..1, 0..1])))?,
            adad_score: tensor_to_scalar(scores.slice([0..1, 1..2]))?,
        })
    }
}
