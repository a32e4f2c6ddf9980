//! Non-linear warp network.

use burn::{
    nn::{
        conv::{Conv3d, Conv3dConfig},
        PaddingConfig3d,
    },
    prelude::*,
};
use loci_core::LociError;

use crate::blocks::{ConvBlock, ConvBlockConfig, UpBlock, UpBlockConfig};
use crate::ports::{WarpInputs, WarpPredictor};
use crate::spatial_transform::SpatialTransformer;

/// Displacement-field U-Net.
///
/// Takes the windowed moving volume and the template as two channels,
/// predicts a dense flow in voxels and applies it to the raw volume.
#[derive(Module, Debug)]
pub struct WarpNetwork<B: Backend> {
    stem: ConvBlock<B>,
    down1: ConvBlock<B>,
    down2: ConvBlock<B>,
    down3: ConvBlock<B>,
    up3: UpBlock<B>,
    up2: UpBlock<B>,
    up1: UpBlock<B>,
    flow: Conv3d<B>,
    transformer: SpatialTransformer<B>,
}

#[derive(Config, Debug)]
pub struct WarpNetworkConfig {
    #[config(default = "[16, 32, 32, 64]")]
    pub channels: [usize; 4],
}

impl WarpNetworkConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> WarpNetwork<B> {
        let [c0, c1, c2, c3] = self.channels;
        WarpNetwork {
            stem: ConvBlockConfig::new(2, c0).init(device),
            down1: ConvBlockConfig::new(c0, c1).with_stride(2).init(device),
            down2: ConvBlockConfig::new(c1, c2).with_stride(2).init(device),
            down3: ConvBlockConfig::new(c2, c3).with_stride(2).init(device),
            up3: UpBlockConfig::new(c3, c2, c2).init(device),
            up2: UpBlockConfig::new(c2, c1, c1).init(device),
            up1: UpBlockConfig::new(c1, c0, c0).init(device),
            flow: Conv3dConfig::new([c0, 3], [3, 3, 3])
                .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
                .init(device),
            transformer: SpatialTransformer::new(),
        }
    }
}

/// Network outputs: the warped raw volume and the flow that produced it.
#[derive(Debug, Clone)]
pub struct WarpOutput<B: Backend> {
    pub warped: Tensor<B, 5>,
    pub flow: Tensor<B, 5>,
}

impl<B: Backend> WarpNetwork<B> {
    /// Spatial dims must be divisible by 8.
    pub fn forward(&self, moving: Tensor<B, 5>, template: Tensor<B, 5>, raw: Tensor<B, 5>) -> WarpOutput<B> {
        let x0 = self.stem.forward(Tensor::cat(vec![moving, template], 1));
        let x1 = self.down1.forward(x0.clone());
        let x2 = self.down2.forward(x1.clone());
        let x3 = self.down3.forward(x2.clone());

        let y = self.up3.forward(x3, x2);
        let y = self.up2.forward(y, x1);
        let y = self.up1.forward(y, x0);

        let flow = self.flow.forward(y);
        let warped = self.transformer.forward(raw, flow.clone());
        WarpOutput { warped, flow }
    }
}

impl<B: Backend> WarpPredictor<B> for WarpNetwork<B> {
    fn predict(&self, inputs: WarpInputs<B>) -> loci_core::Result<Tensor<B, 5>> {
        let dims = inputs.template.dims();
        for other in [inputs.moving.dims(), inputs.raw.dims()] {
            if other != dims {
                return Err(LociError::shape_mismatch(&dims, &other));
            }
        }
        if dims[0] != 1 || dims[1] != 1 || dims[2..].iter().any(|&n| n == 0 || n % 8 != 0) {
            return Err(LociError::domain(format!(
                "warp input must be [1, 1, Z, Y, X] with axes divisible by 8, got {:?}",
                dims
            )));
        }

        tracing::debug!(?dims, "running warp network");
        Ok(self.forward(inputs.moving, inputs.template, inputs.raw).warped)
    }
}
