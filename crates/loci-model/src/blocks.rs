use burn::{
    nn::{
        conv::{Conv3d, Conv3dConfig, ConvTranspose3d, ConvTranspose3dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig3d, Relu,
    },
    prelude::*,
};

/// Conv3d (3x3x3) + BatchNorm + ReLU.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv3d<B>,
    norm: BatchNorm<B, 3>,
    activation: Relu,
}

#[derive(Config, Debug)]
pub struct ConvBlockConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    #[config(default = 1)]
    pub stride: usize,
}

impl ConvBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvBlock<B> {
        let s = self.stride;
        ConvBlock {
            conv: Conv3dConfig::new([self.in_channels, self.out_channels], [3, 3, 3])
                .with_stride([s, s, s])
                .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
                .init(device),
            norm: BatchNormConfig::new(self.out_channels).init(device),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let x = self.conv.forward(x);
        let x = self.norm.forward(x);
        self.activation.forward(x)
    }
}

/// Transposed conv doubling each spatial axis, then concatenation with the
/// skip connection and a fusing ConvBlock.
#[derive(Module, Debug)]
pub struct UpBlock<B: Backend> {
    up: ConvTranspose3d<B>,
    fuse: ConvBlock<B>,
}

#[derive(Config, Debug)]
pub struct UpBlockConfig {
    pub in_channels: usize,
    pub skip_channels: usize,
    pub out_channels: usize,
}

impl UpBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> UpBlock<B> {
        UpBlock {
            up: ConvTranspose3dConfig::new([self.in_channels, self.out_channels], [2, 2, 2])
                .with_stride([2, 2, 2])
                .init(device),
            fuse: ConvBlockConfig::new(self.out_channels + self.skip_channels, self.out_channels)
                .init(device),
        }
    }
}

impl<B: Backend> UpBlock<B> {
    pub fn forward(&self, x: Tensor<B, 5>, skip: Tensor<B, 5>) -> Tensor<B, 5> {
        let x = self.up.forward(x);
        self.fuse.forward(Tensor::cat(vec![x, skip], 1))
    }
}

/// Global average pooling: `[B, C, D, H, W] -> [B, C]`.
pub fn global_average_pool<B: Backend>(x: Tensor<B, 5>) -> Tensor<B, 2> {
    x.flatten::<3>(2, 4).mean_dim(2).squeeze::<2>(2)
}
