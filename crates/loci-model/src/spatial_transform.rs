use burn::{
    module::Module,
    tensor::{backend::Backend, Tensor},
};
use std::marker::PhantomData;

use crate::sampling::trilinear_sample;

/// Warps a volume with a dense displacement field given in voxels,
/// channel order `(z, y, x)`.
#[derive(Module, Debug)]
pub struct SpatialTransformer<B: Backend> {
    phantom: PhantomData<B>,
}

impl<B: Backend> Default for SpatialTransformer<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> SpatialTransformer<B> {
    pub fn new() -> Self {
        Self {
            phantom: PhantomData,
        }
    }

    /// `image [N, C, D, H, W]`, `flow [N, 3, D, H, W]`.
    pub fn forward(&self, image: Tensor<B, 5>, flow: Tensor<B, 5>) -> Tensor<B, 5> {
        let [n, _, d, h, w] = image.dims();
        let device = image.device();

        let axis = |len: usize, shape: [usize; 5]| {
            Tensor::arange(0..len as i64, &device).float().reshape(shape)
        };
        let base = [
            axis(d, [1, 1, d, 1, 1]),
            axis(h, [1, 1, 1, h, 1]),
            axis(w, [1, 1, 1, 1, w]),
        ];

        let grid: Vec<Tensor<B, 5>> = base
            .into_iter()
            .enumerate()
            .map(|(i, coords)| flow.clone().slice([0..n, i..i + 1, 0..d, 0..h, 0..w]) + coords)
            .collect();

        trilinear_sample(image, Tensor::cat(grid, 1))
    }
}
