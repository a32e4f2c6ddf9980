use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

/// Samples a volume at continuous voxel indices.
pub trait Interpolator<B: Backend> {
    /// Interpolate `data` (`[Z, Y, X]`) at `indices` (`[N, 3]`, columns `x, y, z`).
    ///
    /// Returns `[N]` samples. Indices outside the volume yield `default_value`.
    fn interpolate(&self, data: &Tensor<B, 3>, indices: Tensor<B, 2>, default_value: f32) -> Tensor<B, 1>;
}
