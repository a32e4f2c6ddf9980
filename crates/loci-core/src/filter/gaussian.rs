//! Discrete Gaussian smoothing.

use burn::tensor::backend::Backend;
use burn::tensor::ops::ConvOptions;
use burn::tensor::Tensor;
use crate::image::Image;

/// Separable Gaussian smoothing in voxel units.
///
/// Voxels beyond the volume border take a constant boundary value.
pub struct GaussianFilter<B: Backend> {
    variance: f64,
    max_kernel_width: usize,
    boundary_value: f32,
    _b: std::marker::PhantomData<B>,
}

impl<B: Backend> GaussianFilter<B> {
    /// Create a filter with the given variance (voxel²).
    pub fn new(variance: f64) -> Self {
        Self {
            variance,
            max_kernel_width: 32,
            boundary_value: 0.0,
            _b: std::marker::PhantomData,
        }
    }

    /// Cap the kernel width (radius * 2 + 1).
    pub fn with_max_kernel_width(mut self, width: usize) -> Self {
        self.max_kernel_width = width.max(1);
        self
    }

    /// Value assumed outside the volume.
    pub fn with_boundary_value(mut self, value: f32) -> Self {
        self.boundary_value = value;
        self
    }

    pub fn apply(&self, image: &Image<B, 3>) -> Image<B, 3> {
        image.with_data(self.apply_tensor(image.data().clone()))
    }

    pub fn apply_tensor(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        let sigma = self.variance.max(0.0).sqrt();
        if sigma <= 1e-6 {
            return input;
        }
        let radius = ((3.0 * sigma).ceil() as usize).min((self.max_kernel_width - 1) / 2);
        let kernel = generate_kernel(sigma, radius);

        // Zero padding of (x - c) equals constant-c padding of x.
        let mut data = input - self.boundary_value;
        for axis in 0..3 {
            let kernel_tensor = Tensor::<B, 1>::from_floats(kernel.as_slice(), &data.device());
            data = convolve_axis(data, kernel_tensor, axis);
        }
        data + self.boundary_value
    }
}

fn generate_kernel(sigma: f64, radius: usize) -> Vec<f32> {
    let two_sigma2 = 2.0 * sigma * sigma;
    let raw: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            let x = i as f64 - radius as f64;
            (-x * x / two_sigma2).exp()
        })
        .collect();
    let sum: f64 = raw.iter().sum();
    raw.into_iter().map(|v| (v / sum) as f32).collect()
}

/// Convolve a `[Z, Y, X]` tensor with a 1-D kernel along `axis`.
fn convolve_axis<B: Backend>(input: Tensor<B, 3>, kernel: Tensor<B, 1>, axis: usize) -> Tensor<B, 3> {
    let permutation: [isize; 3] = match axis {
        0 => [1, 2, 0],
        1 => [0, 2, 1],
        _ => [0, 1, 2],
    };
    let permuted = input.permute(permutation);
    let [a, b, len] = permuted.dims();

    let kernel_size = kernel.dims()[0];
    let options = ConvOptions::new([1], [kernel_size / 2], [1], 1);
    let output = burn::tensor::module::conv1d(
        permuted.reshape([a * b, 1, len]),
        kernel.reshape([1, 1, kernel_size]),
        None,
        options,
    );

    let mut inverse = [0isize; 3];
    for (new_pos, &old_pos) in permutation.iter().enumerate() {
        inverse[old_pos as usize] = new_pos as isize;
    }
    output.reshape([a, b, len]).permute(inverse)
}
