//! Resampling onto a new voxel grid.
//!
//! Output voxels are mapped to physical space with the output geometry, then
//! back into the input's continuous index space through an identity transform,
//! and sampled with an [`Interpolator`].

use std::marker::PhantomData;
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Shape, Tensor};
use crate::error::{LociError, Result};
use crate::image::{Image, ImageMetadata};
use crate::interpolation::{Interpolator, LinearInterpolator};
use crate::spatial::Spacing;

/// Resample image filter.
///
/// Samples the input at the physical position of every output voxel. The
/// output grid is fixed at construction; input and output share physical
/// space, so no transform is applied between them.
///
/// # Type Parameters
/// * `B` - The Burn backend
/// * `I` - The interpolator used to sample the input
pub struct ResampleImageFilter<B: Backend, I: Interpolator<B>> {
    shape: [usize; 3],
    metadata: ImageMetadata<3>,
    interpolator: I,
    default_pixel_value: f32,
    _phantom: PhantomData<B>,
}

impl<B: Backend, I: Interpolator<B>> ResampleImageFilter<B, I> {
    /// Create a new resample filter.
    ///
    /// # Arguments
    /// * `shape` - Output tensor shape, `[Z, Y, X]`
    /// * `metadata` - Output origin, spacing and direction
    /// * `interpolator` - Interpolator for input image sampling
    pub fn new(shape: [usize; 3], metadata: ImageMetadata<3>, interpolator: I) -> Self {
        Self {
            shape,
            metadata,
            interpolator,
            default_pixel_value: 0.0,
            _phantom: PhantomData,
        }
    }

    /// Create from a reference image.
    ///
    /// Uses the shape and metadata of `reference`; its voxel values are ignored.
    pub fn new_from_reference(reference: &Image<B, 3>, interpolator: I) -> Self {
        Self::new(reference.shape(), reference.metadata(), interpolator)
    }

    /// Value assigned to output voxels that fall outside the input.
    pub fn with_default_pixel_value(mut self, value: f32) -> Self {
        self.default_pixel_value = value;
        self
    }

    /// Apply filter to an input image.
    ///
    /// # Errors
    /// Fails on an empty output grid, invalid output metadata, or an input
    /// whose direction cannot be inverted.
    pub fn apply(&self, input: &Image<B, 3>) -> Result<Image<B, 3>> {
        if self.shape.iter().any(|&n| n == 0) {
            return Err(LociError::computation(format!(
                "cannot resample onto an empty grid {:?}",
                self.shape
            )));
        }
        self.metadata.validate()?;
        let device = input.data().device();

        let output = Image::<B, 3>::from_metadata(Tensor::zeros(self.shape, &device), &self.metadata);
        let output_indices = self.grid_indices(&device);
        let points = output.index_to_world_tensor(output_indices);
        let input_indices = input.world_to_index_tensor(points)?;

        let flat = self
            .interpolator
            .interpolate(input.data(), input_indices, self.default_pixel_value);
        Ok(output.with_data(flat.reshape(Shape::new(self.shape))))
    }

    /// Continuous indices `[N, 3]` (columns `x, y, z`) of every output voxel in tensor order.
    fn grid_indices(&self, device: &B::Device) -> Tensor<B, 2> {
        let [d, h, w] = self.shape;

        let z_range = Tensor::<B, 1, Int>::arange(0..d as i64, device);
        let y_range = Tensor::<B, 1, Int>::arange(0..h as i64, device);
        let x_range = Tensor::<B, 1, Int>::arange(0..w as i64, device);

        let z_grid = z_range.reshape([d, 1, 1]).repeat(&[1, h, w]).reshape([d * h * w]);
        let y_grid = y_range.reshape([1, h, 1]).repeat(&[d, 1, w]).reshape([d * h * w]);
        let x_grid = x_range.reshape([1, 1, w]).repeat(&[d, h, 1]).reshape([d * h * w]);

        Tensor::cat(
            vec![
                x_grid.float().unsqueeze_dim(1),
                y_grid.float().unsqueeze_dim(1),
                z_grid.float().unsqueeze_dim(1),
            ],
            1,
        )
    }
}

/// Resample `moving` onto the grid of `reference` with linear interpolation.
///
/// Returns `moving` unchanged when both already share a grid.
///
/// # Arguments
/// * `reference` - Image defining the output grid
/// * `moving` - Image to sample
pub fn resample_to_match<B: Backend>(reference: &Image<B, 3>, moving: &Image<B, 3>) -> Result<Image<B, 3>> {
    if reference.same_grid(moving) {
        return Ok(moving.clone());
    }
    ResampleImageFilter::new_from_reference(reference, LinearInterpolator::new()).apply(moving)
}

/// Resample to a new spacing covering the same extent.
///
/// The new size per axis is `⌊size · spacing / new_spacing + 0.5⌋`; origin and
/// direction are kept.
pub fn resample_to_spacing<B: Backend>(image: &Image<B, 3>, spacing: Spacing<3>) -> Result<Image<B, 3>> {
    if !spacing.is_valid() {
        return Err(LociError::computation(format!(
            "target spacing must be positive, got {:?}",
            spacing.to_array()
        )));
    }
    let size = image.size();
    let new_size: [usize; 3] =
        std::array::from_fn(|i| ((size[i] as f64 * image.spacing()[i] / spacing[i]) + 0.5).floor() as usize);
    let metadata = ImageMetadata::new(*image.origin(), spacing, *image.direction());
    let shape = [new_size[2], new_size[1], new_size[0]];
    ResampleImageFilter::new(shape, metadata, LinearInterpolator::new()).apply(image)
}

/// Resize to `size` voxels covering the same extent.
///
/// # Arguments
/// * `image` - Image to resize
/// * `size` - New voxel counts in `(x, y, z)` order
///
/// The new spacing is `spacing · old_size / new_size`; origin and direction are kept.
pub fn resize<B: Backend>(image: &Image<B, 3>, size: [usize; 3]) -> Result<Image<B, 3>> {
    let old = image.size();
    let spacing = Spacing::new(std::array::from_fn(|i| image.spacing()[i] * old[i] as f64 / size[i] as f64));
    let metadata = ImageMetadata::new(*image.origin(), spacing, *image.direction());
    ResampleImageFilter::new([size[2], size[1], size[0]], metadata, LinearInterpolator::new()).apply(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{Direction3, Point3, Spacing3};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn ramp_image(shape: [usize; 3], spacing: Spacing3) -> Image<TestBackend, 3> {
        let device = Default::default();
        let [d, h, w] = shape;
        let values: Vec<f32> = (0..d * h * w).map(|i| (i % w) as f32).collect();
        let metadata = ImageMetadata::new(Point3::origin(), spacing, Direction3::identity());
        Image::from_values(values, shape, &metadata, &device).unwrap()
    }

    #[test]
    fn test_resample_to_same_grid_is_identity() {
        let image = ramp_image([2, 3, 4], Spacing3::uniform(1.0));
        let filter = ResampleImageFilter::new_from_reference(&image, LinearInterpolator::new());
        let result = filter.apply(&image).unwrap();
        let a = image.to_values().unwrap();
        let b = result.to_values().unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn test_translated_reference_shifts_content() {
        let image = ramp_image([1, 1, 6], Spacing3::uniform(1.0));
        let metadata = ImageMetadata::new(Point3::new([2.0, 0.0, 0.0]), Spacing3::uniform(1.0), Direction3::identity());
        let result = ResampleImageFilter::new([1, 1, 6], metadata, LinearInterpolator::new())
            .apply(&image)
            .unwrap();
        let values = result.to_values().unwrap();
        assert!((values[0] - 2.0).abs() < 1e-5);
        assert!((values[3] - 5.0).abs() < 1e-5);
        // beyond the input extent
        assert_eq!(values[5], 0.0);
    }

    #[test]
    fn test_resample_to_spacing_size() {
        let image = ramp_image([10, 20, 30], Spacing3::new([2.0, 1.5, 1.0]));
        let result = resample_to_spacing(&image, Spacing3::uniform(3.0)).unwrap();
        // x: 30*2/3 = 20, y: 20*1.5/3 = 10, z: 10*1/3 + 0.5 = 3.83 -> 3
        assert_eq!(result.size(), [20, 10, 3]);
        assert_eq!(result.origin(), image.origin());
    }

    #[test]
    fn test_resize_preserves_extent() {
        let image = ramp_image([8, 8, 16], Spacing3::new([1.0, 2.0, 3.0]));
        let result = resize(&image, [4, 4, 4]).unwrap();
        assert_eq!(result.shape(), [4, 4, 4]);
        assert!((result.spacing()[0] - 4.0).abs() < 1e-12);
        assert!((result.spacing()[1] - 4.0).abs() < 1e-12);
        assert!((result.spacing()[2] - 6.0).abs() < 1e-12);
    }
}
