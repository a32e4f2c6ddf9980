//! Label-masked intensity statistics.

use burn::tensor::backend::Backend;
use crate::error::{LociError, Result};
use crate::image::Image;

/// Label assigned to a mask voxel: the value truncated to an unsigned byte.
pub fn mask_label(value: f32) -> u8 {
    value as u8
}

/// Summary of the voxels carrying one mask label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelStatistics {
    pub count: usize,
    pub sum: f64,
}

impl LabelStatistics {
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Accumulate statistics of `image` over voxels whose mask label equals `label`.
///
/// Both volumes must share a tensor shape.
pub fn label_statistics<B: Backend>(image: &Image<B, 3>, mask: &Image<B, 3>, label: u8) -> Result<LabelStatistics> {
    if image.shape() != mask.shape() {
        return Err(LociError::shape_mismatch(&image.shape(), &mask.shape()));
    }
    let values = image.to_values()?;
    let labels = mask.to_values()?;
    let mut stats = LabelStatistics { count: 0, sum: 0.0 };
    for (v, m) in values.iter().zip(labels.iter()) {
        if mask_label(*m) == label {
            stats.count += 1;
            stats.sum += *v as f64;
        }
    }
    Ok(stats)
}

/// Mean of `image` over voxels labelled 1 in `mask`; `None` when the label is absent.
pub fn mean_in_mask<B: Backend>(image: &Image<B, 3>, mask: &Image<B, 3>) -> Result<Option<f64>> {
    Ok(label_statistics(image, mask, 1)?.mean())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageMetadata;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    fn volume(values: Vec<f32>) -> Image<Backend, 3> {
        let device = Default::default();
        Image::from_values(values, [1, 2, 2], &ImageMetadata::default(), &device).unwrap()
    }

    #[test]
    fn test_mean_in_mask() {
        let image = volume(vec![1.0, 2.0, 3.0, 4.0]);
        let mask = volume(vec![1.0, 0.0, 1.0, 2.0]);
        assert_eq!(mean_in_mask(&image, &mask).unwrap(), Some(2.0));
    }

    #[test]
    fn test_fractional_mask_values_truncate() {
        let image = volume(vec![1.0, 2.0, 3.0, 4.0]);
        let mask = volume(vec![0.99, 1.0, 1.5, 0.0]);
        assert_eq!(mean_in_mask(&image, &mask).unwrap(), Some(2.5));
    }

    #[test]
    fn test_missing_label_is_none() {
        let image = volume(vec![1.0, 2.0, 3.0, 4.0]);
        let mask = volume(vec![0.0; 4]);
        assert_eq!(mean_in_mask(&image, &mask).unwrap(), None);
    }

    #[test]
    fn test_shape_mismatch() {
        let device = Default::default();
        let image = volume(vec![1.0, 2.0, 3.0, 4.0]);
        let mask = Image::<Backend, 3>::from_values(vec![1.0; 8], [2, 2, 2], &ImageMetadata::default(), &device).unwrap();
        assert!(matches!(mean_in_mask(&image, &mask), Err(LociError::ShapeMismatch { .. })));
    }
}
