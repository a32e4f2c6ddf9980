//! Voxelwise z-score classifier against a normative template.

use burn::tensor::backend::Backend;
use loci_core::filter::resample_to_match;
use loci_core::image::Image;
use loci_core::statistics::mean_in_mask;
use loci_core::{LociError, Result};

use crate::calibration::{Abnormality, FillStatesTracer};

/// |z| beyond which a voxel is abnormal.
pub const Z_THRESHOLD: f64 = 1.65;

/// Normative volumes of one tracer.
#[derive(Debug, Clone)]
pub struct NormativeTemplate<B: Backend> {
    pub mean: Image<B, 3>,
    pub std: Image<B, 3>,
    pub roi: Image<B, 3>,
}

/// Binary abnormality mask on the input grid with its ROI proportion.
#[derive(Debug, Clone)]
pub struct FillStatesMask<B: Backend> {
    pub mask: Image<B, 3>,
    pub positive_count: usize,
    pub roi_count: usize,
}

impl<B: Backend> FillStatesMask<B> {
    /// Fraction of ROI voxels flagged abnormal; 0 for an empty ROI.
    pub fn proportion(&self) -> f64 {
        if self.roi_count == 0 {
            0.0
        } else {
            self.positive_count as f64 / self.roi_count as f64
        }
    }
}

/// `z = (intensity / reference_mean − mean) / std`, compared against the
/// threshold on the tracer's abnormal side. `None` when `std` is not positive.
pub fn classify_voxel(intensity: f64, mean: f64, std: f64, reference_mean: f64, abnormality: Abnormality) -> Option<bool> {
    if std <= 0.0 {
        return None;
    }
    let z = (intensity / reference_mean - mean) / std;
    Some(match abnormality {
        Abnormality::High => z > Z_THRESHOLD,
        Abnormality::Low => z < -Z_THRESHOLD,
    })
}

/// Mean of `image` inside `reference`, resampled onto the mask grid.
pub fn reference_mean<B: Backend>(image: &Image<B, 3>, reference: &Image<B, 3>) -> Result<f64> {
    let on_reference = resample_to_match(reference, image)?;
    match mean_in_mask(&on_reference, reference)? {
        Some(mean) if mean > 0.0 => Ok(mean),
        Some(mean) => Err(LociError::computation(format!(
            "fill-states reference region mean is non-positive ({})",
            mean
        ))),
        None => Err(LociError::computation("fill-states reference mask has no voxels labelled 1")),
    }
}

/// Classify every ROI voxel of `image`.
///
/// Template volumes are resampled onto the image grid. Intensities are divided
/// by the reference-region mean when a reference mask is given.
pub fn fill_states<B: Backend>(
    image: &Image<B, 3>,
    template: &NormativeTemplate<B>,
    reference: Option<&Image<B, 3>>,
    tracer: FillStatesTracer,
) -> Result<FillStatesMask<B>> {
    let mean = resample_to_match(image, &template.mean)?.to_values()?;
    let std = resample_to_match(image, &template.std)?.to_values()?;
    let roi = resample_to_match(image, &template.roi)?.to_values()?;
    let values = image.to_values()?;

    let ref_mean = match reference {
        Some(mask) => reference_mean(image, mask)?,
        None => 1.0,
    };
    let abnormality = tracer.abnormality();

    let mut flags = vec![0.0f32; values.len()];
    let mut roi_count = 0;
    let mut positive_count = 0;
    for (i, flag) in flags.iter_mut().enumerate() {
        if roi[i] <= 0.0 {
            continue;
        }
        let Some(positive) = classify_voxel(values[i] as f64, mean[i] as f64, std[i] as f64, ref_mean, abnormality) else {
            continue;
        };
        roi_count += 1;
        if positive {
            positive_count += 1;
            *flag = 1.0;
        }
    }

    tracing::debug!(%tracer, ref_mean, roi_count, positive_count, "fill-states classification");
    let mask = Image::from_values(flags, image.shape(), &image.metadata(), &image.data().device())?;
    Ok(FillStatesMask {
        mask,
        positive_count,
        roi_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use loci_core::image::ImageMetadata;

    type Backend = NdArray<f32>;

    fn volume(values: Vec<f32>) -> Image<Backend, 3> {
        let device = Default::default();
        Image::from_values(values, [1, 1, 4], &ImageMetadata::default(), &device).unwrap()
    }

    #[test]
    fn test_high_uptake_voxel() {
        // z = (2 / 1 - 1) / 0.5 = 2
        assert_eq!(classify_voxel(2.0, 1.0, 0.5, 1.0, Abnormality::High), Some(true));
        assert_eq!(classify_voxel(2.0, 1.0, 0.5, 1.0, Abnormality::Low), Some(false));
    }

    #[test]
    fn test_hypometabolism_needs_negative_z() {
        // z = (0.1 - 1) / 0.5 = -1.8
        assert_eq!(classify_voxel(0.1, 1.0, 0.5, 1.0, Abnormality::Low), Some(true));
        // z = -1.6
        assert_eq!(classify_voxel(0.2, 1.0, 0.5, 1.0, Abnormality::Low), Some(false));
    }

    #[test]
    fn test_non_positive_std_skipped() {
        assert_eq!(classify_voxel(2.0, 1.0, 0.0, 1.0, Abnormality::High), None);
    }

    #[test]
    fn test_mask_and_proportion() {
        let image = volume(vec![2.0, 1.0, 3.0, 9.0]);
        let template = NormativeTemplate {
            mean: volume(vec![1.0; 4]),
            std: volume(vec![0.5, 0.5, 0.0, 0.5]),
            roi: volume(vec![1.0, 1.0, 1.0, 0.0]),
        };
        let result = fill_states(&image, &template, None, FillStatesTracer::Fbp).unwrap();

        // voxel 2 has zero std, voxel 3 lies outside the ROI
        assert_eq!(result.roi_count, 2);
        assert_eq!(result.positive_count, 1);
        assert!((result.proportion() - 0.5).abs() < 1e-12);
        assert_eq!(result.mask.to_values().unwrap(), vec![1.0, 0.0, 0.0, 0.0]);
        assert!(result.mask.same_grid(&image));
    }

    #[test]
    fn test_empty_roi_proportion_is_zero() {
        let image = volume(vec![2.0; 4]);
        let template = NormativeTemplate {
            mean: volume(vec![1.0; 4]),
            std: volume(vec![0.5; 4]),
            roi: volume(vec![0.0; 4]),
        };
        let result = fill_states(&image, &template, None, FillStatesTracer::Ftp).unwrap();
        assert_eq!(result.roi_count, 0);
        assert_eq!(result.proportion(), 0.0);
    }

    #[test]
    fn test_reference_normalization() {
        let image = volume(vec![4.0, 4.0, 2.0, 2.0]);
        let reference = volume(vec![0.0, 0.0, 1.0, 1.0]);
        let template = NormativeTemplate {
            mean: volume(vec![1.0; 4]),
            std: volume(vec![0.5; 4]),
            roi: volume(vec![1.0, 1.0, 0.0, 0.0]),
        };
        // intensities divided by 2 give z = 2
        let result = fill_states(&image, &template, Some(&reference), FillStatesTracer::Fbp).unwrap();
        assert_eq!(result.positive_count, 2);

        let zero_reference = volume(vec![4.0, 4.0, 0.0, 0.0]);
        let result = fill_states(&zero_reference, &template, Some(&reference), FillStatesTracer::Fbp);
        assert!(matches!(result, Err(LociError::Computation(_))));
    }
}
