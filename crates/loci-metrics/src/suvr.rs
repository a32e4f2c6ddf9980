//! Region-mean ratios.

use burn::tensor::backend::Backend;
use loci_core::filter::resample_to_match;
use loci_core::image::Image;
use loci_core::statistics::mean_in_mask;
use loci_core::{LociError, Result};
use serde::{Deserialize, Serialize};

use crate::atlas::{CENTAUR_REF, CENTAUR_VOI, CENTILOID_VOI, WHOLE_CEREBRAL};

/// A labelled target/reference mask pair; masks are atlas keys or paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoiDefinition {
    pub label: String,
    pub voi: String,
    pub reference: String,
}

impl RoiDefinition {
    pub fn new(label: impl Into<String>, voi: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            voi: voi.into(),
            reference: reference.into(),
        }
    }

    pub fn centiloid() -> Self {
        Self::new("Centiloid_SUVr", CENTILOID_VOI, WHOLE_CEREBRAL)
    }

    pub fn centaur() -> Self {
        Self::new("CenTauR_SUVr", CENTAUR_VOI, CENTAUR_REF)
    }
}

fn masked_mean<B: Backend>(image: &Image<B, 3>, mask: &Image<B, 3>, what: &str) -> Result<f64> {
    mean_in_mask(image, mask)?
        .ok_or_else(|| LociError::computation(format!("{} mask has no voxels labelled 1", what)))
}

/// `mean(image in voi) / mean(image in reference)`.
///
/// The image is resampled onto each mask's grid before averaging.
pub fn suvr<B: Backend>(image: &Image<B, 3>, voi: &Image<B, 3>, reference: &Image<B, 3>) -> Result<f64> {
    let on_voi = resample_to_match(voi, image)?;
    let target = masked_mean(&on_voi, voi, "target")?;

    let reference_mean = if reference.same_grid(voi) {
        masked_mean(&on_voi, reference, "reference")?
    } else {
        masked_mean(&resample_to_match(reference, image)?, reference, "reference")?
    };
    if reference_mean <= 0.0 {
        return Err(LociError::computation(format!(
            "reference region mean is non-positive ({})",
            reference_mean
        )));
    }

    Ok(target / reference_mean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use loci_core::image::ImageMetadata;

    type Backend = NdArray<f32>;

    fn volume(values: Vec<f32>) -> Image<Backend, 3> {
        let device = Default::default();
        Image::from_values(values, [1, 2, 3], &ImageMetadata::default(), &device).unwrap()
    }

    #[test]
    fn test_ratio_of_means() {
        let image = volume(vec![2.0, 4.0, 6.0, 1.0, 1.0, 1.0]);
        let voi = volume(vec![1.0, 1.0, 1.0, 0.0, 0.0, 0.0]);
        let reference = volume(vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        assert!((suvr(&image, &voi, &reference).unwrap() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_only_label_one_counts() {
        let image = volume(vec![2.0, 4.0, 6.0, 1.0, 3.0, 1.0]);
        let voi = volume(vec![1.0, 2.0, 1.0, 0.0, 0.0, 0.0]);
        let reference = volume(vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        // voi mean (2 + 6) / 2 = 4, reference mean 5 / 3
        assert!((suvr(&image, &voi, &reference).unwrap() - 4.0 * 3.0 / 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_non_positive_reference_rejected() {
        let image = volume(vec![2.0, 4.0, 6.0, 0.0, 0.0, 0.0]);
        let voi = volume(vec![1.0, 1.0, 1.0, 0.0, 0.0, 0.0]);
        let reference = volume(vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        assert!(matches!(suvr(&image, &voi, &reference), Err(LociError::Computation(_))));
    }

    #[test]
    fn test_empty_mask_rejected() {
        let image = volume(vec![1.0; 6]);
        let empty = volume(vec![0.0; 6]);
        let full = volume(vec![1.0; 6]);
        assert!(matches!(suvr(&image, &empty, &full), Err(LociError::Computation(_))));
    }
}
