//! Intensity and geometry preparation for the networks.

use burn::tensor::backend::Backend;
use loci_core::filter::{resample_to_spacing, resize, ForegroundCropFilter, GaussianFilter, PercentileWindowFilter};
use loci_core::image::Image;
use loci_core::spatial::Spacing3;
use loci_core::Result;

/// Landmark network input preparation:
/// percentile window, Gaussian smoothing, isotropic resample, foreground crop
/// and a fixed-size resize.
#[derive(Debug, Clone)]
pub struct LandmarkPreprocessor {
    pub window: PercentileWindowFilter,
    pub smoothing_variance: f64,
    pub max_kernel_width: usize,
    pub boundary_value: f32,
    pub isotropic_spacing_mm: f64,
    pub foreground_threshold: f32,
    pub output_size: usize,
}

impl Default for LandmarkPreprocessor {
    fn default() -> Self {
        Self {
            window: PercentileWindowFilter::default(),
            smoothing_variance: 1.0,
            max_kernel_width: 9,
            boundary_value: -0.1,
            isotropic_spacing_mm: 3.0,
            foreground_threshold: 0.35,
            output_size: 64,
        }
    }
}

impl LandmarkPreprocessor {
    pub fn apply<B: Backend>(&self, image: &Image<B, 3>) -> Result<Image<B, 3>> {
        let windowed = self.window.apply(image)?;
        let smoothed = GaussianFilter::new(self.smoothing_variance)
            .with_max_kernel_width(self.max_kernel_width)
            .with_boundary_value(self.boundary_value)
            .apply(&windowed);
        let isotropic = resample_to_spacing(&smoothed, Spacing3::uniform(self.isotropic_spacing_mm))?;
        let cropped = ForegroundCropFilter::new(self.foreground_threshold).apply(&isotropic)?;
        let resized = resize(&cropped, [self.output_size; 3])?;

        tracing::debug!(
            isotropic_size = ?isotropic.size(),
            cropped_size = ?cropped.size(),
            origin = ?resized.origin().to_array(),
            spacing = ?resized.spacing().to_array(),
            "landmark preprocessing"
        );
        Ok(resized)
    }
}

/// Warp network moving-image preparation: percentile window only.
#[derive(Debug, Clone, Default)]
pub struct WarpPreprocessor {
    pub window: PercentileWindowFilter,
}

impl WarpPreprocessor {
    pub fn apply<B: Backend>(&self, image: &Image<B, 3>) -> Result<Image<B, 3>> {
        self.window.apply(image)
    }
}
