//! Image filters used by the preprocessing stages.

pub mod crop;
pub mod gaussian;
pub mod intensity;
pub mod resample;

pub use crop::{ForegroundCropFilter, RegionOfInterestFilter};
pub use gaussian::GaussianFilter;
pub use intensity::PercentileWindowFilter;
pub use resample::{resample_to_match, resample_to_spacing, resize, ResampleImageFilter};
