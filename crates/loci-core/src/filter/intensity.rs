//! Percentile-based intensity windowing.

use burn::tensor::backend::Backend;
use crate::error::{LociError, Result};
use crate::image::Image;

/// Clips intensities to a percentile window and rescales them to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentileWindowFilter {
    lower: f64,
    upper: f64,
}

impl Default for PercentileWindowFilter {
    fn default() -> Self {
        Self {
            lower: 0.01,
            upper: 0.99,
        }
    }
}

impl PercentileWindowFilter {
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&lower) || !(0.0..=1.0).contains(&upper) || lower >= upper {
            return Err(LociError::configuration(format!(
                "percentile window must satisfy 0 <= lower < upper <= 1, got [{}, {}]",
                lower, upper
            )));
        }
        Ok(Self { lower, upper })
    }

    /// Intensity bounds at the configured percentiles.
    ///
    /// The percentile `p` selects the sorted value at index `⌊p · (n − 1)⌋`.
    pub fn bounds<B: Backend>(&self, image: &Image<B, 3>) -> Result<(f32, f32)> {
        let mut values = image.to_values()?;
        if values.is_empty() {
            return Err(LociError::computation("cannot window an empty volume"));
        }
        values.sort_unstable_by(|a, b| a.total_cmp(b));
        let last = (values.len() - 1) as f64;
        let lo = values[(self.lower * last) as usize];
        let hi = values[(self.upper * last) as usize];
        Ok((lo, hi))
    }

    pub fn apply<B: Backend>(&self, image: &Image<B, 3>) -> Result<Image<B, 3>> {
        let (lo, hi) = self.bounds(image)?;
        let range = hi - lo;
        let data = image.data().clone();
        let windowed = if range > f32::EPSILON {
            (data.clamp(lo, hi) - lo) / range
        } else {
            tracing::warn!(lo, hi, "degenerate intensity window, output is zero");
            data.zeros_like()
        };
        Ok(image.with_data(windowed))
    }
}
