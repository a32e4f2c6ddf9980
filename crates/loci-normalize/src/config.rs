//! Normalization settings.

use loci_core::filter::RegionOfInterestFilter;
use loci_core::{LociError, Result};
use serde::{Deserialize, Serialize};

/// Canonical output window within the padded template grid, `(x, y, z)` voxels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropWindow {
    pub start: [usize; 3],
    pub size: [usize; 3],
}

impl Default for CropWindow {
    fn default() -> Self {
        Self {
            start: [8, 16, 8],
            size: [79, 95, 79],
        }
    }
}

impl CropWindow {
    pub fn filter(&self) -> RegionOfInterestFilter {
        RegionOfInterestFilter::new(self.start, self.size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    /// Refinement passes after the initial rigid alignment.
    pub max_iterations: usize,
    pub convergence_threshold_mm: f64,
    pub crop: CropWindow,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            convergence_threshold_mm: 2.0,
            crop: CropWindow::default(),
        }
    }
}

impl NormalizationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.convergence_threshold_mm.is_finite() && self.convergence_threshold_mm > 0.0) {
            return Err(LociError::configuration(format!(
                "normalization.convergence_threshold_mm must be positive, got {}",
                self.convergence_threshold_mm
            )));
        }
        if self.crop.size.iter().any(|&n| n == 0) {
            return Err(LociError::configuration(format!(
                "normalization.crop.size must be non-zero, got {:?}",
                self.crop.size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_table() {
        let config: NormalizationConfig = toml::from_str("").unwrap();
        assert_eq!(config, NormalizationConfig::default());
        assert_eq!(config.crop.start, [8, 16, 8]);
        assert_eq!(config.crop.size, [79, 95, 79]);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_override() {
        let config: NormalizationConfig = toml::from_str(
            r#"
            max_iterations = 3
            crop = { start = [0, 0, 0], size = [10, 10, 10] }
            "#,
        )
        .unwrap();
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.convergence_threshold_mm, 2.0);
        assert_eq!(config.crop.size, [10, 10, 10]);
    }

    #[test]
    fn test_invalid_threshold() {
        let config = NormalizationConfig {
            convergence_threshold_mm: 0.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(LociError::Configuration(_))));
    }
}
