//! Error taxonomy shared by every loci crate.

use thiserror::Error;

/// Main error type for normalization and metric operations.
#[derive(Error, Debug)]
pub enum LociError {
    /// Missing or invalid configuration (calibration constants, mask or template paths).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Unsupported tracer, modality or metric name.
    #[error("Unsupported value: {0}")]
    Domain(String),

    /// Numerical failure such as a non-positive reference mean or degenerate landmarks.
    #[error("Computation error: {0}")]
    Computation(String),

    /// Failure surfaced from image I/O or model inference.
    #[error("External collaborator failed: {0}")]
    External(String),

    /// Shape mismatch.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

/// Result type for loci operations.
pub type Result<T> = std::result::Result<T, LociError>;

impl LociError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn domain(msg: impl Into<String>) -> Self {
        Self::Domain(msg.into())
    }

    pub fn computation(msg: impl Into<String>) -> Self {
        Self::Computation(msg.into())
    }

    pub fn external(msg: impl Into<String>) -> Self {
        Self::External(msg.into())
    }

    pub fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}
