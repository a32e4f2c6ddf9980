//! Inference ports.
//!
//! Each network is a black-box function with fixed tensor shapes. Pipeline
//! stages depend on these traits only, so deterministic doubles can replace
//! real weights.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use loci_core::Result;

/// Raw landmark network output, each vector in `(x, y, z)` voxel order of the
/// network's input grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LandmarkPrediction {
    /// Anterior commissure as a fraction of the grid size per axis.
    pub ac: [f64; 3],
    /// Direction from the grid's index origin towards the nose.
    pub nose: [f64; 3],
    /// Direction from the grid's index origin towards the vertex.
    pub top: [f64; 3],
}

/// Predicts AC, nose and vertex landmarks from a `[1, 1, 64, 64, 64]` volume.
pub trait LandmarkPredictor<B: Backend> {
    fn predict(&self, input: Tensor<B, 5>) -> Result<LandmarkPrediction>;
}

/// Inputs of the non-linear warp network, all shaped like the padded template.
#[derive(Debug, Clone)]
pub struct WarpInputs<B: Backend> {
    /// Rigidly aligned volume resampled onto the template grid, unprocessed.
    pub raw: Tensor<B, 5>,
    /// Same volume after intensity windowing.
    pub moving: Tensor<B, 5>,
    pub template: Tensor<B, 5>,
}

/// Produces the warped volume `[1, 1, Z, Y, X]` on the template grid.
pub trait WarpPredictor<B: Backend> {
    fn predict(&self, inputs: WarpInputs<B>) -> Result<Tensor<B, 5>>;
}

/// Outputs of an AD-pattern decomposition network.
#[derive(Debug, Clone)]
pub struct Decomposition<B: Backend> {
    pub stripped_image: Tensor<B, 5>,
    pub stripped_component: Tensor<B, 5>,
    pub ad_probability_map: Tensor<B, 5>,
    pub ad_probability: f64,
    pub adad_score: f64,
}

/// Decomposes an ADNI-style volume into AD-related and residual components.
pub trait DecompositionPredictor<B: Backend> {
    fn predict(&self, input: Tensor<B, 5>) -> Result<Decomposition<B>>;
}

impl<B: Backend, P: LandmarkPredictor<B> + ?Sized> LandmarkPredictor<B> for Box<P> {
    fn predict(&self, input: Tensor<B, 5>) -> Result<LandmarkPrediction> {
        (**self).predict(input)
    }
}

impl<B: Backend, P: WarpPredictor<B> + ?Sized> WarpPredictor<B> for Box<P> {
    fn predict(&self, inputs: WarpInputs<B>) -> Result<Tensor<B, 5>> {
        (**self).predict(inputs)
    }
}

impl<B: Backend, P: DecompositionPredictor<B> + ?Sized> DecompositionPredictor<B> for Box<P> {
    fn predict(&self, input: Tensor<B, 5>) -> Result<Decomposition<B>> {
        (**self).predict(input)
    }
}
