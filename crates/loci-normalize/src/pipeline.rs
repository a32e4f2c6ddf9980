//! Rigid alignment followed by non-linear warp.

use std::sync::Arc;

use burn::tensor::backend::Backend;
use loci_core::image::Image;
use loci_core::Result;
use loci_model::{LandmarkPredictor, WarpPredictor};

use crate::iterative::{IterationReport, IterativeRigidController};
use crate::rigid::{RigidAligner, RigidAlignment};
use crate::sink::{save_debug, ArtifactSink, NullSink};
use crate::warp::NonlinearWarper;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NormalizationMode {
    /// One rigid pass, then warp.
    Standard,
    /// Iterated rigid alignment, then warp.
    Iterative { max_iterations: usize, threshold_mm: f64 },
    /// Warp only; the input is assumed roughly positioned already.
    ManualFov,
}

impl NormalizationMode {
    /// Mode selected by the `iterative` / `manual_fov` flags, manual FOV winning.
    pub fn from_flags(iterative: bool, manual_fov: bool, max_iterations: usize, threshold_mm: f64) -> Self {
        match (manual_fov, iterative) {
            (true, _) => Self::ManualFov,
            (false, true) => Self::Iterative {
                max_iterations,
                threshold_mm,
            },
            (false, false) => Self::Standard,
        }
    }
}

pub struct NormalizationResult<B: Backend> {
    pub rigid_aligned: Image<B, 3>,
    pub normalized: Image<B, 3>,
    /// Set in iterative mode.
    pub iterations: Option<IterationReport>,
}

pub struct NormalizationOrchestrator<B: Backend, L, W> {
    aligner: RigidAligner<B, L>,
    warper: NonlinearWarper<B, W>,
    debug: Arc<dyn ArtifactSink<B>>,
    scratch: Arc<dyn ArtifactSink<B>>,
}

impl<B: Backend, L: LandmarkPredictor<B>, W: WarpPredictor<B>> NormalizationOrchestrator<B, L, W> {
    pub fn new(aligner: RigidAligner<B, L>, warper: NonlinearWarper<B, W>) -> Self {
        Self {
            aligner,
            warper,
            debug: Arc::new(NullSink),
            scratch: Arc::new(NullSink),
        }
    }

    /// Route debug artifacts of every stage to `sink`.
    pub fn with_debug(mut self, sink: Arc<dyn ArtifactSink<B>>) -> Self {
        self.aligner = self.aligner.with_sink(sink.clone());
        self.warper = self.warper.with_sink(sink.clone());
        self.debug = sink;
        self
    }

    pub fn with_scratch(mut self, sink: Arc<dyn ArtifactSink<B>>) -> Self {
        self.scratch = sink;
        self
    }

    pub fn normalize(&self, image: Image<B, 3>, mode: NormalizationMode) -> Result<NormalizationResult<B>> {
        tracing::info!(?mode, size = ?image.size(), "spatial normalization");

        let (rigid_aligned, iterations) = match mode {
            NormalizationMode::Standard => {
                let rigid = self.aligner.align(image, false)?;
                save_debug(self.debug.as_ref(), "rigid", &rigid);
                (rigid, None)
            }
            NormalizationMode::Iterative {
                max_iterations,
                threshold_mm,
            } => {
                let outcome = IterativeRigidController::new(&self.aligner, max_iterations, threshold_mm)
                    .with_scratch(self.scratch.clone())
                    .with_debug(self.debug.clone())
                    .run(image)?;
                (outcome.image, Some(outcome.report))
            }
            NormalizationMode::ManualFov => (image, None),
        };

        let normalized = self.warper.warp(&rigid_aligned)?;
        Ok(NormalizationResult {
            rigid_aligned,
            normalized,
            iterations,
        })
    }
}
