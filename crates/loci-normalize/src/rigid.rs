//! Single-pass landmark rigid alignment.

use std::sync::Arc;

use burn::tensor::backend::Backend;
use loci_core::filter::resample_to_match;
use loci_core::image::Image;
use loci_core::Result;
use loci_model::io::image_to_tensor;
use loci_model::LandmarkPredictor;

use crate::frame::{CoordinateFrameSolver, LandmarkTriplet};
use crate::preprocess::LandmarkPreprocessor;
use crate::sink::{save_debug, ArtifactSink, NullSink};

/// One rigid alignment pass.
///
/// Returns the input volume with a new origin and direction; voxel data are
/// untouched.
pub trait RigidAlignment<B: Backend> {
    fn align(&self, image: Image<B, 3>, resample_first: bool) -> Result<Image<B, 3>>;
}

impl<B: Backend, T: RigidAlignment<B> + ?Sized> RigidAlignment<B> for &T {
    fn align(&self, image: Image<B, 3>, resample_first: bool) -> Result<Image<B, 3>> {
        (**self).align(image, resample_first)
    }
}

pub struct RigidAligner<B: Backend, P> {
    predictor: P,
    template: Image<B, 3>,
    preprocessor: LandmarkPreprocessor,
    solver: CoordinateFrameSolver,
    sink: Arc<dyn ArtifactSink<B>>,
}

impl<B: Backend, P: LandmarkPredictor<B>> RigidAligner<B, P> {
    /// `template` is the padded template grid used when `resample_first` is set.
    pub fn new(predictor: P, template: Image<B, 3>) -> Self {
        Self {
            predictor,
            template,
            preprocessor: LandmarkPreprocessor::default(),
            solver: CoordinateFrameSolver::default(),
            sink: Arc::new(NullSink),
        }
    }

    pub fn with_preprocessor(mut self, preprocessor: LandmarkPreprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ArtifactSink<B>>) -> Self {
        self.sink = sink;
        self
    }
}

impl<B: Backend, P: LandmarkPredictor<B>> RigidAlignment<B> for RigidAligner<B, P> {
    fn align(&self, image: Image<B, 3>, resample_first: bool) -> Result<Image<B, 3>> {
        let preprocessed = if resample_first {
            self.preprocessor
                .apply(&resample_to_match(&self.template, &image)?)?
        } else {
            self.preprocessor.apply(&image)?
        };
        save_debug(self.sink.as_ref(), "rigid_preprocessed", &preprocessed);

        let prediction = self.predictor.predict(image_to_tensor(&preprocessed))?;
        tracing::debug!(ac = ?prediction.ac, nose = ?prediction.nose, top = ?prediction.top, "predicted landmarks");

        let landmarks = LandmarkTriplet::from_prediction(&prediction, preprocessed.size());
        let frame = self
            .solver
            .solve(&landmarks, &preprocessed.metadata(), &image.metadata())?;

        let mut aligned = image;
        aligned.set_frame(frame.origin, frame.direction);
        tracing::info!(origin = ?frame.origin.to_array(), "rigid alignment");
        Ok(aligned)
    }
}
