//! Non-linear warp into template space.

use std::sync::Arc;

use burn::tensor::backend::Backend;
use loci_core::filter::{resample_to_match, RegionOfInterestFilter};
use loci_core::image::Image;
use loci_core::Result;
use loci_model::io::{image_to_tensor, tensor_to_image};
use loci_model::{WarpInputs, WarpPredictor};

use crate::config::CropWindow;
use crate::preprocess::WarpPreprocessor;
use crate::sink::{save_debug, ArtifactSink, NullSink};

pub struct NonlinearWarper<B: Backend, P> {
    predictor: P,
    template: Image<B, 3>,
    preprocessor: WarpPreprocessor,
    crop: RegionOfInterestFilter,
    sink: Arc<dyn ArtifactSink<B>>,
}

impl<B: Backend, P: WarpPredictor<B>> NonlinearWarper<B, P> {
    /// Fails with a configuration error if `crop` does not fit the template grid.
    pub fn new(predictor: P, template: Image<B, 3>, crop: CropWindow) -> Result<Self> {
        let crop = crop.filter();
        crop.check_fits(template.size())?;
        Ok(Self {
            predictor,
            template,
            preprocessor: WarpPreprocessor::default(),
            crop,
            sink: Arc::new(NullSink),
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn ArtifactSink<B>>) -> Self {
        self.sink = sink;
        self
    }

    pub fn template(&self) -> &Image<B, 3> {
        &self.template
    }

    /// Warp a rigidly aligned volume and crop it to the canonical window.
    pub fn warp(&self, rigid: &Image<B, 3>) -> Result<Image<B, 3>> {
        let raw = resample_to_match(&self.template, rigid)?;
        let moving = self.preprocessor.apply(&raw)?;
        save_debug(self.sink.as_ref(), "elastic_preprocessed", &moving);

        let warped = self.predictor.predict(WarpInputs {
            raw: image_to_tensor(&raw),
            moving: image_to_tensor(&moving),
            template: image_to_tensor(&self.template),
        })?;
        let warped = tensor_to_image(warped, self.template.shape(), &self.template.metadata())?;

        tracing::debug!(start = ?self.crop.start(), size = ?self.crop.size(), "cropping to template window");
        self.crop.apply(&warped)
    }
}
