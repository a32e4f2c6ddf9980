//! AD-pattern decoupling of rigidly aligned volumes.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use loci_core::filter::resample_to_match;
use loci_core::image::Image;
use loci_core::statistics::mean_in_mask;
use loci_core::{LociError, Result};
use loci_model::io::{image_to_tensor, tensor_to_image};
use loci_model::DecompositionPredictor;

use crate::calibration::LinearCalibration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Abeta,
    Tau,
}

impl FromStr for Modality {
    type Err = LociError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "abeta" => Ok(Modality::Abeta),
            "tau" => Ok(Modality::Tau),
            other => Err(LociError::domain(format!("unsupported decouple modality '{}'", other))),
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Modality::Abeta => "abeta",
            Modality::Tau => "tau",
        })
    }
}

/// Builds the ADNI-style input: the rigid volume on the legacy template grid,
/// divided by the cerebellar gray mean of the normalized volume.
pub struct AdniStyleRescaler<B: Backend> {
    cerebral_gray: Image<B, 3>,
    template: Image<B, 3>,
}

impl<B: Backend> AdniStyleRescaler<B> {
    pub fn new(cerebral_gray: Image<B, 3>, template: Image<B, 3>) -> Self {
        Self { cerebral_gray, template }
    }

    pub fn prepare(&self, rigid: &Image<B, 3>, normalized: &Image<B, 3>) -> Result<Image<B, 3>> {
        let on_mask = resample_to_match(&self.cerebral_gray, normalized)?;
        let mean = match mean_in_mask(&on_mask, &self.cerebral_gray)? {
            Some(mean) if mean > 0.0 => mean,
            other => {
                return Err(LociError::computation(format!(
                    "cerebral gray mean must be positive, got {:?}",
                    other
                )))
            }
        };
        tracing::debug!(mean, "ADNI-style scaling");

        let resampled = resample_to_match(&self.template, rigid)?;
        let scaled = resampled.data().clone() / mean as f32;
        Ok(resampled.with_data(scaled))
    }
}

pub struct DecoupledResult<B: Backend> {
    pub stripped_image: Image<B, 3>,
    pub stripped_component: Image<B, 3>,
    pub ad_probability_map: Image<B, 3>,
    pub ad_probability: f64,
    pub adad_score: f64,
    /// ADAD score converted per tracer.
    pub adad_values: BTreeMap<String, f64>,
}

impl<B: Backend> DecoupledResult<B> {
    /// Write the three volumes next to `output` with `_stripped_image`,
    /// `_stripped_component` and `_AD_prob_map` suffixes.
    pub fn save(&self, output: &Path) -> Result<()> {
        for (suffix, image) in [
            ("_stripped_image", &self.stripped_image),
            ("_stripped_component", &self.stripped_component),
            ("_AD_prob_map", &self.ad_probability_map),
        ] {
            let path = with_suffix(output, suffix);
            loci_io::write_nifti(&path, image)
                .map_err(|e| LociError::external(format!("failed to write {}: {:#}", path.display(), e)))?;
        }
        Ok(())
    }
}

/// Insert `suffix` before a `.nii` / `.nii.gz` extension.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let (stem, ext) = match name.strip_suffix(".nii.gz") {
        Some(stem) => (stem.to_string(), ".nii.gz"),
        None => match name.strip_suffix(".nii") {
            Some(stem) => (stem.to_string(), ".nii"),
            None => (name.clone(), ".nii"),
        },
    };
    path.with_file_name(format!("{}{}{}", stem, suffix, ext))
}

/// Runs an ensemble of decomposition models and averages their outputs.
pub struct DecoupleAdapter<B: Backend, P> {
    modality: Modality,
    models: Vec<P>,
    calibration: BTreeMap<String, LinearCalibration>,
    _backend: std::marker::PhantomData<B>,
}

impl<B: Backend, P: DecompositionPredictor<B>> DecoupleAdapter<B, P> {
    pub fn new(modality: Modality, models: Vec<P>, calibration: BTreeMap<String, LinearCalibration>) -> Result<Self> {
        if models.is_empty() {
            return Err(LociError::configuration(format!(
                "no decomposition models configured for modality '{}'",
                modality
            )));
        }
        Ok(Self {
            modality,
            models,
            calibration,
            _backend: std::marker::PhantomData,
        })
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    pub fn decouple(&self, adni: &Image<B, 3>) -> Result<DecoupledResult<B>> {
        let input = image_to_tensor(adni);
        let count = self.models.len();

        let mut sum: Option<[Tensor<B, 5>; 3]> = None;
        let mut probability = 0.0;
        let mut score = 0.0;
        for model in &self.models {
            let out = model.predict(input.clone())?;
            probability += out.ad_probability;
            score += out.adad_score;
            let maps = [out.stripped_image, out.stripped_component, out.ad_probability_map];
            sum = Some(match sum {
                None => maps,
                Some([a, b, c]) => {
                    let [x, y, z] = maps;
                    [a + x, b + y, c + z]
                }
            });
        }
        let [stripped_image, stripped_component, probability_map] =
            sum.ok_or_else(|| LociError::configuration("empty decomposition ensemble"))?;

        let n = count as f32;
        let shape = adni.shape();
        let metadata = adni.metadata();
        let ad_probability = probability / count as f64;
        let adad_score = score / count as f64;
        let adad_values: BTreeMap<String, f64> = self
            .calibration
            .iter()
            .map(|(tracer, c)| (tracer.clone(), c.apply(adad_score)))
            .collect();

        tracing::info!(modality = %self.modality, models = count, ad_probability, adad_score, "decoupled");
        Ok(DecoupledResult {
            stripped_image: tensor_to_image(stripped_image / n, shape, &metadata)?,
            stripped_component: tensor_to_image(stripped_component / n, shape, &metadata)?,
            ad_probability_map: tensor_to_image(probability_map / n, shape, &metadata)?,
            ad_probability,
            adad_score,
            adad_values,
        })
    }
}
