//! Biomarker calculation over a spatially normalized volume.

use std::collections::BTreeMap;
use std::fmt;

use burn::tensor::backend::Backend;
use loci_core::image::Image;
use loci_core::{LociError, Result};

use crate::atlas::{MaskAtlas, CENTAUR_REF, CENTAUR_VOI, CENTILOID_VOI, WHOLE_CEREBRAL};
use crate::calibration::FillStatesTracer;
use crate::config::MetricsConfig;
use crate::fill_states::{fill_states, NormativeTemplate};
use crate::suvr::{suvr, RoiDefinition};

/// Requested biomarker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Metric {
    /// Every configured SUVr region.
    Suvr,
    /// One ad hoc target/reference pair.
    CustomSuvr(RoiDefinition),
    Centiloid,
    CenTauR,
    CenTauRz,
    FillStates(FillStatesTracer),
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Suvr => "SUVr",
            Metric::CustomSuvr(_) => "CustomSUVr",
            Metric::Centiloid => "Centiloid",
            Metric::CenTauR => "CenTauR",
            Metric::CenTauRz => "CenTauRz",
            Metric::FillStates(_) => "FillStates",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::FillStates(tracer) => write!(f, "FillStates({})", tracer),
            other => f.write_str(other.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricResult {
    pub metric_name: String,
    /// The underlying region ratio; `None` for fill-states.
    pub ratio: Option<f64>,
    /// Tracer or region label to value.
    pub values: BTreeMap<String, f64>,
}

#[derive(Debug, Clone)]
pub struct MetricOutcome<B: Backend> {
    pub result: MetricResult,
    /// Fill-states classification mask on the input grid.
    pub mask: Option<Image<B, 3>>,
}

impl<B: Backend> From<MetricResult> for MetricOutcome<B> {
    fn from(result: MetricResult) -> Self {
        Self { result, mask: None }
    }
}

pub struct MetricEngine<B: Backend> {
    config: MetricsConfig,
    atlas: MaskAtlas<B>,
}

impl<B: Backend> MetricEngine<B> {
    /// Validates the calibration tables.
    pub fn new(config: MetricsConfig, atlas: MaskAtlas<B>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, atlas })
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    pub fn atlas(&self) -> &MaskAtlas<B> {
        &self.atlas
    }

    /// SUVr of one region pair.
    pub fn ratio(&self, image: &Image<B, 3>, region: &RoiDefinition) -> Result<f64> {
        let voi = self.atlas.mask(&region.voi)?;
        let reference = self.atlas.mask(&region.reference)?;
        suvr(image, &voi, &reference)
    }

    pub fn calculate(&self, image: &Image<B, 3>, metric: &Metric) -> Result<MetricOutcome<B>> {
        let outcome = match metric {
            Metric::Suvr => self.suvr_regions(image)?.into(),
            Metric::CustomSuvr(region) => {
                let ratio = self.ratio(image, region)?;
                result(metric, Some(ratio), [(region.label.clone(), ratio)]).into()
            }
            Metric::Centiloid => {
                let table = &self.config.centiloid.tracers;
                non_empty(metric, table.len())?;
                let ratio = self.ratio(image, &RoiDefinition::new("Centiloid", CENTILOID_VOI, WHOLE_CEREBRAL))?;
                let values = table.iter().map(|(t, c)| (t.label().to_string(), c.apply(ratio)));
                result(metric, Some(ratio), values).into()
            }
            Metric::CenTauR => {
                let table = &self.config.centaur.tracers;
                non_empty(metric, table.len())?;
                let ratio = self.ratio(image, &RoiDefinition::new("CenTauR", CENTAUR_VOI, CENTAUR_REF))?;
                let values = table.iter().map(|(t, c)| (t.label().to_string(), c.apply(ratio)));
                result(metric, Some(ratio), values).into()
            }
            Metric::CenTauRz => {
                let table = &self.config.centaurz.tracers;
                non_empty(metric, table.len())?;
                let ratio = self.ratio(image, &RoiDefinition::new("CenTauRz", CENTAUR_VOI, CENTAUR_REF))?;
                let values = table.iter().map(|(t, c)| (t.label().to_string(), c.apply(ratio)));
                result(metric, Some(ratio), values).into()
            }
            Metric::FillStates(tracer) => self.fill_states(image, *tracer)?,
        };

        tracing::info!(metric = %metric, ratio = ?outcome.result.ratio, values = ?outcome.result.values, "metric");
        Ok(outcome)
    }

    /// Calculate several metrics; a failing metric does not stop the others.
    pub fn calculate_all(&self, image: &Image<B, 3>, metrics: &[Metric]) -> Vec<(Metric, Result<MetricOutcome<B>>)> {
        metrics
            .iter()
            .map(|metric| {
                let outcome = self.calculate(image, metric);
                if let Err(e) = &outcome {
                    tracing::warn!(metric = %metric, error = %e, "metric calculation failed");
                }
                (metric.clone(), outcome)
            })
            .collect()
    }

    fn suvr_regions(&self, image: &Image<B, 3>) -> Result<MetricResult> {
        let regions = &self.config.suvr.regions;
        if regions.is_empty() {
            return Err(LociError::configuration("no SUVr regions configured"));
        }
        let mut values = BTreeMap::new();
        let mut primary = None;
        for region in regions {
            let ratio = self.ratio(image, region)?;
            primary.get_or_insert(ratio);
            values.insert(region.label.clone(), ratio);
        }
        Ok(MetricResult {
            metric_name: Metric::Suvr.name().to_string(),
            ratio: primary,
            values,
        })
    }

    fn fill_states(&self, image: &Image<B, 3>, tracer: FillStatesTracer) -> Result<MetricOutcome<B>> {
        let resources = self.config.fill_states.resources(tracer)?;
        let template = NormativeTemplate {
            mean: self.atlas.load(&resources.mean)?,
            std: self.atlas.load(&resources.std)?,
            roi: self.atlas.load(&resources.roi)?,
        };
        let reference_key = resources
            .reference_mask
            .as_deref()
            .unwrap_or_else(|| tracer.default_reference_mask());
        let reference = self.atlas.mask(reference_key)?;

        let classified = fill_states(image, &template, Some(&reference), tracer)?;
        let metric = Metric::FillStates(tracer);
        Ok(MetricOutcome {
            result: result(&metric, None, [(tracer.label().to_string(), classified.proportion())]),
            mask: Some(classified.mask),
        })
    }
}

fn result(metric: &Metric, ratio: Option<f64>, values: impl IntoIterator<Item = (String, f64)>) -> MetricResult {
    MetricResult {
        metric_name: metric.name().to_string(),
        ratio,
        values: values.into_iter().collect(),
    }
}

fn non_empty(metric: &Metric, count: usize) -> Result<()> {
    if count == 0 {
        Err(LociError::configuration(format!("no {} tracers configured", metric.name())))
    } else {
        Ok(())
    }
}
