//! Metric settings as loaded from TOML.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use loci_core::{LociError, Result};
use serde::{Deserialize, Serialize};

use crate::atlas::default_mask_paths;
use crate::calibration::{validate_linear, CentaurTable, CentaurzTable, CentiloidTable, FillStatesTable, LinearCalibration};
use crate::decouple::Modality;
use crate::suvr::RoiDefinition;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuvrConfig {
    pub regions: Vec<RoiDefinition>,
}

impl Default for SuvrConfig {
    fn default() -> Self {
        Self {
            regions: vec![RoiDefinition::centiloid(), RoiDefinition::centaur()],
        }
    }
}

/// Decomposition ensemble and ADAD calibration of one modality.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModalityConfig {
    pub models: Vec<PathBuf>,
    /// Tracer label to ADAD conversion.
    pub tracers: BTreeMap<String, LinearCalibration>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoupleConfig {
    pub abeta: ModalityConfig,
    pub tau: ModalityConfig,
}

impl DecoupleConfig {
    pub fn modality(&self, modality: Modality) -> &ModalityConfig {
        match modality {
            Modality::Abeta => &self.abeta,
            Modality::Tau => &self.tau,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Mask key to path. Standard keys missing here keep their defaults.
    pub masks: BTreeMap<String, PathBuf>,
    pub suvr: SuvrConfig,
    pub centiloid: CentiloidTable,
    pub centaur: CentaurTable,
    pub centaurz: CentaurzTable,
    pub fill_states: FillStatesTable,
    pub decouple: DecoupleConfig,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            masks: default_mask_paths(),
            suvr: SuvrConfig::default(),
            centiloid: CentiloidTable::default(),
            centaur: CentaurTable::default(),
            centaurz: CentaurzTable::default(),
            fill_states: FillStatesTable::default(),
            decouple: DecoupleConfig::default(),
        }
    }
}

fn resolve(base: &Path, path: &mut PathBuf) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

impl MetricsConfig {
    /// Fill in default masks and make every relative path relative to `base`.
    pub fn finalize(&mut self, base: &Path) {
        for (key, path) in default_mask_paths() {
            self.masks.entry(key).or_insert(path);
        }
        self.masks.values_mut().for_each(|p| resolve(base, p));
        for resources in self.fill_states.tracers.values_mut() {
            resolve(base, &mut resources.mean);
            resolve(base, &mut resources.std);
            resolve(base, &mut resources.roi);
        }
        for modality in [&mut self.decouple.abeta, &mut self.decouple.tau] {
            modality.models.iter_mut().for_each(|p| resolve(base, p));
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.centiloid.validate()?;
        self.centaur.validate()?;
        self.centaurz.validate()?;
        validate_linear("decouple.abeta", &self.decouple.abeta.tracers)?;
        validate_linear("decouple.tau", &self.decouple.tau.tracers)?;

        for region in &self.suvr.regions {
            if region.label.is_empty() {
                return Err(LociError::configuration("suvr.regions entries need a label"));
            }
        }
        for (tracer, resources) in &self.fill_states.tracers {
            if let Some(key) = &resources.reference_mask {
                if key.is_empty() {
                    return Err(LociError::configuration(format!(
                        "fill_states.tracers.{}.reference_mask is empty",
                        tracer.key()
                    )));
                }
            }
        }
        Ok(())
    }
}
