//! `config.toml` loading.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use loci_metrics::MetricsConfig;
use loci_normalize::NormalizationConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPaths {
    /// Landmark network weights.
    pub rigid: PathBuf,
    /// Warp network weights.
    pub warp: PathBuf,
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            rigid: PathBuf::from("models/rigid.mpk"),
            warp: PathBuf::from("models/warp.mpk"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatePaths {
    pub padded: PathBuf,
    pub adni_pet_core: PathBuf,
}

impl Default for TemplatePaths {
    fn default() -> Self {
        Self {
            padded: PathBuf::from("nii/paddedTemplate.nii"),
            adni_pet_core: PathBuf::from("nii/ADNI_empty.nii"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Scratch directory for iterative alignment.
    pub temp_dir: PathBuf,
    pub models: ModelPaths,
    pub templates: TemplatePaths,
    pub normalization: NormalizationConfig,
    #[serde(flatten)]
    pub metrics: MetricsConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("./tmp"),
            models: ModelPaths::default(),
            templates: TemplatePaths::default(),
            normalization: NormalizationConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

fn resolve(base: &Path, path: &mut PathBuf) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

impl Settings {
    pub fn parse(text: &str, base: &Path) -> Result<Self> {
        let mut settings: Settings = toml::from_str(text).context("invalid configuration")?;
        settings.finalize(base);
        settings.validate()?;
        Ok(settings)
    }

    /// Read and validate `path`; relative paths inside resolve against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let settings = Self::parse(&text, base).with_context(|| format!("in {}", path.display()))?;
        tracing::debug!(config = %path.display(), "configuration loaded");
        Ok(settings)
    }

    fn finalize(&mut self, base: &Path) {
        resolve(base, &mut self.temp_dir);
        resolve(base, &mut self.models.rigid);
        resolve(base, &mut self.models.warp);
        resolve(base, &mut self.templates.padded);
        resolve(base, &mut self.templates.adni_pet_core);
        self.metrics.finalize(base);
    }

    pub fn validate(&self) -> Result<()> {
        self.normalization.validate()?;
        self.metrics.validate()?;
        Ok(())
    }
}
