//! Where reference volumes come from.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use burn::tensor::backend::Backend;
use loci_core::image::Image;
use loci_core::{LociError, Result};

/// Loads masks and normative templates by path.
pub trait VolumeSource<B: Backend>: Send + Sync {
    fn load(&self, path: &Path) -> Result<Image<B, 3>>;
}

/// Reads NIfTI files and keeps them in memory for reuse across subjects.
pub struct NiftiSource<B: Backend> {
    device: B::Device,
    cache: Mutex<HashMap<PathBuf, Image<B, 3>>>,
}

impl<B: Backend> NiftiSource<B> {
    pub fn new(device: B::Device) -> Self {
        Self {
            device,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl<B: Backend> VolumeSource<B> for NiftiSource<B> {
    fn load(&self, path: &Path) -> Result<Image<B, 3>> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| LociError::external("volume cache lock poisoned"))?;
        if let Some(image) = cache.get(path) {
            return Ok(image.clone());
        }
        let image = loci_io::read_nifti::<B, _>(path, &self.device)
            .map_err(|e| LociError::external(format!("failed to read {}: {:#}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), size = ?image.size(), "loaded reference volume");
        cache.insert(path.to_path_buf(), image.clone());
        Ok(image)
    }
}

/// Volumes registered up front, keyed by path.
pub struct InMemorySource<B: Backend> {
    volumes: HashMap<PathBuf, Image<B, 3>>,
}

impl<B: Backend> Default for InMemorySource<B> {
    fn default() -> Self {
        Self {
            volumes: HashMap::new(),
        }
    }
}

impl<B: Backend> InMemorySource<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<PathBuf>, image: Image<B, 3>) -> Self {
        self.volumes.insert(path.into(), image);
        self
    }
}

impl<B: Backend> VolumeSource<B> for InMemorySource<B> {
    fn load(&self, path: &Path) -> Result<Image<B, 3>> {
        self.volumes
            .get(path)
            .cloned()
            .ok_or_else(|| LociError::external(format!("no volume registered at {}", path.display())))
    }
}
