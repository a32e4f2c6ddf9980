//! Destinations for intermediate volumes.

use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use loci_core::image::Image;
use loci_core::{LociError, Result};

/// Receives intermediate volumes under a short tag such as `rigid` or
/// `elastic_preprocessed`.
pub trait ArtifactSink<B: Backend>: Send + Sync {
    fn save(&self, tag: &str, image: &Image<B, 3>) -> Result<()>;
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl<B: Backend> ArtifactSink<B> for NullSink {
    fn save(&self, _tag: &str, _image: &Image<B, 3>) -> Result<()> {
        Ok(())
    }
}

/// Writes NIfTI files named after the tag.
#[derive(Debug, Clone)]
pub enum NiftiArtifactSink {
    /// `<base>_<tag>.nii`
    Prefixed(PathBuf),
    /// `<dir>/<tag>.nii`
    Directory(PathBuf),
}

impl NiftiArtifactSink {
    pub fn prefixed(base: impl Into<PathBuf>) -> Self {
        Self::Prefixed(base.into())
    }

    pub fn directory(dir: impl Into<PathBuf>) -> Self {
        Self::Directory(dir.into())
    }

    pub fn path_for(&self, tag: &str) -> PathBuf {
        match self {
            Self::Prefixed(base) => {
                let mut name = base.as_os_str().to_owned();
                name.push(format!("_{}.nii", tag));
                PathBuf::from(name)
            }
            Self::Directory(dir) => dir.join(format!("{}.nii", tag)),
        }
    }
}

impl<B: Backend> ArtifactSink<B> for NiftiArtifactSink {
    fn save(&self, tag: &str, image: &Image<B, 3>) -> Result<()> {
        let path = self.path_for(tag);
        ensure_parent(&path)?;
        loci_io::write_nifti(&path, image)
            .map_err(|e| LociError::external(format!("failed to write {}: {:#}", path.display(), e)))?;
        tracing::debug!(tag, path = %path.display(), "saved artifact");
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|e| LociError::external(format!("failed to create {}: {}", parent.display(), e))),
        _ => Ok(()),
    }
}

/// Save a debug artifact; failures are logged and otherwise ignored.
pub fn save_debug<B: Backend>(sink: &dyn ArtifactSink<B>, tag: &str, image: &Image<B, 3>) {
    if let Err(e) = sink.save(tag, image) {
        tracing::warn!(tag, error = %e, "failed to save debug artifact");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_paths() {
        let sink = NiftiArtifactSink::prefixed("/out/subject01");
        assert_eq!(sink.path_for("rigid"), PathBuf::from("/out/subject01_rigid.nii"));

        let sink = NiftiArtifactSink::directory("/tmp/scratch");
        assert_eq!(sink.path_for("rigid_iter"), PathBuf::from("/tmp/scratch/rigid_iter.nii"));
    }
}
