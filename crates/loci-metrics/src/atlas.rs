//! Named region masks.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::tensor::backend::Backend;
use loci_core::image::Image;
use loci_core::{LociError, Result};

use crate::source::VolumeSource;

/// Cortical composite VOI for Centiloid.
pub const CENTILOID_VOI: &str = "centiloid_voi";
/// Whole cerebellum reference.
pub const WHOLE_CEREBRAL: &str = "whole_cerebral";
pub const CENTAUR_VOI: &str = "centaur_voi";
/// Cerebellar gray reference for tau.
pub const CENTAUR_REF: &str = "centaur_ref";
/// Cerebellar gray matter used for ADNI-style intensity scaling.
pub const CEREBRAL_GRAY: &str = "cerebral_gray";

pub fn default_mask_paths() -> BTreeMap<String, PathBuf> {
    [
        (CENTILOID_VOI, "nii/voi_ctx_2mm.nii"),
        (WHOLE_CEREBRAL, "nii/voi_WhlCbl_2mm.nii"),
        (CENTAUR_VOI, "nii/CenTauR.nii"),
        (CENTAUR_REF, "nii/voi_CerebGry_tau_2mm.nii"),
        (CEREBRAL_GRAY, "nii/voi_CerebGry_2mm.nii"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), PathBuf::from(v)))
    .collect()
}

/// Resolves mask names to volumes.
///
/// A name that is not a configured key is treated as a file path.
#[derive(Clone)]
pub struct MaskAtlas<B: Backend> {
    paths: BTreeMap<String, PathBuf>,
    source: Arc<dyn VolumeSource<B>>,
}

impl<B: Backend> MaskAtlas<B> {
    pub fn new(paths: BTreeMap<String, PathBuf>, source: Arc<dyn VolumeSource<B>>) -> Self {
        Self { paths, source }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.paths
            .get(name)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(name))
    }

    pub fn mask(&self, name: &str) -> Result<Image<B, 3>> {
        let path = self.path(name);
        self.source.load(&path).map_err(|e| match e {
            LociError::External(msg) if !self.paths.contains_key(name) => LociError::configuration(format!(
                "mask '{}' is neither a configured key nor a readable file: {}",
                name, msg
            )),
            other => other,
        })
    }

    pub fn load(&self, path: &Path) -> Result<Image<B, 3>> {
        self.source.load(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySource;
    use burn_ndarray::NdArray;
    use loci_core::image::ImageMetadata;

    type Backend = NdArray<f32>;

    #[test]
    fn test_key_and_path_resolution() {
        let device = Default::default();
        let mask = Image::<Backend, 3>::from_values(vec![1.0; 8], [2, 2, 2], &ImageMetadata::default(), &device).unwrap();
        let source = InMemorySource::new().with("nii/voi_ctx_2mm.nii", mask.clone()).with("/custom/voi.nii", mask);
        let atlas = MaskAtlas::new(default_mask_paths(), Arc::new(source));

        assert_eq!(atlas.mask(CENTILOID_VOI).unwrap().shape(), [2, 2, 2]);
        assert!(atlas.mask("/custom/voi.nii").is_ok());
        assert!(matches!(atlas.mask("unknown_region"), Err(LociError::Configuration(_))));
        assert!(matches!(atlas.mask(WHOLE_CEREBRAL), Err(LociError::External(_))));
    }
}
