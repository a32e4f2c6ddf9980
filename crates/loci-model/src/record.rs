use std::path::Path;

use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::backend::Backend,
};
use loci_core::{LociError, Result};

/// Load trained weights from a named MessagePack record into `model`.
pub fn load_weights<B: Backend, M: Module<B>>(model: M, path: &Path, device: &B::Device) -> Result<M> {
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    tracing::info!(path = %path.display(), "loading model weights");
    model
        .load_file(path.to_path_buf(), &recorder, device)
        .map_err(|e| LociError::external(format!("failed to load weights from {}: {:?}", path.display(), e)))
}

/// Save `model` weights as a named MessagePack record.
pub fn save_weights<B: Backend, M: Module<B>>(model: M, path: &Path) -> Result<()> {
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    model
        .save_file(path.to_path_buf(), &recorder)
        .map_err(|e| LociError::external(format!("failed to save weights to {}: {:?}", path.display(), e)))
}
