//! Neural collaborators for PET normalization and decomposition.
//!
//! The pipeline talks to networks through the traits in [`ports`]; this crate
//! also provides burn implementations and weight loading.

pub mod blocks;
pub mod decompose;
pub mod io;
pub mod landmark;
pub mod ports;
pub mod record;
pub mod sampling;
pub mod spatial_transform;
pub mod warp;

pub use decompose::{DecomposeNetwork, DecomposeNetworkConfig};
pub use landmark::{LandmarkNetwork, LandmarkNetworkConfig};
pub use ports::{
    Decomposition, DecompositionPredictor, LandmarkPrediction, LandmarkPredictor, WarpInputs, WarpPredictor,
};
pub use record::{load_weights, save_weights};
pub use spatial_transform::SpatialTransformer;
pub use warp::{WarpNetwork, WarpNetworkConfig, WarpOutput};
