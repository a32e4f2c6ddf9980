//! Spatial normalization of PET volumes.
//!
//! A landmark network places the volume in a canonical rigid frame
//! ([`rigid`], [`iterative`]); a warp network then maps it onto the padded
//! template and the result is cropped to the atlas window ([`warp`]).
//! [`pipeline`] composes the stages.

pub mod config;
pub mod frame;
pub mod iterative;
pub mod pipeline;
pub mod preprocess;
pub mod rigid;
pub mod sink;
pub mod warp;

pub use config::{CropWindow, NormalizationConfig};
pub use frame::{CoordinateFrame, CoordinateFrameSolver, LandmarkTriplet};
pub use iterative::{ConvergenceState, IterationReport, IterativeOutcome, IterativeRigidController};
pub use pipeline::{NormalizationMode, NormalizationOrchestrator, NormalizationResult};
pub use preprocess::{LandmarkPreprocessor, WarpPreprocessor};
pub use rigid::{RigidAligner, RigidAlignment};
pub use sink::{ArtifactSink, NiftiArtifactSink, NullSink};
pub use warp::NonlinearWarper;
