//! Quantitative PET biomarkers.
//!
//! [`engine::MetricEngine`] turns a spatially normalized volume into SUVr,
//! Centiloid, CenTauR, CenTauRz and fill-states results using the calibration
//! tables in [`calibration`] and masks from a [`atlas::MaskAtlas`].
//! [`decouple`] wraps the AD-pattern decomposition models.

pub mod atlas;
pub mod calibration;
pub mod config;
pub mod decouple;
pub mod engine;
pub mod fill_states;
pub mod source;
pub mod suvr;

pub use atlas::MaskAtlas;
pub use calibration::{
    AmyloidTracer, CentaurTable, CentaurzTable, CentiloidTable, FillStatesTable, FillStatesTracer, LinearCalibration,
    PercentileCalibration, TauTracer,
};
pub use config::MetricsConfig;
pub use decouple::{AdniStyleRescaler, DecoupleAdapter, DecoupledResult, Modality};
pub use engine::{Metric, MetricEngine, MetricOutcome, MetricResult};
pub use fill_states::{FillStatesMask, NormativeTemplate};
pub use source::{InMemorySource, NiftiSource, VolumeSource};
pub use suvr::RoiDefinition;
