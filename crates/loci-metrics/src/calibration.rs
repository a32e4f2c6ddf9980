//! Tracer calibration tables.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use loci_core::{LociError, Result};
use serde::{Deserialize, Serialize};

use crate::atlas::{CENTAUR_REF, WHOLE_CEREBRAL};

macro_rules! tracer_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal { $($variant:ident => $label:literal, $key:literal $(| $alias:literal)*;)+ }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            /// Display label, e.g. `FBP`.
            pub fn label(&self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }

            /// Lower-case configuration key, e.g. `fbp`.
            pub fn key(&self) -> &'static str {
                match self {
                    $($name::$variant => $key,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = LociError;

            fn from_str(s: &str) -> Result<Self> {
                match s.to_ascii_lowercase().as_str() {
                    $($key $(| $alias)* => Ok($name::$variant),)+
                    other => Err(LociError::domain(format!("unsupported {} tracer '{}'", $kind, other))),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = LociError;

            fn try_from(s: String) -> Result<Self> {
                s.parse()
            }
        }

        impl From<$name> for String {
            fn from(t: $name) -> String {
                t.key().to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

tracer_enum! {
    /// Amyloid tracers with a Centiloid calibration.
    AmyloidTracer, "amyloid" {
        Pib => "PiB", "pib";
        Fbp => "FBP", "fbp";
        Fbb => "FBB", "fbb";
        Fmm => "FMM", "fmm";
        Nav => "NAV", "nav";
    }
}

tracer_enum! {
    /// Tau tracers with CenTauR / CenTauRz calibrations.
    TauTracer, "tau" {
        Ftp => "FTP", "ftp";
        Gtp1 => "GTP1", "gtp1";
        Mk6240 => "MK6240", "mk6240";
        Pi2620 => "PI2620", "pi2620";
        Ro948 => "RO948", "ro948";
        PmPbb3 => "PM-PBB3", "pm-pbb3" | "pm_pbb3" | "pmpbb3";
    }
}

tracer_enum! {
    /// Tracers with a fill-states normative template.
    FillStatesTracer, "fill-states" {
        Fbp => "FBP", "fbp";
        Fdg => "FDG", "fdg";
        Ftp => "FTP", "ftp";
    }
}

/// Which tail of the z-score distribution counts as abnormal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abnormality {
    /// Elevated uptake (amyloid, tau).
    High,
    /// Reduced uptake (hypometabolism).
    Low,
}

impl FillStatesTracer {
    pub fn abnormality(&self) -> Abnormality {
        match self {
            FillStatesTracer::Fdg => Abnormality::Low,
            FillStatesTracer::Fbp | FillStatesTracer::Ftp => Abnormality::High,
        }
    }

    /// Mask used to normalize intensities when none is configured.
    pub fn default_reference_mask(&self) -> &'static str {
        match self {
            FillStatesTracer::Fbp | FillStatesTracer::Fdg => WHOLE_CEREBRAL,
            FillStatesTracer::Ftp => CENTAUR_REF,
        }
    }
}

/// `value = slope · ratio + intercept`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearCalibration {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearCalibration {
    pub const fn new(slope: f64, intercept: f64) -> Self {
        Self { slope, intercept }
    }

    pub fn apply(&self, ratio: f64) -> f64 {
        self.slope * ratio + self.intercept
    }

    fn validate(&self, what: &str) -> Result<()> {
        if self.slope.is_finite() && self.intercept.is_finite() {
            Ok(())
        } else {
            Err(LociError::configuration(format!("{}: slope and intercept must be finite", what)))
        }
    }
}

/// `value = (ratio − baseline) / (max − baseline) · 100`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileCalibration {
    pub baseline: f64,
    pub max: f64,
}

impl PercentileCalibration {
    pub const fn new(baseline: f64, max: f64) -> Self {
        Self { baseline, max }
    }

    pub fn apply(&self, ratio: f64) -> f64 {
        (ratio - self.baseline) / (self.max - self.baseline) * 100.0
    }

    fn validate(&self, what: &str) -> Result<()> {
        if self.baseline.is_finite() && self.max.is_finite() && self.max != self.baseline {
            Ok(())
        } else {
            Err(LociError::configuration(format!(
                "{}: baseline {} and max {} must be finite and distinct",
                what, self.baseline, self.max
            )))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CentiloidTable {
    pub tracers: BTreeMap<AmyloidTracer, LinearCalibration>,
}

impl Default for CentiloidTable {
    fn default() -> Self {
        use AmyloidTracer::*;
        Self {
            tracers: BTreeMap::from([
                (Pib, LinearCalibration::new(93.7, -94.6)),
                (Fbp, LinearCalibration::new(175.4, -182.3)),
                (Fbb, LinearCalibration::new(153.4, -154.9)),
                (Fmm, LinearCalibration::new(121.4, -121.2)),
                (Nav, LinearCalibration::new(85.2, -87.6)),
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CentaurTable {
    pub tracers: BTreeMap<TauTracer, PercentileCalibration>,
}

impl Default for CentaurTable {
    fn default() -> Self {
        use TauTracer::*;
        Self {
            tracers: BTreeMap::from([
                (Ftp, PercentileCalibration::new(1.06, 2.13)),
                (Gtp1, PercentileCalibration::new(1.08, 1.69)),
                (Mk6240, PercentileCalibration::new(0.93, 3.30)),
                (Pi2620, PercentileCalibration::new(1.17, 2.12)),
                (Ro948, PercentileCalibration::new(1.03, 2.40)),
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CentaurzTable {
    pub tracers: BTreeMap<TauTracer, LinearCalibration>,
}

impl Default for CentaurzTable {
    fn default() -> Self {
        use TauTracer::*;
        Self {
            tracers: BTreeMap::from([
                (Ftp, LinearCalibration::new(13.63, -15.85)),
                (Gtp1, LinearCalibration::new(10.67, -11.92)),
                (Mk6240, LinearCalibration::new(10.08, -10.06)),
                (Pi2620, LinearCalibration::new(8.45, -9.61)),
                (Ro948, LinearCalibration::new(13.05, -15.57)),
                (PmPbb3, LinearCalibration::new(16.73, -15.34)),
            ]),
        }
    }
}

/// Normative template volumes of one fill-states tracer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillStatesResources {
    pub mean: PathBuf,
    pub std: PathBuf,
    pub roi: PathBuf,
    /// Atlas key or path of the intensity reference region; the tracer
    /// default applies when absent.
    #[serde(default)]
    pub reference_mask: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillStatesTable {
    pub tracers: BTreeMap<FillStatesTracer, FillStatesResources>,
}

impl FillStatesTable {
    pub fn resources(&self, tracer: FillStatesTracer) -> Result<&FillStatesResources> {
        self.tracers.get(&tracer).ok_or_else(|| {
            LociError::configuration(format!(
                "missing fill-states configuration for tracer '{}'; set fill_states.tracers.{}.mean/std/roi",
                tracer.key(),
                tracer.key()
            ))
        })
    }
}

pub(crate) fn validate_linear<K: fmt::Display>(table: &str, tracers: &BTreeMap<K, LinearCalibration>) -> Result<()> {
    tracers
        .iter()
        .try_for_each(|(tracer, c)| c.validate(&format!("{}.tracers.{}", table, tracer)))
}

impl CentiloidTable {
    pub fn validate(&self) -> Result<()> {
        validate_linear("centiloid", &self.tracers)
    }
}

impl CentaurTable {
    pub fn validate(&self) -> Result<()> {
        self.tracers
            .iter()
            .try_for_each(|(tracer, c)| c.validate(&format!("centaur.tracers.{}", tracer)))
    }
}

impl CentaurzTable {
    pub fn validate(&self) -> Result<()> {
        validate_linear("centaurz", &self.tracers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centiloid_linear_formula() {
        let table = CentiloidTable::default();
        let fbp = table.tracers[&AmyloidTracer::Fbp];
        assert!((fbp.apply(1.5) - 80.8).abs() < 1e-9);
        let pib = table.tracers[&AmyloidTracer::Pib];
        assert!((pib.apply(1.0) - (93.7 - 94.6)).abs() < 1e-9);
    }

    #[test]
    fn test_centaur_percentile_formula() {
        let ftp = CentaurTable::default().tracers[&TauTracer::Ftp];
        assert!(ftp.apply(1.06).abs() < 1e-9);
        assert!((ftp.apply(2.13) - 100.0).abs() < 1e-9);
        assert!((ftp.apply(1.595) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_centaurz_covers_extra_tracer() {
        assert!(!CentaurTable::default().tracers.contains_key(&TauTracer::PmPbb3));
        let pbb3 = CentaurzTable::default().tracers[&TauTracer::PmPbb3];
        assert!((pbb3.apply(2.0) - (16.73 * 2.0 - 15.34)).abs() < 1e-9);
    }

    #[test]
    fn test_tracer_parsing() {
        assert_eq!("FBP".parse::<AmyloidTracer>().unwrap(), AmyloidTracer::Fbp);
        assert_eq!("PM_PBB3".parse::<TauTracer>().unwrap(), TauTracer::PmPbb3);
        assert_eq!("fdg".parse::<FillStatesTracer>().unwrap(), FillStatesTracer::Fdg);
        assert!(matches!("xyz".parse::<FillStatesTracer>(), Err(LociError::Domain(_))));
        assert_eq!(TauTracer::PmPbb3.label(), "PM-PBB3");
    }

    #[test]
    fn test_fill_states_policy() {
        assert_eq!(FillStatesTracer::Fdg.abnormality(), Abnormality::Low);
        assert_eq!(FillStatesTracer::Ftp.abnormality(), Abnormality::High);
        assert_eq!(FillStatesTracer::Fbp.default_reference_mask(), WHOLE_CEREBRAL);
        assert_eq!(FillStatesTracer::Ftp.default_reference_mask(), CENTAUR_REF);
    }

    #[test]
    fn test_missing_fill_states_entry() {
        let table = FillStatesTable::default();
        assert!(matches!(
            table.resources(FillStatesTracer::Fbp),
            Err(LociError::Configuration(_))
        ));
    }

    #[test]
    fn test_degenerate_percentile_rejected() {
        let mut table = CentaurTable::default();
        table.tracers.insert(TauTracer::Ftp, PercentileCalibration::new(1.0, 1.0));
        assert!(matches!(table.validate(), Err(LociError::Configuration(_))));
        assert!(CentaurTable::default().validate().is_ok());
    }

    #[test]
    fn test_table_from_toml() {
        let table: CentiloidTable = toml::from_str(
            r#"
            [tracers.fbp]
            slope = 170.0
            intercept = -180.0
            "#,
        )
        .unwrap();
        assert_eq!(table.tracers.len(), 1);
        assert_eq!(table.tracers[&AmyloidTracer::Fbp], LinearCalibration::new(170.0, -180.0));

        let unknown: std::result::Result<CentiloidTable, _> = toml::from_str("[tracers.xyz]\nslope = 1.0\nintercept = 0.0\n");
        assert!(unknown.is_err());
    }
}
