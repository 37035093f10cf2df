//! Single-zone chemical evolution.
//!
//! A zone is a well-mixed gas reservoir with its own star formation,
//! outflows and enrichment. [`ZoneStepper`] advances it one tick at a time;
//! [`crate::singlezone`] and [`crate::multizone`] drive steppers to the end
//! of a run.

pub mod advisory;
pub mod config;
pub mod mdf;
pub mod state;
pub mod stepper;

pub use advisory::{AdvisoryKind, AdvisoryRecord, Advisories};
pub use config::{
    default_mdf_bins, ElementConfig, NumericsConfig, RateMode, Schedule, SchmidtLaw, TimeFn, TimeGrid,
    ZoneConfig,
};
pub use mdf::MetallicityDistribution;
pub use state::{scaled_metallicity, ZoneRates, ZoneSnapshot, ZoneState};
pub use stepper::{StepOutcome, ZoneDiagnostics, ZonePhase, ZoneStepper};
