//! Configuration module for loading model parameters.
//!
//! Parameters are plain serde data read from JSON. They convert into the
//! runtime [`crate::zone::ZoneConfig`] and [`crate::multizone::MultizoneConfig`],
//! which can then be refined with closures for time-dependent rate laws or
//! metallicity-dependent yields.

mod parameters;

pub use parameters::{
    MultizoneParameters, Parameters, RunParameters, StellarParameters, TableParameters, YieldParameters, ZoneParameters,
};
