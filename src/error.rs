//! Error types for model setup, integration and output.
//!
//! Configuration and I/O problems are fatal and surface before integration
//! starts. Numerical trouble inside a step is not an error: it is recovered
//! locally and reported through [`crate::zone::Advisories`].

use std::path::PathBuf;

use thiserror::Error;

/// Library error type
#[derive(Debug, Error)]
pub enum GalchemError {
    /// Invalid parameter value or inconsistent configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Unknown rate-law mode / IMF / DTD string
    #[error("unrecognized {kind} '{value}' (expected one of: {expected})")]
    UnknownOption {
        kind: &'static str,
        value: String,
        expected: &'static str,
    },

    /// Outgoing gas fractions of one zone add up to more than unity
    #[error("gas migration out of zone {zone} at step {step} sums to {total:.6}, which exceeds 1")]
    MigrationOverflow { zone: usize, step: usize, total: f64 },

    /// Gas mass had to be clipped at zero for too many consecutive steps
    #[error("zone '{zone}': gas mass went negative for {steps} consecutive steps ending at t = {time_gyr:.4} Gyr")]
    PersistentNegativeGas {
        zone: String,
        steps: usize,
        time_gyr: f64,
    },

    /// Stepping a zone that already reached its end time
    #[error("zone '{0}' is finalized and can no longer be stepped")]
    Finalized(String),

    /// Output already present and overwriting was not requested
    #[error("output {0} already exists (enable overwrite to replace it)")]
    OutputExists(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GalchemError {
    /// Shorthand for a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Library result type
pub type Result<T> = std::result::Result<T, GalchemError>;
