//! Run metadata as JSON.

use std::path::Path;

use chrono::Local;
use serde::Serialize;

use crate::error::Result;
use crate::run::RunSummary;

/// Contents of `run.json`
#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata<'a> {
    /// Write timestamp (RFC 3339)
    pub written_at: String,
    /// Crate version that produced the output
    pub version: &'static str,
    pub dt_gyr: f64,
    pub elements: Vec<String>,
    pub zones: Vec<String>,
    pub summary: &'a RunSummary,
    /// Parameters the run was built from, when it came from a parameter file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

impl<'a> RunMetadata<'a> {
    pub fn new(
        dt_gyr: f64,
        elements: Vec<String>,
        zones: Vec<String>,
        summary: &'a RunSummary,
        parameters: Option<serde_json::Value>,
    ) -> Self {
        Self {
            written_at: Local::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION"),
            dt_gyr,
            elements,
            zones,
            summary,
            parameters,
        }
    }
}

/// Write `metadata` to `path`
pub fn write_run_json(path: &Path, metadata: &RunMetadata<'_>) -> Result<()> {
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, metadata)?;
    log::info!("run metadata written: {}", path.display());
    Ok(())
}
