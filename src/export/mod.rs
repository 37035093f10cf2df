//! Writing run output to disk.
//!
//! Provides tab-separated history, MDF and tracer tables, the `run.json`
//! metadata file, and the staging directory that makes output appear only
//! when a run completes.

mod csv_export;
mod json_export;
mod output;

pub use csv_export::{history_columns, write_history, write_mdf, write_tracers, TableWriter};
pub use json_export::{write_run_json, RunMetadata};
pub use output::{write_multizone, write_singlezone, OutputDir};
