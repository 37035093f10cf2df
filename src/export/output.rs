//! Output directories that only appear once they are complete.
//!
//! Files are written under `<name>.incomplete/` and the directory is renamed
//! to `<name>/` after everything is flushed. A run that fails half-way
//! leaves at most an `.incomplete` directory behind.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use super::csv_export::{write_history, write_mdf, write_tracers};
use super::json_export::{write_run_json, RunMetadata};
use crate::error::{GalchemError, Result};
use crate::multizone::MultizoneCoordinator;
use crate::run::RunSummary;
use crate::singlezone::SingleZone;
use crate::zone::ZoneStepper;

/// Staging directory for one run's output
#[derive(Debug)]
pub struct OutputDir {
    target: PathBuf,
    staging: PathBuf,
    overwrite: bool,
}

impl OutputDir {
    /// Check the target and create the staging directory. Call this before
    /// integrating so an existing or unwritable target fails the run early.
    pub fn create(target: impl AsRef<Path>, overwrite: bool) -> Result<Self> {
        let target = target.as_ref().to_path_buf();
        if target.exists() && !overwrite {
            return Err(GalchemError::OutputExists(target));
        }
        let file_name = target
            .file_name()
            .ok_or_else(|| GalchemError::config(format!("output path {} has no name", target.display())))?;
        let mut staged: OsString = file_name.to_os_string();
        staged.push(".incomplete");
        let staging = target.with_file_name(staged);
        if staging.exists() {
            log::warn!("removing stale {}", staging.display());
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;
        Ok(Self {
            target,
            staging,
            overwrite,
        })
    }

    /// Directory files are currently written to
    pub fn path(&self) -> &Path {
        &self.staging
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Move the finished output into place
    pub fn commit(self) -> Result<PathBuf> {
        if self.target.exists() {
            if !self.overwrite {
                return Err(GalchemError::OutputExists(self.target));
            }
            fs::remove_dir_all(&self.target)?;
        }
        fs::rename(&self.staging, &self.target)?;
        log::info!("output written: {}", self.target.display());
        Ok(self.target)
    }
}

fn write_zone(dir: &Path, zone: &ZoneStepper) -> Result<()> {
    fs::create_dir_all(dir)?;
    write_history(&dir.join("history.out"), zone)?;
    write_mdf(&dir.join("mdf.out"), zone)?;
    Ok(())
}

/// Write `history.out`, `mdf.out` and `run.json` of a single-zone run into
/// `out`, which should be created before the run starts
pub fn write_singlezone(
    out: OutputDir,
    model: &SingleZone,
    summary: &RunSummary,
    parameters: Option<serde_json::Value>,
) -> Result<PathBuf> {
    let zone = model.stepper();
    write_zone(out.path(), zone)?;
    let metadata = RunMetadata::new(
        zone.grid().dt_gyr(),
        zone.config().symbols(),
        vec![zone.name().to_string()],
        summary,
        parameters,
    );
    write_run_json(&out.path().join("run.json"), &metadata)?;
    out.commit()
}

/// Write one directory per zone, `tracers.out` and `run.json` of a
/// multizone run into `out`
pub fn write_multizone(
    out: OutputDir,
    model: &MultizoneCoordinator,
    summary: &RunSummary,
    parameters: Option<serde_json::Value>,
) -> Result<PathBuf> {
    if model.is_poisoned() {
        return Err(GalchemError::Finalized(format!(
            "{} (a zone failed mid-step; its state is not written)",
            model.name()
        )));
    }
    for zone in model.zones() {
        write_zone(&out.path().join(zone.name()), zone)?;
    }
    write_tracers(&out.path().join("tracers.out"), model)?;
    let metadata = RunMetadata::new(
        model.grid().dt_gyr(),
        model
            .zones()
            .first()
            .map(|z| z.config().symbols())
            .unwrap_or_default(),
        model.zones().iter().map(|z| z.name().to_string()).collect(),
        summary,
        parameters,
    );
    write_run_json(&out.path().join("run.json"), &metadata)?;
    out.commit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_then_commit() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("model");
        let out = OutputDir::create(&target, false).unwrap();
        assert!(out.path().ends_with("model.incomplete"));
        assert!(out.path().is_dir());
        assert!(!target.exists());

        fs::write(out.path().join("x.out"), "1\n").unwrap();
        let done = out.commit().unwrap();
        assert_eq!(done, target);
        assert!(target.join("x.out").exists());
        assert!(!tmp.path().join("model.incomplete").exists());
    }

    #[test]
    fn test_existing_output_needs_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("model");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("old.out"), "old").unwrap();

        assert!(matches!(
            OutputDir::create(&target, false),
            Err(GalchemError::OutputExists(_))
        ));

        let out = OutputDir::create(&target, true).unwrap();
        out.commit().unwrap();
        assert!(!target.join("old.out").exists());
    }
}
