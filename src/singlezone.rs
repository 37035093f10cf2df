//! Driver for a lone zone.

use crate::error::Result;
use crate::run::{CancelFlag, RunSummary};
use crate::yields::YieldTableProvider;
use crate::zone::{TimeGrid, ZoneConfig, ZoneStepper};

/// One zone whose stars return their gas to where they formed
pub struct SingleZone {
    stepper: ZoneStepper,
    cancel: CancelFlag,
}

impl SingleZone {
    pub fn new(config: ZoneConfig, grid: TimeGrid) -> Self {
        Self {
            stepper: ZoneStepper::new(config, grid),
            cancel: CancelFlag::new(),
        }
    }

    pub fn initialize(&mut self, provider: Option<&dyn YieldTableProvider>) -> Result<()> {
        self.stepper.initialize(provider)
    }

    /// Advance one tick and book the new stars' future returns
    pub fn step(&mut self) -> Result<()> {
        let outcome = self.stepper.step()?;
        self.stepper.post_own_cohort(&outcome);
        Ok(())
    }

    /// Step to the end (or until cancelled) and finalize
    pub fn run(&mut self) -> Result<RunSummary> {
        self.stepper.initialize(None)?;
        while !self.stepper.is_complete() {
            if self.cancel.is_cancelled() {
                log::warn!(
                    "zone '{}' cancelled at t = {:.4} Gyr",
                    self.stepper.name(),
                    self.stepper.state().time_gyr
                );
                break;
            }
            self.step()?;
        }
        Ok(self.finalize())
    }

    /// Freeze the zone at the current tick
    pub fn finalize(&mut self) -> RunSummary {
        self.stepper.finalize();
        let summary = self.summary();
        log::info!(
            "zone '{}' finished at t = {:.4} Gyr with {} advisories",
            self.stepper.name(),
            summary.end_time_gyr,
            summary.total_advisories()
        );
        summary
    }

    pub fn summary(&self) -> RunSummary {
        let grid = self.stepper.grid();
        RunSummary {
            name: self.stepper.name().to_string(),
            ticks_completed: self.stepper.state().tick,
            ticks_planned: grid.n_steps(),
            end_time_gyr: self.stepper.state().time_gyr,
            cancelled: !self.stepper.is_complete(),
            n_zones: 1,
            n_tracers: 0,
            advisories: vec![self.stepper.advisories().clone()],
        }
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn stepper(&self) -> &ZoneStepper {
        &self.stepper
    }
}
