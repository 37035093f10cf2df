//! Run control shared by the single-zone and multizone drivers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::zone::Advisories;

/// Cooperative cancellation, checked between ticks.
///
/// Clones share the flag, so one can be handed to another thread (or a
/// signal handler) while the run holds the other.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a completed or cancelled run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub name: String,
    pub ticks_completed: usize,
    pub ticks_planned: usize,
    pub end_time_gyr: f64,
    pub cancelled: bool,
    pub n_zones: usize,
    pub n_tracers: usize,
    pub advisories: Vec<Advisories>,
}

impl RunSummary {
    pub fn total_advisories(&self) -> u64 {
        self.advisories.iter().map(|a| a.total()).sum()
    }

    /// Print a formatted summary.
    pub fn print_summary(&self) {
        println!("=== Run '{}' ===", self.name);
        println!(
            "  Ticks:       {} / {}{}",
            self.ticks_completed,
            self.ticks_planned,
            if self.cancelled { " (cancelled)" } else { "" }
        );
        println!("  End time:    {:.4} Gyr", self.end_time_gyr);
        println!("  Zones:       {}", self.n_zones);
        if self.n_tracers > 0 {
            println!("  Tracers:     {}", self.n_tracers);
        }
        println!("  Advisories:  {}", self.total_advisories());
        for zone in self.advisories.iter().filter(|a| !a.is_empty()) {
            for (kind, record) in zone.iter() {
                println!(
                    "    {:>10}: {:>8} x {} (first at {:.3} Gyr)",
                    zone.zone(),
                    record.count,
                    kind,
                    record.first_time_gyr
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let handle = flag.clone();
        assert!(!flag.is_cancelled());
        handle.cancel();
        assert!(flag.is_cancelled());
    }
}
