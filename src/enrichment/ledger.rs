//! IOU ledger of future enrichment.
//!
//! Summing every earlier cohort against the kernel at every tick costs
//! O(N) per tick. Instead, when a cohort is posted its contribution to each
//! later tick is written once into that tick's accumulator, and a tick reads
//! only its own slot. Posting with `sign = -1` withdraws a cohort's remaining
//! contributions, which is how a migrating tracer takes its future returns
//! to another zone.

use super::kernel::{Cohort, EnrichmentKernel};

/// Amounts due to a zone at one tick
#[derive(Debug, Clone, Copy)]
pub struct LedgerEntry<'a> {
    /// Gas mass returned by stars (Msun)
    pub returned_gas_msun: f64,
    /// Element masses from recycled stellar envelopes, per element
    pub recycled: &'a [f64],
    /// Element masses from the delayed channel, per element
    pub delayed: &'a [f64],
    /// Element masses from the tabulated channel, per element
    pub tabulated: &'a [f64],
}

/// Per-tick accumulators for one zone
#[derive(Debug, Clone)]
pub struct Ledger {
    n_ticks: usize,
    n_elements: usize,
    gas: Vec<f64>,
    recycled: Vec<f64>,
    delayed: Vec<f64>,
    tabulated: Vec<f64>,
    /// scratch for per-cohort delayed yields
    delayed_yields: Vec<f64>,
}

impl Ledger {
    pub fn new(n_ticks: usize, n_elements: usize) -> Self {
        let slots = n_ticks * n_elements;
        Self {
            n_ticks,
            n_elements,
            gas: vec![0.0; n_ticks],
            recycled: vec![0.0; slots],
            delayed: vec![0.0; slots],
            tabulated: vec![0.0; slots],
            delayed_yields: Vec::with_capacity(n_elements),
        }
    }

    pub fn n_ticks(&self) -> usize {
        self.n_ticks
    }

    /// Post `sign` × the contributions of a cohort formed at
    /// `formation_tick`, for every lag from `first_lag` up to the end of the
    /// run.
    pub fn post(
        &mut self,
        kernel: &EnrichmentKernel,
        cohort: &Cohort<'_>,
        formation_tick: usize,
        first_lag: usize,
        sign: f64,
    ) {
        debug_assert_eq!(kernel.n_elements(), self.n_elements);
        if cohort.mass_msun == 0.0 {
            return;
        }
        let mut delayed_yields = std::mem::take(&mut self.delayed_yields);
        kernel.delayed_yields(cohort.metallicity, &mut delayed_yields);

        let first_tick = formation_tick + first_lag;
        for tick in first_tick..self.n_ticks {
            let lag = tick - formation_tick;
            if lag >= kernel.n_lags() {
                break;
            }
            self.gas[tick] += sign * kernel.returned_mass(lag, cohort);
            let base = tick * self.n_elements;
            for e in 0..self.n_elements {
                let y = kernel.element_yield(lag, e, cohort, &delayed_yields);
                self.recycled[base + e] += sign * y.recycled;
                self.delayed[base + e] += sign * y.delayed;
                self.tabulated[base + e] += sign * y.tabulated;
            }
        }
        self.delayed_yields = delayed_yields;
    }

    /// Everything due at `tick`; zeros past the end of the run
    pub fn due(&self, tick: usize) -> Option<LedgerEntry<'_>> {
        if tick >= self.n_ticks {
            return None;
        }
        let range = tick * self.n_elements..(tick + 1) * self.n_elements;
        Some(LedgerEntry {
            returned_gas_msun: self.gas[tick],
            recycled: &self.recycled[range.clone()],
            delayed: &self.delayed[range.clone()],
            tabulated: &self.tabulated[range],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::{DelayTimeDistribution, DtdShape, PopulationTables, RecyclingModel, StellarPhysics};
    use crate::yields::{ElementYields, YieldPolicy};

    fn kernel() -> EnrichmentKernel {
        let tables = PopulationTables::build(&StellarPhysics::default()).unwrap();
        let dtd = DelayTimeDistribution::new(DtdShape::default(), 0.15).unwrap();
        let yields = vec![ElementYields::new(0.0012, 0.0017).resolve(None).unwrap()];
        EnrichmentKernel::build(
            300,
            0.01,
            &RecyclingModel::Continuous,
            &tables,
            &dtd,
            yields,
            YieldPolicy::default(),
        )
    }

    #[test]
    fn test_post_then_withdraw_cancels() {
        let kernel = kernel();
        let mut ledger = Ledger::new(300, 1);
        let abundances = [1e-3];
        let cohort = Cohort {
            mass_msun: 1e8,
            metallicity: 0.01,
            abundances: &abundances,
        };
        ledger.post(&kernel, &cohort, 10, 1, 1.0);
        let due = ledger.due(100).unwrap();
        assert!(due.returned_gas_msun > 0.0);
        assert!(due.delayed[0] > 0.0);

        ledger.post(&kernel, &cohort, 10, 50, -1.0);
        // before the withdrawal point the cohort is still booked
        assert!(ledger.due(40).unwrap().returned_gas_msun > 0.0);
        let due = ledger.due(100).unwrap();
        assert!(due.returned_gas_msun.abs() < 1e-6);
        assert!(due.delayed[0].abs() < 1e-12);
    }

    #[test]
    fn test_ledger_matches_direct_convolution() {
        let kernel = kernel();
        let mut ledger = Ledger::new(300, 1);
        let abundances = [2e-3];
        let masses = [1e7, 3e7, 2e7, 5e7];
        for (k, &m) in masses.iter().enumerate() {
            let cohort = Cohort {
                mass_msun: m,
                metallicity: 0.01,
                abundances: &abundances,
            };
            ledger.post(&kernel, &cohort, k, 1, 1.0);
        }

        let tick = 120;
        let mut delayed_yields = Vec::new();
        kernel.delayed_yields(0.01, &mut delayed_yields);
        let direct: f64 = masses
            .iter()
            .enumerate()
            .map(|(k, &m)| {
                let cohort = Cohort {
                    mass_msun: m,
                    metallicity: 0.01,
                    abundances: &abundances,
                };
                kernel.element_yield(tick - k, 0, &cohort, &delayed_yields).delayed
            })
            .sum();
        let booked = ledger.due(tick).unwrap().delayed[0];
        assert!((booked - direct).abs() <= 1e-12 * direct.abs());
    }

    #[test]
    fn test_past_end_is_none() {
        let ledger = Ledger::new(10, 2);
        assert!(ledger.due(10).is_none());
        assert_eq!(ledger.due(9).unwrap().recycled.len(), 2);
    }
}
