//! Per-lag enrichment weights of a stellar cohort.
//!
//! A cohort formed during tick `k` contributes to tick `k + lag`. The kernel
//! holds, for every lag of the run, the fraction of the cohort's mass
//! returned to the gas, the fraction of its delayed events, the fraction
//! leaving the main sequence and the turnoff mass. Everything here depends on
//! `dt` and the stellar physics only, so it is computed once per zone before
//! the run starts.

use super::dtd::DelayTimeDistribution;
use super::recycling::{PopulationTables, RecyclingModel};
use crate::yields::{ResolvedYields, YieldPolicy};

/// A stellar population as seen by the enrichment channels
#[derive(Debug, Clone, Copy)]
pub struct Cohort<'a> {
    /// Stellar mass formed (Msun)
    pub mass_msun: f64,
    /// Total metallicity of the gas the stars formed from
    pub metallicity: f64,
    /// Mass fraction of each tracked element at formation
    pub abundances: &'a [f64],
}

/// Element masses (Msun) delivered by one cohort at one lag, by channel
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelYield {
    pub recycled: f64,
    pub delayed: f64,
    pub tabulated: f64,
}

impl ChannelYield {
    pub fn total(&self) -> f64 {
        self.recycled + self.delayed + self.tabulated
    }
}

/// Enrichment weights for every lag of a run
#[derive(Debug, Clone)]
pub struct EnrichmentKernel {
    dt_gyr: f64,
    /// Fraction of cohort mass returned to the gas during each lag
    returned: Vec<f64>,
    /// Fraction of delayed events during each lag
    delayed: Vec<f64>,
    /// Fraction of cohort mass leaving the main sequence during each lag
    departing: Vec<f64>,
    /// Turnoff mass (Msun) at the start of each lag
    turnoff_msun: Vec<f64>,
    /// `returned_before[lag]` = total returned fraction over lags `0..lag`
    returned_before: Vec<f64>,
    yields: Vec<ResolvedYields>,
    policy: YieldPolicy,
}

impl EnrichmentKernel {
    /// Tabulate weights for lags `0..n_lags` at step `dt_gyr`.
    pub fn build(
        n_lags: usize,
        dt_gyr: f64,
        recycling: &RecyclingModel,
        tables: &PopulationTables,
        dtd: &DelayTimeDistribution,
        yields: Vec<ResolvedYields>,
        policy: YieldPolicy,
    ) -> Self {
        let age = |lag: usize| lag as f64 * dt_gyr;

        let returned: Vec<f64> = (0..n_lags)
            .map(|lag| match *recycling {
                RecyclingModel::Instantaneous(r) => {
                    if lag == 0 {
                        r
                    } else {
                        0.0
                    }
                }
                RecyclingModel::Continuous => {
                    (tables.crf(age(lag + 1)) - tables.crf(age(lag))).max(0.0)
                }
            })
            .collect();

        // events of bins that start before the minimum delay are held back
        // to the first lag whose start reaches it
        let tolerance = 1e-9 * dt_gyr;
        let mut held = 0.0;
        let delayed = (0..n_lags)
            .map(|lag| {
                let fraction = dtd.fraction_between(age(lag), age(lag + 1));
                if age(lag) + tolerance < dtd.min_delay_gyr() {
                    held += fraction;
                    0.0
                } else {
                    let weight = fraction + held;
                    held = 0.0;
                    weight
                }
            })
            .collect();

        // populations in their formation tick have no AGB stars yet
        let departing = (0..n_lags)
            .map(|lag| {
                if lag == 0 {
                    0.0
                } else {
                    (tables.msmf(age(lag)) - tables.msmf(age(lag + 1))).max(0.0)
                }
            })
            .collect();

        let turnoff_msun = (0..n_lags).map(|lag| tables.turnoff_mass(age(lag))).collect();

        let returned_before = std::iter::once(0.0)
            .chain(returned.iter().scan(0.0, |acc, r| {
                *acc += r;
                Some(*acc)
            }))
            .collect();

        Self {
            dt_gyr,
            returned,
            delayed,
            departing,
            turnoff_msun,
            returned_before,
            yields,
            policy,
        }
    }

    pub fn dt_gyr(&self) -> f64 {
        self.dt_gyr
    }

    pub fn n_lags(&self) -> usize {
        self.returned.len()
    }

    pub fn n_elements(&self) -> usize {
        self.yields.len()
    }

    /// Fraction of a cohort's mass returned to the gas during `lag`
    #[inline]
    pub fn returned_fraction(&self, lag: usize) -> f64 {
        self.returned.get(lag).copied().unwrap_or(0.0)
    }

    /// Fraction of a cohort's delayed events occurring during `lag`
    #[inline]
    pub fn delayed_fraction(&self, lag: usize) -> f64 {
        self.delayed.get(lag).copied().unwrap_or(0.0)
    }

    /// Fraction of a cohort's mass still in stars once `lags` lags have
    /// returned their gas
    pub fn surviving_fraction(&self, lags: usize) -> f64 {
        let index = lags.min(self.returned_before.len() - 1);
        1.0 - self.returned_before[index]
    }

    #[inline]
    pub fn turnoff_mass(&self, lag: usize) -> f64 {
        self.turnoff_msun.get(lag).copied().unwrap_or(0.0)
    }

    pub fn yields(&self) -> &[ResolvedYields] {
        &self.yields
    }

    /// Delayed yield of each element for a cohort of this metallicity.
    /// Constant over the cohort's life, so callers compute it once per post.
    pub fn delayed_yields(&self, metallicity: f64, out: &mut Vec<f64>) {
        out.clear();
        out.extend(self.yields.iter().map(|y| {
            if y.delayed.is_zero() {
                0.0
            } else {
                y.delayed.at(metallicity)
            }
        }));
    }

    /// Gas mass returned by `cohort` during `lag`
    #[inline]
    pub fn returned_mass(&self, lag: usize, cohort: &Cohort<'_>) -> f64 {
        cohort.mass_msun * self.returned_fraction(lag)
    }

    /// Element masses delivered by `cohort` during `lag`.
    ///
    /// `delayed_yields` must come from [`Self::delayed_yields`] for the
    /// cohort's metallicity.
    pub fn element_yield(
        &self,
        lag: usize,
        element: usize,
        cohort: &Cohort<'_>,
        delayed_yields: &[f64],
    ) -> ChannelYield {
        if lag >= self.n_lags() {
            return ChannelYield::default();
        }
        let mass = cohort.mass_msun;
        let recycled = cohort.abundances[element] * mass * self.returned[lag];
        let delayed = delayed_yields[element] * mass * self.delayed[lag];

        let departing = self.departing[lag];
        let tabulated_yield = &self.yields[element].tabulated;
        let tabulated = if departing > 0.0 && !tabulated_yield.is_zero() {
            let m_to = self.turnoff_msun[lag];
            let y = self
                .policy
                .apply(m_to, tabulated_yield.at_mass(m_to, cohort.metallicity));
            y * mass * departing
        } else {
            0.0
        };

        ChannelYield {
            recycled,
            delayed,
            tabulated,
        }
    }
}
