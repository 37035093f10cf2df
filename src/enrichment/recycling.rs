//! Return of stellar mass to the interstellar medium.
//!
//! The continuous model follows a single stellar population: at age τ every
//! star heavier than the turnoff mass m_to(τ) has died and returned
//! `m - m_rem(m)` to the gas. The cumulative return fraction is
//!
//! ```text
//! CRF(τ)  = ∫_{m_to(τ)}^{m_u} (m - m_rem(m)) ξ(m) dm / ∫_{m_l}^{m_u} m ξ(m) dm
//! MSMF(τ) = ∫_{m_l}^{m_to(τ)} m ξ(m) dm           / ∫_{m_l}^{m_u} m ξ(m) dm
//! ```
//!
//! Both integrals are tabulated once on a log-spaced mass grid, together with
//! the lifetimes of the grid masses, so evaluating either at any age is a
//! binary search plus a linear interpolation.

use std::sync::Arc;

use super::imf::Imf;
use super::lifetimes::{remnant_mass, MassLifetime};
use crate::error::{GalchemError, Result};

/// Number of nodes in the mass grid
const MASS_GRID_POINTS: usize = 4000;

/// How stellar mass is returned to the gas
#[derive(Debug, Clone)]
pub enum RecyclingModel {
    /// A fixed fraction of each population is returned in the step it forms
    Instantaneous(f64),
    /// IMF-integrated return following the main-sequence turnoff
    Continuous,
}

impl Default for RecyclingModel {
    fn default() -> Self {
        RecyclingModel::Continuous
    }
}

impl RecyclingModel {
    pub fn validate(&self) -> Result<()> {
        if let RecyclingModel::Instantaneous(r) = *self {
            if !(0.0..1.0).contains(&r) {
                return Err(GalchemError::config(format!(
                    "instantaneous recycling fraction {} must lie in [0, 1)",
                    r
                )));
            }
        }
        Ok(())
    }
}

/// Physical ingredients of a simple stellar population
#[derive(Debug, Clone)]
pub struct StellarPhysics {
    pub imf: Imf,
    pub mass_lifetime: MassLifetime,
    /// Post-main-sequence lifetime as a fraction of the main-sequence lifetime
    pub post_ms_fraction: f64,
    pub m_lower_msun: f64,
    pub m_upper_msun: f64,
}

impl Default for StellarPhysics {
    fn default() -> Self {
        Self {
            imf: Imf::Kroupa,
            mass_lifetime: MassLifetime::default(),
            post_ms_fraction: 0.1,
            m_lower_msun: 0.08,
            m_upper_msun: 100.0,
        }
    }
}

/// Pre-tabulated lifetimes, CRF and MSMF for one [`StellarPhysics`]
#[derive(Debug, Clone)]
pub struct PopulationTables {
    ln_mass: Vec<f64>,
    /// ln of total lifetime (Gyr) at each grid mass, non-increasing
    ln_lifetime: Vec<f64>,
    /// Fraction of the population's mass in stars heavier than each grid mass
    mass_above: Vec<f64>,
    /// Fraction returned to the gas by stars heavier than each grid mass
    returned_above: Vec<f64>,
    m_lower_msun: f64,
    m_upper_msun: f64,
}

impl PopulationTables {
    pub fn build(physics: &StellarPhysics) -> Result<Arc<Self>> {
        let (ml, mu) = (physics.m_lower_msun, physics.m_upper_msun);
        if !(ml > 0.0 && mu > ml && mu.is_finite()) {
            return Err(GalchemError::config(format!(
                "IMF mass range [{}, {}] is invalid",
                ml, mu
            )));
        }
        if !(physics.post_ms_fraction >= 0.0 && physics.post_ms_fraction.is_finite()) {
            return Err(GalchemError::config("post-main-sequence fraction must be non-negative"));
        }

        let n = MASS_GRID_POINTS;
        let (ln_ml, ln_mu) = (ml.ln(), mu.ln());
        let step = (ln_mu - ln_ml) / (n - 1) as f64;
        let ln_mass: Vec<f64> = (0..n).map(|i| ln_ml + step * i as f64).collect();

        let mut ln_lifetime = Vec::with_capacity(n);
        let mut running_min = f64::INFINITY;
        for &lnm in &ln_mass {
            let t = physics
                .mass_lifetime
                .total_gyr(lnm.exp(), physics.post_ms_fraction);
            // Larson's quadratic turns over near 88 Msun; hold lifetimes flat there
            running_min = running_min.min(t);
            ln_lifetime.push(running_min.max(f64::MIN_POSITIVE).ln());
        }

        // Integrate from the top down in ln m: ∫ f(m) dm = ∫ f(m) m dln m
        let mass_weight = |lnm: f64| {
            let m = lnm.exp();
            m * m * physics.imf.dn_dm(m)
        };
        let return_weight = |lnm: f64| {
            let m = lnm.exp();
            (m - remnant_mass(m)).max(0.0) * m * physics.imf.dn_dm(m)
        };

        let mut mass_above = vec![0.0; n];
        let mut returned_above = vec![0.0; n];
        for i in (0..n - 1).rev() {
            let (a, b) = (ln_mass[i], ln_mass[i + 1]);
            mass_above[i] = mass_above[i + 1] + 0.5 * step * (mass_weight(a) + mass_weight(b));
            returned_above[i] =
                returned_above[i + 1] + 0.5 * step * (return_weight(a) + return_weight(b));
        }

        let total = mass_above[0];
        if !(total > 0.0 && total.is_finite()) {
            return Err(GalchemError::config("IMF integrates to zero mass over its range"));
        }
        for v in mass_above.iter_mut().chain(returned_above.iter_mut()) {
            *v /= total;
        }

        Ok(Arc::new(Self {
            ln_mass,
            ln_lifetime,
            mass_above,
            returned_above,
            m_lower_msun: ml,
            m_upper_msun: mu,
        }))
    }

    pub fn mass_range(&self) -> (f64, f64) {
        (self.m_lower_msun, self.m_upper_msun)
    }

    /// Mass of the stars leaving the main sequence at `age_gyr`.
    ///
    /// Clipped to the IMF range: young populations report the upper mass,
    /// populations older than the lightest star's lifetime report the lower.
    pub fn turnoff_mass(&self, age_gyr: f64) -> f64 {
        self.turnoff_position(age_gyr).0.exp()
    }

    /// Cumulative return fraction at `age_gyr`; 0 for non-positive ages
    pub fn crf(&self, age_gyr: f64) -> f64 {
        if age_gyr <= 0.0 {
            return 0.0;
        }
        let (_, i, t) = self.turnoff_position(age_gyr);
        interp(&self.returned_above, i, t)
    }

    /// Main-sequence mass fraction at `age_gyr`; 1 for non-positive ages
    pub fn msmf(&self, age_gyr: f64) -> f64 {
        if age_gyr <= 0.0 {
            return 1.0;
        }
        let (_, i, t) = self.turnoff_position(age_gyr);
        1.0 - interp(&self.mass_above, i, t)
    }

    /// (ln m_to, grid segment index, fractional position inside the segment)
    fn turnoff_position(&self, age_gyr: f64) -> (f64, usize, f64) {
        let n = self.ln_mass.len();
        if !(age_gyr > 0.0) {
            return (self.ln_mass[n - 1], n - 2, 1.0);
        }
        let ln_age = age_gyr.ln();
        if ln_age <= self.ln_lifetime[n - 1] {
            return (self.ln_mass[n - 1], n - 2, 1.0);
        }
        if ln_age >= self.ln_lifetime[0] {
            return (self.ln_mass[0], 0, 0.0);
        }
        // lifetimes are non-increasing: first index whose lifetime drops below age
        let upper = self.ln_lifetime.partition_point(|&lt| lt >= ln_age);
        let i = upper.saturating_sub(1).min(n - 2);
        let (t0, t1) = (self.ln_lifetime[i], self.ln_lifetime[i + 1]);
        let t = if t0 > t1 { (t0 - ln_age) / (t0 - t1) } else { 0.0 };
        let t = t.clamp(0.0, 1.0);
        let ln_m = (1.0 - t) * self.ln_mass[i] + t * self.ln_mass[i + 1];
        (ln_m, i, t)
    }
}

#[inline]
fn interp(values: &[f64], i: usize, t: f64) -> f64 {
    (1.0 - t) * values[i] + t * values[i + 1]
}
