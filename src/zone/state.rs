//! Zone state and the snapshots kept in its history.

use serde::Serialize;

/// Rates evaluated during one step (Msun/yr unless noted)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ZoneRates {
    pub infall: f64,
    pub sfr: f64,
    pub outflow: f64,
    /// Gas returned by stars, as a rate
    pub recycled: f64,
    pub eta: f64,
    pub tau_star_gyr: f64,
}

/// Live state of a zone at the current tick
#[derive(Debug, Clone, Default)]
pub struct ZoneState {
    pub tick: usize,
    pub time_gyr: f64,
    pub gas_msun: f64,
    /// Mass in living stars and remnants
    pub stars_msun: f64,
    /// Mass of each tracked element in the gas
    pub element_masses: Vec<f64>,
    /// Rates of the last completed step
    pub rates: ZoneRates,
}

impl ZoneState {
    pub fn new(n_elements: usize, gas_msun: f64) -> Self {
        Self {
            gas_msun,
            element_masses: vec![0.0; n_elements],
            ..Default::default()
        }
    }

    /// Mass fraction of element `i` in the gas; zero when there is no gas
    #[inline]
    pub fn abundance(&self, i: usize) -> f64 {
        if self.gas_msun > 0.0 {
            self.element_masses[i] / self.gas_msun
        } else {
            0.0
        }
    }

    /// Fill `out` with all element mass fractions
    pub fn abundances_into(&self, out: &mut Vec<f64>) {
        out.clear();
        out.extend((0..self.element_masses.len()).map(|i| self.abundance(i)));
    }

    pub fn snapshot(&self, metallicity: f64) -> ZoneSnapshot {
        ZoneSnapshot {
            time_gyr: self.time_gyr,
            gas_msun: self.gas_msun,
            stars_msun: self.stars_msun,
            rates: self.rates,
            element_masses: self.element_masses.clone(),
            metallicity,
        }
    }
}

/// Total metallicity scaled from the tracked elements:
/// Z = Z⊙ Σ Z_x / Σ Z_x,⊙
pub fn scaled_metallicity(abundances: &[f64], solar: &[f64], solar_z: f64) -> f64 {
    let tracked: f64 = abundances.iter().sum();
    let reference: f64 = solar.iter().sum();
    if reference > 0.0 {
        solar_z * tracked / reference
    } else {
        0.0
    }
}

/// Frozen state at an output time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneSnapshot {
    pub time_gyr: f64,
    pub gas_msun: f64,
    pub stars_msun: f64,
    pub rates: ZoneRates,
    pub element_masses: Vec<f64>,
    pub metallicity: f64,
}

impl ZoneSnapshot {
    pub fn abundance(&self, i: usize) -> f64 {
        if self.gas_msun > 0.0 {
            self.element_masses[i] / self.gas_msun
        } else {
            0.0
        }
    }

    /// Effective recycling parameter: returned gas over star formation
    pub fn r_eff(&self) -> f64 {
        if self.rates.sfr > 0.0 {
            self.rates.recycled / self.rates.sfr
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abundance_zero_without_gas() {
        let mut state = ZoneState::new(2, 0.0);
        state.element_masses[0] = 1.0;
        assert_eq!(state.abundance(0), 0.0);

        state.gas_msun = 100.0;
        assert_eq!(state.abundance(0), 0.01);
    }

    #[test]
    fn test_scaled_metallicity_is_solar_at_solar_abundances() {
        let solar = [1.29e-3, 5.72e-3];
        let z = scaled_metallicity(&solar, &solar, 0.014);
        assert!((z - 0.014).abs() < 1e-15);
        assert_eq!(scaled_metallicity(&[0.0, 0.0], &solar, 0.014), 0.0);
    }
}
