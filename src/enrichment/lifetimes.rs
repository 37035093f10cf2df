//! Stellar lifetimes and remnant masses.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GalchemError;

/// Main-sequence mass–lifetime relation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MassLifetime {
    /// t_MS = coefficient · m^(-exponent)
    PowerLaw { coefficient_gyr: f64, exponent: f64 },
    /// Larson (1974): log10(t / yr) = 10 - 3.42 log10 m + 0.88 (log10 m)^2
    Larson1974,
}

impl Default for MassLifetime {
    fn default() -> Self {
        MassLifetime::PowerLaw {
            coefficient_gyr: 10.0,
            exponent: 3.5,
        }
    }
}

impl MassLifetime {
    /// Main-sequence lifetime (Gyr) of a star of mass `m` (Msun)
    pub fn main_sequence_gyr(&self, m: f64) -> f64 {
        match *self {
            MassLifetime::PowerLaw {
                coefficient_gyr,
                exponent,
            } => coefficient_gyr * m.powf(-exponent),
            MassLifetime::Larson1974 => {
                let lm = m.log10();
                10f64.powf(1.0 - 3.42 * lm + 0.88 * lm * lm)
            }
        }
    }

    /// Total lifetime including the post-main-sequence phase
    pub fn total_gyr(&self, m: f64, post_ms_fraction: f64) -> f64 {
        (1.0 + post_ms_fraction) * self.main_sequence_gyr(m)
    }
}

impl FromStr for MassLifetime {
    type Err = GalchemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "powerlaw" | "power_law" => Ok(MassLifetime::default()),
            "larson1974" | "larson" => Ok(MassLifetime::Larson1974),
            _ => Err(GalchemError::UnknownOption {
                kind: "mass-lifetime relation",
                value: s.to_string(),
                expected: "powerlaw, larson1974",
            }),
        }
    }
}

/// Remnant mass (Msun) left by a star of initial mass `m`.
///
/// Kalirai et al. (2008) initial–final relation for white dwarfs below
/// 8 Msun; a Chandrasekhar-mass remnant above.
pub fn remnant_mass(m: f64) -> f64 {
    if m < 8.0 {
        0.394 + 0.109 * m
    } else {
        1.44
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sun_lives_ten_gyr() {
        let mlr = MassLifetime::default();
        assert!((mlr.main_sequence_gyr(1.0) - 10.0).abs() < 1e-12);
        assert!((MassLifetime::Larson1974.main_sequence_gyr(1.0) - 10.0).abs() < 1e-9);
        assert!((mlr.total_gyr(1.0, 0.1) - 11.0).abs() < 1e-12);
    }

    #[test]
    fn test_lifetime_decreases_with_mass() {
        for mlr in [MassLifetime::default(), MassLifetime::Larson1974] {
            assert!(mlr.main_sequence_gyr(2.0) < mlr.main_sequence_gyr(1.0));
            assert!(mlr.main_sequence_gyr(8.0) < mlr.main_sequence_gyr(2.0));
        }
    }

    #[test]
    fn test_remnant_below_initial_mass_for_massive_stars() {
        assert!((remnant_mass(1.0) - 0.503).abs() < 1e-12);
        assert_eq!(remnant_mass(20.0), 1.44);
    }
}
