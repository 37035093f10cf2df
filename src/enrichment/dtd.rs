//! Delay-time distributions for delayed (Type Ia-like) enrichment.
//!
//! A DTD is the event rate R(τ) of a single stellar population of age τ. The
//! rate is zero before the minimum delay and after a fixed evaluation horizon,
//! and is normalized so that ∫ R dτ over [delay, horizon] = 1. The
//! normalization constant is computed once, in the constructor, analytically
//! where a closed form exists and with composite Simpson quadrature otherwise.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{GalchemError, Result};

/// Ages beyond this horizon (Gyr) contribute nothing
pub const DTD_HORIZON_GYR: f64 = 15.0;

/// Subintervals for numerical normalization of custom shapes
const NORMALIZATION_INTERVALS: usize = 20_000;

/// Unnormalized DTD shape
#[derive(Clone)]
pub enum DtdShape {
    /// R ∝ τ^slope
    PowerLaw { slope: f64 },
    /// R ∝ exp(-τ / timescale)
    Exponential { timescale_gyr: f64 },
    /// User-supplied R(τ); negative values count as zero
    Custom(Arc<dyn Fn(f64) -> f64 + Send + Sync>),
}

impl Default for DtdShape {
    fn default() -> Self {
        DtdShape::PowerLaw { slope: -1.1 }
    }
}

impl fmt::Debug for DtdShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DtdShape::PowerLaw { slope } => write!(f, "PowerLaw({})", slope),
            DtdShape::Exponential { timescale_gyr } => write!(f, "Exponential({} Gyr)", timescale_gyr),
            DtdShape::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

impl FromStr for DtdShape {
    type Err = GalchemError;

    /// `"plaw"` (slope -1.1) or `"exp"` (1.5 Gyr e-folding)
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plaw" | "powerlaw" => Ok(DtdShape::PowerLaw { slope: -1.1 }),
            "exp" | "exponential" => Ok(DtdShape::Exponential { timescale_gyr: 1.5 }),
            _ => Err(GalchemError::UnknownOption {
                kind: "delay-time distribution",
                value: s.to_string(),
                expected: "plaw, exp",
            }),
        }
    }
}

impl DtdShape {
    fn raw(&self, age_gyr: f64) -> f64 {
        let value = match self {
            DtdShape::PowerLaw { slope } => age_gyr.powf(*slope),
            DtdShape::Exponential { timescale_gyr } => (-age_gyr / timescale_gyr).exp(),
            DtdShape::Custom(f) => f(age_gyr),
        };
        if value.is_finite() {
            value.max(0.0)
        } else {
            0.0
        }
    }

    /// ∫_a^b raw(τ) dτ for a ≤ b inside the support
    fn raw_integral(&self, a: f64, b: f64) -> f64 {
        match *self {
            DtdShape::PowerLaw { slope } => {
                if (slope + 1.0).abs() < 1e-12 {
                    (b / a).ln()
                } else {
                    let p = slope + 1.0;
                    (b.powf(p) - a.powf(p)) / p
                }
            }
            DtdShape::Exponential { timescale_gyr } => {
                timescale_gyr * ((-a / timescale_gyr).exp() - (-b / timescale_gyr).exp())
            }
            DtdShape::Custom(_) => {
                // interval count proportional to width, even, at least 2
                let share = (b - a) / DTD_HORIZON_GYR;
                let n = ((share * NORMALIZATION_INTERVALS as f64).ceil() as usize).max(2);
                simpson(|x| self.raw(x), a, b, n + n % 2)
            }
        }
    }
}

/// Normalized delay-time distribution
#[derive(Debug, Clone)]
pub struct DelayTimeDistribution {
    shape: DtdShape,
    min_delay_gyr: f64,
    horizon_gyr: f64,
    /// 1 / ∫ raw over [delay, horizon]
    normalization: f64,
}

impl DelayTimeDistribution {
    pub fn new(shape: DtdShape, min_delay_gyr: f64) -> Result<Self> {
        Self::with_horizon(shape, min_delay_gyr, DTD_HORIZON_GYR)
    }

    pub fn with_horizon(shape: DtdShape, min_delay_gyr: f64, horizon_gyr: f64) -> Result<Self> {
        if !(min_delay_gyr >= 0.0 && min_delay_gyr.is_finite()) {
            return Err(GalchemError::config(format!(
                "minimum delay {} Gyr must be non-negative",
                min_delay_gyr
            )));
        }
        if !(horizon_gyr > min_delay_gyr && horizon_gyr.is_finite()) {
            return Err(GalchemError::config(format!(
                "DTD horizon {} Gyr must exceed the minimum delay",
                horizon_gyr
            )));
        }
        match shape {
            DtdShape::PowerLaw { slope } if min_delay_gyr == 0.0 && slope <= -1.0 => {
                return Err(GalchemError::config(
                    "a power-law DTD with slope <= -1 needs a positive minimum delay",
                ));
            }
            DtdShape::Exponential { timescale_gyr } if !(timescale_gyr > 0.0) => {
                return Err(GalchemError::config("exponential DTD timescale must be positive"));
            }
            _ => {}
        }

        let integral = shape.raw_integral(min_delay_gyr, horizon_gyr);
        if !(integral > 0.0 && integral.is_finite()) {
            return Err(GalchemError::config(format!(
                "DTD cannot be normalized (integral {})",
                integral
            )));
        }

        Ok(Self {
            shape,
            min_delay_gyr,
            horizon_gyr,
            normalization: 1.0 / integral,
        })
    }

    /// Same shape with a different minimum delay, renormalized
    pub fn with_min_delay(&self, min_delay_gyr: f64) -> Result<Self> {
        Self::with_horizon(self.shape.clone(), min_delay_gyr, self.horizon_gyr)
    }

    pub fn min_delay_gyr(&self) -> f64 {
        self.min_delay_gyr
    }

    pub fn horizon_gyr(&self) -> f64 {
        self.horizon_gyr
    }

    /// Normalized rate (per Gyr) at `age_gyr`
    pub fn rate(&self, age_gyr: f64) -> f64 {
        if age_gyr < self.min_delay_gyr || age_gyr > self.horizon_gyr {
            return 0.0;
        }
        self.normalization * self.shape.raw(age_gyr)
    }

    /// Fraction of all events that occur between ages `a` and `b`.
    ///
    /// Intervals that overlap the support by less than `1e-9` of their width
    /// count as empty, so a bin ending on the minimum delay stays exactly zero
    /// despite rounding in `k * dt`.
    pub fn fraction_between(&self, a: f64, b: f64) -> f64 {
        let lo = a.max(self.min_delay_gyr);
        let hi = b.min(self.horizon_gyr);
        if hi - lo <= 1e-9 * (b - a).abs() || hi <= lo {
            return 0.0;
        }
        (self.normalization * self.shape.raw_integral(lo, hi)).max(0.0)
    }
}

/// Composite Simpson rule with `n` (even) subintervals
pub(crate) fn simpson<F: Fn(f64) -> f64>(f: F, a: f64, b: f64, n: usize) -> f64 {
    let h = (b - a) / n as f64;
    let mut sum = f(a) + f(b);
    for i in 1..n {
        let x = a + h * i as f64;
        sum += if i % 2 == 1 { 4.0 * f(x) } else { 2.0 * f(x) };
    }
    sum * h / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_normalized(dtd: &DelayTimeDistribution) {
        let integral = simpson(
            |t| dtd.rate(t),
            dtd.min_delay_gyr(),
            dtd.horizon_gyr(),
            200_000,
        );
        assert!((integral - 1.0).abs() < 1e-3, "integral = {}", integral);
    }

    #[test]
    fn test_builtin_shapes_normalize() {
        check_normalized(&DelayTimeDistribution::new(DtdShape::default(), 0.15).unwrap());
        check_normalized(
            &DelayTimeDistribution::new(DtdShape::Exponential { timescale_gyr: 1.5 }, 0.15).unwrap(),
        );
        check_normalized(&DelayTimeDistribution::new(DtdShape::PowerLaw { slope: -1.0 }, 0.1).unwrap());
    }

    #[test]
    fn test_custom_shape_normalizes() {
        let dtd = DelayTimeDistribution::new(
            DtdShape::Custom(Arc::new(|t: f64| (-(t - 1.0).powi(2)).exp())),
            0.05,
        )
        .unwrap();
        check_normalized(&dtd);
    }

    #[test]
    fn test_zero_before_delay() {
        let dtd = DelayTimeDistribution::new(DtdShape::default(), 0.15).unwrap();
        assert_eq!(dtd.rate(0.149), 0.0);
        assert!(dtd.rate(0.15) > 0.0);
        assert_eq!(dtd.fraction_between(0.14, 0.15), 0.0);
        assert_eq!(dtd.fraction_between(14.0 * 0.01, 15.0 * 0.01), 0.0);
        assert!(dtd.fraction_between(0.15, 0.16) > 0.0);
    }

    #[test]
    fn test_fractions_sum_to_one() {
        let dtd = DelayTimeDistribution::new(DtdShape::default(), 0.15).unwrap();
        let dt = 0.01;
        let total: f64 = (0..2000)
            .map(|k| dtd.fraction_between(k as f64 * dt, (k + 1) as f64 * dt))
            .sum();
        assert!((total - 1.0).abs() < 1e-9, "total = {}", total);
    }

    #[test]
    fn test_invalid_configurations() {
        assert!(DelayTimeDistribution::new(DtdShape::PowerLaw { slope: -1.1 }, 0.0).is_err());
        assert!(DelayTimeDistribution::new(DtdShape::Exponential { timescale_gyr: 0.0 }, 0.1).is_err());
        assert!(DelayTimeDistribution::new(DtdShape::default(), -0.1).is_err());
        assert!(DelayTimeDistribution::new(DtdShape::Custom(Arc::new(|_| 0.0)), 0.1).is_err());
    }

    #[test]
    fn test_changing_delay_renormalizes() {
        let dtd = DelayTimeDistribution::new(DtdShape::default(), 0.15).unwrap();
        let later = dtd.with_min_delay(0.5).unwrap();
        assert!(later.rate(1.0) > dtd.rate(1.0));
        check_normalized(&later);
    }
}
