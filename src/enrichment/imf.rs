//! Stellar initial mass functions.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::GalchemError;

/// Initial mass function dN/dm, up to normalization
#[derive(Clone)]
pub enum Imf {
    /// Salpeter (1955): dN/dm ∝ m^-2.35
    Salpeter,
    /// Kroupa (2001): slopes 0.3 / 1.3 / 2.3 with breaks at 0.08 and 0.5 Msun
    Kroupa,
    /// User-supplied dN/dm (unnormalized)
    Custom(Arc<dyn Fn(f64) -> f64 + Send + Sync>),
}

impl Imf {
    /// Unnormalized dN/dm at mass `m` (Msun). Negative or non-finite custom
    /// values count as zero.
    pub fn dn_dm(&self, m: f64) -> f64 {
        if m <= 0.0 {
            return 0.0;
        }
        let value = match self {
            Imf::Salpeter => m.powf(-2.35),
            Imf::Kroupa => {
                // continuous at both breaks
                if m < 0.08 {
                    m.powf(-0.3)
                } else if m < 0.5 {
                    0.08 * m.powf(-1.3)
                } else {
                    0.04 * m.powf(-2.3)
                }
            }
            Imf::Custom(f) => f(m),
        };
        if value.is_finite() {
            value.max(0.0)
        } else {
            0.0
        }
    }
}

impl fmt::Debug for Imf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Imf::Salpeter => f.write_str("Salpeter"),
            Imf::Kroupa => f.write_str("Kroupa"),
            Imf::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

impl FromStr for Imf {
    type Err = GalchemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "salpeter" => Ok(Imf::Salpeter),
            "kroupa" => Ok(Imf::Kroupa),
            _ => Err(GalchemError::UnknownOption {
                kind: "IMF",
                value: s.to_string(),
                expected: "salpeter, kroupa",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kroupa_is_continuous() {
        let imf = Imf::Kroupa;
        for &m in &[0.08, 0.5] {
            let below = imf.dn_dm(m * (1.0 - 1e-9));
            let above = imf.dn_dm(m);
            assert!((below - above).abs() / above < 1e-6, "discontinuity at {}", m);
        }
    }

    #[test]
    fn test_parse() {
        assert!(matches!("Kroupa".parse::<Imf>(), Ok(Imf::Kroupa)));
        assert!(matches!("salpeter".parse::<Imf>(), Ok(Imf::Salpeter)));
        assert!("chabrier".parse::<Imf>().is_err());
    }

    #[test]
    fn test_custom_clamps_negative() {
        let imf = Imf::Custom(Arc::new(|_| -1.0));
        assert_eq!(imf.dn_dm(1.0), 0.0);
    }
}
