//! Element symbols and solar reference abundances.
//!
//! Solar values are photospheric mass fractions after Asplund et al. (2009),
//! Annu. Rev. Astron. Astrophys. 47, 481, rounded to three figures.

use crate::error::{GalchemError, Result};

/// Default solar total metallicity by mass
pub const SOLAR_Z: f64 = 0.014;

/// (symbol, solar mass fraction)
const SOLAR_MASS_FRACTIONS: &[(&str, f64)] = &[
    ("c", 2.37e-3),
    ("n", 6.93e-4),
    ("o", 5.72e-3),
    ("ne", 1.25e-3),
    ("na", 2.93e-5),
    ("mg", 7.08e-4),
    ("al", 5.56e-5),
    ("si", 6.65e-4),
    ("p", 5.82e-6),
    ("s", 3.09e-4),
    ("ar", 7.34e-5),
    ("k", 3.04e-6),
    ("ca", 6.42e-5),
    ("ti", 3.08e-6),
    ("v", 3.26e-7),
    ("cr", 1.67e-5),
    ("mn", 1.09e-5),
    ("fe", 1.29e-3),
    ("co", 4.16e-6),
    ("ni", 7.12e-5),
    ("cu", 7.18e-7),
    ("zn", 1.75e-6),
    ("sr", 3.12e-8),
    ("y", 6.97e-9),
    ("ba", 1.56e-8),
    ("eu", 3.61e-10),
];

/// Solar mass fraction of an element, if it is in the built-in table
pub fn solar_abundance(symbol: &str) -> Option<f64> {
    let symbol = symbol.to_ascii_lowercase();
    SOLAR_MASS_FRACTIONS
        .iter()
        .find(|(s, _)| *s == symbol)
        .map(|(_, z)| *z)
}

/// Normalize a list of element symbols: lowercase, non-empty, unique
pub fn normalize_symbols(symbols: &[String]) -> Result<Vec<String>> {
    if symbols.is_empty() {
        return Err(GalchemError::config("at least one element must be tracked"));
    }
    let mut out: Vec<String> = Vec::with_capacity(symbols.len());
    for raw in symbols {
        let symbol = raw.trim().to_ascii_lowercase();
        if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(GalchemError::config(format!("invalid element symbol '{}'", raw)));
        }
        if out.contains(&symbol) {
            return Err(GalchemError::config(format!("element '{}' listed twice", symbol)));
        }
        out.push(symbol);
    }
    Ok(out)
}

/// Logarithmic abundance ratio `log10(a / b)`.
///
/// Returns `None` when either side is non-positive; callers substitute a
/// floor value and record the occurrence.
#[inline]
pub fn log_ratio(a: f64, b: f64) -> Option<f64> {
    if a > 0.0 && b > 0.0 && a.is_finite() && b.is_finite() {
        Some((a / b).log10())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solar_lookup_is_case_insensitive() {
        assert_eq!(solar_abundance("Fe"), solar_abundance("fe"));
        assert!((solar_abundance("o").unwrap() - 5.72e-3).abs() < 1e-9);
        assert!(solar_abundance("xx").is_none());
    }

    #[test]
    fn test_normalize_rejects_duplicates() {
        let symbols = vec!["Fe".to_string(), "fe".to_string()];
        assert!(normalize_symbols(&symbols).is_err());
        assert!(normalize_symbols(&[]).is_err());

        let ok = normalize_symbols(&["O".to_string(), " Sr ".to_string()]).unwrap();
        assert_eq!(ok, vec!["o", "sr"]);
    }

    #[test]
    fn test_log_ratio_guards_zero() {
        assert!(log_ratio(0.0, 1.0).is_none());
        assert!(log_ratio(1.0, 0.0).is_none());
        assert!((log_ratio(10.0, 1.0).unwrap() - 1.0).abs() < 1e-12);
    }
}
