//! Nucleosynthetic yield settings.
//!
//! Each tracked element carries three yield settings, one per enrichment
//! channel:
//! - prompt (core-collapse-like): mass of the element per unit stellar mass
//!   formed, as a function of the metallicity of the star-forming gas
//! - delayed (Type Ia-like): mass per unit stellar mass formed, released over
//!   the delay-time distribution, as a function of formation metallicity
//! - tabulated (AGB-like): net fractional yield of stars of mass `m` at
//!   metallicity `Z`, usually a [`YieldTable`]
//!
//! A setting may be a constant, a callable, a table, or the name of a table
//! provided by an external reader. Settings are resolved once, at
//! configuration time, into a [`YieldFn`] so the stepper never inspects the
//! variant.

mod table;

pub use table::YieldTable;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{GalchemError, Result};

/// Yield as a function of metallicity only
pub type MetallicityYield = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// Yield as a function of stellar mass (Msun) and metallicity
pub type MassMetallicityYield = Arc<dyn Fn(f64, f64) -> f64 + Send + Sync>;

/// User-facing yield setting, before resolution
#[derive(Clone)]
pub enum YieldSetting {
    Constant(f64),
    OfMetallicity(MetallicityYield),
    OfMassAndMetallicity(MassMetallicityYield),
    Table(Arc<YieldTable>),
    /// Name of a grid to be fetched from a [`YieldTableProvider`]
    TableKey(String),
}

impl Default for YieldSetting {
    fn default() -> Self {
        Self::Constant(0.0)
    }
}

impl fmt::Debug for YieldSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(v) => write!(f, "Constant({})", v),
            Self::OfMetallicity(_) => f.write_str("OfMetallicity(<fn>)"),
            Self::OfMassAndMetallicity(_) => f.write_str("OfMassAndMetallicity(<fn>)"),
            Self::Table(t) => write!(
                f,
                "Table({}x{})",
                t.masses().len(),
                t.metallicities().len()
            ),
            Self::TableKey(key) => write!(f, "TableKey({:?})", key),
        }
    }
}

impl From<f64> for YieldSetting {
    fn from(value: f64) -> Self {
        Self::Constant(value)
    }
}

impl From<YieldTable> for YieldSetting {
    fn from(table: YieldTable) -> Self {
        Self::Table(Arc::new(table))
    }
}

impl YieldSetting {
    /// Wrap a function of metallicity
    pub fn of_metallicity<F>(f: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Self::OfMetallicity(Arc::new(f))
    }

    /// Wrap a function of stellar mass and metallicity
    pub fn of_mass_and_metallicity<F>(f: F) -> Self
    where
        F: Fn(f64, f64) -> f64 + Send + Sync + 'static,
    {
        Self::OfMassAndMetallicity(Arc::new(f))
    }

    /// Resolve into a uniform callable. Table keys are looked up in `provider`.
    pub fn resolve(&self, provider: Option<&dyn YieldTableProvider>) -> Result<YieldFn> {
        let inner: MassMetallicityYield = match self {
            Self::Constant(v) => {
                if !v.is_finite() {
                    return Err(GalchemError::config(format!("yield {} is not finite", v)));
                }
                let v = *v;
                Arc::new(move |_, _| v)
            }
            Self::OfMetallicity(f) => {
                let f = Arc::clone(f);
                Arc::new(move |_, z| f(z))
            }
            Self::OfMassAndMetallicity(f) => Arc::clone(f),
            Self::Table(table) => {
                let table = Arc::clone(table);
                Arc::new(move |m, z| table.interpolate(m, z))
            }
            Self::TableKey(key) => {
                let provider = provider.ok_or_else(|| {
                    GalchemError::config(format!("yield table '{}' requested but no table provider configured", key))
                })?;
                let table = provider.table(key)?;
                Arc::new(move |m, z| table.interpolate(m, z))
            }
        };
        Ok(YieldFn {
            inner,
            constant: matches!(self, Self::Constant(v) if *v == 0.0),
        })
    }
}

/// Resolved yield: callable on (mass, metallicity)
#[derive(Clone)]
pub struct YieldFn {
    inner: MassMetallicityYield,
    constant: bool,
}

impl YieldFn {
    /// Yield for metallicity-only channels
    #[inline]
    pub fn at(&self, metallicity: f64) -> f64 {
        (self.inner)(0.0, metallicity)
    }

    /// Yield for mass-dependent channels
    #[inline]
    pub fn at_mass(&self, mass_msun: f64, metallicity: f64) -> f64 {
        (self.inner)(mass_msun, metallicity)
    }

    /// True when the setting was a literal zero; lets callers skip the channel
    pub fn is_zero(&self) -> bool {
        self.constant
    }
}

impl fmt::Debug for YieldFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YieldFn").field("zero", &self.constant).finish()
    }
}

/// Source of named yield grids (file readers live outside this crate)
pub trait YieldTableProvider {
    fn table(&self, key: &str) -> Result<Arc<YieldTable>>;
}

/// In-memory table provider
#[derive(Debug, Default, Clone)]
pub struct TableRegistry {
    tables: HashMap<String, Arc<YieldTable>>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, table: YieldTable) {
        self.tables.insert(key.into(), Arc::new(table));
    }
}

impl YieldTableProvider for TableRegistry {
    fn table(&self, key: &str) -> Result<Arc<YieldTable>> {
        self.tables
            .get(key)
            .cloned()
            .ok_or_else(|| GalchemError::config(format!("unknown yield table '{}'", key)))
    }
}

/// Yield settings of one element across the three channels
#[derive(Debug, Clone, Default)]
pub struct ElementYields {
    pub prompt: YieldSetting,
    pub delayed: YieldSetting,
    pub tabulated: YieldSetting,
}

impl ElementYields {
    pub fn new(prompt: impl Into<YieldSetting>, delayed: impl Into<YieldSetting>) -> Self {
        Self {
            prompt: prompt.into(),
            delayed: delayed.into(),
            tabulated: YieldSetting::default(),
        }
    }

    pub fn with_tabulated(mut self, tabulated: impl Into<YieldSetting>) -> Self {
        self.tabulated = tabulated.into();
        self
    }

    /// Default yields for a handful of commonly tracked elements.
    ///
    /// Prompt and delayed values are IMF-integrated yields of the kind quoted
    /// by Johnson & Weinberg (2020); other elements default to zero.
    pub fn default_for(symbol: &str) -> Self {
        match symbol {
            "o" => Self::new(0.015, 0.0),
            "fe" => Self::new(0.0012, 0.0017),
            "mg" => Self::new(0.0012, 0.0),
            "sr" => Self::new(3.5e-8, 0.0),
            "c" => Self::new(0.0033, 0.0),
            "n" => Self::new(3.6e-4, 0.0),
            "si" => Self::new(8.6e-4, 6.0e-4),
            _ => Self::default(),
        }
    }

    pub fn resolve(&self, provider: Option<&dyn YieldTableProvider>) -> Result<ResolvedYields> {
        Ok(ResolvedYields {
            prompt: self.prompt.resolve(provider)?,
            delayed: self.delayed.resolve(provider)?,
            tabulated: self.tabulated.resolve(provider)?,
        })
    }
}

/// Resolved yields of one element
#[derive(Debug, Clone)]
pub struct ResolvedYields {
    pub prompt: YieldFn,
    pub delayed: YieldFn,
    pub tabulated: YieldFn,
}

/// How tabulated yields are post-processed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YieldPolicy {
    /// Negative tabulated yields are raised to zero for turnoff masses below
    /// this value (Msun). `None` disables the clamp.
    pub tabulated_clamp_below_msun: Option<f64>,
}

impl Default for YieldPolicy {
    fn default() -> Self {
        Self {
            tabulated_clamp_below_msun: Some(1.5),
        }
    }
}

impl YieldPolicy {
    /// Apply the low-mass clamp to a tabulated yield
    #[inline]
    pub fn apply(&self, turnoff_msun: f64, value: f64) -> f64 {
        match self.tabulated_clamp_below_msun {
            Some(threshold) if turnoff_msun < threshold => value.max(0.0),
            _ => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_resolves() {
        let y = YieldSetting::Constant(0.015).resolve(None).unwrap();
        assert_eq!(y.at(0.02), 0.015);
        assert_eq!(y.at_mass(3.0, 0.0), 0.015);
        assert!(!y.is_zero());
        assert!(YieldSetting::default().resolve(None).unwrap().is_zero());
    }

    #[test]
    fn test_table_key_needs_provider() {
        let setting = YieldSetting::TableKey("grid".into());
        assert!(setting.resolve(None).is_err());

        let mut registry = TableRegistry::new();
        registry.insert(
            "grid",
            YieldTable::new(vec![1.0, 2.0], vec![0.01], vec![1e-3, 3e-3]).unwrap(),
        );
        let y = setting.resolve(Some(&registry)).unwrap();
        assert!((y.at_mass(1.5, 0.01) - 2e-3).abs() < 1e-15);

        let missing = YieldSetting::TableKey("other".into());
        assert!(missing.resolve(Some(&registry)).is_err());
    }

    #[test]
    fn test_metallicity_function() {
        let y = YieldSetting::of_metallicity(|z| 0.01 * (1.0 + z)).resolve(None).unwrap();
        assert!((y.at(1.0) - 0.02).abs() < 1e-15);
    }

    #[test]
    fn test_clamp_policy() {
        let policy = YieldPolicy::default();
        assert_eq!(policy.apply(1.0, -1e-4), 0.0);
        assert_eq!(policy.apply(2.0, -1e-4), -1e-4);
        let off = YieldPolicy {
            tabulated_clamp_below_msun: None,
        };
        assert_eq!(off.apply(1.0, -1e-4), -1e-4);
    }
}
