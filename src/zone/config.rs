//! Runtime configuration of a single zone.
//!
//! Unlike [`crate::config::Parameters`], which is plain serializable data,
//! a `ZoneConfig` can carry closures: rate laws, star-formation timescales and
//! yields that vary with time or metallicity.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::elements::{self, SOLAR_Z};
use crate::enrichment::{DtdShape, RecyclingModel, StellarPhysics};
use crate::error::{GalchemError, Result};
use crate::yields::{ElementYields, YieldPolicy};

/// Function of time (Gyr)
pub type TimeFn = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// A quantity that is either constant or a function of time
#[derive(Clone)]
pub enum Schedule {
    Constant(f64),
    Function(TimeFn),
}

impl Schedule {
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Schedule::Function(Arc::new(f))
    }

    /// Raw value at `time_gyr`; may be NaN or negative for user functions
    #[inline]
    pub fn eval(&self, time_gyr: f64) -> f64 {
        match self {
            Schedule::Constant(v) => *v,
            Schedule::Function(f) => f(time_gyr),
        }
    }

    pub fn as_constant(&self) -> Option<f64> {
        match self {
            Schedule::Constant(v) => Some(*v),
            Schedule::Function(_) => None,
        }
    }
}

impl From<f64> for Schedule {
    fn from(value: f64) -> Self {
        Schedule::Constant(value)
    }
}

impl fmt::Debug for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Constant(v) => write!(f, "Constant({})", v),
            Schedule::Function(_) => f.write_str("Function(<fn>)"),
        }
    }
}

/// Which quantity the zone's rate law specifies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateMode {
    /// Infall rate (Msun/yr); gas mass is integrated
    Infall,
    /// Star formation rate (Msun/yr); gas follows from the efficiency law
    StarFormation,
    /// Gas mass (Msun); infall is inferred from the mass budget
    Gas,
}

impl RateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateMode::Infall => "ifr",
            RateMode::StarFormation => "sfr",
            RateMode::Gas => "gas",
        }
    }
}

impl FromStr for RateMode {
    type Err = GalchemError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ifr" => Ok(RateMode::Infall),
            "sfr" => Ok(RateMode::StarFormation),
            "gas" => Ok(RateMode::Gas),
            _ => Err(GalchemError::UnknownOption {
                kind: "rate-law mode",
                value: s.to_string(),
                expected: "ifr, sfr, gas",
            }),
        }
    }
}

/// Gas-dependent star formation efficiency: τ*_eff = τ* (Mg / reference)^-index
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchmidtLaw {
    pub index: f64,
    pub reference_gas_msun: f64,
}

impl Default for SchmidtLaw {
    fn default() -> Self {
        Self {
            index: 0.5,
            reference_gas_msun: 6.0e9,
        }
    }
}

/// Configuration of one tracked element
#[derive(Debug, Clone)]
pub struct ElementConfig {
    pub symbol: String,
    pub yields: ElementYields,
    /// Mass fraction of the element in infalling gas
    pub infall_abundance: Schedule,
    /// Solar mass fraction; `None` means "look it up"
    pub solar_abundance: Option<f64>,
}

impl ElementConfig {
    pub fn new(symbol: &str) -> Self {
        let symbol = symbol.trim().to_ascii_lowercase();
        Self {
            yields: ElementYields::default_for(&symbol),
            infall_abundance: Schedule::Constant(0.0),
            solar_abundance: elements::solar_abundance(&symbol),
            symbol,
        }
    }
}

/// Numerical safety limits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericsConfig {
    /// Fail the run when gas has to be clipped at zero this many steps in a
    /// row. `None` never fails.
    pub max_consecutive_clips: Option<usize>,
}

impl Default for NumericsConfig {
    fn default() -> Self {
        Self {
            max_consecutive_clips: Some(25),
        }
    }
}

/// Everything a [`super::ZoneStepper`] needs apart from the time grid
#[derive(Debug, Clone)]
pub struct ZoneConfig {
    pub name: String,
    pub mode: RateMode,
    /// Infall rate, star formation rate or gas mass, depending on `mode`
    pub rate_law: Schedule,
    /// Initial gas mass (Msun); used in infall mode only
    pub initial_gas_msun: f64,
    /// Star formation efficiency timescale (Gyr); infinite means no star formation
    pub tau_star_gyr: Schedule,
    pub schmidt: Option<SchmidtLaw>,
    /// Mass-loading factor η
    pub eta: Schedule,
    /// Outflows follow the SFR averaged over this many Gyr (0 = instantaneous)
    pub outflow_smoothing_gyr: f64,
    /// Outflow metallicity relative to the ISM
    pub outflow_enhancement: Schedule,
    pub elements: Vec<ElementConfig>,
    pub solar_z: f64,
    pub recycling: RecyclingModel,
    pub stellar: StellarPhysics,
    pub dtd: DtdShape,
    pub min_delay_gyr: f64,
    pub yield_policy: YieldPolicy,
    pub numerics: NumericsConfig,
    /// [X/H] bin edges for the metallicity distribution function
    pub mdf_bins: Vec<f64>,
}

impl ZoneConfig {
    /// Infall-mode zone with the reference defaults
    pub fn new(name: impl Into<String>, elements: &[&str]) -> Self {
        Self {
            name: name.into(),
            mode: RateMode::Infall,
            rate_law: Schedule::Constant(9.1),
            initial_gas_msun: 6.0e9,
            tau_star_gyr: Schedule::Constant(2.0),
            schmidt: None,
            eta: Schedule::Constant(2.5),
            outflow_smoothing_gyr: 0.0,
            outflow_enhancement: Schedule::Constant(1.0),
            elements: elements.iter().map(|s| ElementConfig::new(s)).collect(),
            solar_z: SOLAR_Z,
            recycling: RecyclingModel::Continuous,
            stellar: StellarPhysics::default(),
            dtd: DtdShape::default(),
            min_delay_gyr: 0.15,
            yield_policy: YieldPolicy::default(),
            numerics: NumericsConfig::default(),
            mdf_bins: default_mdf_bins(),
        }
    }

    /// Replace the yields of one element
    pub fn with_yields(mut self, symbol: &str, yields: ElementYields) -> Result<Self> {
        let symbol = symbol.to_ascii_lowercase();
        let element = self
            .elements
            .iter_mut()
            .find(|e| e.symbol == symbol)
            .ok_or_else(|| GalchemError::config(format!("element '{}' is not tracked", symbol)))?;
        element.yields = yields;
        Ok(self)
    }

    pub fn element_index(&self, symbol: &str) -> Option<usize> {
        let symbol = symbol.to_ascii_lowercase();
        self.elements.iter().position(|e| e.symbol == symbol)
    }

    pub fn symbols(&self) -> Vec<String> {
        self.elements.iter().map(|e| e.symbol.clone()).collect()
    }

    /// Check everything that can be checked without building tables
    pub fn validate(&self) -> Result<()> {
        let symbols = elements::normalize_symbols(&self.symbols())?;
        for (element, symbol) in self.elements.iter().zip(&symbols) {
            match element.solar_abundance {
                Some(z) if z > 0.0 && z.is_finite() => {}
                Some(z) => {
                    return Err(GalchemError::config(format!(
                        "solar abundance of '{}' must be positive, got {}",
                        symbol, z
                    )))
                }
                None => {
                    return Err(GalchemError::config(format!(
                        "no solar abundance known for '{}'; set it explicitly",
                        symbol
                    )))
                }
            }
        }
        if self.mode == RateMode::Infall
            && !(self.initial_gas_msun >= 0.0 && self.initial_gas_msun.is_finite())
        {
            return Err(GalchemError::config(format!(
                "initial gas mass {} must be non-negative",
                self.initial_gas_msun
            )));
        }
        if !(self.outflow_smoothing_gyr >= 0.0 && self.outflow_smoothing_gyr.is_finite()) {
            return Err(GalchemError::config("outflow smoothing time must be non-negative"));
        }
        if !(self.solar_z > 0.0 && self.solar_z < 1.0) {
            return Err(GalchemError::config(format!("solar Z {} must lie in (0, 1)", self.solar_z)));
        }
        if let Some(schmidt) = self.schmidt {
            if !(schmidt.reference_gas_msun > 0.0 && schmidt.index.is_finite()) {
                return Err(GalchemError::config("Schmidt law needs a positive reference gas mass"));
            }
        }
        for (name, schedule) in [
            ("tau_star", &self.tau_star_gyr),
            ("eta", &self.eta),
            ("outflow enhancement", &self.outflow_enhancement),
        ] {
            if let Some(v) = schedule.as_constant() {
                if v.is_nan() || v < 0.0 {
                    return Err(GalchemError::config(format!("{} must be non-negative, got {}", name, v)));
                }
            }
        }
        if self.tau_star_gyr.as_constant() == Some(0.0) {
            return Err(GalchemError::config("tau_star must be positive"));
        }
        validate_bins(&self.mdf_bins)?;
        self.recycling.validate()
    }
}

/// Bin edges must be finite and strictly increasing
pub fn validate_bins(bins: &[f64]) -> Result<()> {
    if bins.len() < 2 {
        return Err(GalchemError::config("MDF needs at least two bin edges"));
    }
    if bins.iter().any(|b| !b.is_finite()) || bins.windows(2).any(|w| w[1] <= w[0]) {
        return Err(GalchemError::config("MDF bin edges must be finite and strictly increasing"));
    }
    Ok(())
}

/// -3 to +1 dex in steps of 0.01
pub fn default_mdf_bins() -> Vec<f64> {
    (0..=400).map(|i| -3.0 + 0.01 * i as f64).collect()
}

/// Shared clock of a run: fixed timestep and the ticks at which history is kept
#[derive(Debug, Clone, PartialEq)]
pub struct TimeGrid {
    dt_gyr: f64,
    n_steps: usize,
    /// `output[n]` is true when the state at tick n goes to the history
    output: Vec<bool>,
}

impl TimeGrid {
    /// Grid from 0 to `end_time_gyr` with every tick recorded
    pub fn new(dt_gyr: f64, end_time_gyr: f64) -> Result<Self> {
        if !(dt_gyr > 0.0 && dt_gyr.is_finite()) {
            return Err(GalchemError::config(format!("timestep {} Gyr must be positive", dt_gyr)));
        }
        if !(end_time_gyr > 0.0 && end_time_gyr.is_finite()) {
            return Err(GalchemError::config(format!("end time {} Gyr must be positive", end_time_gyr)));
        }
        // tolerate end times that are a whole number of steps up to rounding
        let n_steps = ((end_time_gyr / dt_gyr) - 1e-9).ceil().max(1.0) as usize;
        Ok(Self {
            dt_gyr,
            n_steps,
            output: vec![true; n_steps + 1],
        })
    }

    /// Keep history only at the first tick at or after each requested time.
    /// The final tick is always kept.
    pub fn with_output_times(mut self, times_gyr: &[f64]) -> Result<Self> {
        if times_gyr.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(GalchemError::config("output times must be finite and non-negative"));
        }
        if times_gyr.windows(2).any(|w| w[1] <= w[0]) {
            return Err(GalchemError::config("output times must be strictly increasing"));
        }
        let mut output = vec![false; self.n_steps + 1];
        let tolerance = 1e-9 * self.dt_gyr;
        for &t in times_gyr {
            let tick = ((t / self.dt_gyr) - tolerance / self.dt_gyr).ceil().max(0.0) as usize;
            if tick <= self.n_steps {
                output[tick] = true;
            }
        }
        output[self.n_steps] = true;
        self.output = output;
        Ok(self)
    }

    pub fn dt_gyr(&self) -> f64 {
        self.dt_gyr
    }

    pub fn n_steps(&self) -> usize {
        self.n_steps
    }

    pub fn end_time_gyr(&self) -> f64 {
        self.time(self.n_steps)
    }

    /// Time (Gyr) at tick `n`
    #[inline]
    pub fn time(&self, tick: usize) -> f64 {
        tick as f64 * self.dt_gyr
    }

    #[inline]
    pub fn is_output(&self, tick: usize) -> bool {
        self.output.get(tick).copied().unwrap_or(false)
    }
}
