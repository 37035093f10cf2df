//! Serializable model parameters.
//!
//! Defaults reproduce the reference one-zone model of Weinberg, Andrews &
//! Freudenburg (2017): constant infall onto 6e9 Msun of gas, τ* = 2 Gyr,
//! η = 2.5, a Kroupa IMF and a t^-1.1 delay-time distribution.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::enrichment::{DtdShape, Imf, MassLifetime, RecyclingModel, StellarPhysics};
use crate::error::{GalchemError, Result};
use crate::multizone::{FateModel, GasMigration, MigrationMatrix, MultizoneConfig};
use crate::yields::{ElementYields, TableRegistry, YieldPolicy, YieldSetting, YieldTable};
use crate::zone::{default_mdf_bins, NumericsConfig, Schedule, SchmidtLaw, TimeGrid, ZoneConfig};

/// Top-level parameters container
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    pub run: RunParameters,
    /// Template applied to every zone
    pub zone: ZoneParameters,
    pub stellar: StellarParameters,
    /// Present for multizone runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multizone: Option<MultizoneParameters>,
    /// Named mass-metallicity yield grids, referenced from `zone.yields`
    pub yield_tables: BTreeMap<String, TableParameters>,
}

impl Parameters {
    /// Load from a JSON file, or use defaults if it is missing or invalid
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(params) => {
                    log::info!("Loaded parameters from {:?}", path.as_ref());
                    params
                }
                Err(e) => {
                    log::warn!("Failed to parse parameters: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("Parameter file not found, using defaults");
                Self::default()
            }
        }
    }

    /// Load from a JSON file, failing on any problem
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let params = serde_json::from_str(&contents)?;
        log::info!("Loaded parameters from {:?}", path.as_ref());
        Ok(params)
    }

    pub fn to_json_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Registry holding every grid in `yield_tables`
    pub fn table_registry(&self) -> Result<TableRegistry> {
        let mut registry = TableRegistry::new();
        for (key, table) in &self.yield_tables {
            let grid = YieldTable::from_rows(
                table.masses_msun.clone(),
                table.metallicities.clone(),
                table.rows.clone(),
            )?;
            registry.insert(key.clone(), grid);
        }
        Ok(registry)
    }

    pub fn time_grid(&self) -> Result<TimeGrid> {
        let grid = TimeGrid::new(self.run.dt_gyr, self.run.end_time_gyr)?;
        match &self.run.output_times_gyr {
            Some(times) => grid.with_output_times(times),
            None => Ok(grid),
        }
    }

    /// Zone configuration built from the zone template
    pub fn zone_config(&self, name: &str) -> Result<ZoneConfig> {
        let symbols: Vec<&str> = self.run.elements.iter().map(String::as_str).collect();
        let z = &self.zone;
        let mut config = ZoneConfig::new(name, &symbols);
        config.mode = z.mode.parse()?;
        config.rate_law = Schedule::Constant(z.rate);
        config.initial_gas_msun = z.initial_gas_msun;
        config.tau_star_gyr = Schedule::Constant(z.tau_star_gyr);
        config.schmidt = z.schmidt.then_some(SchmidtLaw {
            index: z.schmidt_index,
            reference_gas_msun: z.schmidt_reference_gas_msun,
        });
        config.eta = Schedule::Constant(z.eta);
        config.outflow_smoothing_gyr = z.smoothing_gyr;
        config.outflow_enhancement = Schedule::Constant(z.enhancement);
        config.solar_z = z.solar_z;
        config.recycling = match z.recycling.trim().to_ascii_lowercase().as_str() {
            "continuous" => RecyclingModel::Continuous,
            "instantaneous" => RecyclingModel::Instantaneous(z.recycling_fraction),
            other => {
                return Err(GalchemError::UnknownOption {
                    kind: "recycling model",
                    value: other.to_string(),
                    expected: "continuous, instantaneous",
                })
            }
        };
        config.stellar = self.stellar.physics()?;
        config.dtd = self.stellar.dtd_shape()?;
        config.min_delay_gyr = self.stellar.min_delay_gyr;
        config.yield_policy = YieldPolicy {
            tabulated_clamp_below_msun: z.tabulated_clamp_below_msun,
        };
        config.numerics = NumericsConfig {
            max_consecutive_clips: z.max_consecutive_clips,
        };
        config.mdf_bins = self.run.mdf_bins.clone().unwrap_or_else(default_mdf_bins);

        for element in config.elements.iter_mut() {
            if let Some(y) = z.yields.get(&element.symbol) {
                element.yields = ElementYields::new(y.prompt, y.delayed);
                if let Some(key) = &y.tabulated {
                    element.yields = element.yields.clone().with_tabulated(YieldSetting::TableKey(key.clone()));
                }
            }
            if let Some(&zin) = z.infall_abundances.get(&element.symbol) {
                element.infall_abundance = Schedule::Constant(zin);
            }
            if let Some(&solar) = z.solar_abundances.get(&element.symbol) {
                element.solar_abundance = Some(solar);
            }
        }
        Ok(config)
    }

    /// Multizone configuration, if the parameters describe one
    pub fn multizone_config(&self) -> Result<Option<MultizoneConfig>> {
        let Some(mz) = &self.multizone else {
            return Ok(None);
        };
        if mz.n_zones == 0 {
            return Err(GalchemError::config("n_zones must be at least 1"));
        }
        let grid = self.time_grid()?;
        let mut zones = Vec::with_capacity(mz.n_zones);
        for i in 0..mz.n_zones {
            let mut zone = self.zone_config(&format!("zone{}", i))?;
            if let Some(scale) = mz.rate_scale_length_kpc {
                if !(scale > 0.0) {
                    return Err(GalchemError::config("rate scale length must be positive"));
                }
                let radius = (i as f64 + 0.5) * mz.zone_width_kpc;
                let factor = (-radius / scale).exp();
                zone.rate_law = Schedule::Constant(self.zone.rate * factor);
                zone.initial_gas_msun = self.zone.initial_gas_msun * factor;
            }
            zones.push(zone);
        }

        let mut config = MultizoneConfig::new(self.run.name.clone(), zones, grid);
        config.n_tracers = mz.n_tracers;
        config.zone_width_kpc = mz.zone_width_kpc;
        config.migration_mode = mz.migration_mode.parse()?;
        config.tracking = mz.tracking.parse()?;
        config.seed = mz.seed;
        config.fate = match mz.fate.trim().to_ascii_lowercase().as_str() {
            "stationary" => FateModel::Stationary,
            "gaussian" => FateModel::Gaussian {
                sigma_kpc: mz.sigma_kpc,
            },
            other => {
                return Err(GalchemError::UnknownOption {
                    kind: "tracer fate model",
                    value: other.to_string(),
                    expected: "stationary, gaussian",
                })
            }
        };
        if mz.neighbor_gas_fraction > 0.0 {
            let mut matrix = MigrationMatrix::zeros(mz.n_zones);
            for i in 0..mz.n_zones {
                if i > 0 {
                    matrix.set(i, i - 1, mz.neighbor_gas_fraction)?;
                }
                if i + 1 < mz.n_zones {
                    matrix.set(i, i + 1, mz.neighbor_gas_fraction)?;
                }
            }
            config.gas_migration = GasMigration::Static(matrix);
        }
        Ok(Some(config))
    }
}

/// Clock, elements and output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunParameters {
    /// Output directory name
    pub name: String,
    pub dt_gyr: f64,
    pub end_time_gyr: f64,
    /// History is kept at the first tick at or after each time; every tick
    /// when absent
    pub output_times_gyr: Option<Vec<f64>>,
    pub overwrite: bool,
    pub elements: Vec<String>,
    /// [X/H] bin edges; -3 to +1 dex in 0.01 dex steps when absent
    pub mdf_bins: Option<Vec<f64>>,
}

impl Default for RunParameters {
    fn default() -> Self {
        Self {
            name: "onezonemodel".to_string(),
            dt_gyr: 0.01,
            end_time_gyr: 10.0,
            output_times_gyr: None,
            overwrite: false,
            elements: vec!["fe".to_string(), "sr".to_string(), "o".to_string()],
            mdf_bins: None,
        }
    }
}

/// Yields of one element (IMF-integrated, by mass)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldParameters {
    pub prompt: f64,
    pub delayed: f64,
    /// Key into `yield_tables`
    #[serde(default)]
    pub tabulated: Option<String>,
}

/// Yield grid rows, one per mass, each holding a value per metallicity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableParameters {
    pub masses_msun: Vec<f64>,
    pub metallicities: Vec<f64>,
    pub rows: Vec<Vec<f64>>,
}

/// Gas and star-formation parameters of a zone
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneParameters {
    /// `ifr`, `sfr` or `gas`
    pub mode: String,
    /// Constant value of the rate law (Msun/yr, or Msun in gas mode)
    pub rate: f64,
    pub initial_gas_msun: f64,
    pub tau_star_gyr: f64,
    pub schmidt: bool,
    pub schmidt_index: f64,
    pub schmidt_reference_gas_msun: f64,
    /// Mass-loading factor
    pub eta: f64,
    pub smoothing_gyr: f64,
    /// Outflow metallicity relative to the ISM
    pub enhancement: f64,
    /// `continuous` or `instantaneous`
    pub recycling: String,
    /// Returned fraction for instantaneous recycling
    /// Source: Weinberg, Andrews & Freudenburg 2017 (r = 0.4 for Kroupa)
    pub recycling_fraction: f64,
    pub solar_z: f64,
    pub yields: BTreeMap<String, YieldParameters>,
    pub infall_abundances: BTreeMap<String, f64>,
    pub solar_abundances: BTreeMap<String, f64>,
    pub tabulated_clamp_below_msun: Option<f64>,
    pub max_consecutive_clips: Option<usize>,
}

impl Default for ZoneParameters {
    fn default() -> Self {
        Self {
            mode: "ifr".to_string(),
            rate: 9.1,
            initial_gas_msun: 6.0e9,
            tau_star_gyr: 2.0,
            schmidt: false,
            schmidt_index: 0.5,
            schmidt_reference_gas_msun: 6.0e9,
            eta: 2.5,
            smoothing_gyr: 0.0,
            enhancement: 1.0,
            recycling: "continuous".to_string(),
            recycling_fraction: 0.4,
            // Asplund et al. 2009
            solar_z: 0.014,
            yields: BTreeMap::new(),
            infall_abundances: BTreeMap::new(),
            solar_abundances: BTreeMap::new(),
            tabulated_clamp_below_msun: Some(1.5),
            max_consecutive_clips: Some(25),
        }
    }
}

/// Stellar populations and delayed enrichment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StellarParameters {
    /// `kroupa` or `salpeter`
    pub imf: String,
    pub m_lower_msun: f64,
    pub m_upper_msun: f64,
    pub mass_lifetime: MassLifetime,
    pub post_ms_fraction: f64,
    /// `plaw` or `exp`
    pub dtd: String,
    pub dtd_slope: f64,
    pub dtd_timescale_gyr: f64,
    pub min_delay_gyr: f64,
}

impl StellarParameters {
    pub fn physics(&self) -> Result<StellarPhysics> {
        let imf: Imf = self.imf.parse()?;
        Ok(StellarPhysics {
            imf,
            mass_lifetime: self.mass_lifetime,
            post_ms_fraction: self.post_ms_fraction,
            m_lower_msun: self.m_lower_msun,
            m_upper_msun: self.m_upper_msun,
        })
    }

    pub fn dtd_shape(&self) -> Result<DtdShape> {
        Ok(match self.dtd.parse::<DtdShape>()? {
            DtdShape::PowerLaw { .. } => DtdShape::PowerLaw {
                slope: self.dtd_slope,
            },
            DtdShape::Exponential { .. } => DtdShape::Exponential {
                timescale_gyr: self.dtd_timescale_gyr,
            },
            custom => custom,
        })
    }
}

impl Default for StellarParameters {
    fn default() -> Self {
        Self {
            // Kroupa 2001
            imf: "kroupa".to_string(),
            m_lower_msun: 0.08,
            m_upper_msun: 100.0,
            mass_lifetime: MassLifetime::default(),
            post_ms_fraction: 0.1,
            // Maoz & Mannucci 2012
            dtd: "plaw".to_string(),
            dtd_slope: -1.1,
            dtd_timescale_gyr: 1.5,
            min_delay_gyr: 0.15,
        }
    }
}

/// Layout and migration of a multizone model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MultizoneParameters {
    pub n_zones: usize,
    pub n_tracers: usize,
    pub zone_width_kpc: f64,
    /// `diffusion`, `linear`, `sudden` or `post-process`
    pub migration_mode: String,
    /// `stationary` or `gaussian`
    pub fate: String,
    /// Gaussian migration width at 8 Gyr
    /// Source: Frankel et al. 2018
    pub sigma_kpc: f64,
    /// `full` or `final`
    pub tracking: String,
    pub seed: u64,
    /// Fraction of gas sent to each neighbouring zone per step
    pub neighbor_gas_fraction: f64,
    /// Exponential radial profile of the rate law and initial gas
    pub rate_scale_length_kpc: Option<f64>,
}

impl Default for MultizoneParameters {
    fn default() -> Self {
        Self {
            n_zones: 10,
            n_tracers: 5,
            zone_width_kpc: 0.1,
            migration_mode: "diffusion".to_string(),
            fate: "stationary".to_string(),
            sigma_kpc: 3.6,
            tracking: "full".to_string(),
            seed: 0,
            neighbor_gas_fraction: 0.0,
            rate_scale_length_kpc: None,
        }
    }
}
