//! Star-particle tracers and their radial migration.
//!
//! Every step each zone's newly formed stars are split into a fixed number of
//! tracers. A tracer's birth zone and time never change; where it ends up is
//! decided once, at spawn, by a [`FateModel`], and the path between the two
//! is given by a [`MigrationMode`]. The zone a tracer occupies is therefore a
//! pure function of time. The arena caches the last evaluated zone so the
//! coordinator can tell when the tracer's future returns must follow it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::error::{GalchemError, Result};

/// Age at which the Gaussian fate model reaches its nominal width (Gyr)
const GAUSSIAN_REFERENCE_AGE_GYR: f64 = 8.0;

/// Shape of the path from birth to final radius
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MigrationMode {
    /// r(t) = r_birth + Δr √(age / final age)
    #[default]
    Diffusive,
    /// r(t) = r_birth + Δr (age / final age)
    Linear,
    /// Stays at birth until a random moment, then jumps to the final radius
    Sudden,
    /// Stays in the birth zone for the whole run; the final zone only
    /// appears in the output
    PostProcess,
}

impl MigrationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationMode::Diffusive => "diffusion",
            MigrationMode::Linear => "linear",
            MigrationMode::Sudden => "sudden",
            MigrationMode::PostProcess => "post-process",
        }
    }
}

impl FromStr for MigrationMode {
    type Err = GalchemError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "diffusion" | "diffusive" => Ok(MigrationMode::Diffusive),
            "linear" => Ok(MigrationMode::Linear),
            "sudden" => Ok(MigrationMode::Sudden),
            "post-process" | "postprocess" => Ok(MigrationMode::PostProcess),
            _ => Err(GalchemError::UnknownOption {
                kind: "migration mode",
                value: s.to_string(),
                expected: "diffusion, linear, sudden, post-process",
            }),
        }
    }
}

/// Where a tracer ends up at the end of the run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fate {
    pub final_zone: usize,
    /// Height above the disk midplane at the end of the run (kpc)
    pub z_height_kpc: Option<f64>,
}

/// What a custom fate model knows about a newborn tracer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FateQuery {
    pub birth_zone: usize,
    pub formation_time_gyr: f64,
    pub end_time_gyr: f64,
    /// Index of the tracer among those spawned by its zone this step
    pub index: usize,
}

pub type FateFn = Arc<dyn Fn(FateQuery) -> Fate + Send + Sync>;

/// How final zones are assigned
#[derive(Clone, Default)]
pub enum FateModel {
    /// Every tracer stays in its birth zone
    #[default]
    Stationary,
    /// Final radius drawn around the birth radius with width
    /// σ √(age / 8 Gyr), age being the tracer's age at the end of the run
    Gaussian { sigma_kpc: f64 },
    Custom(FateFn),
}

impl FateModel {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(FateQuery) -> Fate + Send + Sync + 'static,
    {
        FateModel::Custom(Arc::new(f))
    }
}

impl fmt::Debug for FateModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FateModel::Stationary => f.write_str("Stationary"),
            FateModel::Gaussian { sigma_kpc } => write!(f, "Gaussian({} kpc)", sigma_kpc),
            FateModel::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

/// Read-only view of one tracer
#[derive(Debug, Clone, Copy)]
pub struct TracerPopulation<'a> {
    pub formation_tick: usize,
    pub formation_time_gyr: f64,
    pub birth_zone: usize,
    pub final_zone: usize,
    pub current_zone: usize,
    pub mass_msun: f64,
    pub metallicity: f64,
    pub abundances: &'a [f64],
    pub z_height_kpc: Option<f64>,
}

/// All tracers of a run, one entry per field
#[derive(Debug, Clone)]
pub struct TracerArena {
    n_elements: usize,
    formation_tick: Vec<usize>,
    formation_time_gyr: Vec<f64>,
    birth_zone: Vec<usize>,
    final_zone: Vec<usize>,
    current_zone: Vec<usize>,
    jump_time_gyr: Vec<f64>,
    z_height_kpc: Vec<Option<f64>>,
    mass_msun: Vec<f64>,
    metallicity: Vec<f64>,
    /// `n_elements` abundances per tracer
    abundances: Vec<f64>,
}

impl TracerArena {
    pub fn new(n_elements: usize) -> Self {
        Self {
            n_elements,
            formation_tick: Vec::new(),
            formation_time_gyr: Vec::new(),
            birth_zone: Vec::new(),
            final_zone: Vec::new(),
            current_zone: Vec::new(),
            jump_time_gyr: Vec::new(),
            z_height_kpc: Vec::new(),
            mass_msun: Vec::new(),
            metallicity: Vec::new(),
            abundances: Vec::new(),
        }
    }

    pub fn reserve(&mut self, additional: usize) {
        self.formation_tick.reserve(additional);
        self.formation_time_gyr.reserve(additional);
        self.birth_zone.reserve(additional);
        self.final_zone.reserve(additional);
        self.current_zone.reserve(additional);
        self.jump_time_gyr.reserve(additional);
        self.z_height_kpc.reserve(additional);
        self.mass_msun.reserve(additional);
        self.metallicity.reserve(additional);
        self.abundances.reserve(additional * self.n_elements);
    }

    pub fn len(&self) -> usize {
        self.mass_msun.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mass_msun.is_empty()
    }

    pub fn n_elements(&self) -> usize {
        self.n_elements
    }

    #[allow(clippy::too_many_arguments)]
    fn push(
        &mut self,
        formation_tick: usize,
        formation_time_gyr: f64,
        birth_zone: usize,
        fate: Fate,
        jump_time_gyr: f64,
        mass_msun: f64,
        metallicity: f64,
        abundances: &[f64],
    ) -> usize {
        debug_assert_eq!(abundances.len(), self.n_elements);
        self.formation_tick.push(formation_tick);
        self.formation_time_gyr.push(formation_time_gyr);
        self.birth_zone.push(birth_zone);
        self.final_zone.push(fate.final_zone);
        self.current_zone.push(birth_zone);
        self.jump_time_gyr.push(jump_time_gyr);
        self.z_height_kpc.push(fate.z_height_kpc);
        self.mass_msun.push(mass_msun);
        self.metallicity.push(metallicity);
        self.abundances.extend_from_slice(abundances);
        self.len() - 1
    }

    pub fn get(&self, i: usize) -> TracerPopulation<'_> {
        TracerPopulation {
            formation_tick: self.formation_tick[i],
            formation_time_gyr: self.formation_time_gyr[i],
            birth_zone: self.birth_zone[i],
            final_zone: self.final_zone[i],
            current_zone: self.current_zone[i],
            mass_msun: self.mass_msun[i],
            metallicity: self.metallicity[i],
            abundances: self.abundances(i),
            z_height_kpc: self.z_height_kpc[i],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = TracerPopulation<'_>> {
        (0..self.len()).map(move |i| self.get(i))
    }

    #[inline]
    pub fn abundances(&self, i: usize) -> &[f64] {
        &self.abundances[i * self.n_elements..(i + 1) * self.n_elements]
    }

    #[inline]
    pub fn current_zone(&self, i: usize) -> usize {
        self.current_zone[i]
    }

    pub(crate) fn set_current_zone(&mut self, i: usize, zone: usize) {
        self.current_zone[i] = zone;
    }

    /// Total tracer mass per current zone
    pub fn mass_by_zone(&self, n_zones: usize) -> Vec<f64> {
        let mut out = vec![0.0; n_zones];
        for (zone, mass) in self.current_zone.iter().zip(&self.mass_msun) {
            out[*zone] += mass;
        }
        out
    }
}

/// Assigns fates at spawn and evaluates tracer positions over time
#[derive(Debug)]
pub struct RadialMigration {
    mode: MigrationMode,
    fate: FateModel,
    zone_width_kpc: f64,
    n_zones: usize,
    end_time_gyr: f64,
    rng: StdRng,
}

impl RadialMigration {
    pub fn new(
        mode: MigrationMode,
        fate: FateModel,
        zone_width_kpc: f64,
        n_zones: usize,
        end_time_gyr: f64,
        seed: u64,
    ) -> Result<Self> {
        if !(zone_width_kpc > 0.0 && zone_width_kpc.is_finite()) {
            return Err(GalchemError::config(format!(
                "zone width {} kpc must be positive",
                zone_width_kpc
            )));
        }
        if n_zones == 0 {
            return Err(GalchemError::config("a multizone model needs at least one zone"));
        }
        if let FateModel::Gaussian { sigma_kpc } = fate {
            if !(sigma_kpc >= 0.0 && sigma_kpc.is_finite()) {
                return Err(GalchemError::config(format!(
                    "migration width {} kpc must be non-negative",
                    sigma_kpc
                )));
            }
        }
        Ok(Self {
            mode,
            fate,
            zone_width_kpc,
            n_zones,
            end_time_gyr,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn mode(&self) -> MigrationMode {
        self.mode
    }

    /// Center of a zone (kpc)
    #[inline]
    pub fn zone_radius(&self, zone: usize) -> f64 {
        (zone as f64 + 0.5) * self.zone_width_kpc
    }

    /// Zone containing a radius, clamped to the grid
    #[inline]
    pub fn zone_of(&self, radius_kpc: f64) -> usize {
        if radius_kpc <= 0.0 {
            return 0;
        }
        ((radius_kpc / self.zone_width_kpc).floor() as usize).min(self.n_zones - 1)
    }

    /// Split `mass_msun` into `count` tracers born in `birth_zone` and add
    /// them to the arena. Returns the index of the first new tracer.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        &mut self,
        arena: &mut TracerArena,
        count: usize,
        birth_zone: usize,
        formation_tick: usize,
        formation_time_gyr: f64,
        mass_msun: f64,
        metallicity: f64,
        abundances: &[f64],
    ) -> Result<usize> {
        let first = arena.len();
        let each = mass_msun / count as f64;
        arena.reserve(count);
        for index in 0..count {
            let fate = self.draw_fate(birth_zone, formation_time_gyr, index)?;
            let jump = match self.mode {
                MigrationMode::Sudden if self.end_time_gyr > formation_time_gyr => {
                    self.rng.gen_range(formation_time_gyr..self.end_time_gyr)
                }
                _ => self.end_time_gyr,
            };
            arena.push(
                formation_tick,
                formation_time_gyr,
                birth_zone,
                fate,
                jump,
                each,
                metallicity,
                abundances,
            );
        }
        Ok(first)
    }

    fn draw_fate(&mut self, birth_zone: usize, formation_time_gyr: f64, index: usize) -> Result<Fate> {
        match &self.fate {
            FateModel::Stationary => Ok(Fate {
                final_zone: birth_zone,
                z_height_kpc: None,
            }),
            FateModel::Gaussian { sigma_kpc } => {
                let age = (self.end_time_gyr - formation_time_gyr).max(0.0);
                let width = sigma_kpc * (age / GAUSSIAN_REFERENCE_AGE_GYR).sqrt();
                let radius = if width > 0.0 {
                    let normal = Normal::new(self.zone_radius(birth_zone), width)
                        .map_err(|e| GalchemError::config(format!("migration width: {}", e)))?;
                    normal.sample(&mut self.rng)
                } else {
                    self.zone_radius(birth_zone)
                };
                Ok(Fate {
                    final_zone: self.zone_of(radius),
                    z_height_kpc: None,
                })
            }
            FateModel::Custom(f) => {
                let fate = f(FateQuery {
                    birth_zone,
                    formation_time_gyr,
                    end_time_gyr: self.end_time_gyr,
                    index,
                });
                if fate.final_zone >= self.n_zones {
                    return Err(GalchemError::config(format!(
                        "fate model sent a tracer to zone {} of {}",
                        fate.final_zone, self.n_zones
                    )));
                }
                Ok(fate)
            }
        }
    }

    /// Zone occupied by tracer `i` at `time_gyr`
    pub fn zone_at(&self, arena: &TracerArena, i: usize, time_gyr: f64) -> usize {
        let birth = arena.birth_zone[i];
        let last = arena.final_zone[i];
        if birth == last {
            return birth;
        }
        let formed = arena.formation_time_gyr[i];
        let span = self.end_time_gyr - formed;
        let progress = if span > 0.0 {
            ((time_gyr - formed) / span).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let (r_birth, r_final) = (self.zone_radius(birth), self.zone_radius(last));
        let radius = match self.mode {
            MigrationMode::Diffusive => r_birth + (r_final - r_birth) * progress.sqrt(),
            MigrationMode::Linear => r_birth + (r_final - r_birth) * progress,
            MigrationMode::Sudden => {
                if time_gyr >= arena.jump_time_gyr[i] {
                    r_final
                } else {
                    r_birth
                }
            }
            MigrationMode::PostProcess => r_birth,
        };
        self.zone_of(radius)
    }

    /// True once tracer `i` can no longer change zone
    pub fn is_settled(&self, arena: &TracerArena, i: usize) -> bool {
        let current = arena.current_zone[i];
        match self.mode {
            MigrationMode::PostProcess => true,
            _ => current == arena.final_zone[i],
        }
    }
}
