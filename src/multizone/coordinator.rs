//! Lockstep integration of many zones with gas and stellar migration.
//!
//! Per tick, in this order and with a barrier between each:
//! 1. every zone takes one step,
//! 2. gas and its elements are exchanged through the migration matrix,
//! 3. tracers spawned earlier are moved to their zone at t_{n+1}, taking the
//!    bookkeeping of their future returns with them,
//! 4. each zone's new stars are split into tracers whose returns are booked
//!    in the zone they will occupy at t_{n+1}.

use std::str::FromStr;
use std::sync::Arc;

use super::migration::GasMigration;
use super::tracer::{FateModel, MigrationMode, RadialMigration, TracerArena};
use crate::enrichment::{Cohort, EnrichmentKernel};
use crate::error::{GalchemError, Result};
use crate::run::{CancelFlag, RunSummary};
use crate::yields::YieldTableProvider;
use crate::zone::{TimeGrid, ZoneConfig, ZoneStepper};

/// How tracer positions feed back into enrichment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TracerTracking {
    /// Returns follow the tracer zone by zone
    #[default]
    FullTrajectory,
    /// Returns go straight to the final zone; cheaper, less faithful
    FinalZoneOnly,
}

impl FromStr for TracerTracking {
    type Err = GalchemError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" | "full-trajectory" => Ok(TracerTracking::FullTrajectory),
            "final" | "final-zone-only" => Ok(TracerTracking::FinalZoneOnly),
            _ => Err(GalchemError::UnknownOption {
                kind: "tracer tracking",
                value: s.to_string(),
                expected: "full, final",
            }),
        }
    }
}

/// Configuration of a multizone model
#[derive(Debug, Clone)]
pub struct MultizoneConfig {
    pub name: String,
    pub zones: Vec<ZoneConfig>,
    pub grid: TimeGrid,
    /// Tracers spawned per zone per step
    pub n_tracers: usize,
    pub zone_width_kpc: f64,
    pub migration_mode: MigrationMode,
    pub fate: FateModel,
    pub gas_migration: GasMigration,
    pub tracking: TracerTracking,
    pub seed: u64,
}

impl MultizoneConfig {
    pub fn new(name: impl Into<String>, zones: Vec<ZoneConfig>, grid: TimeGrid) -> Self {
        Self {
            name: name.into(),
            zones,
            grid,
            n_tracers: 5,
            zone_width_kpc: 0.1,
            migration_mode: MigrationMode::default(),
            fate: FateModel::default(),
            gas_migration: GasMigration::default(),
            tracking: TracerTracking::default(),
            seed: 0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let first = self
            .zones
            .first()
            .ok_or_else(|| GalchemError::config("a multizone model needs at least one zone"))?;
        let symbols = first.symbols();
        for (i, zone) in self.zones.iter().enumerate() {
            if zone.symbols() != symbols {
                return Err(GalchemError::config(format!(
                    "zone '{}' tracks {:?} but zone '{}' tracks {:?}",
                    zone.name,
                    zone.symbols(),
                    first.name,
                    symbols
                )));
            }
            if self.zones[..i].iter().any(|z| z.name == zone.name) {
                return Err(GalchemError::config(format!("zone name '{}' used twice", zone.name)));
            }
        }
        if self.n_tracers == 0 {
            return Err(GalchemError::config("at least one tracer per zone per step is required"));
        }
        self.gas_migration.validate(self.zones.len(), &self.grid)
    }
}

/// Drives N zones through a shared clock
pub struct MultizoneCoordinator {
    config: MultizoneConfig,
    zones: Vec<ZoneStepper>,
    kernels: Vec<Arc<EnrichmentKernel>>,
    migration: RadialMigration,
    tracers: TracerArena,
    /// Tracers whose zone can still change
    moving: Vec<usize>,
    cancel: CancelFlag,
    tick: usize,
    initialized: bool,
    finalized: bool,
    /// Set when a tick failed partway; zones may disagree on the tick
    poisoned: bool,
}

impl MultizoneCoordinator {
    pub fn new(config: MultizoneConfig) -> Result<Self> {
        let n_zones = config.zones.len();
        let n_elements = config.zones.first().map_or(0, |z| z.elements.len());
        let migration = RadialMigration::new(
            config.migration_mode,
            config.fate.clone(),
            config.zone_width_kpc,
            n_zones,
            config.grid.end_time_gyr(),
            config.seed,
        )?;
        let zones = config
            .zones
            .iter()
            .map(|z| ZoneStepper::new(z.clone(), config.grid.clone()))
            .collect();
        Ok(Self {
            zones,
            kernels: Vec::with_capacity(n_zones),
            migration,
            tracers: TracerArena::new(n_elements),
            moving: Vec::new(),
            cancel: CancelFlag::new(),
            tick: 0,
            initialized: false,
            finalized: false,
            poisoned: false,
            config,
        })
    }

    /// Validate everything, including every step's migration matrix, and
    /// build the zones' enrichment kernels
    pub fn initialize(&mut self, provider: Option<&dyn YieldTableProvider>) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        self.config.validate()?;
        self.kernels.clear();
        for zone in self.zones.iter_mut() {
            zone.initialize(provider)?;
            match zone.kernel() {
                Some(kernel) => self.kernels.push(Arc::clone(kernel)),
                None => return Err(GalchemError::config("zone initialized without a kernel")),
            }
        }
        let expected = self.zones.len() * self.config.n_tracers * self.config.grid.n_steps();
        self.tracers.reserve(expected);
        self.initialized = true;
        log::info!(
            "multizone '{}': {} zones, {} tracers per zone per step, migration {}",
            self.config.name,
            self.zones.len(),
            self.config.n_tracers,
            self.migration.mode().as_str()
        );
        Ok(())
    }

    /// Advance every zone by one tick.
    ///
    /// An error after the first zone has stepped poisons the coordinator:
    /// later steps and output are refused.
    pub fn step(&mut self) -> Result<()> {
        if !self.initialized {
            self.initialize(None)?;
        }
        if self.poisoned || self.finalized || self.is_complete() {
            return Err(GalchemError::Finalized(self.config.name.clone()));
        }
        let result = self.advance();
        if let Err(err) = &result {
            log::error!("multizone '{}' failed at tick {}: {}", self.config.name, self.tick, err);
            self.poisoned = true;
        }
        result
    }

    fn advance(&mut self) -> Result<()> {
        let n = self.tick;
        let t = self.config.grid.time(n);
        let t_next = self.config.grid.time(n + 1);

        let outcomes = self
            .zones
            .iter_mut()
            .map(|zone| zone.step())
            .collect::<Result<Vec<_>>>()?;

        let matrix = self.config.gas_migration.matrix_at(self.zones.len(), n, t)?;
        if !matrix.is_zero() {
            let mut gas: Vec<f64> = self.zones.iter().map(|z| z.state().gas_msun).collect();
            let mut elements: Vec<Vec<f64>> = self
                .zones
                .iter()
                .map(|z| z.state().element_masses.clone())
                .collect();
            matrix.apply(&mut gas, &mut elements);
            for (zone, (g, e)) in self.zones.iter_mut().zip(gas.into_iter().zip(&elements)) {
                zone.set_gas(g, e);
            }
        }

        self.relocate_tracers(n, t_next);

        for (birth_zone, outcome) in outcomes.iter().enumerate() {
            if outcome.stars_formed_msun <= 0.0 {
                continue;
            }
            let first = self.migration.spawn(
                &mut self.tracers,
                self.config.n_tracers,
                birth_zone,
                n,
                t,
                outcome.stars_formed_msun,
                outcome.metallicity,
                &outcome.abundances,
            )?;

            // siblings share abundances, so book them per destination
            let mut destinations: Vec<(usize, f64)> = Vec::new();
            for i in first..self.tracers.len() {
                let zone = match self.config.tracking {
                    TracerTracking::FullTrajectory => self.migration.zone_at(&self.tracers, i, t_next),
                    TracerTracking::FinalZoneOnly if self.migration.mode() != MigrationMode::PostProcess => {
                        self.tracers.get(i).final_zone
                    }
                    TracerTracking::FinalZoneOnly => birth_zone,
                };
                self.tracers.set_current_zone(i, zone);
                let mass = self.tracers.get(i).mass_msun;
                match destinations.iter_mut().find(|(z, _)| *z == zone) {
                    Some((_, total)) => *total += mass,
                    None => destinations.push((zone, mass)),
                }
                if self.config.tracking == TracerTracking::FullTrajectory
                    && !self.migration.is_settled(&self.tracers, i)
                {
                    self.moving.push(i);
                }
            }
            let kernel = &self.kernels[birth_zone];
            for (zone, mass) in destinations {
                let cohort = Cohort {
                    mass_msun: mass,
                    metallicity: outcome.metallicity,
                    abundances: &outcome.abundances,
                };
                self.zones[zone].post_cohort(kernel, &cohort, n, 1, 1.0);
                if zone != birth_zone {
                    let surviving = mass * kernel.surviving_fraction(1);
                    self.zones[birth_zone].transfer_stars(-surviving);
                    self.zones[zone].transfer_stars(surviving);
                }
            }
        }

        self.tick = n + 1;
        if self.config.grid.is_output(self.tick) {
            log::debug!(
                "multizone '{}': t = {:.4} Gyr, {} tracers ({} moving)",
                self.config.name,
                t_next,
                self.tracers.len(),
                self.moving.len()
            );
        }
        Ok(())
    }

    /// Move tracers whose zone at `t_next` differs from the cached one
    fn relocate_tracers(&mut self, tick: usize, t_next: f64) {
        let mut k = 0;
        while k < self.moving.len() {
            let i = self.moving[k];
            let old = self.tracers.current_zone(i);
            let new = self.migration.zone_at(&self.tracers, i, t_next);
            if new != old {
                let tracer = self.tracers.get(i);
                let cohort = Cohort {
                    mass_msun: tracer.mass_msun,
                    metallicity: tracer.metallicity,
                    abundances: tracer.abundances,
                };
                let kernel = &self.kernels[tracer.birth_zone];
                let first_lag = tick + 1 - tracer.formation_tick;
                self.zones[old].post_cohort(kernel, &cohort, tracer.formation_tick, first_lag, -1.0);
                self.zones[new].post_cohort(kernel, &cohort, tracer.formation_tick, first_lag, 1.0);
                let surviving = tracer.mass_msun * kernel.surviving_fraction(first_lag);
                self.zones[old].transfer_stars(-surviving);
                self.zones[new].transfer_stars(surviving);
                self.tracers.set_current_zone(i, new);
            }
            if self.migration.is_settled(&self.tracers, i) {
                self.moving.swap_remove(k);
            } else {
                k += 1;
            }
        }
    }

    /// Step to the end (or until cancelled) and finalize
    pub fn run(&mut self) -> Result<RunSummary> {
        self.initialize(None)?;
        while !self.is_complete() {
            if self.cancel.is_cancelled() {
                log::warn!(
                    "multizone '{}' cancelled at t = {:.4} Gyr",
                    self.config.name,
                    self.config.grid.time(self.tick)
                );
                break;
            }
            self.step()?;
        }
        Ok(self.finalize())
    }

    /// Freeze all zones at the current tick
    pub fn finalize(&mut self) -> RunSummary {
        for zone in self.zones.iter_mut() {
            zone.finalize();
        }
        self.finalized = true;
        let summary = self.summary();
        log::info!(
            "multizone '{}' finished at t = {:.4} Gyr with {} tracers and {} advisories",
            self.config.name,
            self.config.grid.time(self.tick),
            self.tracers.len(),
            summary.total_advisories()
        );
        summary
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            name: self.config.name.clone(),
            ticks_completed: self.tick,
            ticks_planned: self.config.grid.n_steps(),
            end_time_gyr: self.config.grid.time(self.tick),
            cancelled: self.tick < self.config.grid.n_steps(),
            n_zones: self.zones.len(),
            n_tracers: self.tracers.len(),
            advisories: self.zones.iter().map(|z| z.advisories().clone()).collect(),
        }
    }

    /// Whether a tick failed partway through
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn is_complete(&self) -> bool {
        self.tick >= self.config.grid.n_steps()
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn tick(&self) -> usize {
        self.tick
    }

    pub fn grid(&self) -> &TimeGrid {
        &self.config.grid
    }

    pub fn zones(&self) -> &[ZoneStepper] {
        &self.zones
    }

    pub fn tracers(&self) -> &TracerArena {
        &self.tracers
    }

    pub fn migration(&self) -> &RadialMigration {
        &self.migration
    }

    /// Gas mass summed over zones
    pub fn total_gas_msun(&self) -> f64 {
        self.zones.iter().map(|z| z.state().gas_msun).sum()
    }

    /// Stellar mass summed over zones
    pub fn total_stars_msun(&self) -> f64 {
        self.zones.iter().map(|z| z.state().stars_msun).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::RecyclingModel;
    use crate::multizone::migration::MigrationMatrix;
    use crate::multizone::tracer::Fate;
    use crate::zone::Schedule;

    fn zones(n: usize) -> Vec<ZoneConfig> {
        (0..n)
            .map(|i| {
                let mut z = ZoneConfig::new(format!("zone{}", i), &["fe", "o"]);
                z.rate_law = Schedule::Constant(1.0 + i as f64);
                z
            })
            .collect()
    }

    #[test]
    fn test_tracers_spawned_each_step() {
        let grid = TimeGrid::new(0.01, 0.2).unwrap();
        let mut config = MultizoneConfig::new("mz", zones(3), grid);
        config.n_tracers = 4;
        let mut mz = MultizoneCoordinator::new(config).unwrap();
        let summary = mz.run().unwrap();
        assert!(!summary.cancelled);
        assert_eq!(summary.ticks_completed, 20);
        assert_eq!(mz.tracers().len(), 3 * 4 * 20);

        // tracer masses add up to the stars formed
        let formed: f64 = mz.tracers().iter().map(|t| t.mass_msun).sum();
        let expected: f64 = mz
            .zones()
            .iter()
            .flat_map(|z| z.history().iter().take(20))
            .map(|s| s.rates.sfr * 0.01e9)
            .sum();
        assert!((formed - expected).abs() < 1e-9 * expected);
    }

    #[test]
    fn test_mismatched_elements_rejected() {
        let grid = TimeGrid::new(0.01, 0.1).unwrap();
        let mut zs = zones(2);
        zs[1] = ZoneConfig::new("zone1", &["fe"]);
        let mut mz = MultizoneCoordinator::new(MultizoneConfig::new("mz", zs, grid)).unwrap();
        assert!(matches!(mz.step(), Err(GalchemError::Config(_))));
    }

    #[test]
    fn test_overflow_detected_before_integration() {
        let grid = TimeGrid::new(0.01, 0.1).unwrap();
        let mut config = MultizoneConfig::new("mz", zones(3), grid);
        config.gas_migration = GasMigration::rule(|_, _, t| if t > 0.05 { 0.6 } else { 0.1 });
        let mut mz = MultizoneCoordinator::new(config).unwrap();
        assert!(matches!(mz.run(), Err(GalchemError::MigrationOverflow { .. })));
        assert_eq!(mz.tick(), 0);
    }

    #[test]
    fn test_cancellation_stops_at_tick_boundary() {
        let grid = TimeGrid::new(0.01, 1.0).unwrap();
        let mut mz = MultizoneCoordinator::new(MultizoneConfig::new("mz", zones(2), grid)).unwrap();
        mz.initialize(None).unwrap();
        for _ in 0..7 {
            mz.step().unwrap();
        }
        mz.cancel_flag().cancel();
        let summary = mz.run().unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.ticks_completed, 7);
        for zone in mz.zones() {
            let last = zone.history().last().unwrap();
            assert!((last.time_gyr - 0.07).abs() < 1e-12);
        }
    }

    #[test]
    fn test_migrating_tracers_move_their_returns() {
        // stars born in zone 0 all end up in zone 1; zone 1 forms no stars
        let grid = TimeGrid::new(0.01, 0.5).unwrap();
        let mut zs = zones(2);
        zs[1].tau_star_gyr = Schedule::Constant(f64::INFINITY);
        zs[1].initial_gas_msun = 1.0e9;
        zs[1].rate_law = Schedule::Constant(0.0);
        for z in zs.iter_mut() {
            z.eta = Schedule::Constant(0.0);
        }
        let mut config = MultizoneConfig::new("mz", zs, grid);
        config.migration_mode = MigrationMode::Linear;
        config.fate = FateModel::custom(|_| Fate {
            final_zone: 1,
            z_height_kpc: None,
        });
        let mut mz = MultizoneCoordinator::new(config).unwrap();
        mz.run().unwrap();

        let zone1 = &mz.zones()[1];
        // returned gas raised zone 1 above its untouched reservoir
        assert!(zone1.state().gas_msun > 1.0e9);
        assert!(zone1.state().element_masses[0] > 0.0);
        assert!(zone1.state().stars_msun > 0.0);
        assert!(mz.tracers().iter().all(|t| t.final_zone == 1 && t.current_zone == 1));

        // no outflows: gas + stars = initial gas + 1 Msun/yr for 0.5 Gyr
        let total = mz.total_gas_msun() + mz.total_stars_msun();
        let expected = 7.0e9 + 0.5e9;
        assert!((total - expected).abs() < 1e-8 * expected, "total = {}", total);
    }

    #[test]
    fn test_gas_migration_moves_mass_between_zones() {
        let grid = TimeGrid::new(0.01, 0.3).unwrap();
        let mut zs = zones(2);
        for z in zs.iter_mut() {
            z.rate_law = Schedule::Constant(0.0);
            z.tau_star_gyr = Schedule::Constant(f64::INFINITY);
            z.recycling = RecyclingModel::Instantaneous(0.0);
        }
        zs[1].initial_gas_msun = 0.0;
        let mut matrix = MigrationMatrix::zeros(2);
        matrix.set(0, 1, 0.1).unwrap();
        let mut config = MultizoneConfig::new("mz", zs, grid);
        config.gas_migration = GasMigration::Static(matrix);
        let mut mz = MultizoneCoordinator::new(config).unwrap();
        mz.run().unwrap();

        let total = mz.total_gas_msun();
        assert!((total - 6.0e9).abs() < 1e-6 * 6.0e9);
        let expected_zone0 = 6.0e9 * 0.9f64.powi(30);
        assert!((mz.zones()[0].state().gas_msun - expected_zone0).abs() < 1e-6 * expected_zone0);
    }
}
