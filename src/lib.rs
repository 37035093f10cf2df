//! galchem - galactic chemical evolution engine
//!
//! Integrates the gas, stellar and elemental mass budgets of one-zone models
//! and of multizone models whose stellar populations migrate radially,
//! carrying their delayed enrichment with them.

pub mod config;
pub mod elements;
pub mod enrichment;
pub mod error;
pub mod export;
pub mod multizone;
pub mod run;
pub mod singlezone;
pub mod yields;
pub mod zone;

pub use config::Parameters;
pub use error::{GalchemError, Result};
pub use multizone::{GasMigration, MigrationMatrix, MigrationMode, MultizoneConfig, MultizoneCoordinator};
pub use run::{CancelFlag, RunSummary};
pub use singlezone::SingleZone;
pub use yields::{ElementYields, YieldSetting, YieldTable};
pub use zone::{RateMode, Schedule, TimeGrid, ZoneConfig, ZoneStepper};
