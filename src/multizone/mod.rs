//! Multizone models: zones in lockstep, exchanging gas and stars.

pub mod coordinator;
pub mod migration;
pub mod tracer;

pub use coordinator::{MultizoneConfig, MultizoneCoordinator, TracerTracking};
pub use migration::{GasMigration, MigrationMatrix, MigrationRule};
pub use tracer::{Fate, FateFn, FateModel, FateQuery, MigrationMode, RadialMigration, TracerArena, TracerPopulation};
