//! Enrichment physics shared by every zone.
//!
//! This module holds the pieces that turn a star-formation history into
//! returned gas and newly produced elements:
//! - [`imf`]: initial mass functions
//! - [`lifetimes`]: mass–lifetime relations and remnant masses
//! - [`recycling`]: instantaneous vs. continuous return, CRF/MSMF tables
//! - [`dtd`]: normalized delay-time distributions
//! - [`kernel`]: per-lag weights of a cohort for a given timestep
//! - [`ledger`]: per-tick accumulators of future enrichment
//!
//! Tables and distributions are immutable once built and are shared between
//! zones through `Arc`.

pub mod dtd;
pub mod imf;
pub mod kernel;
pub mod ledger;
pub mod lifetimes;
pub mod recycling;

pub use dtd::{DelayTimeDistribution, DtdShape, DTD_HORIZON_GYR};
pub use imf::Imf;
pub use kernel::{ChannelYield, Cohort, EnrichmentKernel};
pub use ledger::{Ledger, LedgerEntry};
pub use lifetimes::{remnant_mass, MassLifetime};
pub use recycling::{PopulationTables, RecyclingModel, StellarPhysics};
