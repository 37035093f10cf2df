//! Gas migration between zones.
//!
//! Element `[i][j]` of a [`MigrationMatrix`] is the fraction of zone i's gas
//! that moves to zone j during one step. Gas carries its elements with it at
//! the source zone's abundances, so every exchange conserves the total gas
//! and element mass of the galaxy.

use std::fmt;
use std::sync::Arc;

use crate::error::{GalchemError, Result};
use crate::zone::TimeGrid;

/// Tolerance on the sum of outgoing fractions
const OVERFLOW_TOLERANCE: f64 = 1e-12;

/// Square matrix of per-step gas transfer fractions
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationMatrix {
    n_zones: usize,
    fractions: Vec<f64>,
}

impl MigrationMatrix {
    /// No migration
    pub fn zeros(n_zones: usize) -> Self {
        Self {
            n_zones,
            fractions: vec![0.0; n_zones * n_zones],
        }
    }

    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let n_zones = rows.len();
        let mut matrix = Self::zeros(n_zones);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != n_zones {
                return Err(GalchemError::config(format!(
                    "migration matrix row {} has {} entries, expected {}",
                    i,
                    row.len(),
                    n_zones
                )));
            }
            for (j, value) in row.into_iter().enumerate() {
                if i == j {
                    if value != 0.0 {
                        return Err(GalchemError::config(format!(
                            "migration matrix diagonal entry {} must be zero",
                            i
                        )));
                    }
                    continue;
                }
                matrix.set(i, j, value)?;
            }
        }
        Ok(matrix)
    }

    pub fn n_zones(&self) -> usize {
        self.n_zones
    }

    /// Set the fraction of `from`'s gas moving to `to` per step
    pub fn set(&mut self, from: usize, to: usize, fraction: f64) -> Result<()> {
        if from >= self.n_zones || to >= self.n_zones {
            return Err(GalchemError::config(format!(
                "migration between zones {} and {} out of range for {} zones",
                from, to, self.n_zones
            )));
        }
        if from == to {
            return Err(GalchemError::config("a zone cannot migrate gas to itself"));
        }
        if !(0.0..=1.0).contains(&fraction) {
            return Err(GalchemError::config(format!(
                "migration fraction {} from zone {} to {} must lie in [0, 1]",
                fraction, from, to
            )));
        }
        self.fractions[from * self.n_zones + to] = fraction;
        Ok(())
    }

    #[inline]
    pub fn get(&self, from: usize, to: usize) -> f64 {
        self.fractions[from * self.n_zones + to]
    }

    /// Total fraction of zone `from`'s gas leaving it per step
    pub fn outgoing(&self, from: usize) -> f64 {
        self.fractions[from * self.n_zones..(from + 1) * self.n_zones]
            .iter()
            .sum()
    }

    pub fn is_zero(&self) -> bool {
        self.fractions.iter().all(|&f| f == 0.0)
    }

    /// Entries must be finite fractions and no zone may lose more than all
    /// of its gas
    pub fn validate(&self, step: usize) -> Result<()> {
        for i in 0..self.n_zones {
            for j in 0..self.n_zones {
                let f = self.get(i, j);
                if !(0.0..=1.0).contains(&f) {
                    return Err(GalchemError::config(format!(
                        "migration fraction {} from zone {} to {} at step {} must lie in [0, 1]",
                        f, i, j, step
                    )));
                }
            }
            let total = self.outgoing(i);
            if total > 1.0 + OVERFLOW_TOLERANCE {
                return Err(GalchemError::MigrationOverflow { zone: i, step, total });
            }
        }
        Ok(())
    }

    /// Move gas and elements between zones.
    ///
    /// Outgoing amounts are computed from the masses before the exchange, so
    /// the result does not depend on zone order.
    pub fn apply(&self, gas: &mut [f64], elements: &mut [Vec<f64>]) {
        debug_assert_eq!(gas.len(), self.n_zones);
        if self.is_zero() {
            return;
        }
        let before_gas = gas.to_vec();
        let before_elements = elements.to_vec();
        for i in 0..self.n_zones {
            for j in 0..self.n_zones {
                let f = self.get(i, j);
                if f == 0.0 {
                    continue;
                }
                let moved = f * before_gas[i];
                gas[i] -= moved;
                gas[j] += moved;
                for e in 0..before_elements[i].len() {
                    let moved = f * before_elements[i][e];
                    elements[i][e] -= moved;
                    elements[j][e] += moved;
                }
            }
        }
        // rounding can leave -1e-16 behind when a zone empties
        for g in gas.iter_mut() {
            *g = g.max(0.0);
        }
        for zone in elements.iter_mut() {
            for m in zone.iter_mut() {
                *m = m.max(0.0);
            }
        }
    }
}

/// Fraction of gas moving `from -> to` per step at a given time (Gyr)
pub type MigrationRule = Arc<dyn Fn(usize, usize, f64) -> f64 + Send + Sync>;

/// Where the per-step migration matrix comes from
#[derive(Clone, Default)]
pub enum GasMigration {
    #[default]
    None,
    /// Same matrix every step
    Static(MigrationMatrix),
    /// One matrix per step; the last one holds for any remaining steps
    PerStep(Vec<MigrationMatrix>),
    /// Evaluated once per step for every ordered pair of distinct zones
    Rule(MigrationRule),
}

impl fmt::Debug for GasMigration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GasMigration::None => f.write_str("None"),
            GasMigration::Static(m) => write!(f, "Static({} zones)", m.n_zones()),
            GasMigration::PerStep(ms) => write!(f, "PerStep({} matrices)", ms.len()),
            GasMigration::Rule(_) => f.write_str("Rule(<fn>)"),
        }
    }
}

impl GasMigration {
    pub fn rule<F>(f: F) -> Self
    where
        F: Fn(usize, usize, f64) -> f64 + Send + Sync + 'static,
    {
        GasMigration::Rule(Arc::new(f))
    }

    /// Matrix in effect during `step`
    pub fn matrix_at(&self, n_zones: usize, step: usize, time_gyr: f64) -> Result<MigrationMatrix> {
        let matrix = match self {
            GasMigration::None => MigrationMatrix::zeros(n_zones),
            GasMigration::Static(m) => m.clone(),
            GasMigration::PerStep(ms) => match ms.get(step).or_else(|| ms.last()) {
                Some(m) => m.clone(),
                None => MigrationMatrix::zeros(n_zones),
            },
            GasMigration::Rule(rule) => {
                let mut m = MigrationMatrix::zeros(n_zones);
                for i in 0..n_zones {
                    for j in 0..n_zones {
                        if i != j {
                            // raw write so validation can report the value
                            m.fractions[i * n_zones + j] = rule(i, j, time_gyr);
                        }
                    }
                }
                m
            }
        };
        if matrix.n_zones() != n_zones {
            return Err(GalchemError::config(format!(
                "migration matrix covers {} zones but the model has {}",
                matrix.n_zones(),
                n_zones
            )));
        }
        Ok(matrix)
    }

    /// Check every step of the run before integration starts
    pub fn validate(&self, n_zones: usize, grid: &TimeGrid) -> Result<()> {
        match self {
            GasMigration::None => Ok(()),
            GasMigration::Static(_) => self.matrix_at(n_zones, 0, 0.0)?.validate(0),
            GasMigration::PerStep(ms) => {
                for step in 0..ms.len().min(grid.n_steps()).max(1) {
                    self.matrix_at(n_zones, step, grid.time(step))?.validate(step)?;
                }
                Ok(())
            }
            GasMigration::Rule(_) => {
                for step in 0..grid.n_steps() {
                    self.matrix_at(n_zones, step, grid.time(step))?.validate(step)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_conserves_mass() {
        let mut m = MigrationMatrix::zeros(3);
        m.set(0, 1, 0.2).unwrap();
        m.set(1, 2, 0.5).unwrap();
        m.set(2, 0, 0.1).unwrap();
        let mut gas = vec![100.0, 50.0, 10.0];
        let mut elements = vec![vec![1.0, 0.1], vec![0.5, 0.05], vec![0.2, 0.0]];
        let total_gas: f64 = gas.iter().sum();
        let total_e0: f64 = elements.iter().map(|e| e[0]).sum();

        m.apply(&mut gas, &mut elements);
        assert!((gas.iter().sum::<f64>() - total_gas).abs() < 1e-12);
        assert!((elements.iter().map(|e| e[0]).sum::<f64>() - total_e0).abs() < 1e-12);
        assert!((gas[0] - (80.0 + 1.0)).abs() < 1e-12);
        assert!((gas[1] - (25.0 + 20.0)).abs() < 1e-12);
        // abundances travel with the gas
        assert!((elements[1][0] - (0.25 + 0.2)).abs() < 1e-12);
    }

    #[test]
    fn test_overflow_detected() {
        let mut m = MigrationMatrix::zeros(3);
        m.set(0, 1, 0.7).unwrap();
        m.set(0, 2, 0.4).unwrap();
        match m.validate(4) {
            Err(GalchemError::MigrationOverflow { zone, step, total }) => {
                assert_eq!(zone, 0);
                assert_eq!(step, 4);
                assert!((total - 1.1).abs() < 1e-12);
            }
            other => panic!("expected overflow, got {:?}", other),
        }
    }

    #[test]
    fn test_rule_validated_at_every_step() {
        let grid = TimeGrid::new(0.1, 1.0).unwrap();
        let ok = GasMigration::rule(|i, j, _| if j == i + 1 { 0.1 } else { 0.0 });
        assert!(ok.validate(3, &grid).is_ok());

        // overflows only late in the run
        let late = GasMigration::rule(|i, _, t| if i == 1 && t > 0.55 { 0.6 } else { 0.0 });
        match late.validate(3, &grid) {
            Err(GalchemError::MigrationOverflow { zone, step, .. }) => {
                assert_eq!(zone, 1);
                assert_eq!(step, 6);
            }
            other => panic!("expected overflow, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_entries_rejected() {
        let mut m = MigrationMatrix::zeros(2);
        assert!(m.set(0, 0, 0.1).is_err());
        assert!(m.set(0, 1, -0.1).is_err());
        assert!(m.set(0, 2, 0.1).is_err());
        assert!(MigrationMatrix::from_rows(vec![vec![0.0, 0.5], vec![0.5]]).is_err());

        let nan = GasMigration::rule(|_, _, _| f64::NAN);
        let grid = TimeGrid::new(0.1, 0.5).unwrap();
        assert!(matches!(nan.validate(2, &grid), Err(GalchemError::Config(_))));
    }

    #[test]
    fn test_per_step_holds_last_matrix() {
        let a = MigrationMatrix::from_rows(vec![vec![0.0, 0.1], vec![0.0, 0.0]]).unwrap();
        let b = MigrationMatrix::from_rows(vec![vec![0.0, 0.0], vec![0.3, 0.0]]).unwrap();
        let source = GasMigration::PerStep(vec![a.clone(), b.clone()]);
        assert_eq!(source.matrix_at(2, 0, 0.0).unwrap(), a);
        assert_eq!(source.matrix_at(2, 7, 0.7).unwrap(), b);
        assert!(source.matrix_at(3, 0, 0.0).is_err());
    }
}
