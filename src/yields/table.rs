//! Mass × metallicity yield grids with bilinear interpolation.

use crate::error::{GalchemError, Result};

/// Net fractional yields of one element on a (stellar mass, metallicity) grid.
///
/// Values are stored row-major: `values[i_mass * n_z + i_z]`. Lookups inside
/// the grid interpolate bilinearly; lookups outside extrapolate linearly from
/// the two nearest grid lines on each axis.
#[derive(Debug, Clone, PartialEq)]
pub struct YieldTable {
    masses_msun: Vec<f64>,
    metallicities: Vec<f64>,
    values: Vec<f64>,
}

impl YieldTable {
    /// Build a table from its axes and a row-major grid of yields.
    ///
    /// Both axes must be strictly increasing and finite. An axis with a single
    /// entry is allowed; the table is then constant along it.
    pub fn new(masses_msun: Vec<f64>, metallicities: Vec<f64>, values: Vec<f64>) -> Result<Self> {
        check_axis("mass", &masses_msun)?;
        check_axis("metallicity", &metallicities)?;
        if values.len() != masses_msun.len() * metallicities.len() {
            return Err(GalchemError::config(format!(
                "yield grid has {} values, expected {} x {}",
                values.len(),
                masses_msun.len(),
                metallicities.len()
            )));
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(GalchemError::config(format!("non-finite yield {} in table", bad)));
        }
        Ok(Self {
            masses_msun,
            metallicities,
            values,
        })
    }

    /// Build a table from rows, one per mass, each holding one yield per metallicity
    pub fn from_rows(masses_msun: Vec<f64>, metallicities: Vec<f64>, rows: Vec<Vec<f64>>) -> Result<Self> {
        if rows.iter().any(|r| r.len() != metallicities.len()) {
            return Err(GalchemError::config("yield table rows must match the metallicity axis"));
        }
        Self::new(masses_msun, metallicities, rows.into_iter().flatten().collect())
    }

    pub fn masses(&self) -> &[f64] {
        &self.masses_msun
    }

    pub fn metallicities(&self) -> &[f64] {
        &self.metallicities
    }

    /// Tabulated value at grid node (i_mass, i_z)
    pub fn node(&self, i_mass: usize, i_z: usize) -> f64 {
        self.values[i_mass * self.metallicities.len() + i_z]
    }

    /// Interpolated (or extrapolated) yield at `mass_msun`, `metallicity`.
    ///
    /// Written as `(1 - t) * a + t * b` on both axes so that a query exactly at
    /// a node returns the tabulated value bit for bit.
    pub fn interpolate(&self, mass_msun: f64, metallicity: f64) -> f64 {
        let (im, tm) = bracket(&self.masses_msun, mass_msun);
        let (iz, tz) = bracket(&self.metallicities, metallicity);

        let along_z = |i_mass: usize| -> f64 {
            match iz {
                None => self.node(i_mass, 0),
                Some(j) => lerp(self.node(i_mass, j), self.node(i_mass, j + 1), tz),
            }
        };

        match im {
            None => along_z(0),
            Some(i) => lerp(along_z(i), along_z(i + 1), tm),
        }
    }
}

fn check_axis(name: &str, axis: &[f64]) -> Result<()> {
    if axis.is_empty() {
        return Err(GalchemError::config(format!("yield table {} axis is empty", name)));
    }
    if axis.iter().any(|x| !x.is_finite()) {
        return Err(GalchemError::config(format!("yield table {} axis has non-finite entries", name)));
    }
    if axis.windows(2).any(|w| w[1] <= w[0]) {
        return Err(GalchemError::config(format!(
            "yield table {} axis must be strictly increasing",
            name
        )));
    }
    Ok(())
}

/// Lower index of the segment used for `x` and the fractional position in it.
/// `None` for single-node axes. The fraction falls outside [0, 1] when `x`
/// lies beyond the axis ends.
fn bracket(axis: &[f64], x: f64) -> (Option<usize>, f64) {
    let n = axis.len();
    if n < 2 {
        return (None, 0.0);
    }
    // first index with axis[i] > x, minus one, kept inside [0, n - 2]
    let upper = axis.partition_point(|&a| a <= x);
    let i = upper.saturating_sub(1).min(n - 2);
    let t = (x - axis[i]) / (axis[i + 1] - axis[i]);
    (Some(i), t)
}

#[inline]
fn lerp(a: f64, b: f64, t: f64) -> f64 {
    (1.0 - t) * a + t * b
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> YieldTable {
        YieldTable::from_rows(
            vec![1.0, 2.0, 4.0],
            vec![0.001, 0.01, 0.02],
            vec![
                vec![1e-4, 2e-4, 3e-4],
                vec![-1e-4, 5e-4, 7e-4],
                vec![4e-4, 6e-4, 9e-4],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_nodes_are_reproduced_exactly() {
        let table = sample_table();
        for (i, &m) in table.masses().iter().enumerate() {
            for (j, &z) in table.metallicities().iter().enumerate() {
                assert_eq!(table.interpolate(m, z), table.node(i, j));
            }
        }
    }

    #[test]
    fn test_midpoint_is_bilinear_average() {
        let table = sample_table();
        let v = table.interpolate(1.5, 0.0055);
        let expected = 0.25 * (1e-4 + 2e-4 + -1e-4 + 5e-4);
        assert!((v - expected).abs() < 1e-15);
    }

    #[test]
    fn test_extrapolates_linearly_beyond_grid() {
        let table = sample_table();
        // Above the top mass, along z = 0.001: slope (4e-4 - -1e-4) / 2 per Msun
        let v = table.interpolate(6.0, 0.001);
        assert!((v - (4e-4 + 2.0 * 2.5e-4)).abs() < 1e-12);
        // Below the lowest metallicity, along m = 1
        let v = table.interpolate(1.0, 0.0);
        let slope = (2e-4 - 1e-4) / 0.009;
        assert!((v - (1e-4 - 0.001 * slope)).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_bad_axes() {
        assert!(YieldTable::new(vec![2.0, 1.0], vec![0.01], vec![0.0, 0.0]).is_err());
        assert!(YieldTable::new(vec![1.0, 2.0], vec![0.01], vec![0.0]).is_err());
        assert!(YieldTable::new(vec![], vec![0.01], vec![]).is_err());
    }

    #[test]
    fn test_single_metallicity_axis() {
        let table = YieldTable::new(vec![1.0, 3.0], vec![0.014], vec![0.0, 2.0]).unwrap();
        assert!((table.interpolate(2.0, 0.5) - 1.0).abs() < 1e-15);
    }
}
