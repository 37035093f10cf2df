//! Stellar metallicity distribution functions.
//!
//! Each step's newly formed stars are binned by the [X/H] and [X/Y] of the
//! gas they formed from, weighted by their mass. Histograms are normalized
//! to unit area when read.

use crate::elements::log_ratio;

/// One histogram per [X/H], then one per [X/Y] for every pair x < y
#[derive(Debug, Clone)]
pub struct MetallicityDistribution {
    bins: Vec<f64>,
    labels: Vec<String>,
    counts: Vec<Vec<f64>>,
    pairs: Vec<(usize, usize)>,
    n_elements: usize,
}

impl MetallicityDistribution {
    /// `bins` must already be validated as strictly increasing
    pub fn new(symbols: &[String], bins: Vec<f64>) -> Self {
        let n = symbols.len();
        let mut labels: Vec<String> = symbols.iter().map(|s| format!("dN/d[{}/H]", s)).collect();
        let mut pairs = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                labels.push(format!("dN/d[{}/{}]", symbols[i], symbols[j]));
                pairs.push((i, j));
            }
        }
        let n_bins = bins.len().saturating_sub(1);
        Self {
            counts: vec![vec![0.0; n_bins]; labels.len()],
            bins,
            labels,
            pairs,
            n_elements: n,
        }
    }

    pub fn bins(&self) -> &[f64] {
        &self.bins
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Add `weight` Msun of stars formed at the given abundances.
    ///
    /// Returns `false` when some ratio was undefined (zero abundance) and the
    /// corresponding histogram skipped the contribution.
    pub fn record(&mut self, abundances: &[f64], solar: &[f64], weight: f64) -> bool {
        if weight <= 0.0 {
            return true;
        }
        let mut all_defined = true;
        let mut x_h = Vec::with_capacity(self.n_elements);
        for (i, (&z, &zs)) in abundances.iter().zip(solar).enumerate() {
            let value = log_ratio(z, zs);
            if let Some(v) = value {
                add(&self.bins, &mut self.counts[i], v, weight);
            } else {
                all_defined = false;
            }
            x_h.push(value);
        }
        for (p, &(i, j)) in self.pairs.iter().enumerate() {
            match (x_h[i], x_h[j]) {
                (Some(a), Some(b)) => {
                    add(&self.bins, &mut self.counts[self.n_elements + p], a - b, weight)
                }
                _ => all_defined = false,
            }
        }
        all_defined
    }

    /// Histograms normalized to unit area; empty ones stay zero
    pub fn normalized(&self) -> Vec<Vec<f64>> {
        self.counts
            .iter()
            .map(|counts| {
                let total: f64 = counts.iter().sum();
                counts
                    .iter()
                    .zip(self.bins.windows(2))
                    .map(|(c, w)| if total > 0.0 { c / (total * (w[1] - w[0])) } else { 0.0 })
                    .collect()
            })
            .collect()
    }
}

/// Values outside the bin range are dropped
fn add(bins: &[f64], counts: &mut [f64], value: f64, weight: f64) {
    let n = bins.len();
    if n < 2 || value < bins[0] || value >= bins[n - 1] {
        return;
    }
    let i = bins.partition_point(|&edge| edge <= value) - 1;
    counts[i] += weight;
}
