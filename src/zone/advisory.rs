//! Recoverable numerical conditions.
//!
//! A zone never fails because a rate law returned NaN once or an Euler step
//! overshot zero. The value is repaired, the occurrence is counted here, and a
//! warning is logged the first time each kind shows up in a zone.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Kinds of recoverable conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryKind {
    /// A rate law or parameter function returned NaN or ±inf
    NonFiniteRate,
    /// A rate law returned a negative value where none is allowed
    NegativeRate,
    /// Gas mass went negative and was set to zero
    NegativeGasClipped,
    /// An element mass went negative and was set to zero
    NegativeElementClipped,
    /// Element masses summed to more than the gas mass and were rescaled
    ElementsExceedGas,
    /// In sfr or gas mode the mass budget implied a negative infall rate
    NegativeInferredInfall,
    /// A log abundance ratio had a zero denominator or numerator
    UndefinedLogRatio,
}

impl AdvisoryKind {
    pub fn description(&self) -> &'static str {
        match self {
            AdvisoryKind::NonFiniteRate => "non-finite rate-law value replaced by zero",
            AdvisoryKind::NegativeRate => "negative rate-law value replaced by zero",
            AdvisoryKind::NegativeGasClipped => "negative gas mass clipped to zero",
            AdvisoryKind::NegativeElementClipped => "negative element mass clipped to zero",
            AdvisoryKind::ElementsExceedGas => "element masses rescaled to the gas mass",
            AdvisoryKind::NegativeInferredInfall => "inferred infall rate is negative",
            AdvisoryKind::UndefinedLogRatio => "log ratio undefined, floor value used",
        }
    }
}

impl fmt::Display for AdvisoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Aggregate of one kind
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AdvisoryRecord {
    pub count: u64,
    pub first_time_gyr: f64,
    pub last_time_gyr: f64,
}

/// Per-zone advisory counts
#[derive(Debug, Clone, Default, Serialize)]
pub struct Advisories {
    zone: String,
    records: BTreeMap<AdvisoryKind, AdvisoryRecord>,
}

impl Advisories {
    pub fn new(zone: impl Into<String>) -> Self {
        Self {
            zone: zone.into(),
            records: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, kind: AdvisoryKind, time_gyr: f64) {
        match self.records.get_mut(&kind) {
            Some(record) => {
                record.count += 1;
                record.last_time_gyr = time_gyr;
            }
            None => {
                log::warn!("zone '{}' at t = {:.4} Gyr: {}", self.zone, time_gyr, kind);
                self.records.insert(
                    kind,
                    AdvisoryRecord {
                        count: 1,
                        first_time_gyr: time_gyr,
                        last_time_gyr: time_gyr,
                    },
                );
            }
        }
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    pub fn count(&self, kind: AdvisoryKind) -> u64 {
        self.records.get(&kind).map_or(0, |r| r.count)
    }

    pub fn total(&self) -> u64 {
        self.records.values().map(|r| r.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AdvisoryKind, &AdvisoryRecord)> {
        self.records.iter().map(|(k, r)| (*k, r))
    }

    /// Post-run summary through the log
    pub fn log_summary(&self) {
        for (kind, record) in &self.records {
            log::warn!(
                "zone '{}': {} x {} (t = {:.4} to {:.4} Gyr)",
                self.zone,
                record.count,
                kind,
                record.first_time_gyr,
                record.last_time_gyr
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_aggregate_per_kind() {
        let mut advisories = Advisories::new("zone0");
        assert!(advisories.is_empty());
        advisories.record(AdvisoryKind::NegativeGasClipped, 0.5);
        advisories.record(AdvisoryKind::NegativeGasClipped, 0.7);
        advisories.record(AdvisoryKind::NonFiniteRate, 1.0);

        assert_eq!(advisories.count(AdvisoryKind::NegativeGasClipped), 2);
        assert_eq!(advisories.count(AdvisoryKind::ElementsExceedGas), 0);
        assert_eq!(advisories.total(), 3);

        let (_, record) = advisories
            .iter()
            .find(|(k, _)| *k == AdvisoryKind::NegativeGasClipped)
            .unwrap();
        assert_eq!(record.first_time_gyr, 0.5);
        assert_eq!(record.last_time_gyr, 0.7);
    }
}
