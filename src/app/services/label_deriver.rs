//! Binary failure-label derivation from yield records
//!
//! Two interchangeable strategies: a per-region z-score over productivity
//! (fine-grained weekly pipeline) and a status-text prefix rule for the
//! annual "conclusion" variant. Both degrade gracefully: rows whose label
//! cannot be derived are excluded, never fatal.

use crate::app::models::HarvestRecord;
use crate::constants::{
    STATUS_DECLINE_TOKEN, STATUS_DELTA_PATTERN, STATUS_INCREASE_TOKEN,
};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

/// A harvest record with its derived anomaly score and failure label
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledHarvest {
    /// Canonical region key
    pub region: String,
    pub year: i32,
    pub productivity: f64,
    pub harvested_area: f64,

    /// Standard deviations below/above the region's historical mean
    pub z_score: f64,

    /// 1 = harvest failure, 0 = normal
    pub label: u8,
}

/// Z-score labeling strategy for the weekly pipeline.
///
/// For each region, productivity is scored against that region's own
/// history using the sample mean and population standard deviation
/// (ddof = 0); rows more than `threshold` standard deviations below the
/// mean are failures.
#[derive(Debug, Clone)]
pub struct ZScoreLabeler {
    threshold: f64,
}

impl ZScoreLabeler {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Label every complete record, grouped per region.
    ///
    /// Regions whose productivity has zero spread (a single data point,
    /// or all values equal to the mean with zero variance) have undefined
    /// z-scores; their rows are excluded from the output rather than
    /// crashing or receiving a fabricated label.
    pub fn label(&self, records: &[HarvestRecord]) -> Vec<LabeledHarvest> {
        let mut by_region: BTreeMap<&str, Vec<&HarvestRecord>> = BTreeMap::new();
        for record in records.iter().filter(|record| record.is_complete()) {
            by_region.entry(record.region.as_str()).or_default().push(record);
        }

        let mut labeled = Vec::new();
        let mut excluded_regions = 0usize;

        for (region, rows) in by_region {
            let values: Vec<f64> = rows
                .iter()
                .map(|record| record.productivity.unwrap_or_default())
                .collect();
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            let variance = values
                .iter()
                .map(|value| (value - mean).powi(2))
                .sum::<f64>()
                / values.len() as f64;
            let std = variance.sqrt();

            if std == 0.0 {
                excluded_regions += 1;
                continue;
            }

            for record in rows {
                let productivity = record.productivity.unwrap_or_default();
                let z_score = (productivity - mean) / std;
                labeled.push(LabeledHarvest {
                    region: region.to_string(),
                    year: record.year,
                    productivity,
                    harvested_area: record.harvested_area.unwrap_or_default(),
                    z_score,
                    label: u8::from(z_score < self.threshold),
                });
            }
        }

        if excluded_regions > 0 {
            debug!(
                "Excluded {} regions with undefined z-scores (zero productivity spread)",
                excluded_regions
            );
        }

        labeled
    }
}

/// Label and tonnage delta derived from an annual status phrase
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusLabel {
    /// 1 iff the status declares a decline
    pub label: u8,

    /// Signed tonnage change parsed from the "(<number> TON)" substring;
    /// 0.0 when absent or unparseable
    pub delta_tons: f64,
}

static DELTA_PATTERN: OnceLock<regex::Regex> = OnceLock::new();

/// Status-text labeling strategy for the annual pipeline.
///
/// The label is 1 iff the case-folded, trimmed status starts with
/// "TURUN". The delta magnitude comes from a "(<number> TON)" substring
/// when present, with "," accepted as a decimal separator and the sign
/// applied by the direction word.
pub fn derive_status_label(status: &str) -> StatusLabel {
    let upper = status.trim().to_uppercase();
    let label = u8::from(upper.starts_with(STATUS_DECLINE_TOKEN));

    let pattern = DELTA_PATTERN
        .get_or_init(|| regex::Regex::new(STATUS_DELTA_PATTERN).expect("static pattern"));

    let delta_tons = pattern
        .captures(&upper)
        .and_then(|captures| captures.get(1))
        .and_then(|matched| matched.as_str().replace(',', ".").parse::<f64>().ok())
        .map(|magnitude| {
            if upper.contains(STATUS_DECLINE_TOKEN) {
                -magnitude.abs()
            } else if upper.contains(STATUS_INCREASE_TOKEN) {
                magnitude.abs()
            } else {
                magnitude
            }
        })
        .unwrap_or(0.0);

    StatusLabel { label, delta_tons }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(region: &str, year: i32, productivity: f64) -> HarvestRecord {
        HarvestRecord {
            region: region.to_string(),
            year,
            productivity: Some(productivity),
            harvested_area: Some(1000.0),
            production: None,
        }
    }

    #[test]
    fn severe_drop_is_labeled_a_failure() {
        let labeler = ZScoreLabeler::new(-1.5);
        let records = vec![
            record("Bandung", 2019, 100.0),
            record("Bandung", 2020, 100.0),
            record("Bandung", 2021, 100.0),
            record("Bandung", 2022, 10.0),
        ];

        let labeled = labeler.label(&records);
        assert_eq!(labeled.len(), 4);

        // mean 77.5, population std ~38.97; z for 10 is ~-1.732
        let drop = labeled.iter().find(|row| row.year == 2022).unwrap();
        assert!((drop.z_score - (-1.732)).abs() < 0.001);
        assert_eq!(drop.label, 1);

        // the three equal values sit above the mean with z ~ +0.577
        for row in labeled.iter().filter(|row| row.year != 2022) {
            assert_eq!(row.label, 0);
        }
    }

    #[test]
    fn equal_values_score_zero_when_spread_exists_elsewhere() {
        let labeler = ZScoreLabeler::new(-1.5);
        let records = vec![
            record("Bogor", 2019, 50.0),
            record("Bogor", 2020, 70.0),
            record("Bogor", 2021, 60.0),
        ];
        let labeled = labeler.label(&records);
        let middle = labeled.iter().find(|row| row.year == 2021).unwrap();
        assert!((middle.z_score).abs() < 1e-9);
        assert_eq!(middle.label, 0);
    }

    #[test]
    fn single_point_regions_are_excluded_not_fatal() {
        let labeler = ZScoreLabeler::new(-1.5);
        let labeled = labeler.label(&[record("Cianjur", 2022, 55.0)]);
        assert!(labeled.is_empty());
    }

    #[test]
    fn incomplete_records_are_skipped() {
        let labeler = ZScoreLabeler::new(-1.5);
        let mut incomplete = record("Bandung", 2020, 50.0);
        incomplete.harvested_area = None;
        let labeled = labeler.label(&[incomplete, record("Bandung", 2021, 60.0)]);
        // one complete record leaves zero spread, so the region drops out
        assert!(labeled.is_empty());
    }

    #[test]
    fn decline_status_with_decimal_delta() {
        let status = derive_status_label("TURUN (5.2 TON)");
        assert_eq!(status.label, 1);
        assert!((status.delta_tons - (-5.2)).abs() < 1e-9);
    }

    #[test]
    fn increase_status_keeps_positive_delta() {
        let status = derive_status_label("NAIK (3 TON)");
        assert_eq!(status.label, 0);
        assert!((status.delta_tons - 3.0).abs() < 1e-9);
    }

    #[test]
    fn stable_status_has_zero_delta() {
        let status = derive_status_label("STABIL");
        assert_eq!(status.label, 0);
        assert_eq!(status.delta_tons, 0.0);
    }

    #[test]
    fn comma_decimal_separator_is_accepted() {
        let status = derive_status_label("turun (12,75 ton)");
        assert_eq!(status.label, 1);
        assert!((status.delta_tons - (-12.75)).abs() < 1e-9);
    }
}
