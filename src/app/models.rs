//! Data models for harvest-failure prediction
//!
//! This module contains the core data structures for weather-event and
//! harvest-yield records, plus the prediction outcome types exposed to
//! external collaborators (the serving layer and the recommendation
//! generator).

use crate::constants::HIGH_RISK_PROBABILITY;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

// =============================================================================
// Source Records
// =============================================================================

/// One daily weather-event observation for a region.
///
/// Immutable after load. `events` and `impacts` hold the raw delimited
/// free text exactly as sourced; tokenization happens in the encoder so
/// the raw slice handed to the recommendation layer is unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    /// Region name as it appears in the source (not canonicalized)
    pub region: String,

    /// Calendar date of the observation
    pub date: NaiveDate,

    /// Delimited extreme-weather event text, e.g. "Hujan Lebat, Petir"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<String>,

    /// Delimited impact text, e.g. "Banjir / Tanah Longsor"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impacts: Option<String>,

    /// Optional numeric metrics located via the schema mapping
    /// (temperature, humidity, rainfall, wind)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, f64>,
}

/// One harvest-yield record for a region and year.
///
/// Numeric fields arrive as locale-formatted strings ("54 987,79") and are
/// parsed at load time; unparseable values degrade to `None` and the
/// record is dropped before labeling rather than aborting the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestRecord {
    /// Region name as it appears in the source
    pub region: String,

    /// Harvest year
    pub year: i32,

    /// Rice productivity in quintal per hectare
    pub productivity: Option<f64>,

    /// Harvested area in hectares
    pub harvested_area: Option<f64>,

    /// Total production in tons; label-adjacent, never a feature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production: Option<f64>,
}

impl HarvestRecord {
    /// Whether the record carries both numeric fields the pipeline needs
    pub fn is_complete(&self) -> bool {
        self.productivity.is_some() && self.harvested_area.is_some()
    }
}

/// One row of the annual "conclusion" dataset variant: a yearly yield
/// total plus a status phrase and a free-text weather summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnualOutcomeRecord {
    /// Region name as it appears in the source
    pub region: String,

    /// Outcome year
    pub year: i32,

    /// Yield total in tons
    pub yield_tons: f64,

    /// Status phrase, e.g. "TURUN (5.2 TON)" or "STABIL"
    pub status_text: String,

    /// Combined weather/impact summary text ("<events> | <impacts>")
    pub weather_info: Option<String>,
}

// =============================================================================
// Prediction Outcomes
// =============================================================================

/// Binary classification of a prediction against the bundle threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionLabel {
    /// Probability at or above the threshold
    Failure,
    /// Probability below the threshold
    Normal,
}

impl PredictionLabel {
    pub fn from_probability(probability: f32, threshold: f32) -> Self {
        if probability >= threshold {
            Self::Failure
        } else {
            Self::Normal
        }
    }
}

/// Coarse risk banding reported alongside the raw probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// High at or above the fixed high-risk bound, medium at or above the
    /// bundle threshold, low otherwise
    pub fn from_probability(probability: f32, threshold: f32) -> Self {
        if probability >= HIGH_RISK_PROBABILITY {
            Self::High
        } else if probability >= threshold {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// How far the probability sits from the decision threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Medium,
    High,
}

impl Confidence {
    pub fn from_probability(probability: f32, threshold: f32) -> Self {
        if (probability - threshold).abs() > 0.2 {
            Self::High
        } else {
            Self::Medium
        }
    }
}

/// Result of a single-region prediction.
///
/// The recommendation layer consumes `probability` plus the raw slices
/// only; it never touches the scaler or windowing internals.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionOutcome {
    /// Region name as requested by the caller
    pub region: String,

    /// Failure probability from the sequence classifier, in [0, 1]
    pub probability: f32,

    /// Decision threshold stored in the artifact bundle
    pub threshold: f32,

    /// Classification of `probability` against `threshold`
    pub label: PredictionLabel,

    /// Coarse risk banding
    pub risk_level: RiskLevel,

    /// Distance-from-threshold confidence band
    pub confidence: Confidence,

    /// Probabilities for every window of the region's history, most
    /// recent last; diagnostic view behind the headline probability
    pub window_probabilities: Vec<f32>,

    /// Raw weather rows used for this prediction, for the explanation layer
    pub weather_slice: Vec<WeatherRecord>,

    /// Raw harvest rows used for this prediction, for the explanation layer
    pub harvest_slice: Vec<HarvestRecord>,
}

/// One slot of a batch prediction: either an outcome or an error message,
/// never a propagated panic or raw stack trace
#[derive(Debug, Clone, Serialize)]
pub struct BatchPredictionEntry {
    /// Region as requested
    pub region: String,

    /// Prediction when the region succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction: Option<PredictionOutcome>,

    /// Error description when it did not
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchPredictionEntry {
    pub fn success(prediction: PredictionOutcome) -> Self {
        Self {
            region: prediction.region.clone(),
            prediction: Some(prediction),
            error: None,
        }
    }

    pub fn failure(region: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            prediction: None,
            error: Some(error.into()),
        }
    }
}

// =============================================================================
// Parsing Helpers
// =============================================================================

static WHITESPACE: OnceLock<regex::Regex> = OnceLock::new();

/// Parse a locale-formatted numeric string such as "54 987,79" into a
/// float. Whitespace (including grouping spaces) is removed and the comma
/// decimal separator replaced; `None` for anything that still fails to
/// parse, per the ParseWarning policy.
pub fn parse_locale_number(raw: &str) -> Option<f64> {
    let pattern = WHITESPACE.get_or_init(|| regex::Regex::new(r"\s").expect("static pattern"));
    let cleaned = pattern.replace_all(raw, "").replace(',', ".");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// Parse a numeric string using Indonesian digit grouping, where "." groups
/// thousands and "," marks decimals ("12.345,67" → 12345.67). Used by the
/// annual dataset whose yield totals arrive in this form.
pub fn parse_grouped_number(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace('.', "").replace(',', ".");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// Parse a source date, accepting ISO (`2023-01-15`) and day-first
/// (`15/01/2023`) forms. `None` for unparseable input.
pub fn parse_flexible_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%d/%m/%Y"))
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%d-%m-%Y"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_grouped_locale_number() {
        assert_eq!(parse_locale_number("54 987,79"), Some(54987.79));
        assert_eq!(parse_locale_number("5,82"), Some(5.82));
        assert_eq!(parse_locale_number("1200"), Some(1200.0));
    }

    #[test]
    fn malformed_numbers_degrade_to_none() {
        assert_eq!(parse_locale_number(""), None);
        assert_eq!(parse_locale_number("n/a"), None);
        assert_eq!(parse_locale_number("12,3,4"), None);
    }

    #[test]
    fn parses_grouped_indonesian_numbers() {
        assert_eq!(parse_grouped_number("12.345,67"), Some(12345.67));
        assert_eq!(parse_grouped_number("850"), Some(850.0));
        assert_eq!(parse_grouped_number(""), None);
    }

    #[test]
    fn parses_iso_and_day_first_dates() {
        let expected = NaiveDate::from_ymd_opt(2023, 1, 15).unwrap();
        assert_eq!(parse_flexible_date("2023-01-15"), Some(expected));
        assert_eq!(parse_flexible_date("15/01/2023"), Some(expected));
        assert_eq!(parse_flexible_date("15-01-2023"), Some(expected));
        assert_eq!(parse_flexible_date("not a date"), None);
    }

    #[test]
    fn risk_level_banding_matches_threshold() {
        assert_eq!(RiskLevel::from_probability(0.75, 0.5), RiskLevel::High);
        assert_eq!(RiskLevel::from_probability(0.55, 0.5), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_probability(0.2, 0.5), RiskLevel::Low);
    }

    #[test]
    fn prediction_label_uses_inclusive_threshold() {
        assert_eq!(
            PredictionLabel::from_probability(0.5, 0.5),
            PredictionLabel::Failure
        );
        assert_eq!(
            PredictionLabel::from_probability(0.49, 0.5),
            PredictionLabel::Normal
        );
    }
}
