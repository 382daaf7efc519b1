//! Annual "conclusion" dataset preparation
//!
//! Converts raw annual outcome rows (yearly yield totals with free-text
//! status and weather summaries) into a structured dataset: status-derived
//! labels and deltas, keyword-count weather features, and occurrence
//! totals. The processed rows feed the annual pipeline variant (Period =
//! year) and can be exported as CSV plus a summary JSON.

use crate::app::models::AnnualOutcomeRecord;
use crate::app::services::feature_matrix::FeatureFrame;
use crate::app::services::label_deriver::derive_status_label;
use crate::constants::{
    ANNUAL_EVENT_KEYWORDS, ANNUAL_IMPACT_KEYWORDS, ANNUAL_OCCURRENCE_PATTERN,
};
use crate::{Error, Result};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use tracing::info;

/// One processed annual row: label, delta, and keyword-count features
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedAnnualRow {
    pub region: String,
    pub year: i32,
    pub yield_tons: f64,
    pub status_text: String,

    /// 1 iff the status declares a decline
    pub label: u8,

    /// Signed tonnage delta parsed from the status
    pub delta_tons: f64,

    /// Total "(Nx)" event occurrences in the weather segment
    pub total_events: u32,

    /// Total "(Nx)" occurrences in the impact segment
    pub total_impacts: u32,

    /// Keyword counts aligned with [`annual_feature_columns`]
    pub keyword_counts: Vec<u32>,
}

/// Deduplicated keyword feature column names, events first then impacts,
/// in declaration order
pub fn annual_feature_columns() -> Vec<String> {
    let mut columns = Vec::new();
    for (_, column) in ANNUAL_EVENT_KEYWORDS.iter().chain(ANNUAL_IMPACT_KEYWORDS) {
        if !columns.contains(&column.to_string()) {
            columns.push(column.to_string());
        }
    }
    columns
}

static OCCURRENCE_PATTERN: OnceLock<regex::Regex> = OnceLock::new();

/// Sum the "(Nx)" occurrence multipliers embedded in a summary segment
pub fn count_occurrence_tokens(text: &str) -> u32 {
    let pattern = OCCURRENCE_PATTERN
        .get_or_init(|| regex::Regex::new(ANNUAL_OCCURRENCE_PATTERN).expect("static pattern"));
    pattern
        .captures_iter(text)
        .filter_map(|captures| captures.get(1))
        .filter_map(|matched| matched.as_str().parse::<u32>().ok())
        .sum()
}

/// Count keyword matches per feature column over one summary segment.
///
/// Overlapping keywords mapping to the same column (the flood variants)
/// contribute the maximum of their individual match counts, so a phrase
/// containing one variant is never counted as zero because a sibling
/// variant is absent.
fn count_keywords(
    text: &str,
    keywords: &[(&str, &str)],
    columns: &[String],
    counts: &mut [u32],
) {
    let lowered = text.to_lowercase();
    for (keyword, column) in keywords {
        let matches = lowered.matches(keyword).count() as u32;
        if let Some(position) = columns.iter().position(|name| name == column) {
            counts[position] = counts[position].max(matches);
        }
    }
}

/// Process raw annual outcome rows into the structured dataset
pub fn process_outcomes(records: &[AnnualOutcomeRecord]) -> Vec<ProcessedAnnualRow> {
    let columns = annual_feature_columns();

    let mut rows: Vec<ProcessedAnnualRow> = records
        .iter()
        .map(|record| {
            let status = derive_status_label(&record.status_text);

            // "<events> | <impacts>"
            let info = record.weather_info.as_deref().unwrap_or("");
            let mut segments = info.split('|').map(str::trim);
            let events_segment = segments.next().unwrap_or("");
            let impacts_segment = segments.next().unwrap_or("");

            let mut keyword_counts = vec![0u32; columns.len()];
            count_keywords(
                events_segment,
                ANNUAL_EVENT_KEYWORDS,
                &columns,
                &mut keyword_counts,
            );
            count_keywords(
                impacts_segment,
                ANNUAL_IMPACT_KEYWORDS,
                &columns,
                &mut keyword_counts,
            );

            ProcessedAnnualRow {
                region: record.region.clone(),
                year: record.year,
                yield_tons: record.yield_tons,
                status_text: record.status_text.clone(),
                label: status.label,
                delta_tons: status.delta_tons,
                total_events: count_occurrence_tokens(events_segment),
                total_impacts: count_occurrence_tokens(impacts_segment),
                keyword_counts,
            }
        })
        .collect();

    rows.sort_by(|a, b| (a.region.as_str(), a.year).cmp(&(b.region.as_str(), b.year)));
    rows
}

/// Convert processed annual rows into a labeled feature frame with
/// Period = year.
///
/// Features are the keyword counts plus the occurrence totals. The yield
/// total and the status-derived delta stay out of the vector: both carry
/// the label's source value.
pub fn annual_feature_frame(rows: &[ProcessedAnnualRow]) -> FeatureFrame {
    let mut columns = annual_feature_columns();
    columns.push("total_events".to_string());
    columns.push("total_impacts".to_string());

    let mut frame_rows = Vec::with_capacity(rows.len());
    let mut regions = Vec::with_capacity(rows.len());
    let mut periods = Vec::with_capacity(rows.len());
    let mut labels = Vec::with_capacity(rows.len());

    for row in rows {
        let mut values: Vec<f64> = row
            .keyword_counts
            .iter()
            .map(|count| f64::from(*count))
            .collect();
        values.push(f64::from(row.total_events));
        values.push(f64::from(row.total_impacts));

        frame_rows.push(values);
        regions.push(row.region.clone());
        periods.push(
            NaiveDate::from_ymd_opt(row.year, 1, 1)
                .unwrap_or_else(|| NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch")),
        );
        labels.push(row.label);
    }

    FeatureFrame {
        columns,
        rows: frame_rows,
        regions,
        periods,
        labels: Some(labels),
    }
}

/// Summary statistics written next to the processed dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnualDatasetSummary {
    pub total_records: usize,
    pub failed_percentage: f64,
    pub min_year: Option<i32>,
    pub max_year: Option<i32>,
    pub columns: Vec<String>,
}

impl AnnualDatasetSummary {
    pub fn from_rows(rows: &[ProcessedAnnualRow]) -> Self {
        let failed = rows.iter().filter(|row| row.label == 1).count();
        Self {
            total_records: rows.len(),
            failed_percentage: if rows.is_empty() {
                0.0
            } else {
                failed as f64 / rows.len() as f64 * 100.0
            },
            min_year: rows.iter().map(|row| row.year).min(),
            max_year: rows.iter().map(|row| row.year).max(),
            columns: annual_feature_columns(),
        }
    }
}

/// Write the processed dataset as CSV plus a summary JSON
pub fn write_processed(
    rows: &[ProcessedAnnualRow],
    csv_path: &Path,
    summary_path: &Path,
) -> Result<AnnualDatasetSummary> {
    let columns = annual_feature_columns();
    let mut frame_columns: Vec<Column> = Vec::new();

    frame_columns.push(Column::new(
        "kabupaten_kota".into(),
        rows.iter().map(|row| row.region.clone()).collect::<Vec<_>>(),
    ));
    frame_columns.push(Column::new(
        "tahun".into(),
        rows.iter().map(|row| row.year).collect::<Vec<_>>(),
    ));
    frame_columns.push(Column::new(
        "hasil_panen".into(),
        rows.iter().map(|row| row.yield_tons).collect::<Vec<_>>(),
    ));
    frame_columns.push(Column::new(
        "status_panen".into(),
        rows.iter().map(|row| row.status_text.clone()).collect::<Vec<_>>(),
    ));
    frame_columns.push(Column::new(
        "label_gagal".into(),
        rows.iter().map(|row| u32::from(row.label)).collect::<Vec<_>>(),
    ));
    frame_columns.push(Column::new(
        "delta_ton".into(),
        rows.iter().map(|row| row.delta_tons).collect::<Vec<_>>(),
    ));
    frame_columns.push(Column::new(
        "cuaca_total_event".into(),
        rows.iter().map(|row| row.total_events).collect::<Vec<_>>(),
    ));
    frame_columns.push(Column::new(
        "dampak_total_event".into(),
        rows.iter().map(|row| row.total_impacts).collect::<Vec<_>>(),
    ));
    for (position, name) in columns.iter().enumerate() {
        frame_columns.push(Column::new(
            name.as_str().into(),
            rows.iter()
                .map(|row| row.keyword_counts[position])
                .collect::<Vec<_>>(),
        ));
    }

    let mut df = DataFrame::new(frame_columns)
        .map_err(|e| Error::frame_export("Failed to assemble annual DataFrame", e))?;

    let file = std::fs::File::create(csv_path)
        .map_err(|e| Error::io(format!("Failed to create {}", csv_path.display()), e))?;
    CsvWriter::new(file)
        .include_header(true)
        .finish(&mut df)
        .map_err(|e| Error::frame_export("Failed to write processed annual CSV", e))?;

    let summary = AnnualDatasetSummary::from_rows(rows);
    let encoded = serde_json::to_string_pretty(&summary)
        .map_err(|e| Error::serialization("Failed to encode annual summary", e))?;
    std::fs::write(summary_path, encoded)
        .map_err(|e| Error::io(format!("Failed to write {}", summary_path.display()), e))?;

    info!(
        "Wrote {} processed annual rows to {} (summary at {})",
        rows.len(),
        csv_path.display(),
        summary_path.display()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(region: &str, year: i32, status: &str, info: Option<&str>) -> AnnualOutcomeRecord {
        AnnualOutcomeRecord {
            region: region.to_string(),
            year,
            yield_tons: 1000.0,
            status_text: status.to_string(),
            weather_info: info.map(str::to_string),
        }
    }

    #[test]
    fn occurrence_tokens_are_summed() {
        assert_eq!(
            count_occurrence_tokens("Hujan Lebat (3x), Petir (2x)"),
            5
        );
        assert_eq!(count_occurrence_tokens("Tidak ada data"), 0);
    }

    #[test]
    fn keyword_counts_split_event_and_impact_segments() {
        let rows = process_outcomes(&[record(
            "Garut",
            2022,
            "TURUN (5.2 TON)",
            Some("Hujan Lebat (3x), Petir (1x) | Banjir / Genangan, Tanah Longsor"),
        )]);

        let row = &rows[0];
        let columns = annual_feature_columns();
        let count = |name: &str| {
            row.keyword_counts[columns.iter().position(|column| column == name).unwrap()]
        };

        assert_eq!(count("event_hujan_lebat"), 1);
        assert_eq!(count("event_petir"), 1);
        assert_eq!(count("impact_banjir"), 1);
        assert_eq!(count("impact_tanah_longsor"), 1);
        assert_eq!(row.total_events, 4);
        assert_eq!(row.total_impacts, 0);
        assert_eq!(row.label, 1);
        assert!((row.delta_tons - (-5.2)).abs() < 1e-9);
    }

    #[test]
    fn flood_variants_share_one_column_without_zeroing() {
        let rows = process_outcomes(&[record(
            "Garut",
            2022,
            "STABIL",
            Some(" | Banjir"),
        )]);
        let columns = annual_feature_columns();
        let position = columns
            .iter()
            .position(|column| column == "impact_banjir")
            .unwrap();
        assert_eq!(rows[0].keyword_counts[position], 1);
    }

    #[test]
    fn feature_frame_keeps_label_out_of_the_vector() {
        let rows = process_outcomes(&[
            record("Garut", 2021, "NAIK (3 TON)", Some("Petir (1x) | Banjir")),
            record("Garut", 2022, "TURUN (5.2 TON)", None),
        ]);
        let frame = annual_feature_frame(&rows);

        assert_eq!(frame.height(), 2);
        assert_eq!(frame.labels.as_deref(), Some(&[0, 1][..]));
        assert!(!frame.columns.iter().any(|column| column == "delta_ton"));
        assert!(!frame.columns.iter().any(|column| column == "hasil_panen"));
        // rows are sorted by (region, year); the frame is window-ready
        assert_eq!(frame.periods[0].format("%Y").to_string(), "2021");
    }

    #[test]
    fn summary_reports_failure_percentage() {
        let rows = process_outcomes(&[
            record("A", 2021, "TURUN (1 TON)", None),
            record("A", 2022, "NAIK (1 TON)", None),
        ]);
        let summary = AnnualDatasetSummary::from_rows(&rows);
        assert_eq!(summary.total_records, 2);
        assert!((summary.failed_percentage - 50.0).abs() < 1e-9);
        assert_eq!(summary.min_year, Some(2021));
        assert_eq!(summary.max_year, Some(2022));
    }

    #[test]
    fn processed_dataset_exports_csv_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("processed.csv");
        let summary_path = dir.path().join("summary.json");

        let rows = process_outcomes(&[record(
            "Garut",
            2022,
            "TURUN (5.2 TON)",
            Some("Hujan Lebat (2x) | Banjir"),
        )]);
        let summary = write_processed(&rows, &csv_path, &summary_path).unwrap();

        assert_eq!(summary.total_records, 1);
        let written = std::fs::read_to_string(&csv_path).unwrap();
        assert!(written.starts_with("kabupaten_kota,"));
        let summary_json = std::fs::read_to_string(&summary_path).unwrap();
        assert!(summary_json.contains("failed_percentage"));
    }
}
