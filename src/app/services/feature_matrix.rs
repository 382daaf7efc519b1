//! Feature matrix assembly and min-max scaling
//!
//! Merges weekly weather features with sparser annual harvest features on
//! the (region, period) key, fills harvest-derived columns within each
//! region, and produces a scaler-normalized numeric matrix whose column
//! set and order are fixed at training time and reproduced verbatim at
//! inference. Identifier columns (region, period) ride alongside the
//! matrix and never enter the feature vector.

use crate::app::services::label_deriver::LabeledHarvest;
use crate::app::services::temporal_aggregator::AggregatedRow;
use crate::constants::AREA_FEATURE_COLUMN;
use crate::{Error, Result};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

// =============================================================================
// Feature Frame
// =============================================================================

/// A numeric feature matrix with parallel identifier vectors.
///
/// `rows[i]` is the feature vector for `(regions[i], periods[i])`;
/// `labels` is present only for training frames. Rows are ordered by
/// (region, period) ascending, so each region occupies one contiguous run.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub regions: Vec<String>,
    pub periods: Vec<NaiveDate>,
    pub labels: Option<Vec<u8>>,
}

impl FeatureFrame {
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Contiguous `[start, end)` row ranges per region, in frame order.
    /// The windower slices within these runs so no window spans regions.
    pub fn region_runs(&self) -> Vec<(usize, usize)> {
        let mut runs = Vec::new();
        let mut start = 0usize;
        for index in 1..=self.regions.len() {
            if index == self.regions.len() || self.regions[index] != self.regions[start] {
                runs.push((start, index));
                start = index;
            }
        }
        runs
    }

    /// Convert to a polars DataFrame with identifier columns restored,
    /// for Parquet export and inspection
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut frame_columns: Vec<Column> = Vec::with_capacity(self.width() + 3);

        frame_columns.push(Column::new("region".into(), &self.regions));
        let period_labels: Vec<String> = self
            .periods
            .iter()
            .map(|period| period.format("%Y-%m-%d").to_string())
            .collect();
        frame_columns.push(Column::new("period".into(), period_labels));

        for (position, name) in self.columns.iter().enumerate() {
            let values: Vec<f64> = self.rows.iter().map(|row| row[position]).collect();
            frame_columns.push(Column::new(name.as_str().into(), values));
        }

        if let Some(labels) = &self.labels {
            let values: Vec<u32> = labels.iter().map(|label| u32::from(*label)).collect();
            frame_columns.push(Column::new("label".into(), values));
        }

        DataFrame::new(frame_columns)
            .map_err(|e| Error::frame_export("Failed to assemble feature DataFrame", e))
    }

    /// Write the frame to a Snappy-compressed Parquet file
    pub fn write_parquet(&self, path: &Path) -> Result<usize> {
        let mut df = self.to_dataframe()?;
        let file = std::fs::File::create(path)
            .map_err(|e| Error::io(format!("Failed to create {}", path.display()), e))?;

        ParquetWriter::new(file)
            .with_compression(ParquetCompression::Snappy)
            .finish(&mut df)
            .map_err(|e| Error::frame_export("Failed to write feature Parquet", e))?;

        info!("Wrote {} feature rows to {}", self.height(), path.display());
        Ok(self.height())
    }
}

// =============================================================================
// Matrix Assembly
// =============================================================================

/// Harvested-area values keyed by (canonical region, year)
pub fn areas_from_labeled(labeled: &[LabeledHarvest]) -> HashMap<(String, i32), f64> {
    let mut areas = HashMap::new();
    for row in labeled {
        areas
            .entry((row.region.clone(), row.year))
            .or_insert(row.harvested_area);
    }
    areas
}

/// Failure labels keyed by (canonical region, year)
pub fn labels_from_labeled(labeled: &[LabeledHarvest]) -> HashMap<(String, i32), u8> {
    let mut labels = HashMap::new();
    for row in labeled {
        labels.entry((row.region.clone(), row.year)).or_insert(row.label);
    }
    labels
}

/// Merge aggregated weather rows with harvest-derived values.
///
/// Left join: every weather period row is kept even when no harvest
/// record exists for its year; the sparse area and label columns are then
/// forward- and backward-filled within each region so every period
/// inherits the nearest known annual value. Rows whose label (training)
/// or area (inference) is still undefined after filling are dropped;
/// a region with no yield history at all contributes nothing.
pub fn build_feature_frame(
    weekly: &[AggregatedRow],
    indicator_columns: &[String],
    areas: &HashMap<(String, i32), f64>,
    labels: Option<&HashMap<(String, i32), u8>>,
) -> FeatureFrame {
    let mut columns = indicator_columns.to_vec();
    columns.push(AREA_FEATURE_COLUMN.to_string());

    // Left-join pass: attach the year's harvest values where they exist.
    let mut joined_area: Vec<Option<f64>> = Vec::with_capacity(weekly.len());
    let mut joined_label: Vec<Option<u8>> = Vec::with_capacity(weekly.len());
    for row in weekly {
        let key = (row.region.clone(), row.year());
        joined_area.push(areas.get(&key).copied());
        joined_label.push(labels.and_then(|map| map.get(&key).copied()));
    }

    // Fill within each contiguous region run.
    let mut start = 0usize;
    for index in 1..=weekly.len() {
        if index == weekly.len() || weekly[index].region != weekly[start].region {
            fill_run(&mut joined_area[start..index]);
            fill_run(&mut joined_label[start..index]);
            start = index;
        }
    }

    let mut rows = Vec::new();
    let mut regions = Vec::new();
    let mut periods = Vec::new();
    let mut kept_labels = Vec::new();
    let mut dropped = 0usize;

    for (position, row) in weekly.iter().enumerate() {
        let keep = if labels.is_some() {
            joined_label[position].is_some() && joined_area[position].is_some()
        } else {
            joined_area[position].is_some()
        };
        if !keep {
            dropped += 1;
            continue;
        }

        let mut values: Vec<f64> = row.counts.iter().map(|count| f64::from(*count)).collect();
        values.push(joined_area[position].unwrap_or_default());
        rows.push(values);
        regions.push(row.region.clone());
        periods.push(row.period_end);
        if labels.is_some() {
            kept_labels.push(joined_label[position].unwrap_or_default());
        }
    }

    if dropped > 0 {
        debug!(
            "Dropped {} weather periods with no resolvable harvest values",
            dropped
        );
    }

    FeatureFrame {
        columns,
        rows,
        regions,
        periods,
        labels: labels.map(|_| kept_labels),
    }
}

/// Forward-fill then backward-fill a run of optional values in place
fn fill_run<T: Copy>(run: &mut [Option<T>]) {
    let mut carried: Option<T> = None;
    for slot in run.iter_mut() {
        match slot {
            Some(value) => carried = Some(*value),
            None => *slot = carried,
        }
    }

    let mut carried: Option<T> = None;
    for slot in run.iter_mut().rev() {
        match slot {
            Some(value) => carried = Some(*value),
            None => *slot = carried,
        }
    }
}

// =============================================================================
// Min-Max Scaler
// =============================================================================

/// A fitted per-column min-max transform with a fixed column order.
///
/// Fit exclusively on training rows and persisted alongside the model;
/// inference reuses the fitted parameters verbatim and never refits. The
/// stored column list is the training-time column contract: at transform
/// time, columns missing from the input are injected as zero and columns
/// unknown to the scaler are dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub columns: Vec<String>,
    pub mins: Vec<f64>,
    pub maxs: Vec<f64>,
}

impl MinMaxScaler {
    /// Fit column ranges on a training frame
    pub fn fit(frame: &FeatureFrame) -> Result<Self> {
        if frame.height() == 0 {
            return Err(Error::data_validation(
                "Cannot fit scaler on an empty feature frame".to_string(),
            ));
        }

        let width = frame.width();
        let mut mins = vec![f64::INFINITY; width];
        let mut maxs = vec![f64::NEG_INFINITY; width];
        for row in &frame.rows {
            for (position, value) in row.iter().enumerate() {
                mins[position] = mins[position].min(*value);
                maxs[position] = maxs[position].max(*value);
            }
        }

        debug!("Fitted scaler over {} columns", width);
        Ok(Self {
            columns: frame.columns.clone(),
            mins,
            maxs,
        })
    }

    /// Number of feature columns in the training contract
    pub fn feature_count(&self) -> usize {
        self.columns.len()
    }

    /// Scale a frame into [0, 1] per column, enforcing the training-time
    /// column contract. Deterministic: the same input and scaler always
    /// produce bit-identical output.
    pub fn transform(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        let source_positions: HashMap<&str, usize> = frame
            .columns
            .iter()
            .enumerate()
            .map(|(position, name)| (name.as_str(), position))
            .collect();

        let missing = self
            .columns
            .iter()
            .filter(|column| !source_positions.contains_key(column.as_str()))
            .count();
        let unseen = frame
            .columns
            .iter()
            .filter(|column| !self.columns.contains(column))
            .count();
        if missing > 0 || unseen > 0 {
            debug!(
                "Reindexing features to the training contract: {} columns injected as zero, {} dropped",
                missing, unseen
            );
        }

        let rows = frame
            .rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .enumerate()
                    .map(|(target, column)| {
                        let raw = source_positions
                            .get(column.as_str())
                            .map(|&source| row[source])
                            .unwrap_or(0.0);
                        self.scale(target, raw)
                    })
                    .collect()
            })
            .collect();

        Ok(FeatureFrame {
            columns: self.columns.clone(),
            rows,
            regions: frame.regions.clone(),
            periods: frame.periods.clone(),
            labels: frame.labels.clone(),
        })
    }

    fn scale(&self, position: usize, value: f64) -> f64 {
        let range = self.maxs[position] - self.mins[position];
        if range == 0.0 {
            // constant training column: shift only, as a unit scale
            value - self.mins[position]
        } else {
            (value - self.mins[position]) / range
        }
    }
}
