//! Configuration management and validation.
//!
//! Provides explicit configuration values for the pipeline stages: source
//! schema mapping, labeling and windowing parameters, and artifact bundle
//! locations. Configuration is constructed once (typically in the CLI
//! layer) and passed into each stage, so two pipeline variants can coexist
//! in one process.

use crate::constants::{self, columns};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Temporal bucket a feature row represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodGranularity {
    /// One row per (region, week); weather-driven fine-grained pipeline
    Week,
    /// One row per (region, year); annual "conclusion" pipeline
    Year,
}

/// Explicit mapping from pipeline roles to source column names.
///
/// Replaces keyword-substring column discovery with a versioned mapping
/// supplied at configuration time. Heuristic discovery remains available
/// through [`SourceSchema::discover_metric_column`] as a best-effort
/// fallback that logs a warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSchema {
    /// Region identifier column, shared by both sources
    pub region_column: String,

    /// Weather event date column
    pub date_column: String,

    /// Delimited extreme-weather event text column
    pub event_column: String,

    /// Delimited impact text column
    pub impact_column: String,

    /// Harvest year column
    pub year_column: String,

    /// Productivity column (locale-formatted numeric)
    pub productivity_column: String,

    /// Harvested area column (locale-formatted numeric)
    pub area_column: String,

    /// Raw production total column; excluded from features
    pub production_column: String,

    /// Explicit metric-name to source-column mapping for numeric weather
    /// metrics (temperature, humidity, rainfall, wind). Preferred over
    /// heuristic discovery whenever present.
    pub metric_columns: BTreeMap<String, String>,
}

impl Default for SourceSchema {
    fn default() -> Self {
        Self {
            region_column: columns::REGION.to_string(),
            date_column: columns::DATE.to_string(),
            event_column: columns::WEATHER_EVENT.to_string(),
            impact_column: columns::WEATHER_IMPACT.to_string(),
            year_column: columns::YEAR.to_string(),
            productivity_column: columns::PRODUCTIVITY.to_string(),
            area_column: columns::HARVESTED_AREA.to_string(),
            production_column: columns::PRODUCTION.to_string(),
            metric_columns: BTreeMap::new(),
        }
    }
}

impl SourceSchema {
    /// Map a metric to an explicitly configured source column
    pub fn metric_column(&self, metric: &str) -> Option<&str> {
        self.metric_columns.get(metric).map(String::as_str)
    }

    /// Locate a metric column by keyword search over source headers.
    ///
    /// Best-effort fallback for sources without an explicit mapping; logs a
    /// warning so operators know the schema mapping should be extended.
    pub fn discover_metric_column(
        &self,
        headers: &[String],
        metric: &str,
        keywords: &[&str],
    ) -> Option<String> {
        if let Some(explicit) = self.metric_column(metric) {
            return Some(explicit.to_string());
        }

        let found = headers.iter().find(|header| {
            let lowered = header.to_lowercase();
            keywords.iter().any(|keyword| lowered.contains(keyword))
        });

        if let Some(column) = found {
            warn!(
                "No explicit schema mapping for metric '{}'; using heuristic match '{}'",
                metric, column
            );
        }

        found.cloned()
    }
}

/// Pipeline-stage configuration, passed explicitly into each stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Temporal granularity of feature rows
    pub granularity: PeriodGranularity,

    /// Z-score threshold below which a yield row is labeled a failure
    pub z_score_threshold: f64,

    /// Number of consecutive periods per classifier window
    pub sequence_length: usize,

    /// Stride between consecutive windows
    pub sequence_stride: usize,

    /// Allow shortening the sequence length at inference when a region's
    /// history is naturally short (annual pipeline variant)
    pub allow_sequence_override: bool,

    /// Source column mapping
    pub schema: SourceSchema,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            granularity: PeriodGranularity::Week,
            z_score_threshold: constants::DEFAULT_Z_SCORE_THRESHOLD,
            sequence_length: constants::DEFAULT_SEQUENCE_LENGTH,
            sequence_stride: constants::DEFAULT_SEQUENCE_STRIDE,
            allow_sequence_override: false,
            schema: SourceSchema::default(),
        }
    }
}

impl PipelineConfig {
    /// Configuration for the annual pipeline variant: yearly periods,
    /// status-text labels, and the short-history sequence override enabled
    pub fn annual() -> Self {
        Self {
            granularity: PeriodGranularity::Year,
            allow_sequence_override: true,
            ..Self::default()
        }
    }

    /// Set the z-score labeling threshold
    pub fn with_z_score_threshold(mut self, threshold: f64) -> Self {
        self.z_score_threshold = threshold;
        self
    }

    /// Set the sequence window length
    pub fn with_sequence_length(mut self, length: usize) -> Self {
        self.sequence_length = length;
        self
    }

    /// Set the window stride
    pub fn with_sequence_stride(mut self, stride: usize) -> Self {
        self.sequence_stride = stride;
        self
    }

    /// Enable the inference-time sequence-length override
    pub fn with_sequence_override(mut self) -> Self {
        self.allow_sequence_override = true;
        self
    }

    /// Replace the source schema mapping
    pub fn with_schema(mut self, schema: SourceSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Validate parameter consistency before running a pipeline
    pub fn validate(&self) -> crate::Result<()> {
        if self.sequence_length < constants::MIN_SEQUENCE_LENGTH {
            return Err(crate::Error::configuration(format!(
                "Sequence length {} is below the minimum of {}",
                self.sequence_length,
                constants::MIN_SEQUENCE_LENGTH
            )));
        }
        if self.sequence_stride == 0 {
            return Err(crate::Error::configuration(
                "Sequence stride must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Locations of the three artifact bundle files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactPaths {
    /// Classifier weights (JSON)
    pub classifier_path: PathBuf,

    /// Fitted scaler parameters and column order (JSON)
    pub scaler_path: PathBuf,

    /// Model configuration: optimal threshold, sequence length,
    /// feature count (JSON)
    pub config_path: PathBuf,
}

impl ArtifactPaths {
    /// Artifact paths inside the given directory, using the standard
    /// bundle file names
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            classifier_path: dir.join(constants::CLASSIFIER_FILE_NAME),
            scaler_path: dir.join(constants::SCALER_FILE_NAME),
            config_path: dir.join(constants::MODEL_CONFIG_FILE_NAME),
        }
    }

    /// Default platform-specific artifact directory
    /// (falls back to ./models when no platform data dir exists)
    pub fn default_dir() -> PathBuf {
        dirs::data_dir()
            .map(|dir| dir.join(constants::ARTIFACT_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from("models"))
    }

    /// Paths of bundle members that do not exist on disk
    pub fn missing_files(&self) -> Vec<PathBuf> {
        [&self.classifier_path, &self.scaler_path, &self.config_path]
            .into_iter()
            .filter(|path| !path.exists())
            .cloned()
            .collect()
    }
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self::in_dir(&Self::default_dir())
    }
}
