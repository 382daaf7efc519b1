//! Harvest Processor Library
//!
//! A Rust library for turning regional weather-event and rice-yield records
//! into model-ready feature sequences and serving harvest-failure risk
//! predictions.
//!
//! This library provides tools for:
//! - Canonicalizing inconsistently-named administrative regions
//! - Encoding delimited free-text weather events into multi-hot count features
//! - Aggregating daily events into weekly per-region buckets
//! - Deriving binary failure labels from yield z-scores or status text
//! - Building scaled feature matrices with a fixed train-time column contract
//! - Windowing per-region histories into fixed-length classifier sequences
//! - Reconstructing the exact training pipeline at inference time from
//!   persisted artifacts, with comprehensive error handling

pub mod config;
pub mod constants;

// Core application modules
pub mod app {
    pub mod models;
    pub mod services {
        pub mod annual_dataset;
        pub mod artifact_store;
        pub mod classifier;
        pub mod event_encoder;
        pub mod feature_matrix;
        pub mod inference;
        pub mod label_deriver;
        pub mod region_resolver;
        pub mod sequence_windower;
        pub mod source;
        pub mod temporal_aggregator;
        pub mod training;
    }
}

// CLI modules
pub mod cli {
    pub mod args;
    pub mod commands;
}

// Re-export commonly used types
pub use app::models::{HarvestRecord, PredictionOutcome, RiskLevel, WeatherRecord};
pub use config::PipelineConfig;

/// Result type alias for the harvest processor
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error types for harvest prediction operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV parsing error
    #[error("CSV parsing error in file '{file}': {message}")]
    CsvParsing {
        file: String,
        message: String,
        #[source]
        source: Option<csv::Error>,
    },

    /// Configuration error (fatal, pre-flight; propagated unmodified)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// One or more artifact bundle files are absent
    #[error("Model artifacts missing: {missing}. Run `harvest-processor train` first")]
    ArtifactsMissing { missing: String },

    /// No rows matched the requested region after name resolution
    #[error("No data found for region '{region}'")]
    DataNotFound { region: String },

    /// Matched rows exist but are too few to form one sequence window.
    /// Distinct from [`Error::DataNotFound`]: the remediation is more
    /// history, not a different region name.
    #[error(
        "Insufficient history for region '{region}': {available} periods available, \
         at least {required} required"
    )]
    InsufficientSequence {
        region: String,
        available: usize,
        required: usize,
    },

    /// Data validation error
    #[error("Data validation error: {message}")]
    DataValidation { message: String },

    /// Date/time parsing error
    #[error("Date/time parsing error: {message}")]
    DateTimeParsing {
        message: String,
        #[source]
        source: chrono::ParseError,
    },

    /// Feature frame export error
    #[error("Frame export error: {message}")]
    FrameExport {
        message: String,
        #[source]
        source: polars::error::PolarsError,
    },

    /// Artifact serialization error
    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// Create an I/O error with context
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a CSV parsing error with context
    pub fn csv_parsing(
        file: impl Into<String>,
        message: impl Into<String>,
        source: Option<csv::Error>,
    ) -> Self {
        Self::CsvParsing {
            file: file.into(),
            message: message.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an artifacts-missing error from the list of absent files
    pub fn artifacts_missing(missing: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::ArtifactsMissing {
            missing: missing
                .into_iter()
                .map(Into::into)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Create a data-not-found error for a region
    pub fn data_not_found(region: impl Into<String>) -> Self {
        Self::DataNotFound {
            region: region.into(),
        }
    }

    /// Create an insufficient-sequence error for a region
    pub fn insufficient_sequence(
        region: impl Into<String>,
        available: usize,
        required: usize,
    ) -> Self {
        Self::InsufficientSequence {
            region: region.into(),
            available,
            required,
        }
    }

    /// Create a data validation error
    pub fn data_validation(message: impl Into<String>) -> Self {
        Self::DataValidation {
            message: message.into(),
        }
    }

    /// Create a date/time parsing error
    pub fn datetime_parsing(message: impl Into<String>, source: chrono::ParseError) -> Self {
        Self::DateTimeParsing {
            message: message.into(),
            source,
        }
    }

    /// Create a frame export error
    pub fn frame_export(
        message: impl Into<String>,
        source: polars::error::PolarsError,
    ) -> Self {
        Self::FrameExport {
            message: message.into(),
            source,
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            message: message.into(),
            source,
        }
    }

    /// Whether this error is recoverable per-request (batch mode converts it
    /// to an error entry in the region's result slot instead of aborting)
    pub fn is_per_request(&self) -> bool {
        matches!(
            self,
            Self::DataNotFound { .. } | Self::InsufficientSequence { .. }
        )
    }
}

// Automatic conversions from common error types
impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: "I/O operation failed".to_string(),
            source: error,
        }
    }
}

impl From<csv::Error> for Error {
    fn from(error: csv::Error) -> Self {
        Self::CsvParsing {
            file: "unknown".to_string(),
            message: "CSV parsing failed".to_string(),
            source: Some(error),
        }
    }
}

impl From<chrono::ParseError> for Error {
    fn from(error: chrono::ParseError) -> Self {
        Self::DateTimeParsing {
            message: "Date/time parsing failed".to_string(),
            source: error,
        }
    }
}

impl From<polars::error::PolarsError> for Error {
    fn from(error: polars::error::PolarsError) -> Self {
        Self::FrameExport {
            message: "DataFrame operation failed".to_string(),
            source: error,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization {
            message: "JSON serialization failed".to_string(),
            source: error,
        }
    }
}
