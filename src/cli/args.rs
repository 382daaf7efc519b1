//! Command-line argument definitions for the harvest processor
//!
//! Defines the complete CLI interface using the clap derive API: training,
//! single and batch prediction, annual dataset preparation, and region
//! listing.

use crate::constants::{
    DEFAULT_LEARNING_RATE, DEFAULT_SEQUENCE_LENGTH, DEFAULT_SEQUENCE_STRIDE,
    DEFAULT_TRAINING_EPOCHS, DEFAULT_Z_SCORE_THRESHOLD,
};
use crate::{Error, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for the harvest-failure risk processor
///
/// Turns regional weather-event and rice-yield records into model-ready
/// sequences, trains the failure classifier, and serves per-region risk
/// predictions from the persisted artifact bundle.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "harvest-processor",
    version,
    about = "Predict regional harvest-failure risk from weather and yield records",
    long_about = "A production-ready pipeline that reconciles daily weather events with \
                  annual harvest yields, derives failure labels, builds scaled feature \
                  sequences, and serves per-region failure-risk predictions. Training \
                  persists the classifier, scaler, and threshold as one artifact bundle \
                  which inference replays exactly."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all but warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

impl Args {
    /// Log level implied by the verbosity flags
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }
}

/// Available subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Train the classifier and persist the artifact bundle
    Train(TrainArgs),
    /// Predict harvest-failure risk for one region
    Predict(PredictArgs),
    /// Predict many regions (or all known regions), ranked by risk
    Batch(BatchArgs),
    /// Convert the raw annual "conclusion" CSV into a processed dataset
    PrepareAnnual(PrepareAnnualArgs),
    /// List the regions available in the harvest source
    Regions(RegionsArgs),
}

/// Source file and artifact locations shared by most commands
#[derive(Debug, Clone, Parser)]
pub struct SourceArgs {
    /// Semicolon-delimited weather events CSV
    #[arg(long = "weather", value_name = "PATH")]
    pub weather_path: Option<PathBuf>,

    /// Semicolon-delimited harvest yields CSV
    #[arg(long = "harvest", value_name = "PATH")]
    pub harvest_path: Option<PathBuf>,

    /// Annual "conclusion" dataset CSV (annual pipeline variant)
    #[arg(long = "annual", value_name = "PATH")]
    pub annual_path: Option<PathBuf>,

    /// Directory holding the artifact bundle
    ///
    /// Defaults to the platform data directory
    /// (e.g. ~/.local/share/harvest-processor)
    #[arg(long = "artifacts", value_name = "PATH")]
    pub artifacts_dir: Option<PathBuf>,
}

impl SourceArgs {
    /// Require the weather and harvest files, checking they exist
    pub fn require_tabular_sources(&self) -> Result<(&PathBuf, &PathBuf)> {
        let weather = self.weather_path.as_ref().ok_or_else(|| {
            Error::configuration("--weather is required for this command".to_string())
        })?;
        let harvest = self.harvest_path.as_ref().ok_or_else(|| {
            Error::configuration("--harvest is required for this command".to_string())
        })?;
        for path in [weather, harvest] {
            if !path.exists() {
                return Err(Error::configuration(format!(
                    "Source file does not exist: {}",
                    path.display()
                )));
            }
        }
        Ok((weather, harvest))
    }

    /// Require the annual dataset file, checking it exists
    pub fn require_annual_source(&self) -> Result<&PathBuf> {
        let annual = self.annual_path.as_ref().ok_or_else(|| {
            Error::configuration("--annual is required for this command".to_string())
        })?;
        if !annual.exists() {
            return Err(Error::configuration(format!(
                "Annual dataset does not exist: {}",
                annual.display()
            )));
        }
        Ok(annual)
    }
}

/// Arguments for the train command
#[derive(Debug, Clone, Parser)]
pub struct TrainArgs {
    #[command(flatten)]
    pub sources: SourceArgs,

    /// Train the annual pipeline variant (Period = year, status labels)
    #[arg(long = "annual-pipeline")]
    pub annual_pipeline: bool,

    /// Window length in periods
    #[arg(long = "sequence-length", value_name = "N", default_value_t = DEFAULT_SEQUENCE_LENGTH)]
    pub sequence_length: usize,

    /// Stride between windows
    #[arg(long = "stride", value_name = "N", default_value_t = DEFAULT_SEQUENCE_STRIDE)]
    pub stride: usize,

    /// Z-score threshold for failure labels
    #[arg(long = "z-threshold", value_name = "Z", default_value_t = DEFAULT_Z_SCORE_THRESHOLD, allow_hyphen_values = true)]
    pub z_threshold: f64,

    /// Classifier fitting epochs
    #[arg(long = "epochs", value_name = "N", default_value_t = DEFAULT_TRAINING_EPOCHS)]
    pub epochs: usize,

    /// Classifier learning rate
    #[arg(long = "learning-rate", value_name = "RATE", default_value_t = DEFAULT_LEARNING_RATE)]
    pub learning_rate: f64,

    /// Write the scaled feature matrix to this Parquet file
    #[arg(long = "export-matrix", value_name = "PATH")]
    pub export_matrix: Option<PathBuf>,
}

/// Arguments for the predict command
#[derive(Debug, Clone, Parser)]
pub struct PredictArgs {
    #[command(flatten)]
    pub sources: SourceArgs,

    /// Region to predict (kabupaten/kota name, prefix variants accepted)
    #[arg(short = 'r', long = "region", value_name = "NAME")]
    pub region: String,

    /// Restrict the weather history to dates on or after this ISO date
    #[arg(long = "start-date", value_name = "YYYY-MM-DD")]
    pub start_date: Option<NaiveDate>,

    /// Anchor the analysis window at this planting month (1-12) of the
    /// latest year on record; ignored when --start-date is given
    #[arg(long = "planting-month", value_name = "MONTH")]
    pub planting_month: Option<u32>,

    /// Use the annual pipeline variant
    #[arg(long = "annual-pipeline")]
    pub annual_pipeline: bool,

    /// Emit the full prediction as JSON
    #[arg(long = "json")]
    pub json: bool,
}

/// Arguments for the batch command
#[derive(Debug, Clone, Parser)]
pub struct BatchArgs {
    #[command(flatten)]
    pub sources: SourceArgs,

    /// Comma-separated region names to predict
    #[arg(long = "regions", value_name = "LIST", value_delimiter = ',')]
    pub regions: Vec<String>,

    /// Predict every region found in the harvest source
    #[arg(long = "all", conflicts_with = "regions")]
    pub all: bool,

    /// Emit results as a JSON array
    #[arg(long = "json")]
    pub json: bool,
}

impl BatchArgs {
    pub fn validate(&self) -> Result<()> {
        if self.regions.is_empty() && !self.all {
            return Err(Error::configuration(
                "Provide --regions or --all to select prediction targets".to_string(),
            ));
        }
        Ok(())
    }
}

/// Arguments for the prepare-annual command
#[derive(Debug, Clone, Parser)]
pub struct PrepareAnnualArgs {
    #[command(flatten)]
    pub sources: SourceArgs,

    /// Processed dataset output CSV
    #[arg(long = "output", value_name = "PATH", default_value = "data_kesimpulan_processed.csv")]
    pub output: PathBuf,

    /// Summary JSON output
    #[arg(long = "summary", value_name = "PATH", default_value = "data_kesimpulan_summary.json")]
    pub summary: PathBuf,
}

/// Arguments for the regions command
#[derive(Debug, Clone, Parser)]
pub struct RegionsArgs {
    #[command(flatten)]
    pub sources: SourceArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_requires_a_target_selection() {
        let args = BatchArgs {
            sources: SourceArgs {
                weather_path: None,
                harvest_path: None,
                annual_path: None,
                artifacts_dir: None,
            },
            regions: vec![],
            all: false,
            json: false,
        };
        assert!(args.validate().is_err());
    }

    #[test]
    fn missing_tabular_sources_are_configuration_errors() {
        let sources = SourceArgs {
            weather_path: None,
            harvest_path: None,
            annual_path: None,
            artifacts_dir: None,
        };
        assert!(matches!(
            sources.require_tabular_sources(),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn verbosity_flags_map_to_log_levels() {
        let args = Args::parse_from(["harvest-processor", "--verbose", "regions"]);
        assert_eq!(args.log_level(), "debug");
        let args = Args::parse_from(["harvest-processor", "--quiet", "regions"]);
        assert_eq!(args.log_level(), "warn");
    }

    #[test]
    fn predict_parses_start_date() {
        let args = Args::parse_from([
            "harvest-processor",
            "predict",
            "--region",
            "Bandung",
            "--start-date",
            "2023-01-15",
        ]);
        let Some(Commands::Predict(predict)) = args.command else {
            panic!("expected predict subcommand");
        };
        assert_eq!(
            predict.start_date,
            Some(NaiveDate::from_ymd_opt(2023, 1, 15).unwrap())
        );
    }
}
