//! Command implementations for the harvest processor CLI
//!
//! Contains command execution logic, logging setup, progress reporting,
//! and human/JSON output formatting.

use crate::app::models::{BatchPredictionEntry, PredictionLabel, PredictionOutcome, RiskLevel};
use crate::app::services::annual_dataset;
use crate::app::services::inference::InferencePipeline;
use crate::app::services::source::{CsvRecordStore, RecordStore, SourceQuery, distinct_regions};
use crate::app::services::training::{TrainingOptions, TrainingRun};
use crate::cli::args::{
    Args, BatchArgs, Commands, PredictArgs, PrepareAnnualArgs, RegionsArgs, SourceArgs, TrainArgs,
};
use crate::config::{ArtifactPaths, PipelineConfig};
use crate::{Error, Result};
use colored::Colorize;
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Main command dispatcher
pub async fn run(args: Args) -> Result<()> {
    setup_logging(&args);

    let Some(command) = args.command.clone() else {
        return Err(Error::configuration(
            "No command provided; run with --help for usage".to_string(),
        ));
    };

    debug!("Command line arguments: {:?}", args);

    match command {
        Commands::Train(train_args) => cmd_train(train_args).await,
        Commands::Predict(predict_args) => cmd_predict(predict_args).await,
        Commands::Batch(batch_args) => cmd_batch(batch_args).await,
        Commands::PrepareAnnual(prepare_args) => cmd_prepare_annual(prepare_args).await,
        Commands::Regions(regions_args) => cmd_regions(regions_args).await,
    }
}

fn setup_logging(args: &Args) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("harvest_processor={}", args.log_level())));

    // try_init: tests and repeated invocations may already have a subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Artifact locations from the CLI override or the platform default
fn artifact_paths(sources: &SourceArgs) -> ArtifactPaths {
    sources
        .artifacts_dir
        .as_deref()
        .map(ArtifactPaths::in_dir)
        .unwrap_or_default()
}

/// Build the pipeline configuration for a command
fn pipeline_config(annual: bool) -> PipelineConfig {
    if annual {
        PipelineConfig::annual()
    } else {
        PipelineConfig::default()
    }
}

/// Build the CSV store a weekly-pipeline command needs
fn tabular_store(sources: &SourceArgs, config: &PipelineConfig) -> Result<CsvRecordStore> {
    let (weather, harvest) = sources.require_tabular_sources()?;
    let mut store =
        CsvRecordStore::new(weather.clone(), harvest.clone(), config.schema.clone());
    if let Some(annual) = &sources.annual_path {
        store = store.with_annual_path(annual.clone());
    }
    Ok(store)
}

async fn cmd_train(args: TrainArgs) -> Result<()> {
    let config = pipeline_config(args.annual_pipeline)
        .with_z_score_threshold(args.z_threshold)
        .with_sequence_length(args.sequence_length)
        .with_sequence_stride(args.stride);

    let store: CsvRecordStore = if args.annual_pipeline {
        CsvRecordStore::annual_only(args.sources.require_annual_source()?.clone())
    } else {
        tabular_store(&args.sources, &config)?
    };

    let paths = artifact_paths(&args.sources);
    info!(
        "Training artifacts will be written to {}",
        paths.classifier_path.parent().unwrap_or(std::path::Path::new(".")).display()
    );

    let options = TrainingOptions {
        epochs: args.epochs,
        learning_rate: args.learning_rate,
        matrix_export: args.export_matrix.clone(),
    };

    let started = Instant::now();
    let report = TrainingRun::new(&store, config, paths).execute(&options).await?;

    println!();
    println!("{}", "Training complete".green().bold());
    println!("  {}", report.summary());
    println!(
        "  {} weather rows, {} harvest rows, {} labeled",
        report.weather_rows, report.harvest_rows, report.labeled_rows
    );
    println!("  finished in {}", HumanDuration(started.elapsed()));
    Ok(())
}

async fn cmd_predict(args: PredictArgs) -> Result<()> {
    let config = pipeline_config(args.annual_pipeline);
    let store: Arc<dyn RecordStore> = if args.annual_pipeline {
        Arc::new(CsvRecordStore::annual_only(
            args.sources.require_annual_source()?.clone(),
        ))
    } else {
        Arc::new(tabular_store(&args.sources, &config)?)
    };

    let pipeline =
        InferencePipeline::load(store, artifact_paths(&args.sources), config).await?;

    match pipeline
        .predict_one(&args.region, args.start_date, args.planting_month)
        .await
    {
        Ok(outcome) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_outcome(&outcome);
            }
            Ok(())
        }
        // Per-request conditions surface as a structured result, not a
        // propagated failure: the command itself completed.
        Err(error) if error.is_per_request() => {
            let entry = BatchPredictionEntry::failure(args.region.clone(), error.to_string());
            if args.json {
                println!("{}", serde_json::to_string_pretty(&entry)?);
            } else {
                println!(
                    "{} {}",
                    "No prediction:".yellow().bold(),
                    entry.error.unwrap_or_default()
                );
            }
            Ok(())
        }
        Err(error) => Err(error),
    }
}

async fn cmd_batch(args: BatchArgs) -> Result<()> {
    args.validate()?;

    let config = pipeline_config(false);
    let store: Arc<dyn RecordStore> = Arc::new(tabular_store(&args.sources, &config)?);
    let pipeline =
        InferencePipeline::load(store, artifact_paths(&args.sources), config).await?;

    let regions = if args.all {
        pipeline.known_regions().await?
    } else {
        args.regions.clone()
    };
    info!("Batch predicting {} regions", regions.len());

    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap(),
    );
    progress.set_message(format!("Predicting {} regions...", regions.len()));
    progress.enable_steady_tick(Duration::from_millis(120));

    let mut entries = pipeline.predict_many(&regions).await;
    progress.finish_and_clear();

    // Rank predictions by probability, errors last
    entries.sort_by(|a, b| {
        let left = a.prediction.as_ref().map(|outcome| outcome.probability);
        let right = b.prediction.as_ref().map(|outcome| outcome.probability);
        right
            .partial_cmp(&left)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    let successes = entries.iter().filter(|entry| entry.prediction.is_some()).count();
    println!();
    println!(
        "{} ({} of {} regions predicted)",
        "Batch prediction complete".green().bold(),
        successes,
        entries.len()
    );
    for entry in &entries {
        match &entry.prediction {
            Some(outcome) => println!(
                "  {:<30} {:>6.1}%  {}",
                entry.region,
                outcome.probability * 100.0,
                risk_tag(outcome.risk_level)
            ),
            None => println!(
                "  {:<30} {}",
                entry.region,
                entry.error.as_deref().unwrap_or("unknown error").red()
            ),
        }
    }
    Ok(())
}

async fn cmd_prepare_annual(args: PrepareAnnualArgs) -> Result<()> {
    let annual = args.sources.require_annual_source()?;
    let store = CsvRecordStore::annual_only(annual.clone());

    let outcomes = store.annual_outcomes().await?;
    if outcomes.is_empty() {
        return Err(Error::data_validation(format!(
            "Annual dataset {} contains no usable rows",
            annual.display()
        )));
    }

    let rows = annual_dataset::process_outcomes(&outcomes);
    let summary = annual_dataset::write_processed(&rows, &args.output, &args.summary)?;

    println!("{}", "Annual dataset prepared".green().bold());
    println!(
        "  {} records, {:.1}% failures, years {}-{}",
        summary.total_records,
        summary.failed_percentage,
        summary.min_year.unwrap_or_default(),
        summary.max_year.unwrap_or_default()
    );
    println!("  dataset: {}", args.output.display());
    println!("  summary: {}", args.summary.display());
    Ok(())
}

async fn cmd_regions(args: RegionsArgs) -> Result<()> {
    let harvest = args.sources.harvest_path.clone().ok_or_else(|| {
        Error::configuration("--harvest is required for this command".to_string())
    })?;
    let store = CsvRecordStore::harvest_only(harvest, PipelineConfig::default().schema);

    let records = store.harvest_records(&SourceQuery::default()).await?;
    let regions = distinct_regions(&records);

    println!("{} regions available:", regions.len());
    for region in regions {
        println!("  {region}");
    }
    Ok(())
}

fn print_outcome(outcome: &PredictionOutcome) {
    let verdict = match outcome.label {
        PredictionLabel::Failure => "HARVEST FAILURE RISK".red().bold(),
        PredictionLabel::Normal => "NORMAL".green().bold(),
    };

    println!();
    println!("Region:      {}", outcome.region.bold());
    println!("Prediction:  {verdict}");
    println!(
        "Probability: {:.1}% (threshold {:.1}%)",
        outcome.probability * 100.0,
        outcome.threshold * 100.0
    );
    println!("Risk level:  {}", risk_tag(outcome.risk_level));
    println!(
        "Based on {} windows over {} weather rows and {} harvest rows",
        outcome.window_probabilities.len(),
        outcome.weather_slice.len(),
        outcome.harvest_slice.len()
    );
}

fn risk_tag(risk: RiskLevel) -> colored::ColoredString {
    match risk {
        RiskLevel::High => "high".red().bold(),
        RiskLevel::Medium => "medium".yellow(),
        RiskLevel::Low => "low".green(),
    }
}
