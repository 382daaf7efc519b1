//! Training-run orchestration
//!
//! Drives the full training pipeline: load records, canonicalize regions,
//! derive labels, fit the encoder vocabularies and scaler, window the
//! scaled matrix, fit the classifier, sweep the decision threshold on a
//! validation tail, and persist the artifact bundle. The fitted scaler
//! and column order captured here are the contract every later inference
//! run replays.

use crate::app::services::annual_dataset;
use crate::app::services::artifact_store::{ArtifactStore, ModelArtifactBundle, ModelConfig};
use crate::app::services::classifier::{LogisticSequenceModel, SequenceClassifier};
use crate::app::services::event_encoder::EventVocabulary;
use crate::app::services::feature_matrix::{
    FeatureFrame, MinMaxScaler, areas_from_labeled, build_feature_frame, labels_from_labeled,
};
use crate::app::services::label_deriver::ZScoreLabeler;
use crate::app::services::region_resolver;
use crate::app::services::sequence_windower::{SequenceWindow, collect_windows};
use crate::app::services::source::{RecordStore, SourceQuery};
use crate::app::services::temporal_aggregator::{EncodedObservation, aggregate_weekly};
use crate::config::{ArtifactPaths, PeriodGranularity, PipelineConfig};
use crate::constants::{
    DEFAULT_LEARNING_RATE, DEFAULT_OPTIMAL_THRESHOLD, DEFAULT_TRAINING_EPOCHS,
    EVENT_COLUMN_PREFIX, EVENT_DELIMITER, IMPACT_COLUMN_PREFIX, IMPACT_DELIMITER,
    THRESHOLD_SWEEP_END, THRESHOLD_SWEEP_START, THRESHOLD_SWEEP_STEP, VALIDATION_SPLIT,
};
use crate::{Error, Result};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, info};

/// Tunable knobs for one training run
#[derive(Debug, Clone)]
pub struct TrainingOptions {
    pub epochs: usize,
    pub learning_rate: f64,

    /// Optional Parquet checkpoint of the scaled feature matrix
    pub matrix_export: Option<PathBuf>,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            epochs: DEFAULT_TRAINING_EPOCHS,
            learning_rate: DEFAULT_LEARNING_RATE,
            matrix_export: None,
        }
    }
}

/// Statistics from a completed training run
#[derive(Debug, Clone, Default)]
pub struct TrainingReport {
    pub weather_rows: usize,
    pub harvest_rows: usize,
    pub labeled_rows: usize,
    pub regions: usize,
    pub feature_count: usize,
    pub matrix_rows: usize,
    pub window_count: usize,
    pub positive_windows: usize,
    pub validation_windows: usize,
    pub optimal_threshold: f32,
    pub validation_f1: Option<f32>,
}

impl TrainingReport {
    /// One-line human summary for CLI reporting
    pub fn summary(&self) -> String {
        format!(
            "{} regions, {} matrix rows, {} windows ({} positive), threshold {:.2}{}",
            self.regions,
            self.matrix_rows,
            self.window_count,
            self.positive_windows,
            self.optimal_threshold,
            self.validation_f1
                .map(|f1| format!(", validation F1 {f1:.3}"))
                .unwrap_or_default()
        )
    }
}

/// One offline training run against a record store
pub struct TrainingRun<'a> {
    store: &'a dyn RecordStore,
    config: PipelineConfig,
    paths: ArtifactPaths,
}

impl<'a> TrainingRun<'a> {
    pub fn new(store: &'a dyn RecordStore, config: PipelineConfig, paths: ArtifactPaths) -> Self {
        Self {
            store,
            config,
            paths,
        }
    }

    /// Execute the run and persist the artifact bundle
    pub async fn execute(&self, options: &TrainingOptions) -> Result<TrainingReport> {
        self.config.validate()?;

        let mut report = TrainingReport::default();
        let frame = match self.config.granularity {
            PeriodGranularity::Week => self.build_weekly_frame(&mut report).await?,
            PeriodGranularity::Year => self.build_annual_frame(&mut report).await?,
        };

        if frame.height() == 0 {
            return Err(Error::data_validation(
                "Training produced an empty feature matrix; check source coverage".to_string(),
            ));
        }
        report.matrix_rows = frame.height();
        report.regions = frame
            .regions
            .iter()
            .collect::<BTreeSet<_>>()
            .len();

        let scaler = MinMaxScaler::fit(&frame)?;
        let scaled = scaler.transform(&frame)?;
        report.feature_count = scaler.feature_count();

        if let Some(path) = &options.matrix_export {
            scaled.write_parquet(path)?;
        }

        let windows = collect_windows(
            &scaled,
            self.config.sequence_length,
            self.config.sequence_stride,
        );
        if windows.is_empty() {
            return Err(Error::data_validation(format!(
                "No region has more than {} periods of history; cannot build training windows",
                self.config.sequence_length
            )));
        }
        report.window_count = windows.len();
        report.positive_windows = windows
            .iter()
            .filter(|window| window.label == Some(1))
            .count();

        // Validation tail, as the training split leaves it
        let validation_count =
            ((windows.len() as f64) * VALIDATION_SPLIT) as usize;
        let training_count = windows.len() - validation_count;
        let (training_windows, validation_windows) = windows.split_at(training_count.max(1));
        report.validation_windows = validation_windows.len();

        info!(
            "Fitting classifier on {} windows ({} held out for validation)",
            training_windows.len(),
            validation_windows.len()
        );
        let classifier =
            LogisticSequenceModel::fit(training_windows, options.epochs, options.learning_rate)?;

        let (optimal_threshold, validation_f1) =
            sweep_threshold(&classifier, validation_windows)?;
        report.optimal_threshold = optimal_threshold;
        report.validation_f1 = validation_f1;

        let bundle = ModelArtifactBundle {
            classifier,
            scaler,
            config: ModelConfig {
                optimal_threshold,
                sequence_length: self.config.sequence_length,
                feature_count: report.feature_count,
                validation_f1,
            },
        };
        ArtifactStore::new(self.paths.clone()).save(&bundle).await?;

        info!("Training complete: {}", report.summary());
        Ok(report)
    }

    /// Weekly pipeline: encode events, aggregate, merge with z-score
    /// labeled harvest rows
    async fn build_weekly_frame(&self, report: &mut TrainingReport) -> Result<FeatureFrame> {
        let query = SourceQuery::default();
        let weather = self.store.weather_records(&query).await?;
        let mut harvest = self.store.harvest_records(&query).await?;
        report.weather_rows = weather.len();
        report.harvest_rows = harvest.len();

        if weather.is_empty() || harvest.is_empty() {
            return Err(Error::data_validation(
                "Training sources are empty; both weather and harvest records are required"
                    .to_string(),
            ));
        }

        // Canonicalize both sources so prefix variants join
        for record in &mut harvest {
            record.region = region_resolver::normalize(&record.region);
        }

        let labeler = ZScoreLabeler::new(self.config.z_score_threshold);
        let labeled = labeler.label(&harvest);
        report.labeled_rows = labeled.len();
        debug!("Derived {} labeled harvest rows", labeled.len());

        let event_vocabulary = EventVocabulary::fit(
            weather.iter().filter_map(|record| record.events.as_deref()),
            EVENT_DELIMITER,
            EVENT_COLUMN_PREFIX,
        );
        let impact_vocabulary = EventVocabulary::fit(
            weather.iter().filter_map(|record| record.impacts.as_deref()),
            IMPACT_DELIMITER,
            IMPACT_COLUMN_PREFIX,
        );

        let observations: Vec<EncodedObservation> = weather
            .iter()
            .map(|record| {
                let mut counts = event_vocabulary.encode(record.events.as_deref());
                counts.extend(impact_vocabulary.encode(record.impacts.as_deref()));
                EncodedObservation {
                    region: region_resolver::normalize(&record.region),
                    date: record.date,
                    counts,
                }
            })
            .collect();

        let column_count = event_vocabulary.len() + impact_vocabulary.len();
        let weekly = aggregate_weekly(&observations, column_count);

        let mut indicator_columns = event_vocabulary.column_names();
        indicator_columns.extend(impact_vocabulary.column_names());

        Ok(build_feature_frame(
            &weekly,
            &indicator_columns,
            &areas_from_labeled(&labeled),
            Some(&labels_from_labeled(&labeled)),
        ))
    }

    /// Annual pipeline: keyword-count features and status-text labels
    async fn build_annual_frame(&self, report: &mut TrainingReport) -> Result<FeatureFrame> {
        let mut outcomes = self.store.annual_outcomes().await?;
        report.harvest_rows = outcomes.len();

        if outcomes.is_empty() {
            return Err(Error::data_validation(
                "Training source has no annual outcome rows".to_string(),
            ));
        }

        for record in &mut outcomes {
            record.region = region_resolver::normalize(&record.region);
        }

        let rows = annual_dataset::process_outcomes(&outcomes);
        report.labeled_rows = rows.len();
        Ok(annual_dataset::annual_feature_frame(&rows))
    }
}

/// Sweep classification thresholds over the validation windows, keeping
/// the threshold with the best F1. Falls back to the default threshold
/// when no validation windows exist.
fn sweep_threshold(
    classifier: &LogisticSequenceModel,
    validation: &[SequenceWindow],
) -> Result<(f32, Option<f32>)> {
    if validation.is_empty() {
        return Ok((DEFAULT_OPTIMAL_THRESHOLD, None));
    }

    let probabilities = classifier.predict(validation)?;
    let labels: Vec<u8> = validation
        .iter()
        .map(|window| window.label.unwrap_or_default())
        .collect();

    let mut best_threshold = DEFAULT_OPTIMAL_THRESHOLD;
    let mut best_f1 = 0.0f32;

    let steps =
        ((THRESHOLD_SWEEP_END - THRESHOLD_SWEEP_START) / THRESHOLD_SWEEP_STEP).round() as usize;
    for step in 0..steps {
        let threshold = THRESHOLD_SWEEP_START + THRESHOLD_SWEEP_STEP * step as f32;
        let f1 = f1_score(&labels, &probabilities, threshold);
        if f1 > best_f1 {
            best_f1 = f1;
            best_threshold = threshold;
        }
    }

    debug!(
        "Threshold sweep selected {:.2} (F1 {:.3}) over {} validation windows",
        best_threshold,
        best_f1,
        validation.len()
    );
    Ok((best_threshold, Some(best_f1)))
}

fn f1_score(labels: &[u8], probabilities: &[f32], threshold: f32) -> f32 {
    let mut true_positive = 0u32;
    let mut false_positive = 0u32;
    let mut false_negative = 0u32;

    for (label, probability) in labels.iter().zip(probabilities) {
        let predicted = u8::from(*probability >= threshold);
        match (predicted, *label) {
            (1, 1) => true_positive += 1,
            (1, 0) => false_positive += 1,
            (0, 1) => false_negative += 1,
            _ => {}
        }
    }

    let denominator = 2 * true_positive + false_positive + false_negative;
    if denominator == 0 {
        0.0
    } else {
        2.0 * true_positive as f32 / denominator as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f1_is_zero_without_positives() {
        assert_eq!(f1_score(&[0, 0], &[0.1, 0.2], 0.5), 0.0);
    }

    #[test]
    fn f1_is_one_for_perfect_separation() {
        let labels = [1, 1, 0, 0];
        let probabilities = [0.9, 0.8, 0.1, 0.2];
        assert_eq!(f1_score(&labels, &probabilities, 0.5), 1.0);
    }

    #[test]
    fn f1_penalizes_false_positives() {
        let labels = [1, 0];
        let probabilities = [0.9, 0.9];
        let f1 = f1_score(&labels, &probabilities, 0.5);
        assert!((f1 - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn report_summary_mentions_threshold_and_f1() {
        let report = TrainingReport {
            regions: 3,
            matrix_rows: 120,
            window_count: 84,
            positive_windows: 9,
            optimal_threshold: 0.45,
            validation_f1: Some(0.8),
            ..Default::default()
        };
        let summary = report.summary();
        assert!(summary.contains("threshold 0.45"));
        assert!(summary.contains("validation F1 0.800"));
    }
}
