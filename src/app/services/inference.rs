//! Inference-time pipeline reconstruction and prediction
//!
//! Replays the exact training-time feature pipeline for one region using
//! the persisted artifact bundle: the encoder vocabularies and column
//! order are re-derived from the scaler's stored column list, the scaler
//! is reused verbatim (never refit), and the window length comes from the
//! bundle. Guards insufficient histories into a distinguishable error
//! instead of handing the classifier an empty batch.

use crate::app::models::{
    BatchPredictionEntry, Confidence, HarvestRecord, PredictionLabel, PredictionOutcome,
    RiskLevel, WeatherRecord,
};
use crate::app::services::annual_dataset;
use crate::app::services::artifact_store::{ArtifactStore, ModelArtifactBundle};
use crate::app::services::classifier::SequenceClassifier;
use crate::app::services::event_encoder::EventVocabulary;
use crate::app::services::feature_matrix::{FeatureFrame, build_feature_frame};
use crate::app::services::region_resolver::{self, select_matching};
use crate::app::services::sequence_windower::collect_windows;
use crate::app::services::source::{RecordStore, SourceQuery};
use crate::app::services::temporal_aggregator::{EncodedObservation, aggregate_weekly};
use crate::config::{ArtifactPaths, PeriodGranularity, PipelineConfig};
use crate::constants::{
    EVENT_COLUMN_PREFIX, EVENT_DELIMITER, IMPACT_COLUMN_PREFIX, IMPACT_DELIMITER,
    MIN_SEQUENCE_LENGTH,
};
use crate::{Error, Result};
use chrono::{Datelike, NaiveDate};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// A loaded, immutable prediction pipeline.
///
/// Cheap to share across requests: the bundle is read-only after load, so
/// batch prediction fans out over it without locking.
pub struct InferencePipeline {
    store: Arc<dyn RecordStore>,
    bundle: Arc<ModelArtifactBundle>,
    config: PipelineConfig,
}

impl std::fmt::Debug for InferencePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferencePipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl InferencePipeline {
    /// Load the artifact bundle from disk and build a pipeline.
    ///
    /// Fails fast with [`Error::ArtifactsMissing`] when any bundle member
    /// is absent.
    pub async fn load(
        store: Arc<dyn RecordStore>,
        paths: ArtifactPaths,
        config: PipelineConfig,
    ) -> Result<Self> {
        let bundle = ArtifactStore::new(paths).load().await?;
        Ok(Self::new(store, bundle, config))
    }

    pub fn new(
        store: Arc<dyn RecordStore>,
        bundle: ModelArtifactBundle,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            bundle: Arc::new(bundle),
            config,
        }
    }

    /// Decision threshold persisted by the training run
    pub fn threshold(&self) -> f32 {
        self.bundle.config.optimal_threshold
    }

    /// Predict harvest-failure risk for one region.
    ///
    /// `start_date` restricts the weather history; when the restriction
    /// leaves nothing, the full regional history is used instead. When no
    /// start date is given, `planting_month` anchors the window at the
    /// first day of that month in the latest year on record.
    pub async fn predict_one(
        &self,
        region: &str,
        start_date: Option<NaiveDate>,
        planting_month: Option<u32>,
    ) -> Result<PredictionOutcome> {
        match self.config.granularity {
            PeriodGranularity::Week => {
                self.predict_weekly(region, start_date, planting_month).await
            }
            PeriodGranularity::Year => self.predict_annual(region).await,
        }
    }

    /// Predict many regions with per-region error isolation.
    ///
    /// One region's failure never aborts the batch: its slot carries an
    /// error message instead. Output order matches input order.
    pub async fn predict_many(&self, regions: &[String]) -> Vec<BatchPredictionEntry> {
        let concurrency = num_cpus::get().clamp(1, 8);
        debug!(
            "Batch predicting {} regions with concurrency {}",
            regions.len(),
            concurrency
        );

        futures::stream::iter(regions.iter().cloned())
            .map(|region| async move {
                match self.predict_one(&region, None, None).await {
                    Ok(outcome) => BatchPredictionEntry::success(outcome),
                    Err(error) => BatchPredictionEntry::failure(region, error.to_string()),
                }
            })
            .buffered(concurrency)
            .collect()
            .await
    }

    /// Distinct raw region names present in the harvest source, sorted
    /// case-insensitively
    pub async fn known_regions(&self) -> Result<Vec<String>> {
        let records = self
            .store
            .harvest_records(&SourceQuery::default())
            .await?;
        Ok(crate::app::services::source::distinct_regions(&records))
    }

    async fn predict_weekly(
        &self,
        region: &str,
        start_date: Option<NaiveDate>,
        planting_month: Option<u32>,
    ) -> Result<PredictionOutcome> {
        if let Some(month) = planting_month {
            if !(1..=12).contains(&month) {
                return Err(Error::configuration(format!(
                    "Planting month {month} is out of range 1-12"
                )));
            }
        }

        let query = SourceQuery {
            region: Some(region.to_string()),
            start_date,
        };
        let all_weather = self.store.weather_records(&query).await?;
        let all_harvest = self.store.harvest_records(&query).await?;

        let (weather_matched, weather_tier) =
            select_matching(&all_weather, |record| record.region.as_str(), region);
        let (harvest_matched, _) =
            select_matching(&all_harvest, |record| record.region.as_str(), region);

        if weather_matched.is_empty() || harvest_matched.is_empty() {
            return Err(Error::data_not_found(region));
        }
        debug!(
            "Region '{}' matched {} weather rows at tier {:?}",
            region,
            weather_matched.len(),
            weather_tier
        );

        // Anchor the analysis window, falling back to the full history
        // when the restriction leaves nothing.
        let effective_start = start_date.or_else(|| {
            planting_month.and_then(|month| {
                let latest_year = weather_matched
                    .iter()
                    .map(|record| record.date.year())
                    .max()?;
                NaiveDate::from_ymd_opt(latest_year, month, 1)
            })
        });

        let weather_slice: Vec<WeatherRecord> = match effective_start {
            Some(start) => {
                let restricted: Vec<WeatherRecord> = weather_matched
                    .iter()
                    .filter(|record| record.date >= start)
                    .map(|record| (*record).clone())
                    .collect();
                if restricted.is_empty() {
                    debug!(
                        "Start date {} leaves no weather rows for '{}'; using full history",
                        start, region
                    );
                    weather_matched.iter().map(|record| (*record).clone()).collect()
                } else {
                    restricted
                }
            }
            None => weather_matched.iter().map(|record| (*record).clone()).collect(),
        };
        let harvest_slice: Vec<HarvestRecord> =
            harvest_matched.iter().map(|record| (*record).clone()).collect();

        // Re-derive the training-time vocabularies from the persisted
        // scaler columns; tokens unseen at training encode to nothing.
        let scaler = &self.bundle.scaler;
        let event_vocabulary =
            EventVocabulary::from_columns(&scaler.columns, EVENT_DELIMITER, EVENT_COLUMN_PREFIX);
        let impact_vocabulary =
            EventVocabulary::from_columns(&scaler.columns, IMPACT_DELIMITER, IMPACT_COLUMN_PREFIX);

        let observations: Vec<_> = weather_slice
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

        let mut areas: HashMap<(String, i32), f64> = HashMap::new();
        for record in &harvest_slice {
            if let Some(area) = record.harvested_area {
                areas
                    .entry((region_resolver::normalize(&record.region), record.year))
                    .or_insert(area);
            }
        }

        let frame = build_feature_frame(&weekly, &indicator_columns, &areas, None);
        let scaled = scaler.transform(&frame)?;

        self.classify(region, scaled, weather_slice, harvest_slice)
    }

    async fn predict_annual(&self, region: &str) -> Result<PredictionOutcome> {
        let outcomes = self.store.annual_outcomes().await?;
        let (matched, _) = select_matching(&outcomes, |record| record.region.as_str(), region);
        if matched.is_empty() {
            return Err(Error::data_not_found(region));
        }

        let mut owned: Vec<_> = matched.into_iter().cloned().collect();
        for record in &mut owned {
            record.region = region_resolver::normalize(&record.region);
        }

        let rows = annual_dataset::process_outcomes(&owned);
        let mut frame = annual_dataset::annual_feature_frame(&rows);
        frame.labels = None;
        let scaled = self.bundle.scaler.transform(&frame)?;

        // The annual source has no daily weather rows; the yield history
        // stands in as the harvest slice for the explanation layer.
        let harvest_slice: Vec<HarvestRecord> = owned
            .iter()
            .map(|record| HarvestRecord {
                region: record.region.clone(),
                year: record.year,
                productivity: None,
                harvested_area: None,
                production: Some(record.yield_tons),
            })
            .collect();

        self.classify(region, scaled, Vec::new(), harvest_slice)
    }

    /// Window the scaled history, guard insufficiency, and run the
    /// classifier over every window
    fn classify(
        &self,
        region: &str,
        scaled: FeatureFrame,
        weather_slice: Vec<WeatherRecord>,
        harvest_slice: Vec<HarvestRecord>,
    ) -> Result<PredictionOutcome> {
        let available = scaled.height();
        let sequence_length = self.effective_sequence_length(available);

        let windows = collect_windows(&scaled, sequence_length, self.config.sequence_stride);
        if windows.is_empty() {
            return Err(Error::insufficient_sequence(
                region,
                available,
                sequence_length + 1,
            ));
        }

        let window_probabilities = self.bundle.classifier.predict(&windows)?;
        let probability = *window_probabilities
            .last()
            .expect("non-empty windows produce non-empty probabilities");
        let threshold = self.bundle.config.optimal_threshold;

        info!(
            "Region '{}': probability {:.4} over {} windows (threshold {:.3})",
            region,
            probability,
            window_probabilities.len(),
            threshold
        );

        Ok(PredictionOutcome {
            region: region.to_string(),
            probability,
            threshold,
            label: PredictionLabel::from_probability(probability, threshold),
            risk_level: RiskLevel::from_probability(probability, threshold),
            confidence: Confidence::from_probability(probability, threshold),
            window_probabilities,
            weather_slice,
            harvest_slice,
        })
    }

    /// Sequence length for this request: the bundle's training length,
    /// optionally shortened for naturally short annual histories
    fn effective_sequence_length(&self, available: usize) -> usize {
        let configured = self.bundle.config.sequence_length;
        if !self.config.allow_sequence_override {
            return configured;
        }
        configured
            .min(available.saturating_sub(1))
            .max(MIN_SEQUENCE_LENGTH)
    }
}
