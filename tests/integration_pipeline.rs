//! End-to-end integration tests for the harvest prediction pipeline
//!
//! These tests train a real artifact bundle from synthetic CSV sources,
//! then exercise the inference pipeline against it: the predict contract,
//! the insufficient-data guard, per-region batch isolation, and the
//! fail-fast artifact check.

use chrono::NaiveDate;
use harvest_processor::Error;
use harvest_processor::app::models::PredictionLabel;
use harvest_processor::app::services::inference::InferencePipeline;
use harvest_processor::app::services::source::CsvRecordStore;
use harvest_processor::app::services::training::{TrainingOptions, TrainingRun};
use harvest_processor::config::{ArtifactPaths, PipelineConfig};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const SEQUENCE_LENGTH: usize = 3;

/// Write synthetic weather and harvest CSVs:
/// - "Kab. Bandung": 12 weekly events in 2021 plus 8 in 2022, with a
///   severe yield drop in 2022 (z < -1.5)
/// - "Kota Bogor": only 2 weekly events, enough to resolve the region
///   but never enough for a window
fn write_sources(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let mut weather = String::from("Kabupaten/Kota;Tanggal;Cuaca Ekstrem;Dampak\n");

    let events = ["Hujan Lebat, Petir", "Hujan Lebat", "Angin Kencang"];
    let impacts = ["Banjir / Genangan", "Pohon Tumbang", ""];

    let start_2021 = NaiveDate::from_ymd_opt(2021, 1, 4).unwrap();
    for week in 0..12i64 {
        let date = start_2021 + chrono::Duration::weeks(week);
        weather.push_str(&format!(
            "Kab. Bandung;{};{};{}\n",
            date.format("%Y-%m-%d"),
            events[week as usize % events.len()],
            impacts[week as usize % impacts.len()],
        ));
    }
    let start_2022 = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
    for week in 0..8i64 {
        let date = start_2022 + chrono::Duration::weeks(week);
        weather.push_str(&format!(
            "Kab. Bandung;{};{};{}\n",
            date.format("%Y-%m-%d"),
            events[week as usize % events.len()],
            impacts[week as usize % impacts.len()],
        ));
    }
    // Bogor: two events only
    weather.push_str("Kota Bogor;2022-02-07;Hujan Lebat;Banjir / Genangan\n");
    weather.push_str("Kota Bogor;2022-02-14;Petir;\n");

    let mut harvest = String::from(
        "Kabupaten/Kota;Tahun;Produktivitas Tanaman Padi (ku/ha) (Ku/ha);\
         Luas Panen Tanaman Padi (ha) (Ha);Rekap Produksi Padi (ton)\n",
    );
    // Bandung: three stable years then a collapse (z ~ -1.73 in 2022)
    for (year, productivity) in [(2019, "60"), (2020, "60"), (2021, "60"), (2022, "10")] {
        harvest.push_str(&format!(
            "Kab. Bandung;{year};{productivity};1 200,5;99 000\n"
        ));
    }
    // Bogor: spread exists so labels are defined
    for (year, productivity) in [(2019, "50"), (2020, "52"), (2021, "48"), (2022, "51")] {
        harvest.push_str(&format!("Kota Bogor;{year};{productivity};800;40 000\n"));
    }

    let weather_path = dir.join("sample_data_cuaca.csv");
    let harvest_path = dir.join("sample_data_panen.csv");
    std::fs::write(&weather_path, weather).unwrap();
    std::fs::write(&harvest_path, harvest).unwrap();
    (weather_path, harvest_path)
}

fn pipeline_config() -> PipelineConfig {
    PipelineConfig::default().with_sequence_length(SEQUENCE_LENGTH)
}

/// Train a bundle into the given directory and return the store used
async fn train(dir: &TempDir) -> (CsvRecordStore, ArtifactPaths) {
    let (weather_path, harvest_path) = write_sources(dir.path());
    let store = CsvRecordStore::new(
        weather_path,
        harvest_path,
        pipeline_config().schema.clone(),
    );
    let paths = ArtifactPaths::in_dir(&dir.path().join("models"));

    let options = TrainingOptions {
        epochs: 150,
        learning_rate: 0.2,
        matrix_export: Some(dir.path().join("training_matrix.parquet")),
    };
    let report = TrainingRun::new(&store, pipeline_config(), paths.clone())
        .execute(&options)
        .await
        .expect("training should succeed on the synthetic sources");

    // Bandung contributes 20 weekly periods, Bogor only 2:
    // (20 - 3) + 0 = 17 windows
    assert_eq!(report.window_count, 17);
    assert!(report.positive_windows > 0);
    assert!(dir.path().join("training_matrix.parquet").exists());

    (store, paths)
}

#[tokio::test]
async fn predict_one_honors_the_artifact_contract() {
    let dir = TempDir::new().unwrap();
    let (store, paths) = train(&dir).await;

    // the persisted model config carries the decision threshold
    let persisted: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(&paths.config_path).unwrap(),
    )
    .unwrap();
    let persisted_threshold = persisted["optimal_threshold"].as_f64().unwrap() as f32;

    let pipeline = InferencePipeline::load(Arc::new(store), paths, pipeline_config())
        .await
        .unwrap();

    let outcome = pipeline
        .predict_one("Bandung", None, None)
        .await
        .expect("Bandung has a full history");

    assert!((0.0..=1.0).contains(&outcome.probability));
    assert_eq!(outcome.threshold, persisted_threshold);
    assert_eq!(
        outcome.label == PredictionLabel::Failure,
        outcome.probability >= outcome.threshold
    );
    assert!(!outcome.window_probabilities.is_empty());
    assert!(!outcome.weather_slice.is_empty());
    assert!(!outcome.harvest_slice.is_empty());
}

#[tokio::test]
async fn short_histories_are_insufficient_not_fatal() {
    let dir = TempDir::new().unwrap();
    let (store, paths) = train(&dir).await;
    let pipeline = InferencePipeline::load(Arc::new(store), paths, pipeline_config())
        .await
        .unwrap();

    // Bogor resolves but has 2 periods against a window of 3
    let error = pipeline
        .predict_one("Bogor", None, None)
        .await
        .unwrap_err();
    match error {
        Error::InsufficientSequence {
            region,
            available,
            required,
        } => {
            assert_eq!(region, "Bogor");
            assert_eq!(available, 2);
            assert_eq!(required, SEQUENCE_LENGTH + 1);
        }
        other => panic!("expected InsufficientSequence, got {other:?}"),
    }

    // an unknown region is a different condition entirely
    let error = pipeline
        .predict_one("Atlantis", None, None)
        .await
        .unwrap_err();
    assert!(matches!(error, Error::DataNotFound { .. }));
}

#[tokio::test]
async fn batch_prediction_isolates_failures_per_region() {
    let dir = TempDir::new().unwrap();
    let (store, paths) = train(&dir).await;
    let pipeline = InferencePipeline::load(Arc::new(store), paths, pipeline_config())
        .await
        .unwrap();

    let regions = vec![
        "Kab. Bandung".to_string(),
        "Atlantis".to_string(),
        "Kota Bogor".to_string(),
    ];
    let entries = pipeline.predict_many(&regions).await;

    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].region, "Kab. Bandung");
    assert!(entries[0].prediction.is_some());

    assert!(entries[1].prediction.is_none());
    assert!(entries[1].error.as_deref().unwrap().contains("Atlantis"));

    // insufficient history and missing data read differently
    assert!(entries[2].error.as_deref().unwrap().contains("Insufficient"));
}

#[tokio::test]
async fn start_date_restriction_falls_back_to_full_history() {
    let dir = TempDir::new().unwrap();
    let (store, paths) = train(&dir).await;
    let pipeline = InferencePipeline::load(Arc::new(store), paths, pipeline_config())
        .await
        .unwrap();

    // a start date beyond the newest record leaves nothing; the pipeline
    // must fall back to the full history instead of failing
    let outcome = pipeline
        .predict_one(
            "Bandung",
            Some(NaiveDate::from_ymd_opt(2030, 1, 1).unwrap()),
            None,
        )
        .await
        .unwrap();
    assert!(!outcome.weather_slice.is_empty());
}

#[tokio::test]
async fn missing_artifacts_fail_fast_before_any_prediction() {
    let dir = TempDir::new().unwrap();
    let (weather_path, harvest_path) = write_sources(dir.path());
    let store = CsvRecordStore::new(
        weather_path,
        harvest_path,
        pipeline_config().schema.clone(),
    );

    let error = InferencePipeline::load(
        Arc::new(store),
        ArtifactPaths::in_dir(&dir.path().join("empty")),
        pipeline_config(),
    )
    .await
    .unwrap_err();

    assert!(matches!(error, Error::ArtifactsMissing { .. }));
}
