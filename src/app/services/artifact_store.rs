//! Persistence of the trained artifact bundle
//!
//! The bundle is the versioned triple {classifier weights, fitted scaler,
//! model config} produced by one training run. It is read-only during
//! inference and loaded atomically: if any member file is absent the load
//! fails fast with a distinguishable artifacts-missing condition instead
//! of partially proceeding.

use crate::app::services::classifier::LogisticSequenceModel;
use crate::app::services::feature_matrix::MinMaxScaler;
use crate::config::ArtifactPaths;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Small training-run configuration stored alongside the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Probability threshold chosen by the validation sweep
    pub optimal_threshold: f32,

    /// Window length the classifier was trained with
    pub sequence_length: usize,

    /// Width of the feature vectors, for pre-flight shape checks
    pub feature_count: usize,

    /// F1 score achieved on the validation split at the chosen threshold
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_f1: Option<f32>,
}

/// The trained classifier, its scaler, and the run configuration,
/// versioned as a unit
#[derive(Debug, Clone)]
pub struct ModelArtifactBundle {
    pub classifier: LogisticSequenceModel,
    pub scaler: MinMaxScaler,
    pub config: ModelConfig,
}

impl ModelArtifactBundle {
    /// Cross-check that the three members describe the same model shape
    pub fn validate(&self) -> Result<()> {
        use crate::app::services::classifier::SequenceClassifier;

        if self.scaler.feature_count() != self.config.feature_count {
            return Err(Error::data_validation(format!(
                "Scaler has {} columns but the model config records {}",
                self.scaler.feature_count(),
                self.config.feature_count
            )));
        }
        if self.classifier.feature_count() != self.config.feature_count {
            return Err(Error::data_validation(format!(
                "Classifier expects {} features but the model config records {}",
                self.classifier.feature_count(),
                self.config.feature_count
            )));
        }
        if self.classifier.sequence_length != self.config.sequence_length {
            return Err(Error::data_validation(format!(
                "Classifier was fitted with sequence length {} but the model config records {}",
                self.classifier.sequence_length, self.config.sequence_length
            )));
        }
        Ok(())
    }
}

/// Loads and saves the artifact bundle at configured paths
pub struct ArtifactStore {
    paths: ArtifactPaths,
}

impl ArtifactStore {
    pub fn new(paths: ArtifactPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// Load the bundle, failing fast when any member file is absent
    pub async fn load(&self) -> Result<ModelArtifactBundle> {
        let missing = self.paths.missing_files();
        if !missing.is_empty() {
            return Err(Error::artifacts_missing(
                missing.iter().map(|path| path.display().to_string()),
            ));
        }

        let classifier: LogisticSequenceModel =
            read_json(&self.paths.classifier_path, "classifier weights").await?;
        let scaler: MinMaxScaler = read_json(&self.paths.scaler_path, "scaler").await?;
        let config: ModelConfig = read_json(&self.paths.config_path, "model config").await?;

        let bundle = ModelArtifactBundle {
            classifier,
            scaler,
            config,
        };
        bundle.validate()?;

        info!(
            "Loaded artifact bundle: {} features, sequence length {}, threshold {:.3}",
            bundle.config.feature_count,
            bundle.config.sequence_length,
            bundle.config.optimal_threshold
        );
        Ok(bundle)
    }

    /// Persist all three bundle members, creating the directory if needed
    pub async fn save(&self, bundle: &ModelArtifactBundle) -> Result<()> {
        bundle.validate()?;

        if let Some(parent) = self.paths.classifier_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::io(format!("Failed to create {}", parent.display()), e)
            })?;
        }

        write_json(&self.paths.classifier_path, &bundle.classifier, "classifier weights").await?;
        write_json(&self.paths.scaler_path, &bundle.scaler, "scaler").await?;
        write_json(&self.paths.config_path, &bundle.config, "model config").await?;

        info!(
            "Saved artifact bundle to {}",
            self.paths
                .classifier_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .display()
        );
        Ok(())
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    debug!("Reading {} from {}", what, path.display());
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::io(format!("Failed to read {}", path.display()), e))?;
    serde_json::from_str(&content)
        .map_err(|e| Error::serialization(format!("Failed to decode {what}"), e))
}

async fn write_json<T: Serialize>(path: &Path, value: &T, what: &str) -> Result<()> {
    let content = serde_json::to_string_pretty(value)
        .map_err(|e| Error::serialization(format!("Failed to encode {what}"), e))?;
    tokio::fs::write(path, content)
        .await
        .map_err(|e| Error::io(format!("Failed to write {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle() -> ModelArtifactBundle {
        ModelArtifactBundle {
            classifier: LogisticSequenceModel {
                weights: vec![0.5, -0.25],
                bias: 0.1,
                sequence_length: 12,
            },
            scaler: MinMaxScaler {
                columns: vec!["event_Petir".to_string(), "harvested_area".to_string()],
                mins: vec![0.0, 100.0],
                maxs: vec![4.0, 900.0],
            },
            config: ModelConfig {
                optimal_threshold: 0.45,
                sequence_length: 12,
                feature_count: 2,
                validation_f1: Some(0.81),
            },
        }
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(ArtifactPaths::in_dir(dir.path()));

        store.save(&bundle()).await.unwrap();
        let loaded = store.load().await.unwrap();

        assert_eq!(loaded.classifier, bundle().classifier);
        assert_eq!(loaded.scaler, bundle().scaler);
        assert_eq!(loaded.config, bundle().config);
    }

    #[tokio::test]
    async fn missing_member_fails_fast_and_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(ArtifactPaths::in_dir(dir.path()));

        store.save(&bundle()).await.unwrap();
        tokio::fs::remove_file(&store.paths().scaler_path)
            .await
            .unwrap();

        let error = store.load().await.unwrap_err();
        match error {
            Error::ArtifactsMissing { missing } => {
                assert!(missing.contains("feature_scaler.json"));
            }
            other => panic!("expected ArtifactsMissing, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_directory_reports_all_three_members() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(ArtifactPaths::in_dir(dir.path()));

        let error = store.load().await.unwrap_err();
        match error {
            Error::ArtifactsMissing { missing } => {
                assert!(missing.contains("sequence_model.json"));
                assert!(missing.contains("feature_scaler.json"));
                assert!(missing.contains("model_config.json"));
            }
            other => panic!("expected ArtifactsMissing, got {other:?}"),
        }
    }

    #[test]
    fn mismatched_shapes_fail_validation() {
        let mut inconsistent = bundle();
        inconsistent.config.feature_count = 7;
        assert!(inconsistent.validate().is_err());
    }
}
