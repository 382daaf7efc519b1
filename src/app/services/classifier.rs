//! Sequence classifier boundary
//!
//! The pipeline treats the temporal classifier as a black box: windows of
//! shape (sequence_length, feature_count) go in, failure probabilities in
//! [0, 1] come out. [`SequenceClassifier`] is that boundary. The shipped
//! implementation is a mean-pooled logistic scorer with JSON-persisted
//! weights; richer architectures plug in behind the same trait without
//! touching the pipeline.

use crate::app::services::sequence_windower::SequenceWindow;
use crate::{Error, Result};
use ndarray::{Array1, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// The black-box classifier boundary: a fixed tensor shape in, one
/// probability per window out
pub trait SequenceClassifier {
    /// Probability of harvest failure for each window, in window order
    fn predict(&self, windows: &[SequenceWindow]) -> Result<Vec<f32>>;

    /// Width of the feature vectors this classifier was trained on
    fn feature_count(&self) -> usize;
}

/// Mean-pooled logistic scorer over window features.
///
/// Each window is pooled over its time axis into one feature vector,
/// scored linearly, and squashed through a sigmoid. Weights are fitted by
/// full-batch gradient descent, which keeps training deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticSequenceModel {
    pub weights: Vec<f64>,
    pub bias: f64,
    pub sequence_length: usize,
}

impl LogisticSequenceModel {
    /// Fit a model on labeled training windows
    pub fn fit(
        windows: &[SequenceWindow],
        epochs: usize,
        learning_rate: f64,
    ) -> Result<Self> {
        let first = windows.first().ok_or_else(|| {
            Error::data_validation("Cannot fit classifier on zero windows".to_string())
        })?;
        let feature_count = first.values.ncols();
        let sequence_length = first.values.nrows();

        let pooled: Vec<Array1<f64>> = windows
            .iter()
            .map(|window| pool_window(window))
            .collect::<Result<_>>()?;
        let targets: Vec<f64> = windows
            .iter()
            .map(|window| {
                window.label.map(f64::from).ok_or_else(|| {
                    Error::data_validation("Training window is missing its label".to_string())
                })
            })
            .collect::<std::result::Result<_, _>>()?;

        let mut weights = Array1::<f64>::zeros(feature_count);
        let mut bias = 0.0f64;
        let count = windows.len() as f64;

        for epoch in 0..epochs {
            let mut weight_gradient = Array1::<f64>::zeros(feature_count);
            let mut bias_gradient = 0.0f64;

            for (features, target) in pooled.iter().zip(&targets) {
                let residual = sigmoid(weights.dot(features) + bias) - target;
                weight_gradient = weight_gradient + features * residual;
                bias_gradient += residual;
            }

            weights = weights - (weight_gradient / count) * learning_rate;
            bias -= bias_gradient / count * learning_rate;

            if epoch % 50 == 0 {
                debug!("Classifier fit epoch {}: bias {:.4}", epoch, bias);
            }
        }

        info!(
            "Fitted sequence model over {} windows ({} features)",
            windows.len(),
            feature_count
        );

        Ok(Self {
            weights: weights.to_vec(),
            bias,
            sequence_length,
        })
    }
}

impl SequenceClassifier for LogisticSequenceModel {
    fn predict(&self, windows: &[SequenceWindow]) -> Result<Vec<f32>> {
        let weights = Array1::from_vec(self.weights.clone());

        windows
            .iter()
            .map(|window| {
                if window.values.ncols() != self.weights.len() {
                    return Err(Error::data_validation(format!(
                        "Window has {} features but the model expects {}",
                        window.values.ncols(),
                        self.weights.len()
                    )));
                }
                let pooled = pool_window(window)?;
                Ok(sigmoid(weights.dot(&pooled) + self.bias) as f32)
            })
            .collect()
    }

    fn feature_count(&self) -> usize {
        self.weights.len()
    }
}

/// Mean over the window's time axis, one value per feature
fn pool_window(window: &SequenceWindow) -> Result<Array1<f64>> {
    window.values.mean_axis(Axis(0)).ok_or_else(|| {
        Error::data_validation("Cannot pool an empty window".to_string())
    })
}

fn sigmoid(logit: f64) -> f64 {
    1.0 / (1.0 + (-logit).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ndarray::Array2;

    fn window(fill: f64, label: u8) -> SequenceWindow {
        SequenceWindow {
            region: "Bandung".to_string(),
            period_end: NaiveDate::from_ymd_opt(2022, 1, 2).unwrap(),
            values: Array2::from_elem((3, 2), fill),
            label: Some(label),
        }
    }

    fn separable_training_set() -> Vec<SequenceWindow> {
        let mut windows = Vec::new();
        for _ in 0..10 {
            windows.push(window(0.9, 1));
            windows.push(window(0.1, 0));
        }
        windows
    }

    #[test]
    fn fit_learns_a_separable_problem() {
        let model = LogisticSequenceModel::fit(&separable_training_set(), 500, 0.5).unwrap();

        let probabilities = model
            .predict(&[window(0.9, 1), window(0.1, 0)])
            .unwrap();
        assert!(probabilities[0] > 0.5);
        assert!(probabilities[1] < 0.5);
    }

    #[test]
    fn probabilities_stay_in_unit_interval() {
        let model = LogisticSequenceModel::fit(&separable_training_set(), 100, 0.5).unwrap();
        for probability in model.predict(&separable_training_set()).unwrap() {
            assert!((0.0..=1.0).contains(&probability));
        }
    }

    #[test]
    fn feature_width_mismatch_is_an_error() {
        let model = LogisticSequenceModel {
            weights: vec![0.0; 3],
            bias: 0.0,
            sequence_length: 3,
        };
        assert!(model.predict(&[window(0.5, 0)]).is_err());
    }

    #[test]
    fn fit_requires_labels_and_windows() {
        assert!(LogisticSequenceModel::fit(&[], 10, 0.1).is_err());

        let mut unlabeled = window(0.5, 0);
        unlabeled.label = None;
        assert!(LogisticSequenceModel::fit(&[unlabeled], 10, 0.1).is_err());
    }

    #[test]
    fn serializes_round_trip() {
        let model = LogisticSequenceModel {
            weights: vec![0.25, -0.75],
            bias: 0.125,
            sequence_length: 12,
        };
        let encoded = serde_json::to_string(&model).unwrap();
        let decoded: LogisticSequenceModel = serde_json::from_str(&encoded).unwrap();
        assert_eq!(model, decoded);
    }
}
