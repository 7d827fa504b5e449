//! Eligibility inference engine

use crate::config::ArtifactsConfig;
use crate::feature_aligner::FeatureMatrix;
use crate::models::loader::{load_eligibility_model, LoadedModel};
use crate::types::Eligibility;
use anyhow::{Context, Result};
use std::sync::Mutex;
use tracing::{debug, warn};

/// A binary classifier scoring aligned feature rows.
pub trait Classifier: Send + Sync {
    /// Model name used in logs
    fn name(&self) -> &str;

    /// Positive-class (eligible) probability for every row
    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>>;
}

/// Classifier backed by an ONNX Runtime session.
///
/// The session needs exclusive access while running, hence the mutex.
pub struct OnnxClassifier {
    model: Mutex<LoadedModel>,
}

impl OnnxClassifier {
    pub fn load(config: &ArtifactsConfig) -> Result<Self> {
        let model = load_eligibility_model(config)?;
        Ok(Self {
            model: Mutex::new(model),
        })
    }
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        "onnx"
    }

    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        use ort::value::Tensor;

        if features.rows == 0 {
            return Ok(Vec::new());
        }

        let mut guard = self
            .model
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let model: &mut LoadedModel = &mut guard;

        // Input tensor shape [rows, num_features]
        let shape = vec![features.rows as i64, features.cols as i64];
        let input_tensor = Tensor::from_array((shape, features.data.clone()))
            .context("Failed to create input tensor")?;

        let outputs = model
            .session
            .run(ort::inputs![model.input_name.as_str() => input_tensor])?;

        if let Some(output) = outputs.get(model.output_name.as_str()) {
            if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
                let dims: Vec<i64> = shape.iter().copied().collect();
                if let Some(probabilities) = positive_class_probabilities(&dims, data, features.rows) {
                    return Ok(probabilities);
                }
            }
        }

        // Fall back to the hard labels some exports emit alongside probabilities
        for (name, output) in outputs.iter() {
            if !name.contains("label") {
                continue;
            }
            if let Ok((_, labels)) = output.try_extract_tensor::<i64>() {
                if labels.len() == features.rows {
                    warn!(model = %model.name, output = %name, "Using hard labels, probabilities unavailable");
                    return Ok(labels.iter().map(|&l| if l == 1 { 1.0 } else { 0.0 }).collect());
                }
            }
        }

        anyhow::bail!("Model {} produced no usable probability output", model.name)
    }
}

/// Pick the positive-class column out of a probability tensor.
///
/// Handles `[rows, classes]` (class 1 taken when there are two or more) and
/// single-probability `[rows, 1]` / `[rows]` layouts.
fn positive_class_probabilities(dims: &[i64], data: &[f32], rows: usize) -> Option<Vec<f64>> {
    match dims {
        [r, classes] if *r as usize == rows && *classes >= 2 => Some(
            data.chunks(*classes as usize)
                .map(|row| row[1] as f64)
                .collect(),
        ),
        [r, 1] | [r] if *r as usize == rows && data.len() == rows => {
            Some(data.iter().map(|&p| p as f64).collect())
        }
        _ => None,
    }
}

/// Turns aligned features into eligibility decisions.
pub struct InferenceEngine {
    classifier: Box<dyn Classifier>,
    /// Probability at or above which a partner is eligible
    threshold: f64,
}

impl InferenceEngine {
    pub fn new(classifier: Box<dyn Classifier>, threshold: f64) -> Self {
        Self {
            classifier,
            threshold,
        }
    }

    /// Load the ONNX classifier described by the artifacts configuration
    pub fn from_config(config: &ArtifactsConfig) -> Result<Self> {
        let classifier = OnnxClassifier::load(config)?;
        Ok(Self::new(Box::new(classifier), config.decision_threshold))
    }

    pub fn model_name(&self) -> &str {
        self.classifier.name()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Predict every row of the matrix
    pub fn predict(&self, features: &FeatureMatrix) -> Result<Vec<Eligibility>> {
        let probabilities = self.classifier.predict_proba(features)?;
        if probabilities.len() != features.rows {
            anyhow::bail!(
                "Model {} returned {} scores for {} rows",
                self.classifier.name(),
                probabilities.len(),
                features.rows
            );
        }

        let decisions: Vec<Eligibility> = probabilities
            .iter()
            .map(|&p| Eligibility::from_probability(p, self.threshold))
            .collect();

        debug!(
            model = %self.classifier.name(),
            rows = features.rows,
            eligible = decisions.iter().filter(|d| **d == Eligibility::Eligible).count(),
            "Inference complete"
        );

        Ok(decisions)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn matrix(rows: usize, cols: usize, data: Vec<f32>) -> FeatureMatrix {
        FeatureMatrix { rows, cols, data }
    }

    #[test]
    fn test_positive_class_two_columns() {
        let probs = positive_class_probabilities(&[2, 2], &[0.9, 0.1, 0.3, 0.7], 2).unwrap();
        assert!((probs[0] - 0.1).abs() < 1e-6);
        assert!((probs[1] - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_positive_class_single_column() {
        let probs = positive_class_probabilities(&[3], &[0.2, 0.5, 0.8], 3).unwrap();
        assert_eq!(probs.len(), 3);
        assert!(positive_class_probabilities(&[2, 2], &[0.5, 0.5, 0.5, 0.5], 3).is_none());
    }

    #[test]
    fn test_engine_thresholds_scores() {
        let engine = InferenceEngine::new(Box::new(FnClassifier(|row: &[f32]| row[0] as f64)), 0.5);
        let decisions = engine.predict(&matrix(3, 1, vec![0.2, 0.5, 0.9])).unwrap();

        assert_eq!(
            decisions,
            vec![Eligibility::NotEligible, Eligibility::Eligible, Eligibility::Eligible]
        );
    }

    #[test]
    fn test_engine_propagates_failure() {
        let engine = InferenceEngine::new(Box::new(FailingClassifier), 0.5);
        assert!(engine.predict(&matrix(1, 1, vec![0.0])).is_err());
    }
}
