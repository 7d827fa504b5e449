//! Prediction outcomes and the evaluation metrics bundle

use serde::{Deserialize, Serialize};

/// Eligibility decision produced by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Eligibility {
    #[serde(rename = "Eligible")]
    Eligible,
    #[serde(rename = "Not Eligible")]
    NotEligible,
}

impl Eligibility {
    /// Map a positive-class probability to a decision
    pub fn from_probability(probability: f64, threshold: f64) -> Self {
        if probability >= threshold {
            Eligibility::Eligible
        } else {
            Eligibility::NotEligible
        }
    }

    /// Binary label (1 = eligible)
    pub fn as_label(&self) -> u8 {
        match self {
            Eligibility::Eligible => 1,
            Eligibility::NotEligible => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Eligibility::Eligible => "Eligible",
            Eligibility::NotEligible => "Not Eligible",
        }
    }
}

impl std::fmt::Display for Eligibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hold-out metrics computed once at training time.
///
/// Attached verbatim to every inference response. Fields absent from the
/// artifact are omitted, so a missing artifact serializes as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recall: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f1_score: Option<f64>,
}

impl EvaluationMetrics {
    /// Compute the bundle from binary labels.
    ///
    /// Precision, recall and F1 are 0 when their denominator is 0.
    pub fn from_labels(y_true: &[u8], y_pred: &[u8]) -> Self {
        let mut tp = 0usize;
        let mut fp = 0usize;
        let mut fn_ = 0usize;
        let mut correct = 0usize;

        for (&truth, &pred) in y_true.iter().zip(y_pred) {
            if truth == pred {
                correct += 1;
            }
            match (truth, pred) {
                (1, 1) => tp += 1,
                (0, 1) => fp += 1,
                (1, 0) => fn_ += 1,
                _ => {}
            }
        }

        let total = y_true.len().min(y_pred.len());
        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };

        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1_score = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };

        Self {
            accuracy: Some(ratio(correct, total)),
            precision: Some(precision),
            recall: Some(recall),
            f1_score: Some(f1_score),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.accuracy.is_none()
            && self.precision.is_none()
            && self.recall.is_none()
            && self.f1_score.is_none()
    }
}
