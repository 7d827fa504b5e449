//! Group fairness reporting for bulk uploads.
//!
//! Computed only when an upload carries ground truth labels and the
//! configured sensitive attribute column. Groups are visited in sorted label
//! order, which also fixes how ties are broken in the observation.

use crate::types::{ColumnValues, Eligibility};
use serde::Serialize;
use std::collections::BTreeMap;

/// Observation returned when fairness cannot be computed.
pub const UNAVAILABLE_OBSERVATION: &str =
    "Fairness metrics require ground truth labels and are not available for this upload.";

const MITIGATION_NOTE: &str = " Mitigation recommended: Consider reweighting or post-processing.";

/// Textual ground truth values counted as positive (compared lowercased).
const POSITIVE_LABELS: &[&str] = &["eligible", "1", "true", "yes"];

/// Per-group metrics. Serializes as `{}` when empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FairnessMetrics {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub selection_rate: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub equal_opportunity: BTreeMap<String, f64>,
}

impl FairnessMetrics {
    pub fn is_empty(&self) -> bool {
        self.selection_rate.is_empty() && self.equal_opportunity.is_empty()
    }
}

/// Fairness metrics with a human-readable observation.
#[derive(Debug, Clone, PartialEq)]
pub struct FairnessReport {
    pub metrics: FairnessMetrics,
    pub observation: String,
}

impl FairnessReport {
    /// Empty report with the explanatory placeholder.
    pub fn unavailable() -> Self {
        Self {
            metrics: FairnessMetrics::default(),
            observation: UNAVAILABLE_OBSERVATION.to_string(),
        }
    }
}

#[derive(Default)]
struct GroupCounts {
    size: usize,
    predicted_positive: usize,
    actual_positive: usize,
    true_positive: usize,
}

/// Computes selection rate and equal opportunity per sensitive group.
#[derive(Debug, Clone)]
pub struct FairnessReporter {
    disparity_threshold: f64,
}

impl FairnessReporter {
    /// `disparity_threshold` is the selection-rate gap (as a fraction) above
    /// which a mitigation note is added.
    pub fn new(disparity_threshold: f64) -> Self {
        Self {
            disparity_threshold,
        }
    }

    /// Report for an upload, checking prerequisites first.
    ///
    /// Returns [`FairnessReport::unavailable`] when either the ground truth or
    /// the sensitive attribute is missing.
    pub fn report_for_upload(
        &self,
        ground_truth: Option<&ColumnValues>,
        sensitive: Option<&ColumnValues>,
        predictions: &[Eligibility],
    ) -> FairnessReport {
        let (Some(ground_truth), Some(sensitive)) = (ground_truth, sensitive) else {
            return FairnessReport::unavailable();
        };

        let y_true = normalize_labels(ground_truth);
        let y_pred: Vec<u8> = predictions.iter().map(Eligibility::as_label).collect();
        let groups: Vec<Option<String>> = (0..sensitive.len()).map(|row| sensitive.text(row)).collect();

        self.report(&y_true, &y_pred, &groups)
    }

    /// Group metrics over aligned label, prediction and group slices.
    ///
    /// Rows without a group value are skipped. Never fails: with no usable
    /// rows the placeholder report is returned.
    pub fn report(&self, y_true: &[u8], y_pred: &[u8], groups: &[Option<String>]) -> FairnessReport {
        let mut counts: BTreeMap<&str, GroupCounts> = BTreeMap::new();

        for ((&truth, &pred), group) in y_true.iter().zip(y_pred).zip(groups) {
            let Some(group) = group else { continue };
            let entry = counts.entry(group.as_str()).or_default();
            entry.size += 1;
            if pred == 1 {
                entry.predicted_positive += 1;
            }
            if truth == 1 {
                entry.actual_positive += 1;
                if pred == 1 {
                    entry.true_positive += 1;
                }
            }
        }

        if counts.is_empty() {
            return FairnessReport::unavailable();
        }

        let mut metrics = FairnessMetrics::default();
        for (group, c) in &counts {
            let selection_rate = c.predicted_positive as f64 / c.size as f64;
            let true_positive_rate = if c.actual_positive == 0 {
                0.0
            } else {
                c.true_positive as f64 / c.actual_positive as f64
            };
            metrics.selection_rate.insert(group.to_string(), selection_rate);
            metrics
                .equal_opportunity
                .insert(group.to_string(), true_positive_rate);
        }

        let observation = self.observe(&metrics.selection_rate);
        FairnessReport {
            metrics,
            observation,
        }
    }

    fn observe(&self, rates: &BTreeMap<String, f64>) -> String {
        let mut max: Option<(&str, f64)> = None;
        let mut min: Option<(&str, f64)> = None;

        for (group, &rate) in rates {
            if max.map_or(true, |(_, best)| rate > best) {
                max = Some((group.as_str(), rate));
            }
            if min.map_or(true, |(_, worst)| rate < worst) {
                min = Some((group.as_str(), rate));
            }
        }

        let (Some((max_group, max_rate)), Some((min_group, min_rate))) = (max, min) else {
            return UNAVAILABLE_OBSERVATION.to_string();
        };

        let gap = max_rate - min_rate;
        let mut observation = format!(
            "{} group approval rate is {:.2}% higher than {} group.",
            max_group,
            gap * 100.0,
            min_group
        );
        if gap.abs() > self.disparity_threshold {
            observation.push_str(MITIGATION_NOTE);
        }
        observation
    }
}

impl Default for FairnessReporter {
    fn default() -> Self {
        Self::new(0.1)
    }
}

/// Map ground truth to binary labels.
///
/// Text labels are positive when they read eligible/1/true/yes in any case;
/// numeric labels are positive when equal to 1. Empty cells are negative.
pub fn normalize_labels(values: &ColumnValues) -> Vec<u8> {
    match values {
        ColumnValues::Numeric(values) => values
            .iter()
            .map(|v| u8::from(*v == Some(1.0)))
            .collect(),
        ColumnValues::Categorical(values) => values
            .iter()
            .map(|v| {
                let positive = v
                    .as_deref()
                    .map(|s| POSITIVE_LABELS.contains(&s.trim().to_lowercase().as_str()))
                    .unwrap_or(false);
                u8::from(positive)
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(labels: &[&str]) -> Vec<Option<String>> {
        labels.iter().map(|s| Some(s.to_string())).collect()
    }

    #[test]
    fn test_two_group_disparity() {
        let reporter = FairnessReporter::default();
        let report = reporter.report(&[1, 1, 0, 0], &[1, 0, 0, 0], &groups(&["A", "A", "B", "B"]));

        assert_eq!(report.metrics.selection_rate["A"], 0.5);
        assert_eq!(report.metrics.selection_rate["B"], 0.0);
        assert_eq!(report.metrics.equal_opportunity["A"], 0.5);
        assert_eq!(report.metrics.equal_opportunity["B"], 0.0);
        assert_eq!(
            report.observation,
            "A group approval rate is 50.00% higher than B group. \
             Mitigation recommended: Consider reweighting or post-processing."
        );
    }

    #[test]
    fn test_small_gap_has_no_mitigation_note() {
        let reporter = FairnessReporter::default();
        let report = reporter.report(
            &[1; 20],
            &[
                1, 1, 1, 1, 1, 1, 1, 1, 1, 1, // Driver: 10/10
                1, 1, 1, 1, 1, 1, 1, 1, 1, 0, // Merchant: 9/10
            ],
            &[vec![Some("Driver".to_string()); 10], vec![Some("Merchant".to_string()); 10]].concat(),
        );

        assert_eq!(
            report.observation,
            "Driver group approval rate is 10.00% higher than Merchant group."
        );
    }

    #[test]
    fn test_ties_follow_group_order() {
        let reporter = FairnessReporter::default();
        let report = reporter.report(&[1, 1], &[1, 1], &groups(&["Merchant", "Driver"]));

        assert_eq!(
            report.observation,
            "Driver group approval rate is 0.00% higher than Driver group."
        );
    }

    #[test]
    fn test_missing_prerequisites() {
        let reporter = FairnessReporter::default();
        let truth = ColumnValues::Numeric(vec![Some(1.0)]);

        let report = reporter.report_for_upload(Some(&truth), None, &[Eligibility::Eligible]);
        assert_eq!(report, FairnessReport::unavailable());
        assert!(report.metrics.is_empty());
        assert_eq!(report.observation, UNAVAILABLE_OBSERVATION);
        assert_eq!(serde_json::to_string(&report.metrics).unwrap(), "{}");
    }

    #[test]
    fn test_rows_without_group_are_skipped() {
        let reporter = FairnessReporter::default();
        let report = reporter.report(&[1, 0], &[1, 1], &[Some("A".to_string()), None]);

        assert_eq!(report.metrics.selection_rate.len(), 1);
        assert_eq!(report.metrics.selection_rate["A"], 1.0);
    }

    #[test]
    fn test_normalize_text_labels() {
        let values = ColumnValues::Categorical(vec![
            Some("Eligible".to_string()),
            Some("YES".to_string()),
            Some("Not Eligible".to_string()),
            Some("true".to_string()),
            None,
        ]);
        assert_eq!(normalize_labels(&values), vec![1, 1, 0, 1, 0]);
    }

    #[test]
    fn test_normalize_numeric_labels() {
        let values = ColumnValues::Numeric(vec![Some(1.0), Some(0.0), None]);
        assert_eq!(normalize_labels(&values), vec![1, 0, 0]);
    }

    #[test]
    fn test_report_for_upload_uses_sensitive_text() {
        let reporter = FairnessReporter::default();
        let truth = ColumnValues::Categorical(vec![Some("Eligible".into()), Some("Not Eligible".into())]);
        let sensitive = ColumnValues::Categorical(vec![Some("Driver".into()), Some("Merchant".into())]);

        let report = reporter.report_for_upload(
            Some(&truth),
            Some(&sensitive),
            &[Eligibility::Eligible, Eligibility::NotEligible],
        );

        assert_eq!(report.metrics.selection_rate["Driver"], 1.0);
        assert_eq!(report.metrics.equal_opportunity["Merchant"], 0.0);
        assert!(report.observation.starts_with("Driver group approval rate is 100.00% higher"));
    }
}
