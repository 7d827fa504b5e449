//! Prediction orchestration: validate, align, score, log and report.
//!
//! Everything here is synchronous. The HTTP layer runs it on the blocking
//! pool because ONNX inference holds the CPU.

use crate::config::{AppConfig, FairnessConfig};
use crate::error::{Result, ServiceError};
use crate::fairness::{normalize_labels, FairnessMetrics, FairnessReport, FairnessReporter};
use crate::feature_aligner::FeatureAligner;
use crate::models::artifacts;
use crate::models::InferenceEngine;
use crate::submission_log::SubmissionLog;
use crate::types::{Column, Eligibility, EvaluationMetrics, Table};
use crate::validator::InputValidator;
use anyhow::Context;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

/// Response of the single-record endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SinglePrediction {
    pub prediction: Eligibility,
    pub metrics: EvaluationMetrics,
}

/// Response of the bulk endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct BulkPrediction {
    /// Uploaded rows with the prediction column appended
    pub predictions: Vec<Map<String, Value>>,
    pub metrics: EvaluationMetrics,
    pub fairness_metrics: FairnessMetrics,
    pub fairness_observation: String,
    #[serde(skip)]
    pub decisions: Vec<Eligibility>,
}

/// Scores of the model against a labeled table.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub rows: usize,
    pub metrics: EvaluationMetrics,
    pub fairness: FairnessReport,
}

/// Immutable state shared by every request once artifacts are loaded.
pub struct InferenceContext {
    engine: InferenceEngine,
    aligner: FeatureAligner,
    validator: InputValidator,
    fairness: FairnessReporter,
    columns: FairnessConfig,
    evaluation: EvaluationMetrics,
    submission_log: Option<SubmissionLog>,
}

impl InferenceContext {
    pub fn new(engine: InferenceEngine, aligner: FeatureAligner, evaluation: EvaluationMetrics) -> Self {
        let columns = FairnessConfig::default();
        Self {
            engine,
            aligner,
            validator: InputValidator::default(),
            fairness: FairnessReporter::new(columns.disparity_threshold),
            columns,
            evaluation,
            submission_log: None,
        }
    }

    pub fn with_validator(mut self, validator: InputValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_fairness(mut self, config: FairnessConfig) -> Self {
        self.fairness = FairnessReporter::new(config.disparity_threshold);
        self.columns = config;
        self
    }

    pub fn with_submission_log(mut self, log: Option<SubmissionLog>) -> Self {
        self.submission_log = log;
        self
    }

    /// Load the model, feature manifest and evaluation metrics.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let manifest = artifacts::load_manifest(config.artifacts.columns_path())?;
        let evaluation = artifacts::load_metrics(config.artifacts.metrics_path())?;
        let engine = InferenceEngine::from_config(&config.artifacts)?;
        let aligner = FeatureAligner::new(manifest, config.alignment.encoding);

        info!(
            model = %engine.model_name(),
            features = aligner.feature_count(),
            encoding = ?aligner.strategy(),
            threshold = engine.threshold(),
            "Inference context ready"
        );

        let submission_log = config
            .submission_log
            .enabled
            .then(|| SubmissionLog::new(&config.submission_log.path));

        Ok(Self::new(engine, aligner, evaluation)
            .with_validator(InputValidator::new(config.validation.clone()))
            .with_fairness(config.fairness.clone())
            .with_submission_log(submission_log))
    }

    /// Number of features the loaded model expects.
    pub fn feature_count(&self) -> usize {
        self.aligner.feature_count()
    }

    /// Score one JSON record.
    pub fn predict_single(&self, record: &Value) -> Result<SinglePrediction> {
        self.validator.validate_record(record)?;

        let mut table = Table::from_json_record(record)?;
        let features = self.aligner.align_to_matrix(&table)?;
        let decisions = self
            .engine
            .predict(&features)
            .context("Error processing record")
            .map_err(ServiceError::Internal)?;
        let prediction = decisions
            .first()
            .copied()
            .ok_or_else(|| ServiceError::Internal(anyhow::anyhow!("Model returned no prediction")))?;

        table
            .set_column(Column::categorical(
                self.columns.prediction_column.as_str(),
                vec![Some(prediction.as_str().to_string())],
            ))
            .context("Failed to attach prediction")
            .map_err(ServiceError::Internal)?;
        self.log_submission(&table);

        Ok(SinglePrediction {
            prediction,
            metrics: self.evaluation.clone(),
        })
    }

    /// Score every row of an uploaded table.
    ///
    /// The ground truth column is split off before validation and never
    /// reaches the model; it is only used for fairness reporting.
    pub fn predict_bulk(&self, mut table: Table) -> Result<BulkPrediction> {
        let ground_truth = table
            .column(&self.columns.ground_truth_column)
            .map(|c| c.values.clone())
            .filter(|values| !values.is_all_missing());

        let mut features = table.clone();
        features.remove_column(&self.columns.ground_truth_column);
        let dropped = features.drop_empty_columns();
        if !dropped.is_empty() {
            debug!(columns = ?dropped, "Dropped empty columns");
        }

        self.validator.validate_table(&features)?;

        let matrix = self.aligner.align_to_matrix(&features)?;
        let decisions = self
            .engine
            .predict(&matrix)
            .context("Error processing file")
            .map_err(ServiceError::Internal)?;

        table
            .set_column(Column::categorical(
                self.columns.prediction_column.as_str(),
                decisions.iter().map(|d| Some(d.as_str().to_string())).collect(),
            ))
            .context("Error processing file")
            .map_err(ServiceError::Internal)?;
        table.drop_empty_columns();
        self.log_submission(&table);

        let sensitive = table
            .column(&self.columns.sensitive_column)
            .map(|c| &c.values);
        let report = self
            .fairness
            .report_for_upload(ground_truth.as_ref(), sensitive, &decisions);

        Ok(BulkPrediction {
            predictions: table.to_records(),
            metrics: self.evaluation.clone(),
            fairness_metrics: report.metrics,
            fairness_observation: report.observation,
            decisions,
        })
    }

    /// Score a labeled table and compare against its ground truth column.
    ///
    /// Nothing is logged; this backs offline evaluation.
    pub fn evaluate(&self, mut table: Table) -> Result<Evaluation> {
        let ground_truth = table
            .remove_column(&self.columns.ground_truth_column)
            .ok_or_else(|| {
                ServiceError::BadRequest(format!(
                    "Column {} is required for evaluation",
                    self.columns.ground_truth_column
                ))
            })?;
        table.drop_empty_columns();

        let matrix = self.aligner.align_to_matrix(&table)?;
        let decisions = self
            .engine
            .predict(&matrix)
            .context("Evaluation failed")
            .map_err(ServiceError::Internal)?;

        let y_true = normalize_labels(&ground_truth.values);
        let y_pred: Vec<u8> = decisions.iter().map(Eligibility::as_label).collect();
        let sensitive = table
            .column(&self.columns.sensitive_column)
            .map(|c| &c.values);

        Ok(Evaluation {
            rows: decisions.len(),
            metrics: EvaluationMetrics::from_labels(&y_true, &y_pred),
            fairness: self.fairness.report_for_upload(
                Some(&ground_truth.values),
                sensitive,
                &decisions,
            ),
        })
    }

    fn log_submission(&self, table: &Table) {
        let Some(log) = &self.submission_log else {
            return;
        };
        if let Err(e) = log.append(table) {
            warn!(path = %log.path().display(), error = %e, "Failed to append submission");
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::feature_aligner::{EncodingStrategy, TrainingManifest};
    use crate::models::inference::testing::FnClassifier;

    pub const FEATURES: &[&str] = &["Order/Trip Volume", "Earnings (Value)", "Partner Type_Merchant"];

    /// Context whose model approves merchants and anyone earning over 5000.
    pub fn context() -> InferenceContext {
        let manifest =
            TrainingManifest::new(FEATURES.iter().map(|s| s.to_string()).collect()).unwrap();
        let aligner = FeatureAligner::new(manifest, EncodingStrategy::TrainingManifest);
        let engine = InferenceEngine::new(
            Box::new(FnClassifier(|row: &[f32]| {
                if row[2] == 1.0 || row[1] > 5000.0 {
                    0.9
                } else {
                    0.1
                }
            })),
            0.5,
        );
        let evaluation = EvaluationMetrics {
            accuracy: Some(0.91),
            precision: Some(0.88),
            recall: Some(0.86),
            f1_score: Some(0.87),
        };
        InferenceContext::new(engine, aligner, evaluation).with_validator(InputValidator::new(
            crate::validator::FieldBounds {
                trips_field: "Order/Trip Volume".to_string(),
                earnings_field: "Earnings (Value)".to_string(),
                ..Default::default()
            },
        ))
    }
}
