//! Training artifacts consumed at startup.
//!
//! The offline training job exports three files next to each other: the ONNX
//! graph, the ordered feature column list and the hold-out metrics.

use crate::feature_aligner::TrainingManifest;
use crate::types::EvaluationMetrics;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Load the ordered training column list (a JSON array of strings).
pub fn load_manifest<P: AsRef<Path>>(path: P) -> Result<TrainingManifest> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read column manifest {}", path.display()))?;
    let columns: Vec<String> = serde_json::from_str(&raw)
        .with_context(|| format!("Column manifest {} is not a JSON array of strings", path.display()))?;

    let manifest = TrainingManifest::new(columns)
        .with_context(|| format!("Invalid column manifest {}", path.display()))?;

    info!(path = %path.display(), features = manifest.len(), "Training column manifest loaded");
    Ok(manifest)
}

/// Load the evaluation metrics bundle.
///
/// A missing file is not an error: responses then carry an empty bundle.
pub fn load_metrics<P: AsRef<Path>>(path: P) -> Result<EvaluationMetrics> {
    let path = path.as_ref();
    if !path.exists() {
        warn!(path = %path.display(), "Evaluation metrics not found, responses will carry an empty bundle");
        return Ok(EvaluationMetrics::default());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read evaluation metrics {}", path.display()))?;
    let metrics: EvaluationMetrics = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse evaluation metrics {}", path.display()))?;

    info!(path = %path.display(), metrics = ?metrics, "Evaluation metrics loaded");
    Ok(metrics)
}

/// Write the evaluation metrics bundle as pretty JSON.
pub fn save_metrics<P: AsRef<Path>>(path: P, metrics: &EvaluationMetrics) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(metrics)?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write evaluation metrics {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_manifest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("train_features_columns.json");
        fs::write(&path, r#"["Earnings (Value)", "Partner Type_Merchant"]"#).unwrap();

        let manifest = load_manifest(&path).unwrap();
        assert_eq!(manifest.columns(), &["Earnings (Value)", "Partner Type_Merchant"]);
    }

    #[test]
    fn test_load_manifest_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("train_features_columns.json");
        fs::write(&path, r#"{"not": "a list"}"#).unwrap();

        assert!(load_manifest(&path).is_err());
        assert!(load_manifest(dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn test_missing_metrics_yield_empty_bundle() {
        let dir = tempdir().unwrap();
        let metrics = load_metrics(dir.path().join("evaluation_metrics.json")).unwrap();
        assert!(metrics.is_empty());
    }

    #[test]
    fn test_metrics_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("evaluation_metrics.json");
        let metrics = EvaluationMetrics::from_labels(&[1, 0, 1], &[1, 0, 0]);

        save_metrics(&path, &metrics).unwrap();
        assert_eq!(load_metrics(&path).unwrap(), metrics);
    }
}
