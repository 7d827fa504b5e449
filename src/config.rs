//! Configuration management for the eligibility service

use crate::feature_aligner::EncodingStrategy;
use crate::validator::FieldBounds;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub artifacts: ArtifactsConfig,
    pub alignment: AlignmentConfig,
    pub validation: FieldBounds,
    pub fairness: FairnessConfig,
    pub submission_log: SubmissionLogConfig,
    pub feedback: FeedbackConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allow any origin, method and header
    pub cors_enabled: bool,
    /// Interval of the periodic metrics summary in the logs (0 disables it)
    pub metrics_interval_secs: u64,
    /// Largest accepted request body, CSV uploads included
    pub max_body_bytes: usize,
}

impl ServerConfig {
    pub fn address(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7860,
            cors_enabled: true,
            metrics_interval_secs: 300,
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Trained model artifacts
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    /// Directory containing the exported artifacts
    pub dir: String,
    pub model_file: String,
    pub columns_file: String,
    pub metrics_file: String,
    /// Number of threads for ONNX inference
    pub onnx_threads: usize,
    /// Eligible when the positive-class probability reaches this value
    pub decision_threshold: f64,
}

impl ArtifactsConfig {
    pub fn model_path(&self) -> PathBuf {
        Path::new(&self.dir).join(&self.model_file)
    }

    pub fn columns_path(&self) -> PathBuf {
        Path::new(&self.dir).join(&self.columns_file)
    }

    pub fn metrics_path(&self) -> PathBuf {
        Path::new(&self.dir).join(&self.metrics_file)
    }
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: "artifacts".to_string(),
            model_file: "model.onnx".to_string(),
            columns_file: "train_features_columns.json".to_string(),
            metrics_file: "evaluation_metrics.json".to_string(),
            onnx_threads: 1,
            decision_threshold: 0.5,
        }
    }
}

/// Schema alignment configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AlignmentConfig {
    /// "per_request" or "training_manifest"
    pub encoding: EncodingStrategy,
}

/// Column names and threshold used by bulk fairness reporting
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FairnessConfig {
    /// Ground truth label column, never used as a feature
    pub ground_truth_column: String,
    /// Sensitive attribute to group by
    pub sensitive_column: String,
    /// Column appended to bulk results
    pub prediction_column: String,
    /// Selection-rate gap above which mitigation is suggested
    pub disparity_threshold: f64,
}

impl Default for FairnessConfig {
    fn default() -> Self {
        Self {
            ground_truth_column: "Creditworthy".to_string(),
            sensitive_column: "Partner Type".to_string(),
            prediction_column: "Creditworthy_Prediction".to_string(),
            disparity_threshold: 0.1,
        }
    }
}

/// Append-only log of submitted records
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubmissionLogConfig {
    pub enabled: bool,
    pub path: String,
}

impl Default for SubmissionLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "online_testcases.csv".to_string(),
        }
    }
}

/// SMTP relay for feedback mail. Credentials come from the environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            smtp_server: "smtp.gmail.com".to_string(),
            smtp_port: 587,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `CATALYST_CONFIG` or the default path
    pub fn load() -> Result<Self> {
        let path = std::env::var("CATALYST_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path, layered with
    /// `CATALYST__SECTION__KEY` environment overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("CATALYST")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 7860);
        assert_eq!(config.artifacts.decision_threshold, 0.5);
        assert_eq!(config.alignment.encoding, EncodingStrategy::PerRequest);
        assert_eq!(config.fairness.sensitive_column, "Partner Type");
        assert_eq!(config.validation.max_trips, 1000.0);
        assert_eq!(config.submission_log.path, "online_testcases.csv");
    }

    #[test]
    fn test_artifact_paths() {
        let config = ArtifactsConfig::default();
        assert_eq!(config.model_path(), PathBuf::from("artifacts/model.onnx"));
        assert_eq!(
            config.columns_path(),
            PathBuf::from("artifacts/train_features_columns.json")
        );
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[server]
port = 5000

[alignment]
encoding = "training_manifest"

[validation]
trips_field = "Order/Trip Volume"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from_path(&path).unwrap();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.alignment.encoding, EncodingStrategy::TrainingManifest);
        assert_eq!(config.validation.trips_field, "Order/Trip Volume");
        assert_eq!(config.validation.max_earnings, 100_000.0);
    }

    #[test]
    fn test_listen_address() {
        let server = ServerConfig::default();
        assert_eq!(server.address().unwrap().port(), 7860);
    }
}
