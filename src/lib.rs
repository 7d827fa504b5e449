//! Catalyst Score
//!
//! Loan eligibility inference for gig-economy partners: schema alignment,
//! input validation, ONNX scoring and group fairness reporting behind a
//! small HTTP API.

pub mod api;
pub mod config;
pub mod error;
pub mod fairness;
pub mod feature_aligner;
pub mod feedback;
pub mod metrics;
pub mod models;
pub mod service;
pub mod submission_log;
pub mod types;
pub mod validator;

pub use config::AppConfig;
pub use error::ServiceError;
pub use fairness::{FairnessReport, FairnessReporter};
pub use feature_aligner::{FeatureAligner, TrainingManifest};
pub use models::inference::InferenceEngine;
pub use service::InferenceContext;
pub use types::{Eligibility, Table};
pub use validator::InputValidator;
