//! Service error taxonomy.
//!
//! Status codes are assigned only at the HTTP boundary, see `api`.

use crate::feature_aligner::AlignmentError;
use crate::types::TableError;
use crate::validator::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed or missing request payload
    #[error("{0}")]
    BadRequest(String),

    /// A bounded field is out of range
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The input cannot be brought into the training schema
    #[error(transparent)]
    Alignment(#[from] AlignmentError),

    /// Artifacts failed to load at startup
    #[error("Model is not trained or loaded. Please check backend logs.")]
    ModelUnavailable,

    /// The mail relay could not deliver feedback
    #[error("Failed to send feedback")]
    Feedback(#[source] anyhow::Error),

    /// Inference or I/O failure
    #[error("{0:#}")]
    Internal(anyhow::Error),
}

impl ServiceError {
    /// Whether the caller is at fault
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServiceError::BadRequest(_) | ServiceError::Validation(_) | ServiceError::Alignment(_)
        )
    }
}

impl From<TableError> for ServiceError {
    fn from(err: TableError) -> Self {
        ServiceError::BadRequest(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors() {
        assert!(ServiceError::BadRequest("No selected file".into()).is_client_error());
        assert!(ServiceError::Validation(ValidationError::TripsRows(vec![0])).is_client_error());
        assert!(!ServiceError::ModelUnavailable.is_client_error());
        assert!(!ServiceError::Internal(anyhow::anyhow!("boom")).is_client_error());
    }

    #[test]
    fn test_internal_message_keeps_context() {
        let err = ServiceError::Internal(anyhow::anyhow!("session crashed").context("Error processing file"));
        assert_eq!(err.to_string(), "Error processing file: session crashed");
    }
}
