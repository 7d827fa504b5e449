//! HTTP surface: single and bulk prediction, feedback and health.

use crate::config::ServerConfig;
use crate::error::ServiceError;
use crate::feedback::{FeedbackMessage, FeedbackRelay, FeedbackRequest};
use crate::metrics::ServiceMetrics;
use crate::service::{BulkPrediction, InferenceContext, SinglePrediction};
use crate::types::Table;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// `None` when artifacts failed to load; prediction endpoints then fail
    pub context: Option<Arc<InferenceContext>>,
    /// `None` when mail credentials are missing
    pub relay: Option<Arc<dyn FeedbackRelay>>,
    pub metrics: Arc<ServiceMetrics>,
}

impl AppState {
    fn context(&self) -> Result<Arc<InferenceContext>, ServiceError> {
        self.context.clone().ok_or(ServiceError::ModelUnavailable)
    }

    fn finish<T>(&self, result: Result<T, ServiceError>) -> Result<T, ServiceError> {
        if let Err(e) = &result {
            self.metrics.record_error(e.is_client_error());
        }
        result
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            info!(error = %self, "Request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Build the application router
pub fn router(state: AppState, server: &ServerConfig) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/predict_csv", post(predict_csv))
        .route("/feedback", post(feedback))
        .layer(DefaultBodyLimit::max(server.max_body_bytes))
        .layer(TraceLayer::new_for_http());

    if server.cors_enabled {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router.with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "model_loaded": state.context.is_some(),
        "feature_count": state.context.as_ref().map(|c| c.feature_count()),
        "metrics": state.metrics.snapshot(),
    }))
}

async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<SinglePrediction>, ServiceError> {
    state.metrics.record_request("predict");
    let result = score_record(&state, payload).await;
    state.finish(result).map(Json)
}

async fn score_record(
    state: &AppState,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<SinglePrediction, ServiceError> {
    let context = state.context()?;
    let Json(record) = payload.map_err(|e| ServiceError::BadRequest(e.body_text()))?;

    let started = Instant::now();
    let response = tokio::task::spawn_blocking(move || context.predict_single(&record))
        .await
        .map_err(|e| ServiceError::Internal(e.into()))??;
    state
        .metrics
        .record_decisions(&[response.prediction], started.elapsed());

    Ok(response)
}

async fn predict_csv(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<BulkPrediction>, ServiceError> {
    state.metrics.record_request("predict_csv");
    let result = score_upload(&state, multipart).await;
    state.finish(result).map(Json)
}

async fn score_upload(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<BulkPrediction, ServiceError> {
    let context = state.context()?;
    let mut multipart = multipart.map_err(|e| ServiceError::BadRequest(e.body_text()))?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::BadRequest(e.body_text()))?
    {
        // A part without a filename is a plain form value, not an upload
        if field.name() != Some("file") || field.file_name().is_none() {
            continue;
        }
        if field.file_name() == Some("") {
            return Err(ServiceError::BadRequest("No selected file".to_string()));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ServiceError::BadRequest(e.body_text()))?;
        upload = Some(bytes);
        break;
    }
    let bytes = upload
        .ok_or_else(|| ServiceError::BadRequest("No file part in the request".to_string()))?;

    let started = Instant::now();
    let response = tokio::task::spawn_blocking(move || -> Result<BulkPrediction, ServiceError> {
        let table = Table::from_csv_reader(bytes.as_ref())?;
        context.predict_bulk(table)
    })
    .await
    .map_err(|e| ServiceError::Internal(e.into()))??;
    state
        .metrics
        .record_decisions(&response.decisions, started.elapsed());

    Ok(response)
}

async fn feedback(
    State(state): State<AppState>,
    payload: Result<Json<FeedbackRequest>, JsonRejection>,
) -> Result<Json<Value>, ServiceError> {
    state.metrics.record_request("feedback");
    let result = relay_feedback(&state, payload).await;
    state.finish(result).map(Json)
}

async fn relay_feedback(
    state: &AppState,
    payload: Result<Json<FeedbackRequest>, JsonRejection>,
) -> Result<Value, ServiceError> {
    let Json(request) = payload.map_err(|e| {
        warn!(error = %e.body_text(), "Unreadable feedback payload");
        ServiceError::Feedback(anyhow::anyhow!(e.body_text()))
    })?;
    let message = FeedbackMessage::from_request(&request);

    let Some(relay) = &state.relay else {
        warn!("Feedback received but no mail relay is configured");
        return Err(ServiceError::Feedback(anyhow::anyhow!("mail relay not configured")));
    };

    if let Err(e) = relay.send(&message).await {
        warn!(error = %e, "Failed to relay feedback");
        return Err(ServiceError::Feedback(e));
    }

    info!(subject = %message.subject, "Feedback relayed");
    Ok(json!({ "message": "Feedback sent successfully!" }))
}
