//! Catalyst Score - Main Entry Point
//!
//! Loads the trained artifacts and serves eligibility predictions over HTTP.
//! The server starts even when artifacts are missing; prediction endpoints
//! then answer with an error until the model is exported and the service
//! restarted.

use anyhow::{Context, Result};
use catalyst_score::{
    api::{self, AppState},
    config::{AppConfig, LoggingConfig},
    feedback::{FeedbackRelay, SmtpRelay},
    metrics::{MetricsReporter, ServiceMetrics},
    service::InferenceContext,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging)?;

    info!("Starting Catalyst Score");
    info!(
        "Validation bounds: {} in [{}, {}], {} in [{}, {}]",
        config.validation.trips_field,
        config.validation.min_trips,
        config.validation.max_trips,
        config.validation.earnings_field,
        config.validation.min_earnings,
        config.validation.max_earnings
    );

    let metrics = Arc::new(ServiceMetrics::new());

    let context = match InferenceContext::from_config(&config) {
        Ok(context) => Some(Arc::new(context)),
        Err(e) => {
            error!(
                error = format!("{:#}", e),
                dir = %config.artifacts.dir,
                "Failed to load model artifacts, prediction endpoints are disabled"
            );
            None
        }
    };

    let relay: Option<Arc<dyn FeedbackRelay>> = match SmtpRelay::from_env(&config.feedback) {
        Ok(relay) => Some(Arc::new(relay)),
        Err(e) => {
            warn!(error = %e, "Feedback relay disabled");
            None
        }
    };

    if config.server.metrics_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.server.metrics_interval_secs);
        tokio::spawn(reporter.start());
    }

    let state = AppState {
        context,
        relay,
        metrics: metrics.clone(),
    };
    let app = api::router(state, &config.server);

    let address = config.server.address()?;
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!(%address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Service shutting down...");
    metrics.print_summary();

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("catalyst_score={},tower_http=info", logging.level)))
        .context("Invalid log level")?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
}
