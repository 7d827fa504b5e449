//! Model Evaluation
//!
//! Scores a labeled CSV with the exported model, writes the evaluation
//! metrics served alongside predictions and logs the group fairness report.
//!
//! Usage: evaluate_model [labeled_csv]

use anyhow::{Context, Result};
use catalyst_score::{config::AppConfig, models::artifacts, service::InferenceContext, Table};
use std::fs::File;
use tracing::info;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("evaluate_model=info".parse()?)
                .add_directive("catalyst_score=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let csv_path = args.get(1).map(|s| s.as_str()).unwrap_or("catalyst_test.csv");

    let config = AppConfig::load()?;
    let context = InferenceContext::from_config(&config)?;

    let file = File::open(csv_path).with_context(|| format!("Failed to open {}", csv_path))?;
    let table = Table::from_csv_reader(file).with_context(|| format!("Failed to parse {}", csv_path))?;
    info!(path = %csv_path, rows = table.row_count(), "Evaluating model");

    let evaluation = context.evaluate(table).context("Evaluation failed")?;

    let metrics = &evaluation.metrics;
    info!(
        rows = evaluation.rows,
        accuracy = format!("{:.4}", metrics.accuracy.unwrap_or_default()),
        precision = format!("{:.4}", metrics.precision.unwrap_or_default()),
        recall = format!("{:.4}", metrics.recall.unwrap_or_default()),
        f1_score = format!("{:.4}", metrics.f1_score.unwrap_or_default()),
        "Evaluation metrics"
    );

    for (group, rate) in &evaluation.fairness.metrics.selection_rate {
        let tpr = evaluation
            .fairness
            .metrics
            .equal_opportunity
            .get(group)
            .copied()
            .unwrap_or_default();
        info!(
            group = %group,
            selection_rate = format!("{:.4}", rate),
            equal_opportunity = format!("{:.4}", tpr),
            "Group fairness"
        );
    }
    info!("{}", evaluation.fairness.observation);

    let metrics_path = config.artifacts.metrics_path();
    artifacts::save_metrics(&metrics_path, metrics)?;
    info!(path = %metrics_path.display(), "Evaluation metrics saved");

    Ok(())
}
