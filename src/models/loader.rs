//! Loading the exported eligibility classifier

use crate::config::ArtifactsConfig;
use anyhow::{Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use tracing::info;

/// Input name used by skl2onnx/onnxmltools exports when the graph reports none
const DEFAULT_INPUT: &str = "float_input";

/// ONNX session for the eligibility classifier and the tensor names it uses
pub struct LoadedModel {
    pub name: String,
    pub session: Session,
    /// Feature matrix input, shape `[rows, features]`
    pub input_name: String,
    /// Class probability output, shape `[rows, 2]` or `[rows]`
    pub output_name: String,
}

/// Open `artifacts.model_file` from the artifacts directory.
///
/// Gradient-boosted exports produce a `label` tensor followed by a
/// `probabilities` tensor; the probability output is the one scored.
pub fn load_eligibility_model(artifacts: &ArtifactsConfig) -> Result<LoadedModel> {
    let path = artifacts.model_path();

    ort::init().commit()?;
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(artifacts.onnx_threads)?
        .commit_from_file(&path)
        .with_context(|| format!("Failed to load eligibility model from {}", path.display()))?;

    let input_name = session
        .inputs
        .first()
        .map(|i| i.name.clone())
        .unwrap_or_else(|| DEFAULT_INPUT.to_string());

    let outputs: Vec<&str> = session.outputs.iter().map(|o| o.name.as_str()).collect();
    let output_name = probability_output(&outputs)
        .with_context(|| format!("Model {} declares no outputs", path.display()))?
        .to_string();

    info!(
        path = %path.display(),
        threads = artifacts.onnx_threads,
        input = %input_name,
        output = %output_name,
        "Eligibility model loaded"
    );

    Ok(LoadedModel {
        name: artifacts.model_file.clone(),
        session,
        input_name,
        output_name,
    })
}

/// First output whose name mentions probabilities, else the last output.
fn probability_output<'a>(outputs: &[&'a str]) -> Option<&'a str> {
    outputs
        .iter()
        .find(|name| name.contains("prob"))
        .or_else(|| outputs.last())
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probability_output_preferred() {
        assert_eq!(
            probability_output(&["label", "probabilities"]),
            Some("probabilities")
        );
        assert_eq!(
            probability_output(&["output_probability", "output_label"]),
            Some("output_probability")
        );
    }

    #[test]
    fn test_probability_output_fallback() {
        assert_eq!(probability_output(&["label", "scores"]), Some("scores"));
        assert_eq!(probability_output(&[]), None);
    }
}
