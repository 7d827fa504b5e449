//! Model artifacts and inference components

pub mod artifacts;
pub mod inference;
pub mod loader;

pub use inference::{Classifier, InferenceEngine, OnnxClassifier};
pub use loader::{load_eligibility_model, LoadedModel};
