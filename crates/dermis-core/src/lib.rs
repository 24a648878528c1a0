//! dermis-core — Skin feature extraction and classification engine.
//!
//! Turns a face region of a BGR frame into an 18-dimensional feature vector
//! and classifies it into a skin type and a skin condition with two
//! standardize-then-random-forest models. Models are bootstrapped from seeded
//! synthetic data and persisted as checksummed JSON artifacts.

pub mod analyzer;
pub mod artifact;
pub mod classifier;
pub mod color;
pub mod features;
pub mod forest;
pub mod frame;
pub mod metrics;
pub mod scaler;
pub mod split;
pub mod synthetic;
pub mod types;

use std::path::PathBuf;

pub use analyzer::{AnalysisError, AnalyzerConfig, SkinAnalysis, SkinAnalyzer, TrainingReport};
pub use classifier::{ClassifierConfig, ClassifierError, SkinClassifier, TrainedModel};
pub use features::FeatureExtractor;
pub use frame::{BgrFrame, FrameError};
pub use types::{
    ClassLabel, FaceRect, FeatureVector, LabelReport, Prediction, SkinCondition, SkinType,
    FEATURE_DIM,
};

/// Default model directory: `$XDG_DATA_HOME/dermis/models`, falling back to
/// `~/.local/share/dermis/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("dermis")
        .join("models")
}
