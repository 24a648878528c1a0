//! Skin analysis service: owns the feature extractor and both classifiers.

use crate::artifact;
use crate::classifier::{ClassifierConfig, ClassifierError, SkinClassifier};
use crate::features::FeatureExtractor;
use crate::frame::BgrFrame;
use crate::synthetic::{unzip, SyntheticGenerator};
use crate::types::{ClassLabel, FaceRect, FeatureVector, LabelReport, SkinCondition, SkinType};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("no face rectangle supplied")]
    NoFace,
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

/// Analyzer settings. Missing fields take their defaults when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Directory holding `skin_type.model.json` and `skin_condition.model.json`.
    pub model_dir: PathBuf,
    /// Seeds synthetic data, the train/test split and the forests.
    pub seed: u64,
    /// Requested synthetic sample count (rounded down to a multiple of 16).
    pub sample_count: usize,
    /// Both classifiers must exceed this for a run to count as successful.
    pub min_accuracy: f32,
    /// Below this, a classifier is logged as unusable.
    pub usability_floor: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            model_dir: crate::default_model_dir(),
            seed: 42,
            sample_count: 1000,
            min_accuracy: 0.60,
            usability_floor: 0.40,
        }
    }
}

/// Outcome of [`SkinAnalyzer::auto_train`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub samples: usize,
    pub skin_type_accuracy: f32,
    pub skin_condition_accuracy: f32,
    pub success: bool,
}

/// Result of analyzing one face.
#[derive(Debug, Clone, Serialize)]
pub struct SkinAnalysis {
    pub face: FaceRect,
    pub features: FeatureVector,
    pub skin_type: LabelReport,
    pub skin_condition: LabelReport,
    pub care_tips: Vec<String>,
}

pub struct SkinAnalyzer {
    config: AnalyzerConfig,
    extractor: FeatureExtractor,
    skin_type: SkinClassifier<SkinType>,
    skin_condition: SkinClassifier<SkinCondition>,
}

impl SkinAnalyzer {
    /// Build the analyzer, loading any models already present in `model_dir`.
    pub fn open(config: AnalyzerConfig) -> Self {
        let skin_type = SkinClassifier::open(
            ClassifierConfig::skin_type().with_seed(config.seed),
            config.model_dir.join(artifact::file_name::<SkinType>()),
        );
        let skin_condition = SkinClassifier::open(
            ClassifierConfig::skin_condition().with_seed(config.seed),
            config.model_dir.join(artifact::file_name::<SkinCondition>()),
        );
        tracing::info!(
            model_dir = %config.model_dir.display(),
            skin_type_ready = skin_type.is_trained(),
            skin_condition_ready = skin_condition.is_trained(),
            "skin analyzer opened"
        );
        Self {
            config,
            extractor: FeatureExtractor::new(),
            skin_type,
            skin_condition,
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// True once both classifiers hold a model.
    pub fn is_ready(&self) -> bool {
        self.skin_type.is_trained() && self.skin_condition.is_trained()
    }

    pub fn skin_type_classifier(&self) -> &SkinClassifier<SkinType> {
        &self.skin_type
    }

    pub fn skin_condition_classifier(&self) -> &SkinClassifier<SkinCondition> {
        &self.skin_condition
    }

    /// Train both classifiers from scratch on seeded synthetic data and
    /// overwrite their artifacts.
    ///
    /// Both models are fitted and written before either replaces the one in
    /// memory, so a failure leaves the in-memory pair unchanged. If the
    /// skin-type artifact is written and the skin-condition write then fails,
    /// the files on disk hold a mismatched pair until the next run.
    ///
    /// Low accuracy is reported through `success` and the log, never as an
    /// error.
    pub fn auto_train(&mut self) -> Result<TrainingReport, ClassifierError> {
        tracing::info!(
            seed = self.config.seed,
            sample_count = self.config.sample_count,
            "training on synthetic data"
        );
        let samples = SyntheticGenerator::with_seed(self.config.seed).generate(self.config.sample_count);
        let (features, types, conditions) = unzip(&samples);

        let skin_type = self.skin_type.fit(&features, &types)?;
        let skin_type_accuracy = skin_type.accuracy();
        self.check_accuracy(SkinType::KIND, skin_type_accuracy);
        let skin_condition = self.skin_condition.fit(&features, &conditions)?;
        let skin_condition_accuracy = skin_condition.accuracy();
        self.check_accuracy(SkinCondition::KIND, skin_condition_accuracy);

        self.skin_type.persist(&skin_type)?;
        self.skin_condition.persist(&skin_condition)?;
        self.skin_type.install(skin_type);
        self.skin_condition.install(skin_condition);

        let success = skin_type_accuracy > self.config.min_accuracy
            && skin_condition_accuracy > self.config.min_accuracy;
        tracing::info!(
            samples = samples.len(),
            skin_type_accuracy,
            skin_condition_accuracy,
            success,
            "training finished"
        );

        Ok(TrainingReport {
            samples: samples.len(),
            skin_type_accuracy,
            skin_condition_accuracy,
            success,
        })
    }

    fn check_accuracy(&self, kind: &str, accuracy: f32) {
        if accuracy < self.config.usability_floor {
            tracing::error!(
                kind,
                accuracy,
                floor = self.config.usability_floor,
                "classifier accuracy below usability floor"
            );
        } else if accuracy <= self.config.min_accuracy {
            tracing::warn!(
                kind,
                accuracy,
                target = self.config.min_accuracy,
                "classifier accuracy below target"
            );
        }
    }

    /// Feature vector for one face.
    pub fn extract(&self, frame: &BgrFrame, face: &FaceRect) -> FeatureVector {
        self.extractor.extract(frame, face)
    }

    /// Classify the primary face among `faces`.
    pub fn analyze(&self, frame: &BgrFrame, faces: &[FaceRect]) -> Result<SkinAnalysis, AnalysisError> {
        let face = FaceRect::primary(faces).ok_or(AnalysisError::NoFace)?;
        if faces.len() > 1 {
            tracing::debug!(faces = faces.len(), "multiple faces, analyzing the first");
        }

        let features = self.extractor.extract(frame, &face);
        if features.is_zero() {
            tracing::warn!(?face, "face region produced no usable features");
        }

        let skin_type = self.skin_type.predict(&features)?;
        let skin_condition = self.skin_condition.predict(&features)?;
        tracing::debug!(
            skin_type = skin_type.label.name(),
            skin_type_confidence = skin_type.confidence,
            skin_condition = skin_condition.label.name(),
            skin_condition_confidence = skin_condition.confidence,
            "face analyzed"
        );

        Ok(SkinAnalysis {
            face,
            features,
            care_tips: skin_type.label.care_tips().iter().map(|t| t.to_string()).collect(),
            skin_type: skin_type.report(),
            skin_condition: skin_condition.report(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &std::path::Path) -> AnalyzerConfig {
        AnalyzerConfig {
            model_dir: dir.to_path_buf(),
            ..AnalyzerConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let c = AnalyzerConfig::default();
        assert_eq!(c.seed, 42);
        assert_eq!(c.sample_count, 1000);
        assert_eq!(c.min_accuracy, 0.60);
        assert_eq!(c.usability_floor, 0.40);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let c: AnalyzerConfig = serde_json::from_str(r#"{"seed": 7, "model_dir": "/tmp/m"}"#).unwrap();
        assert_eq!(c.seed, 7);
        assert_eq!(c.model_dir, PathBuf::from("/tmp/m"));
        assert_eq!(c.sample_count, 1000);
    }

    #[test]
    fn test_untrained_analyzer() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = SkinAnalyzer::open(config_in(dir.path()));
        assert!(!analyzer.is_ready());

        let frame = BgrFrame::filled(32, 32, [120, 140, 180]);
        assert!(matches!(
            analyzer.analyze(&frame, &[]),
            Err(AnalysisError::NoFace)
        ));
        assert!(matches!(
            analyzer.analyze(&frame, &[frame.full_rect()]),
            Err(AnalysisError::Classifier(ClassifierError::ModelNotTrained))
        ));
    }

    #[test]
    fn test_auto_train_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let mut analyzer = SkinAnalyzer::open(config_in(dir.path()));
        let report = analyzer.auto_train().unwrap();

        assert_eq!(report.samples, 992);
        assert!(report.skin_type_accuracy > 0.6, "{report:?}");
        // seed 42 is deterministic and clears the target for both models
        assert!(report.skin_condition_accuracy > 0.6, "{report:?}");
        assert!(report.success, "{report:?}");
        assert!(analyzer.is_ready());
        assert!(dir.path().join("skin_type.model.json").exists());
        assert!(dir.path().join("skin_condition.model.json").exists());

        let frame = BgrFrame::filled(40, 40, [110, 140, 190]);
        let analysis = analyzer
            .analyze(&frame, &[FaceRect::new(5, 5, 30, 30), FaceRect::new(0, 0, 2, 2)])
            .unwrap();
        assert_eq!(analysis.face, FaceRect::new(5, 5, 30, 30));
        assert_eq!(analysis.care_tips.len(), 5);
        assert_eq!(analysis.skin_type.kind, "skin_type");
        assert_eq!(analysis.skin_condition.kind, "skin_condition");
        let sum: f32 = analysis.skin_type.all_probabilities.values().sum();
        assert!((sum - 1.0).abs() < 1e-5);

        // a fresh analyzer over the same directory picks the models up
        let reopened = SkinAnalyzer::open(config_in(dir.path()));
        assert!(reopened.is_ready());
        let again = reopened
            .analyze(&frame, &[FaceRect::new(5, 5, 30, 30)])
            .unwrap();
        assert_eq!(again.skin_type.label, analysis.skin_type.label);
        assert_eq!(again.skin_condition.label, analysis.skin_condition.label);
    }

    #[test]
    fn test_failed_write_keeps_both_models_out() {
        let dir = tempfile::tempdir().unwrap();
        // a directory where the condition artifact should go makes its rename fail
        std::fs::create_dir(dir.path().join("skin_condition.model.json")).unwrap();
        let mut analyzer = SkinAnalyzer::open(AnalyzerConfig {
            sample_count: 160,
            ..config_in(dir.path())
        });

        assert!(matches!(
            analyzer.auto_train(),
            Err(ClassifierError::Artifact(_))
        ));
        assert!(!analyzer.skin_type_classifier().is_trained());
        assert!(!analyzer.skin_condition_classifier().is_trained());
    }

    #[test]
    fn test_too_few_samples_fails_training() {
        let dir = tempfile::tempdir().unwrap();
        let mut analyzer = SkinAnalyzer::open(AnalyzerConfig {
            sample_count: 16,
            ..config_in(dir.path())
        });
        // 16 samples give four per label, enough to split; 15 gives none
        assert!(analyzer.auto_train().is_ok());

        let mut empty = SkinAnalyzer::open(AnalyzerConfig {
            sample_count: 15,
            ..config_in(dir.path())
        });
        assert!(matches!(
            empty.auto_train(),
            Err(ClassifierError::InsufficientData(_))
        ));
    }
}
