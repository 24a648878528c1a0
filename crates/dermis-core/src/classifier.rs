//! Standardize-then-forest classifier over one label space.
//!
//! A classifier is either untrained or holds a [`TrainedModel`] whose
//! standardizer and forest were fitted together. Training evaluates on a
//! stratified hold-out split and persists the result before swapping it in,
//! so a failed run leaves the previous model untouched.

use crate::artifact::{self, ArtifactError, ModelInfo};
use crate::forest::{ForestConfig, ForestError, RandomForest};
use crate::metrics::{accuracy, ClassificationReport};
use crate::scaler::{ScalerError, StandardScaler};
use crate::split::{stratified_split, TEST_FRACTION};
use crate::types::{ClassLabel, FeatureVector, Prediction, FEATURE_DIM};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("insufficient training data: {0}")]
    InsufficientData(String),
    #[error("model is not trained")]
    ModelNotTrained,
    #[error("standardizer has no fitted statistics")]
    ScalerNotFitted,
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error(transparent)]
    Forest(ForestError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

impl From<ScalerError> for ClassifierError {
    fn from(e: ScalerError) -> Self {
        match e {
            ScalerError::NotFitted => ClassifierError::ScalerNotFitted,
            ScalerError::Empty => ClassifierError::InsufficientData(e.to_string()),
            ScalerError::DimensionMismatch { expected, actual } => {
                ClassifierError::DimensionMismatch { expected, actual }
            }
        }
    }
}

impl From<ForestError> for ClassifierError {
    fn from(e: ForestError) -> Self {
        match e {
            ForestError::Empty => ClassifierError::InsufficientData(e.to_string()),
            ForestError::DimensionMismatch { expected, actual } => {
                ClassifierError::DimensionMismatch { expected, actual }
            }
            other => ClassifierError::Forest(other),
        }
    }
}

/// Forest hyper-parameters for one classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub seed: u64,
}

impl ClassifierConfig {
    pub fn skin_type() -> Self {
        Self {
            n_trees: 40,
            max_depth: 7,
            seed: 42,
        }
    }

    pub fn skin_condition() -> Self {
        Self {
            n_trees: 50,
            max_depth: 8,
            seed: 42,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn forest(&self) -> ForestConfig {
        ForestConfig {
            n_trees: self.n_trees,
            max_depth: self.max_depth,
            seed: self.seed,
        }
    }
}

/// A standardizer and the forest fitted on its output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub scaler: StandardScaler,
    pub forest: RandomForest,
}

/// Output of [`SkinClassifier::fit`], not yet persisted or in use.
#[derive(Debug, Clone)]
pub struct FittedModel<L: ClassLabel> {
    model: TrainedModel,
    info: ModelInfo,
    report: ClassificationReport,
    _label: PhantomData<L>,
}

impl<L: ClassLabel> FittedModel<L> {
    /// Held-out accuracy.
    pub fn accuracy(&self) -> f32 {
        self.info.accuracy
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    pub fn report(&self) -> &ClassificationReport {
        &self.report
    }
}

pub struct SkinClassifier<L: ClassLabel> {
    config: ClassifierConfig,
    artifact_path: Option<PathBuf>,
    model: Option<TrainedModel>,
    info: Option<ModelInfo>,
    report: Option<ClassificationReport>,
    _label: PhantomData<L>,
}

impl<L: ClassLabel> SkinClassifier<L> {
    /// An untrained classifier that keeps its model in memory only.
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            artifact_path: None,
            model: None,
            info: None,
            report: None,
            _label: PhantomData,
        }
    }

    /// A classifier backed by the artifact at `path`.
    ///
    /// Loads the artifact when it exists. A missing file or an artifact that
    /// fails validation leaves the classifier untrained; training later
    /// writes a fresh artifact to the same path.
    pub fn open(config: ClassifierConfig, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut classifier = Self::new(config);

        if path.exists() {
            match classifier.load(&path) {
                Ok(()) => {}
                Err(e) => {
                    tracing::warn!(
                        kind = L::KIND,
                        path = %path.display(),
                        error = %e,
                        "ignoring unusable model artifact"
                    );
                }
            }
        } else {
            tracing::info!(kind = L::KIND, path = %path.display(), "no saved model, classifier untrained");
        }

        classifier.artifact_path = Some(path);
        classifier
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn artifact_path(&self) -> Option<&Path> {
        self.artifact_path.as_deref()
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    /// Provenance of the current model.
    pub fn info(&self) -> Option<&ModelInfo> {
        self.info.as_ref()
    }

    /// Hold-out report of the most recent training run in this process.
    pub fn report(&self) -> Option<&ClassificationReport> {
        self.report.as_ref()
    }

    /// Fit on labeled feature vectors, persist, and swap the new model in.
    /// Returns held-out accuracy.
    ///
    /// Every label of `L` needs at least two samples so it can appear in
    /// both halves of the split.
    pub fn train(&mut self, features: &[FeatureVector], labels: &[L]) -> Result<f32, ClassifierError> {
        let fitted = self.fit(features, labels)?;
        self.persist(&fitted)?;
        let acc = fitted.accuracy();
        self.install(fitted);
        Ok(acc)
    }

    /// Fit a model without touching this classifier's state or its artifact.
    pub fn fit(&self, features: &[FeatureVector], labels: &[L]) -> Result<FittedModel<L>, ClassifierError> {
        if features.len() != labels.len() {
            return Err(ClassifierError::InsufficientData(format!(
                "{} feature vectors but {} labels",
                features.len(),
                labels.len()
            )));
        }
        let codes: Vec<usize> = labels.iter().map(|l| l.code()).collect();
        let split = stratified_split(&codes, L::count(), TEST_FRACTION, self.config.seed)
            .map_err(|e| ClassifierError::InsufficientData(e.to_string()))?;

        let x_train = rows(features, &split.train);
        let x_test = rows(features, &split.test);
        let y_train: Vec<usize> = split.train.iter().map(|&i| codes[i]).collect();
        let y_test: Vec<usize> = split.test.iter().map(|&i| codes[i]).collect();

        let mut scaler = StandardScaler::new();
        let z_train = scaler.fit_transform(x_train.view())?;
        let z_test = scaler.transform(x_test.view())?;

        let forest = RandomForest::fit(self.config.forest(), z_train.view(), &y_train, L::count())?;
        let predicted = forest.predict(z_test.view())?;

        let acc = accuracy(&predicted, &y_test);
        let report = ClassificationReport::new::<L>(&predicted, &y_test);
        report.log();

        let info = ModelInfo::new::<L>(acc, y_train.len(), y_test.len());
        tracing::info!(
            kind = L::KIND,
            accuracy = acc,
            train_samples = info.train_samples,
            test_samples = info.test_samples,
            "classifier fitted"
        );

        Ok(FittedModel {
            model: TrainedModel { scaler, forest },
            info,
            report,
            _label: PhantomData,
        })
    }

    /// Write `fitted` to this classifier's artifact path, if it has one.
    pub fn persist(&self, fitted: &FittedModel<L>) -> Result<(), ClassifierError> {
        if let Some(path) = &self.artifact_path {
            artifact::write(path, &fitted.info, &fitted.model)?;
        }
        Ok(())
    }

    /// Make `fitted` the current model.
    pub fn install(&mut self, fitted: FittedModel<L>) {
        self.model = Some(fitted.model);
        self.info = Some(fitted.info);
        self.report = Some(fitted.report);
    }

    pub fn predict(&self, features: &FeatureVector) -> Result<Prediction<L>, ClassifierError> {
        let model = self.model.as_ref().ok_or(ClassifierError::ModelNotTrained)?;
        let z = model.scaler.transform_row(features.as_slice())?;
        let proba = model.forest.predict_proba_row(&z)?;
        let n = proba.len();
        Prediction::from_probabilities(proba).ok_or(ClassifierError::DimensionMismatch {
            expected: L::count(),
            actual: n,
        })
    }

    /// Write the current model to `path`.
    pub fn save(&self, path: &Path) -> Result<(), ClassifierError> {
        match (&self.model, &self.info) {
            (Some(model), Some(info)) => Ok(artifact::write(path, info, model)?),
            _ => Err(ClassifierError::ModelNotTrained),
        }
    }

    /// Replace the current model with the artifact at `path`. On error the
    /// classifier keeps whatever model it had.
    pub fn load(&mut self, path: &Path) -> Result<(), ClassifierError> {
        let (info, model) = artifact::read::<L>(path)?;
        tracing::info!(
            kind = L::KIND,
            id = %info.id,
            accuracy = info.accuracy,
            trained_at = %info.trained_at,
            "model loaded"
        );
        self.model = Some(model);
        self.info = Some(info);
        Ok(())
    }
}

fn rows(features: &[FeatureVector], indices: &[usize]) -> Array2<f32> {
    Array2::from_shape_fn((indices.len(), FEATURE_DIM), |(r, c)| {
        features[indices[r]].0[c]
    })
}
