//! On-disk model artifacts.
//!
//! One JSON document per classifier holds the fitted standardizer and forest
//! together with provenance (id, training time, held-out accuracy) and a
//! SHA-256 checksum of the model payload. Files are written to a temporary
//! sibling and renamed into place, so readers never observe a half-written
//! artifact.

use crate::classifier::TrainedModel;
use crate::types::{ClassLabel, FEATURE_DIM};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("artifact I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("artifact JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported artifact format version {found} (expected {FORMAT_VERSION})")]
    UnsupportedVersion { found: u32 },
    #[error("artifact holds a {found} model, expected {expected}")]
    KindMismatch { expected: String, found: String },
    #[error("artifact checksum mismatch")]
    ChecksumMismatch,
    #[error("inconsistent model: {0}")]
    Inconsistent(String),
}

/// Provenance recorded alongside a trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub kind: String,
    pub id: Uuid,
    pub trained_at: DateTime<Utc>,
    /// Held-out accuracy measured at training time.
    pub accuracy: f32,
    pub train_samples: usize,
    pub test_samples: usize,
}

impl ModelInfo {
    /// Fresh provenance for a model of label space `L` trained just now.
    pub fn new<L: ClassLabel>(accuracy: f32, train_samples: usize, test_samples: usize) -> Self {
        Self {
            kind: L::KIND.to_string(),
            id: Uuid::new_v4(),
            trained_at: Utc::now(),
            accuracy,
            train_samples,
            test_samples,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ArtifactFile {
    format_version: u32,
    kind: String,
    id: Uuid,
    trained_at: DateTime<Utc>,
    accuracy: f32,
    train_samples: usize,
    test_samples: usize,
    /// Hex SHA-256 of the exact `model` bytes.
    checksum: String,
    model: Box<RawValue>,
}

fn checksum(payload: &str) -> String {
    format!("{:x}", Sha256::digest(payload.as_bytes()))
}

/// Conventional artifact file name for a label space.
pub fn file_name<L: ClassLabel>() -> String {
    format!("{}.model.json", L::KIND)
}

/// Persist `model` atomically at `path`, creating parent directories.
pub fn write(path: &Path, info: &ModelInfo, model: &TrainedModel) -> Result<(), ArtifactError> {
    let payload = serde_json::to_string(model)?;
    let file = ArtifactFile {
        format_version: FORMAT_VERSION,
        kind: info.kind.clone(),
        id: info.id,
        trained_at: info.trained_at,
        accuracy: info.accuracy,
        train_samples: info.train_samples,
        test_samples: info.test_samples,
        checksum: checksum(&payload),
        model: RawValue::from_string(payload)?,
    };

    let io_err = |source: std::io::Error| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(io_err)?;
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string());
    let tmp = path.with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4().simple()));

    let result = (|| -> Result<(), ArtifactError> {
        let handle = fs::File::create(&tmp).map_err(io_err)?;
        let mut writer = BufWriter::new(handle);
        serde_json::to_writer_pretty(&mut writer, &file)?;
        writer.flush().map_err(io_err)?;
        writer.get_ref().sync_all().map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result?;

    tracing::info!(
        path = %path.display(),
        kind = %info.kind,
        id = %info.id,
        accuracy = info.accuracy,
        "model artifact written"
    );
    Ok(())
}

/// Load and validate an artifact for label space `L`.
pub fn read<L: ClassLabel>(path: &Path) -> Result<(ModelInfo, TrainedModel), ArtifactError> {
    let bytes = fs::read(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: ArtifactFile = serde_json::from_slice(&bytes)?;

    if file.format_version != FORMAT_VERSION {
        return Err(ArtifactError::UnsupportedVersion {
            found: file.format_version,
        });
    }
    if file.kind != L::KIND {
        return Err(ArtifactError::KindMismatch {
            expected: L::KIND.to_string(),
            found: file.kind,
        });
    }
    if checksum(file.model.get()) != file.checksum {
        return Err(ArtifactError::ChecksumMismatch);
    }

    let model: TrainedModel = serde_json::from_str(file.model.get())?;
    validate::<L>(&model)?;

    let info = ModelInfo {
        kind: file.kind,
        id: file.id,
        trained_at: file.trained_at,
        accuracy: file.accuracy,
        train_samples: file.train_samples,
        test_samples: file.test_samples,
    };
    tracing::debug!(path = %path.display(), kind = %info.kind, id = %info.id, "model artifact loaded");
    Ok((info, model))
}

fn validate<L: ClassLabel>(model: &TrainedModel) -> Result<(), ArtifactError> {
    if !model.scaler.is_fitted() {
        return Err(ArtifactError::Inconsistent(
            "standardizer has no fitted statistics".into(),
        ));
    }
    if model.scaler.n_features() != FEATURE_DIM || model.forest.n_features() != FEATURE_DIM {
        return Err(ArtifactError::Inconsistent(format!(
            "expected {FEATURE_DIM} features, standardizer has {} and forest has {}",
            model.scaler.n_features(),
            model.forest.n_features()
        )));
    }
    if model.forest.n_classes() != L::count() {
        return Err(ArtifactError::Inconsistent(format!(
            "forest has {} classes, {} expects {}",
            model.forest.n_classes(),
            L::KIND,
            L::count()
        )));
    }
    if !model.forest.is_consistent() {
        return Err(ArtifactError::Inconsistent("malformed tree structure".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::{ForestConfig, RandomForest};
    use crate::scaler::StandardScaler;
    use crate::types::{SkinCondition, SkinType};
    use ndarray::Array2;

    fn tiny_model() -> TrainedModel {
        let mut data = Vec::new();
        let mut y = Vec::new();
        for class in 0..4usize {
            for k in 0..6 {
                for d in 0..FEATURE_DIM {
                    data.push(class as f32 + 0.01 * (k + d) as f32);
                }
                y.push(class);
            }
        }
        let x = Array2::from_shape_vec((24, FEATURE_DIM), data).unwrap();
        let mut scaler = StandardScaler::new();
        let z = scaler.fit_transform(x.view()).unwrap();
        let config = ForestConfig {
            n_trees: 3,
            max_depth: 4,
            seed: 1,
        };
        let forest = RandomForest::fit(config, z.view(), &y, 4).unwrap();
        TrainedModel { scaler, forest }
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(file_name::<SkinType>());
        let model = tiny_model();
        let info = ModelInfo::new::<SkinType>(0.9, 19, 5);

        write(&path, &info, &model).unwrap();
        let (loaded_info, loaded) = read::<SkinType>(&path).unwrap();
        assert_eq!(loaded_info, info);
        assert_eq!(loaded, model);

        // no temp files left behind
        let entries: Vec<_> = fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_kind_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        write(&path, &ModelInfo::new::<SkinType>(0.9, 19, 5), &tiny_model()).unwrap();
        assert!(matches!(
            read::<SkinCondition>(&path),
            Err(ArtifactError::KindMismatch { .. })
        ));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        write(&path, &ModelInfo::new::<SkinType>(0.9, 19, 5), &tiny_model()).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let tampered = text.replacen("\"max_depth\":4", "\"max_depth\":5", 1);
        assert_ne!(text, tampered);
        fs::write(&path, tampered).unwrap();

        assert!(matches!(
            read::<SkinType>(&path),
            Err(ArtifactError::ChecksumMismatch)
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        write(&path, &ModelInfo::new::<SkinType>(0.9, 19, 5), &tiny_model()).unwrap();

        let mut doc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        doc["format_version"] = serde_json::json!(7);
        fs::write(&path, doc.to_string()).unwrap();

        assert!(matches!(
            read::<SkinType>(&path),
            Err(ArtifactError::UnsupportedVersion { found: 7 })
        ));
    }

    #[test]
    fn test_truncated_file_is_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        write(&path, &ModelInfo::new::<SkinType>(0.9, 19, 5), &tiny_model()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        fs::write(&path, &text[..text.len() / 2]).unwrap();
        assert!(matches!(read::<SkinType>(&path), Err(ArtifactError::Json(_))));
    }

    #[test]
    fn test_unfitted_scaler_is_inconsistent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        let mut model = tiny_model();
        model.scaler = StandardScaler::new();
        write(&path, &ModelInfo::new::<SkinType>(0.9, 19, 5), &model).unwrap();
        assert!(matches!(
            read::<SkinType>(&path),
            Err(ArtifactError::Inconsistent(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read::<SkinType>(&dir.path().join("absent.json")),
            Err(ArtifactError::Io { .. })
        ));
    }
}
