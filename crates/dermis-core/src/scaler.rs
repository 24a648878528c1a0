//! Per-feature standardization: `z = (x - mean) / scale`.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ScalerError {
    #[error("cannot fit a standardizer on zero samples")]
    Empty,
    #[error("standardizer has no fitted statistics")]
    NotFitted,
    #[error("expected {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Standardizer fitted on training data and reapplied unchanged at inference.
///
/// `scale` is the population standard deviation of each feature; constant
/// features get a scale of 1 so they pass through centered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Option<Vec<f32>>,
    scale: Option<Vec<f32>>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// True only when both statistics are present and agree in length.
    pub fn is_fitted(&self) -> bool {
        match (&self.mean, &self.scale) {
            (Some(m), Some(s)) => !m.is_empty() && m.len() == s.len(),
            _ => false,
        }
    }

    /// Number of features the scaler was fitted on (0 when unfitted).
    pub fn n_features(&self) -> usize {
        if self.is_fitted() {
            self.mean.as_ref().map_or(0, Vec::len)
        } else {
            0
        }
    }

    pub fn mean(&self) -> Option<&[f32]> {
        self.mean.as_deref()
    }

    pub fn scale(&self) -> Option<&[f32]> {
        self.scale.as_deref()
    }

    /// Learn per-column mean and scale from `x` (rows are samples).
    pub fn fit(&mut self, x: ArrayView2<'_, f32>) -> Result<(), ScalerError> {
        let n = x.nrows();
        if n == 0 || x.ncols() == 0 {
            return Err(ScalerError::Empty);
        }

        let mut mean = Vec::with_capacity(x.ncols());
        let mut scale = Vec::with_capacity(x.ncols());
        for column in x.axis_iter(Axis(1)) {
            let m = column.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
            let var = column
                .iter()
                .map(|&v| (v as f64 - m).powi(2))
                .sum::<f64>()
                / n as f64;
            let std = var.sqrt();
            mean.push(m as f32);
            scale.push(if std > f64::EPSILON { std as f32 } else { 1.0 });
        }

        self.mean = Some(mean);
        self.scale = Some(scale);
        Ok(())
    }

    pub fn fit_transform(&mut self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>, ScalerError> {
        self.fit(x)?;
        self.transform(x)
    }

    pub fn transform(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>, ScalerError> {
        let (mean, scale) = self.stats()?;
        if x.ncols() != mean.len() {
            return Err(ScalerError::DimensionMismatch {
                expected: mean.len(),
                actual: x.ncols(),
            });
        }
        let mean = Array1::from(mean.to_vec());
        let scale = Array1::from(scale.to_vec());
        Ok((&x - &mean) / &scale)
    }

    /// Standardize a single sample.
    pub fn transform_row(&self, row: &[f32]) -> Result<Vec<f32>, ScalerError> {
        let (mean, scale) = self.stats()?;
        if row.len() != mean.len() {
            return Err(ScalerError::DimensionMismatch {
                expected: mean.len(),
                actual: row.len(),
            });
        }
        Ok(row
            .iter()
            .zip(mean.iter().zip(scale.iter()))
            .map(|(v, (m, s))| (v - m) / s)
            .collect())
    }

    fn stats(&self) -> Result<(&[f32], &[f32]), ScalerError> {
        if !self.is_fitted() {
            return Err(ScalerError::NotFitted);
        }
        match (&self.mean, &self.scale) {
            (Some(m), Some(s)) => Ok((m, s)),
            _ => Err(ScalerError::NotFitted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fit_transform_zero_mean_unit_std() {
        let x = array![[1.0f32, 100.0], [2.0, 200.0], [3.0, 300.0], [4.0, 400.0]];
        let mut scaler = StandardScaler::new();
        let z = scaler.fit_transform(x.view()).unwrap();

        for col in z.axis_iter(Axis(1)) {
            let mean = col.sum() / col.len() as f32;
            let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / col.len() as f32;
            assert!(mean.abs() < 1e-5, "mean {mean}");
            assert!((var - 1.0).abs() < 1e-4, "var {var}");
        }
    }

    #[test]
    fn test_population_std() {
        let x = array![[0.0f32], [2.0]];
        let mut scaler = StandardScaler::new();
        scaler.fit(x.view()).unwrap();
        assert_eq!(scaler.mean().unwrap(), &[1.0]);
        assert_eq!(scaler.scale().unwrap(), &[1.0]);
    }

    #[test]
    fn test_constant_feature_gets_unit_scale() {
        let x = array![[5.0f32, 1.0], [5.0, 3.0]];
        let mut scaler = StandardScaler::new();
        let z = scaler.fit_transform(x.view()).unwrap();
        assert_eq!(scaler.scale().unwrap()[0], 1.0);
        assert_eq!(z[[0, 0]], 0.0);
        assert_eq!(z[[1, 0]], 0.0);
    }

    #[test]
    fn test_unfitted_transform_fails() {
        let scaler = StandardScaler::new();
        assert!(!scaler.is_fitted());
        assert_eq!(scaler.transform_row(&[1.0]), Err(ScalerError::NotFitted));
        let x = array![[1.0f32]];
        assert_eq!(scaler.transform(x.view()), Err(ScalerError::NotFitted));
    }

    #[test]
    fn test_fit_empty_fails() {
        let x = Array2::<f32>::zeros((0, 3));
        let mut scaler = StandardScaler::new();
        assert_eq!(scaler.fit(x.view()), Err(ScalerError::Empty));
        assert!(!scaler.is_fitted());
    }

    #[test]
    fn test_row_matches_matrix() {
        let x = array![[1.0f32, 10.0, -3.0], [2.0, 14.0, 5.0], [6.0, 11.0, 0.5]];
        let mut scaler = StandardScaler::new();
        let z = scaler.fit_transform(x.view()).unwrap();
        let row = scaler.transform_row(&[2.0, 14.0, 5.0]).unwrap();
        for (a, b) in row.iter().zip(z.row(1).iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let x = array![[1.0f32, 2.0], [3.0, 4.0]];
        let mut scaler = StandardScaler::new();
        scaler.fit(x.view()).unwrap();
        assert_eq!(
            scaler.transform_row(&[1.0]),
            Err(ScalerError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn test_partial_statistics_not_fitted() {
        let scaler: StandardScaler =
            serde_json::from_str(r#"{"mean":[0.0,1.0],"scale":null}"#).unwrap();
        assert!(!scaler.is_fitted());
        assert_eq!(scaler.n_features(), 0);
    }
}
