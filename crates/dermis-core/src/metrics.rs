//! Hold-out evaluation metrics.

use crate::types::ClassLabel;
use serde::Serialize;
use std::fmt;

/// Fraction of positions where `predicted` equals `truth`. 0 for empty input.
pub fn accuracy(predicted: &[usize], truth: &[usize]) -> f32 {
    let n = predicted.len().min(truth.len());
    if n == 0 {
        return 0.0;
    }
    let correct = predicted
        .iter()
        .zip(truth)
        .filter(|(p, t)| p == t)
        .count();
    correct as f32 / n as f32
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
    pub support: usize,
}

/// Per-class precision/recall/F1 over a label space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub kind: String,
    pub accuracy: f32,
    pub classes: Vec<ClassMetrics>,
}

impl ClassificationReport {
    pub fn new<L: ClassLabel>(predicted: &[usize], truth: &[usize]) -> Self {
        let classes = L::ALL
            .iter()
            .map(|label| {
                let code = label.code();
                let pairs = predicted.iter().zip(truth);
                let tp = pairs.clone().filter(|&(&p, &t)| p == code && t == code).count();
                let fp = pairs.clone().filter(|&(&p, &t)| p == code && t != code).count();
                let fn_ = pairs.filter(|&(&p, &t)| p != code && t == code).count();

                let precision = ratio(tp, tp + fp);
                let recall = ratio(tp, tp + fn_);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassMetrics {
                    label: label.name().to_string(),
                    precision,
                    recall,
                    f1,
                    support: tp + fn_,
                }
            })
            .collect();

        Self {
            kind: L::KIND.to_string(),
            accuracy: accuracy(predicted, truth),
            classes,
        }
    }

    /// Emit one debug event per class.
    pub fn log(&self) {
        for c in &self.classes {
            tracing::debug!(
                kind = %self.kind,
                label = %c.label,
                precision = c.precision,
                recall = c.recall,
                f1 = c.f1,
                support = c.support,
                "class metrics"
            );
        }
    }
}

fn ratio(num: usize, den: usize) -> f32 {
    if den == 0 {
        0.0
    } else {
        num as f32 / den as f32
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} (accuracy {:.3})", self.kind, self.accuracy)?;
        writeln!(
            f,
            "{:<20} {:>9} {:>9} {:>9} {:>9}",
            "label", "precision", "recall", "f1", "support"
        )?;
        for c in &self.classes {
            writeln!(
                f,
                "{:<20} {:>9.3} {:>9.3} {:>9.3} {:>9}",
                c.label, c.precision, c.recall, c.f1, c.support
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SkinType;

    #[test]
    fn test_accuracy() {
        assert_eq!(accuracy(&[0, 1, 2, 3], &[0, 1, 0, 0]), 0.5);
        assert_eq!(accuracy(&[], &[]), 0.0);
    }

    #[test]
    fn test_report_per_class() {
        // Dry: tp 2, fp 1, fn 0. Oily: tp 1, fp 0, fn 1.
        let truth = [0, 0, 1, 1];
        let predicted = [0, 0, 0, 1];
        let report = ClassificationReport::new::<SkinType>(&predicted, &truth);

        assert_eq!(report.kind, "skin_type");
        assert_eq!(report.classes.len(), 4);
        assert_eq!(report.accuracy, 0.75);

        let dry = &report.classes[0];
        assert!((dry.precision - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(dry.recall, 1.0);
        assert!((dry.f1 - 0.8).abs() < 1e-6);
        assert_eq!(dry.support, 2);

        let oily = &report.classes[1];
        assert_eq!(oily.precision, 1.0);
        assert_eq!(oily.recall, 0.5);
        assert_eq!(oily.support, 2);

        let sensitive = &report.classes[3];
        assert_eq!(sensitive.precision, 0.0);
        assert_eq!(sensitive.f1, 0.0);
        assert_eq!(sensitive.support, 0);
    }

    #[test]
    fn test_display_lists_every_label() {
        let report = ClassificationReport::new::<SkinType>(&[0, 1], &[0, 1]);
        let text = report.to_string();
        for name in ["Dry", "Oily", "Combination", "Sensitive"] {
            assert!(text.contains(name));
        }
    }
}
