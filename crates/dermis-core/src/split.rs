//! Stratified train/test splitting.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

/// Fraction of each class held out for evaluation.
pub const TEST_FRACTION: f64 = 0.2;

#[derive(Error, Debug, PartialEq)]
pub enum SplitError {
    #[error("no samples to split")]
    Empty,
    #[error("class {class} has {count} samples; at least 2 are needed to appear in both splits")]
    TooFewSamples { class: usize, count: usize },
}

/// Row indices of the two halves of a split.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Split sample indices so every class in `0..n_classes` lands in both halves.
///
/// Each class contributes `round(count * test_fraction)` test samples, clamped
/// to `[1, count - 1]`. Within a class, membership is decided by a seeded
/// shuffle.
pub fn stratified_split(
    labels: &[usize],
    n_classes: usize,
    test_fraction: f64,
    seed: u64,
) -> Result<TrainTestSplit, SplitError> {
    if labels.is_empty() {
        return Err(SplitError::Empty);
    }

    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
    for (i, &label) in labels.iter().enumerate() {
        if let Some(bucket) = by_class.get_mut(label) {
            bucket.push(i);
        }
    }
    if let Some((class, bucket)) = by_class.iter().enumerate().find(|(_, b)| b.len() < 2) {
        return Err(SplitError::TooFewSamples {
            class,
            count: bucket.len(),
        });
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();
    for mut bucket in by_class {
        bucket.shuffle(&mut rng);
        let count = bucket.len();
        let n_test = ((count as f64 * test_fraction).round() as usize).clamp(1, count - 1);
        test.extend_from_slice(&bucket[..n_test]);
        train.extend_from_slice(&bucket[n_test..]);
    }

    Ok(TrainTestSplit { train, test })
}
