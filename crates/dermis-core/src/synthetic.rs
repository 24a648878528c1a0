//! Synthetic labeled training data.
//!
//! Samples feature vectors around hand-authored per-skin-type prototypes,
//! perturbed per skin condition. Used to bootstrap both classifiers when no
//! labeled photo corpus exists; accuracy on real photographs is unverified.

use crate::types::{ClassLabel, FeatureVector, SkinCondition, SkinType, SyntheticSample, FEATURE_DIM};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

/// Number of (skin type × skin condition) strata.
pub const STRATA: usize = 16;

/// Amount added to the condition's marker dimension before noise.
const CONDITION_SHIFT: f64 = 0.2;

// Feature indices shifted by each condition.
const CONTRAST_IDX: usize = 13;
const DARK_SPOT_IDX: usize = 15;
const TEXTURE_IDX: usize = 17;

const DRY_PROTOTYPE: [f64; FEATURE_DIM] = [
    0.5, 0.3, 0.4, 0.1, 0.1, 0.1, 0.4, 0.0, 0.0, 0.1, 0.1, 0.1, 0.3, 0.2, 0.3, 0.4, 0.2, 0.3,
];
const OILY_PROTOTYPE: [f64; FEATURE_DIM] = [
    0.5, 0.6, 0.7, 0.1, 0.1, 0.1, 0.6, 0.0, 0.0, 0.1, 0.1, 0.1, 0.7, 0.3, 0.5, 0.1, 0.6, 0.5,
];
const COMBINATION_PROTOTYPE: [f64; FEATURE_DIM] = [
    0.5, 0.4, 0.5, 0.1, 0.1, 0.1, 0.5, 0.0, 0.0, 0.1, 0.1, 0.1, 0.5, 0.25, 0.4, 0.25, 0.4, 0.4,
];
const SENSITIVE_PROTOTYPE: [f64; FEATURE_DIM] = [
    0.5, 0.3, 0.4, 0.15, 0.15, 0.15, 0.4, 0.0, 0.0, 0.15, 0.15, 0.15, 0.6, 0.4, 0.3, 0.3, 0.5, 0.5,
];

/// Prototype feature vector for a skin type.
pub fn prototype(skin_type: SkinType) -> [f64; FEATURE_DIM] {
    match skin_type {
        SkinType::Dry => DRY_PROTOTYPE,
        SkinType::Oily => OILY_PROTOTYPE,
        SkinType::Combination => COMBINATION_PROTOTYPE,
        SkinType::Sensitive => SENSITIVE_PROTOTYPE,
    }
}

/// Per-dimension Gaussian noise standard deviation for a skin type.
pub fn noise_std(skin_type: SkinType) -> f64 {
    match skin_type {
        SkinType::Dry => 0.10,
        SkinType::Oily => 0.10,
        SkinType::Combination => 0.15,
        SkinType::Sensitive => 0.12,
    }
}

/// Prototype for a stratum: the skin-type prototype with the condition's
/// marker dimension raised.
pub fn stratum_center(skin_type: SkinType, condition: SkinCondition) -> [f64; FEATURE_DIM] {
    let mut center = prototype(skin_type);
    match condition {
        SkinCondition::Normal => {}
        SkinCondition::Acne => center[DARK_SPOT_IDX] += CONDITION_SHIFT,
        SkinCondition::PigmentationSpots => center[CONTRAST_IDX] += CONDITION_SHIFT,
        SkinCondition::EnlargedPores => center[TEXTURE_IDX] += CONDITION_SHIFT,
    }
    center
}

/// Samples drawn per stratum for a requested total. The remainder of the
/// division is dropped, so the returned dataset may be smaller than requested.
pub fn samples_per_stratum(sample_count: usize) -> usize {
    sample_count / STRATA
}

/// Generate `sample_count / 16` samples for each stratum, skin type outermost,
/// then condition, drawing noise from `rng`.
pub fn generate<R: Rng + ?Sized>(sample_count: usize, rng: &mut R) -> Vec<SyntheticSample> {
    let per_stratum = samples_per_stratum(sample_count);
    let mut samples = Vec::with_capacity(per_stratum * STRATA);

    for &skin_type in SkinType::ALL {
        let sigma = noise_std(skin_type);
        for &condition in SkinCondition::ALL {
            let center = stratum_center(skin_type, condition);
            for _ in 0..per_stratum {
                let mut values = [0.0f32; FEATURE_DIM];
                for (v, c) in values.iter_mut().zip(center.iter()) {
                    let z: f64 = StandardNormal.sample(&mut *rng);
                    *v = (c + sigma * z).clamp(0.0, 1.0) as f32;
                }
                samples.push(SyntheticSample {
                    features: FeatureVector(values),
                    skin_type,
                    condition,
                });
            }
        }
    }

    tracing::debug!(
        requested = sample_count,
        generated = samples.len(),
        per_stratum,
        "generated synthetic samples"
    );
    samples
}

/// Seeded synthetic data source.
pub struct SyntheticGenerator {
    rng: ChaCha8Rng,
}

impl SyntheticGenerator {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn generate(&mut self, sample_count: usize) -> Vec<SyntheticSample> {
        generate(sample_count, &mut self.rng)
    }
}

/// Split samples into parallel feature / skin-type / condition columns.
pub fn unzip(samples: &[SyntheticSample]) -> (Vec<FeatureVector>, Vec<SkinType>, Vec<SkinCondition>) {
    let mut features = Vec::with_capacity(samples.len());
    let mut types = Vec::with_capacity(samples.len());
    let mut conditions = Vec::with_capacity(samples.len());
    for s in samples {
        features.push(s.features);
        types.push(s.skin_type);
        conditions.push(s.condition);
    }
    (features, types, conditions)
}
