use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Number of statistics in a skin feature vector.
pub const FEATURE_DIM: usize = 18;

/// Normalized skin statistics for one face region.
///
/// Layout (index → meaning):
/// - 0..3: HSV channel means, 3..6: HSV channel std-devs
/// - 6..9: LAB channel means, 9..12: LAB channel std-devs
/// - 12: sharpness (Laplacian variance), 13: contrast, 14: brightness
/// - 15: dark-spot ratio, 16: oily-area ratio, 17: texture complexity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f32; FEATURE_DIM]);

impl FeatureVector {
    /// The all-zero vector returned when extraction cannot proceed.
    pub const fn zeros() -> Self {
        Self([0.0; FEATURE_DIM])
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// True for the extraction fallback. A real face region can in principle
    /// produce this too, so treat it as "no usable signal".
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&v| v == 0.0)
    }
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self::zeros()
    }
}

impl From<[f32; FEATURE_DIM]> for FeatureVector {
    fn from(values: [f32; FEATURE_DIM]) -> Self {
        Self(values)
    }
}

/// Axis-aligned face rectangle in pixel coordinates, as produced by a face detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Convert a floating-point detector box. Negative origins are clamped to
    /// zero (shrinking the box accordingly), sizes are rounded.
    pub fn from_box(x: f32, y: f32, width: f32, height: f32) -> Self {
        let x0 = x.max(0.0);
        let y0 = y.max(0.0);
        let x1 = (x + width).max(x0);
        let y1 = (y + height).max(y0);
        Self {
            x: x0.round() as u32,
            y: y0.round() as u32,
            width: (x1 - x0).round() as u32,
            height: (y1 - y0).round() as u32,
        }
    }

    /// The rectangle consumed by the analysis when a detector reports several.
    /// Ordering is the detector's responsibility.
    pub fn primary(faces: &[FaceRect]) -> Option<FaceRect> {
        faces.first().copied()
    }
}

/// A closed, integer-coded label space for one classifier.
pub trait ClassLabel: Copy + Eq + Debug + Send + Sync + 'static {
    /// Every label, ordered by code.
    const ALL: &'static [Self];
    /// Stable identifier of the label space, recorded in persisted models.
    const KIND: &'static str;

    fn code(self) -> usize;

    fn from_code(code: usize) -> Option<Self> {
        Self::ALL.get(code).copied()
    }

    fn name(self) -> &'static str;

    fn description(self) -> &'static str;

    fn count() -> usize {
        Self::ALL.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkinType {
    Dry,
    Oily,
    Combination,
    Sensitive,
}

impl SkinType {
    /// Everyday care advice for this skin type.
    pub fn care_tips(self) -> &'static [&'static str] {
        match self {
            SkinType::Dry => &[
                "Use a rich moisturizer formulated for dry skin",
                "Avoid washing your face too many times a day",
                "Look for products containing hyaluronic acid",
                "Apply a hydrating mask 2-3 times a week",
                "Avoid products that contain alcohol",
            ],
            SkinType::Oily => &[
                "Use a gentle, non-drying cleanser",
                "Use an oil-free, non-comedogenic moisturizer",
                "Avoid oil-based products",
                "Look for products containing salicylic acid",
                "Apply a clay mask 1-2 times a week",
            ],
            SkinType::Combination => &[
                "Treat each zone of the face with suitable products",
                "T-zone: use oil-control products",
                "Cheeks: use hydrating products",
                "Use a lightweight moisturizer",
                "Apply masks zone by zone",
            ],
            SkinType::Sensitive => &[
                "Use products that are free of known irritants",
                "Avoid fragranced products",
                "Patch-test new products before using them",
                "Use a mineral (physical) sunscreen",
                "Avoid harsh exfoliation",
            ],
        }
    }
}

impl ClassLabel for SkinType {
    const ALL: &'static [Self] = &[
        SkinType::Dry,
        SkinType::Oily,
        SkinType::Combination,
        SkinType::Sensitive,
    ];
    const KIND: &'static str = "skin_type";

    fn code(self) -> usize {
        self as usize
    }

    fn name(self) -> &'static str {
        match self {
            SkinType::Dry => "Dry",
            SkinType::Oily => "Oily",
            SkinType::Combination => "Combination",
            SkinType::Sensitive => "Sensitive",
        }
    }

    fn description(self) -> &'static str {
        match self {
            SkinType::Dry => {
                "Skin lacks moisture, often feels tight, flakes and is prone to fine lines"
            }
            SkinType::Oily => "Skin produces excess sebum, looks shiny and is prone to acne",
            SkinType::Combination => {
                "Skin has both dry and oily areas, usually an oilier T-zone (forehead, nose, chin)"
            }
            SkinType::Sensitive => {
                "Skin is easily irritated, turning red or itchy on contact with cosmetic ingredients"
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkinCondition {
    Normal,
    Acne,
    PigmentationSpots,
    EnlargedPores,
}

impl ClassLabel for SkinCondition {
    const ALL: &'static [Self] = &[
        SkinCondition::Normal,
        SkinCondition::Acne,
        SkinCondition::PigmentationSpots,
        SkinCondition::EnlargedPores,
    ];
    const KIND: &'static str = "skin_condition";

    fn code(self) -> usize {
        self as usize
    }

    fn name(self) -> &'static str {
        match self {
            SkinCondition::Normal => "Normal",
            SkinCondition::Acne => "Acne",
            SkinCondition::PigmentationSpots => "Pigmentation spots",
            SkinCondition::EnlargedPores => "Enlarged pores",
        }
    }

    fn description(self) -> &'static str {
        match self {
            SkinCondition::Normal => "No prominent skin concern detected",
            SkinCondition::Acne => "Breakouts and dark marks are visible across the face",
            SkinCondition::PigmentationSpots => {
                "Uneven tone from melasma, freckles or sun spots"
            }
            SkinCondition::EnlargedPores => "Visible pores and uneven surface texture",
        }
    }
}

/// Output of a classifier for one feature vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction<L: ClassLabel> {
    pub label: L,
    /// Probability mass on `label`, in [0, 1].
    pub confidence: f32,
    /// Per-class probabilities indexed by label code; sums to 1.
    pub probabilities: Vec<f32>,
}

impl<L: ClassLabel> Prediction<L> {
    /// Build a prediction from a class distribution, picking the arg-max.
    /// Ties resolve to the lowest code.
    pub fn from_probabilities(probabilities: Vec<f32>) -> Option<Self> {
        let (code, &confidence) = probabilities
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, &f32)>, (i, p)| match best {
                Some((_, bp)) if bp >= p => best,
                _ => Some((i, p)),
            })?;
        let label = L::from_code(code)?;
        Some(Self {
            label,
            confidence,
            probabilities,
        })
    }

    /// Probability for each label, keyed by label name.
    pub fn all_probabilities(&self) -> BTreeMap<String, f32> {
        L::ALL
            .iter()
            .map(|l| {
                let p = self.probabilities.get(l.code()).copied().unwrap_or(0.0);
                (l.name().to_string(), p)
            })
            .collect()
    }

    pub fn report(&self) -> LabelReport {
        LabelReport {
            kind: L::KIND.to_string(),
            label: self.label.name().to_string(),
            code: self.label.code(),
            confidence: self.confidence,
            all_probabilities: self.all_probabilities(),
            description: self.label.description().to_string(),
        }
    }
}

/// Serializable form of a [`Prediction`] handed to downstream consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelReport {
    pub kind: String,
    pub label: String,
    pub code: usize,
    pub confidence: f32,
    pub all_probabilities: BTreeMap<String, f32>,
    pub description: String,
}

/// One labeled synthetic training example.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticSample {
    pub features: FeatureVector,
    pub skin_type: SkinType,
    pub condition: SkinCondition,
}
