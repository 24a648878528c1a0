//! Skin feature extraction from a face region.
//!
//! Produces the 18-dimensional [`FeatureVector`]: color statistics in HSV and
//! LAB plus grayscale texture statistics. Extraction never fails; degenerate
//! input yields the all-zero vector.

use crate::color;
use crate::frame::BgrFrame;
use crate::types::{FaceRect, FeatureVector, FEATURE_DIM};

// --- Normalization constants ---
// Empirical soft-clipping scales. Tunable, not derived from physical units.
const HUE_MAX: f64 = 179.0;
const CHANNEL_MAX: f64 = 255.0;
const HUE_STD_SCALE: f64 = 90.0;
const STD_SCALE: f64 = 128.0;
const SHARPNESS_SCALE: f64 = 1000.0;
const GRADIENT_SCALE: f64 = 255.0;

// --- Binary thresholds (strictly greater than) ---
const DARK_SPOT_THRESHOLD: u8 = 127;
const OILY_THRESHOLD: u8 = 200;

/// Computes skin features for a face rectangle in a BGR frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract the feature vector for `face` in `frame`.
    ///
    /// The rectangle is clamped to the frame. An empty crop returns
    /// [`FeatureVector::zeros`].
    pub fn extract(&self, frame: &BgrFrame, face: &FaceRect) -> FeatureVector {
        let roi = frame.crop(face);
        match compute_features(&roi) {
            Some(features) => features,
            None => {
                tracing::warn!(
                    x = face.x,
                    y = face.y,
                    width = face.width,
                    height = face.height,
                    frame_width = frame.width,
                    frame_height = frame.height,
                    "face region unusable, falling back to zero feature vector"
                );
                FeatureVector::zeros()
            }
        }
    }
}

fn compute_features(roi: &BgrFrame) -> Option<FeatureVector> {
    if roi.is_empty() || !roi.is_well_formed() {
        return None;
    }
    let w = roi.width as usize;
    let h = roi.height as usize;

    let hsv = color::bgr_to_hsv(roi);
    let lab = color::bgr_to_lab(roi);
    let gray = color::bgr_to_gray(roi);

    let (hsv_mean, hsv_std) = channel_stats(&hsv);
    let (lab_mean, lab_std) = channel_stats(&lab);

    let gray_f: Vec<f64> = gray.iter().map(|&p| p as f64).collect();
    let (gray_mean, gray_std) = mean_std(&gray_f);

    let laplacian = laplacian(&gray, w, h);
    let (_, lap_std) = mean_std(&laplacian);
    let sharpness = (lap_std * lap_std / SHARPNESS_SCALE).min(1.0);

    let contrast = (gray_std / STD_SCALE).min(1.0);
    let brightness = gray_mean / CHANNEL_MAX;

    let total = gray.len() as f64;
    let dark_spot_ratio = gray.iter().filter(|&&p| p > DARK_SPOT_THRESHOLD).count() as f64 / total;
    let oily_ratio = gray.iter().filter(|&&p| p > OILY_THRESHOLD).count() as f64 / total;

    let gradient = gradient_magnitude(&gray, w, h);
    let (gradient_mean, _) = mean_std(&gradient);
    let texture_complexity = (gradient_mean / GRADIENT_SCALE).min(1.0);

    let values: [f64; FEATURE_DIM] = [
        hsv_mean[0] / HUE_MAX,
        hsv_mean[1] / CHANNEL_MAX,
        hsv_mean[2] / CHANNEL_MAX,
        hsv_std[0] / HUE_STD_SCALE,
        hsv_std[1] / STD_SCALE,
        hsv_std[2] / STD_SCALE,
        lab_mean[0] / CHANNEL_MAX,
        lab_mean[1] / CHANNEL_MAX,
        lab_mean[2] / CHANNEL_MAX,
        lab_std[0] / STD_SCALE,
        lab_std[1] / STD_SCALE,
        lab_std[2] / STD_SCALE,
        sharpness,
        contrast,
        brightness,
        dark_spot_ratio,
        oily_ratio,
        texture_complexity,
    ];

    if values.iter().any(|v| !v.is_finite()) {
        return None;
    }

    Some(FeatureVector(values.map(|v| v as f32)))
}

/// Per-channel mean and population standard deviation.
fn channel_stats(pixels: &[[u8; 3]]) -> ([f64; 3], [f64; 3]) {
    let n = pixels.len() as f64;
    let mut sum = [0.0f64; 3];
    for p in pixels {
        for c in 0..3 {
            sum[c] += p[c] as f64;
        }
    }
    let mean = sum.map(|s| s / n);

    let mut var = [0.0f64; 3];
    for p in pixels {
        for c in 0..3 {
            let d = p[c] as f64 - mean[c];
            var[c] += d * d;
        }
    }
    (mean, var.map(|v| (v / n).sqrt()))
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Mirror an out-of-range index back into [0, n) without repeating the edge
/// pixel (`gfedcb|abcdefgh|gfedcba`).
fn reflect101(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let n = n as isize;
    let mut i = i;
    // Kernels here are 3x3, so one reflection is always enough.
    if i < 0 {
        i = -i;
    }
    if i >= n {
        i = 2 * n - 2 - i;
    }
    i as usize
}

/// Apply a 3x3 kernel with reflect-101 borders.
fn convolve3x3(gray: &[u8], w: usize, h: usize, kernel: &[[f64; 3]; 3]) -> Vec<f64> {
    let mut out = Vec::with_capacity(w * h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (ky, row) in kernel.iter().enumerate() {
                let sy = reflect101(y as isize + ky as isize - 1, h);
                for (kx, &k) in row.iter().enumerate() {
                    if k == 0.0 {
                        continue;
                    }
                    let sx = reflect101(x as isize + kx as isize - 1, w);
                    acc += k * gray[sy * w + sx] as f64;
                }
            }
            out.push(acc);
        }
    }
    out
}

const LAPLACIAN_KERNEL: [[f64; 3]; 3] = [[0.0, 1.0, 0.0], [1.0, -4.0, 1.0], [0.0, 1.0, 0.0]];
const SOBEL_X: [[f64; 3]; 3] = [[-1.0, 0.0, 1.0], [-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]];
const SOBEL_Y: [[f64; 3]; 3] = [[-1.0, -2.0, -1.0], [0.0, 0.0, 0.0], [1.0, 2.0, 1.0]];

fn laplacian(gray: &[u8], w: usize, h: usize) -> Vec<f64> {
    convolve3x3(gray, w, h, &LAPLACIAN_KERNEL)
}

fn gradient_magnitude(gray: &[u8], w: usize, h: usize) -> Vec<f64> {
    let gx = convolve3x3(gray, w, h, &SOBEL_X);
    let gy = convolve3x3(gray, w, h, &SOBEL_Y);
    gx.iter()
        .zip(gy.iter())
        .map(|(x, y)| (x * x + y * y).sqrt())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic pseudo-skin texture: warm base tone with a checker of
    /// darker and brighter blotches.
    fn textured_frame(w: u32, h: u32) -> BgrFrame {
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            for x in 0..w {
                let wobble = ((x * 7 + y * 13) % 41) as u8;
                let (b, g, r) = if (x / 4 + y / 4) % 2 == 0 {
                    (90 + wobble, 130 + wobble, 180 + wobble)
                } else {
                    (60 + wobble / 2, 90 + wobble / 2, 140 + wobble / 2)
                };
                data.extend_from_slice(&[b, g, r]);
            }
        }
        BgrFrame::new(data, w, h).unwrap()
    }

    #[test]
    fn test_extract_deterministic() {
        let frame = textured_frame(64, 48);
        let rect = FaceRect::new(8, 4, 40, 36);
        let extractor = FeatureExtractor::new();
        let a = extractor.extract(&frame, &rect);
        let b = extractor.extract(&frame, &rect);
        let bits_a: Vec<u32> = a.0.iter().map(|v| v.to_bits()).collect();
        let bits_b: Vec<u32> = b.0.iter().map(|v| v.to_bits()).collect();
        assert_eq!(bits_a, bits_b);
    }

    #[test]
    fn test_extract_in_unit_range() {
        let frame = textured_frame(64, 48);
        let features = FeatureExtractor::new().extract(&frame, &FaceRect::new(0, 0, 64, 48));
        assert_eq!(features.0.len(), FEATURE_DIM);
        for (i, v) in features.0.iter().enumerate() {
            assert!((0.0..=1.0 + 1e-6).contains(v), "feature {i} = {v}");
        }
        assert!(!features.is_zero());
    }

    #[test]
    fn test_extract_empty_crop_is_zero() {
        let frame = textured_frame(16, 16);
        let extractor = FeatureExtractor::new();
        assert!(extractor.extract(&frame, &FaceRect::new(16, 0, 4, 4)).is_zero());
        assert!(extractor.extract(&frame, &FaceRect::new(0, 0, 0, 8)).is_zero());
        assert!(extractor.extract(&frame, &FaceRect::new(100, 100, 10, 10)).is_zero());
    }

    #[test]
    fn test_extract_empty_frame_is_zero() {
        let frame = BgrFrame::filled(0, 0, [0, 0, 0]);
        let features = FeatureExtractor::new().extract(&frame, &FaceRect::new(0, 0, 10, 10));
        assert!(features.is_zero());
    }

    #[test]
    fn test_extract_short_buffer_is_zero() {
        let frame = BgrFrame {
            data: vec![0; 30],
            width: 10,
            height: 10,
        };
        let features = FeatureExtractor::new().extract(&frame, &FaceRect::new(0, 0, 10, 10));
        assert!(features.is_zero());
    }

    #[test]
    fn test_extract_partially_outside_matches_clamped() {
        let frame = textured_frame(32, 32);
        let extractor = FeatureExtractor::new();
        let partial = extractor.extract(&frame, &FaceRect::new(20, 20, 50, 50));
        let clamped = extractor.extract(&frame, &FaceRect::new(20, 20, 12, 12));
        assert_eq!(partial, clamped);
    }

    #[test]
    fn test_uniform_gray_region() {
        let frame = BgrFrame::filled(10, 10, [128, 128, 128]);
        let f = FeatureExtractor::new().extract(&frame, &frame.full_rect());
        // No hue, no saturation, value 128
        assert_eq!(f.0[0], 0.0);
        assert_eq!(f.0[1], 0.0);
        assert!((f.0[2] - 128.0 / 255.0).abs() < 1e-6);
        // All spreads vanish on a flat patch
        for i in [3, 4, 5, 9, 10, 11, 12, 13, 17] {
            assert_eq!(f.0[i], 0.0, "feature {i}");
        }
        assert!((f.0[14] - 128.0 / 255.0).abs() < 1e-6);
        // 128 > 127 counts as above the dark-spot threshold, but not oily
        assert_eq!(f.0[15], 1.0);
        assert_eq!(f.0[16], 0.0);
    }

    #[test]
    fn test_single_pixel_region() {
        let frame = BgrFrame::filled(1, 1, [255, 255, 255]);
        let f = FeatureExtractor::new().extract(&frame, &frame.full_rect());
        assert_eq!(f.0[16], 1.0);
        assert_eq!(f.0[12], 0.0);
        assert_eq!(f.0[17], 0.0);
    }

    #[test]
    fn test_sharp_edges_raise_texture_features() {
        let flat = BgrFrame::filled(20, 20, [100, 100, 100]);
        let mut data = Vec::new();
        for y in 0..20u32 {
            for x in 0..20u32 {
                let v = if (x + y) % 2 == 0 { 0 } else { 255 };
                data.extend_from_slice(&[v, v, v]);
            }
        }
        let checker = BgrFrame::new(data, 20, 20).unwrap();
        let extractor = FeatureExtractor::new();
        let a = extractor.extract(&flat, &flat.full_rect());
        let b = extractor.extract(&checker, &checker.full_rect());
        assert!(b.0[12] > a.0[12]);
        assert_eq!(b.0[12], 1.0, "checkerboard laplacian variance saturates");
        assert!(b.0[13] > 0.9);
    }

    #[test]
    fn test_reflect101() {
        assert_eq!(reflect101(-1, 5), 1);
        assert_eq!(reflect101(5, 5), 3);
        assert_eq!(reflect101(2, 5), 2);
        assert_eq!(reflect101(-1, 1), 0);
        assert_eq!(reflect101(1, 1), 0);
    }

    #[test]
    fn test_sobel_on_horizontal_ramp() {
        // gray = x * 10 on a 5x3 strip; interior dx = (1 + 2 + 1) * 20 = 80
        let w = 5;
        let h = 3;
        let gray: Vec<u8> = (0..h).flat_map(|_| (0..w).map(|x| (x * 10) as u8)).collect();
        let gx = convolve3x3(&gray, w, h, &SOBEL_X);
        assert_eq!(gx[w + 2], 80.0);
        let gy = convolve3x3(&gray, w, h, &SOBEL_Y);
        assert!(gy.iter().all(|&v| v == 0.0));
    }
}
