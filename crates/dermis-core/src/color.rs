//! 8-bit color space conversions from BGR.
//!
//! Value ranges follow the conventions of the imaging library used by the
//! upstream detector: hue in [0, 180), saturation/value in [0, 255], LAB with
//! L scaled to [0, 255] and a/b offset by 128.

use crate::frame::BgrFrame;

// Fixed-point luma weights (14-bit), R/G/B = 0.299/0.587/0.114.
const GRAY_SHIFT: u32 = 14;
const GRAY_R: u32 = 4899;
const GRAY_G: u32 = 9617;
const GRAY_B: u32 = 1868;

// D65 reference white.
const WHITE_X: f64 = 0.950456;
const WHITE_Z: f64 = 1.088754;
const LAB_EPSILON: f64 = 0.008856;

/// Grayscale intensity of one BGR pixel.
pub fn gray_pixel([b, g, r]: [u8; 3]) -> u8 {
    let acc = b as u32 * GRAY_B + g as u32 * GRAY_G + r as u32 * GRAY_R;
    ((acc + (1 << (GRAY_SHIFT - 1))) >> GRAY_SHIFT) as u8
}

/// HSV of one BGR pixel with H in [0, 180).
pub fn hsv_pixel([b, g, r]: [u8; 3]) -> [u8; 3] {
    let (b, g, r) = (b as i32, g as i32, r as i32);
    let v = r.max(g).max(b);
    let vmin = r.min(g).min(b);
    let diff = v - vmin;

    let s = if v == 0 {
        0.0
    } else {
        diff as f64 * 255.0 / v as f64
    };

    let h = if diff == 0 {
        0.0
    } else {
        let raw = if v == r {
            g - b
        } else if v == g {
            b - r + 2 * diff
        } else {
            r - g + 4 * diff
        };
        let h = (30.0 * raw as f64 / diff as f64 + 0.5).floor();
        if h < 0.0 {
            h + 180.0
        } else {
            h
        }
    };

    [
        saturate(h),
        saturate((s + 0.5).floor()),
        v as u8,
    ]
}

/// CIE L*a*b* of one BGR pixel, 8-bit encoded.
pub fn lab_pixel([b, g, r]: [u8; 3]) -> [u8; 3] {
    let r = srgb_to_linear(r);
    let g = srgb_to_linear(g);
    let b = srgb_to_linear(b);

    let x = (0.412453 * r + 0.357580 * g + 0.180423 * b) / WHITE_X;
    let y = 0.212671 * r + 0.715160 * g + 0.072169 * b;
    let z = (0.019334 * r + 0.119193 * g + 0.950227 * b) / WHITE_Z;

    let fx = lab_f(x);
    let fy = lab_f(y);
    let fz = lab_f(z);

    let l = if y > LAB_EPSILON {
        116.0 * fy - 16.0
    } else {
        903.3 * y
    };
    let a = 500.0 * (fx - fy) + 128.0;
    let bb = 200.0 * (fy - fz) + 128.0;

    [
        saturate((l * 255.0 / 100.0).round()),
        saturate(a.round()),
        saturate(bb.round()),
    ]
}

pub fn bgr_to_gray(frame: &BgrFrame) -> Vec<u8> {
    frame.pixels().map(gray_pixel).collect()
}

pub fn bgr_to_hsv(frame: &BgrFrame) -> Vec<[u8; 3]> {
    frame.pixels().map(hsv_pixel).collect()
}

pub fn bgr_to_lab(frame: &BgrFrame) -> Vec<[u8; 3]> {
    frame.pixels().map(lab_pixel).collect()
}

fn srgb_to_linear(c: u8) -> f64 {
    let c = c as f64 / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn lab_f(t: f64) -> f64 {
    if t > LAB_EPSILON {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

fn saturate(v: f64) -> u8 {
    v.clamp(0.0, 255.0) as u8
}
