//! Frame type — interleaved BGR pixel buffers, decoding and face-region cropping.

use crate::types::FaceRect;
use image::{DynamicImage, RgbImage};
use std::path::Path;

/// Bytes per pixel in a [`BgrFrame`].
pub const CHANNELS: usize = 3;

/// A color image in row-major, interleaved BGR order.
///
/// BGR is the channel order used by the upstream face detector; every stage of
/// the pipeline reads pixels in this order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BgrFrame {
    /// Pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl BgrFrame {
    /// Wrap an existing BGR buffer, checking its length.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// A frame filled with a single BGR color.
    pub fn filled(width: u32, height: u32, bgr: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * CHANNELS);
        for _ in 0..pixels {
            data.extend_from_slice(&bgr);
        }
        Self {
            data,
            width,
            height,
        }
    }

    /// Convert an RGB image into BGR order.
    pub fn from_rgb_image(img: &RgbImage) -> Self {
        let (width, height) = img.dimensions();
        let mut data = Vec::with_capacity(width as usize * height as usize * CHANNELS);
        for px in img.pixels() {
            let [r, g, b] = px.0;
            data.extend_from_slice(&[b, g, r]);
        }
        Self {
            data,
            width,
            height,
        }
    }

    pub fn from_dynamic(img: &DynamicImage) -> Self {
        Self::from_rgb_image(&img.to_rgb8())
    }

    /// Decode an image file (any format the `image` crate understands).
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FrameError> {
        let path = path.as_ref();
        let img = image::open(path).map_err(|e| FrameError::Decode {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let frame = Self::from_dynamic(&img);
        if frame.is_empty() {
            return Err(FrameError::ZeroDimensions);
        }
        tracing::debug!(
            path = %path.display(),
            width = frame.width,
            height = frame.height,
            "decoded frame"
        );
        Ok(frame)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// True when `data` holds exactly `width * height` BGR triples. Frames
    /// built through [`BgrFrame::new`] always are; struct literals may not be.
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.pixel_count() * CHANNELS
    }

    /// BGR triple at (x, y). Caller guarantees the coordinates are in bounds.
    #[cfg(test)]
    fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = (y as usize * self.width as usize + x as usize) * CHANNELS;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Iterate over BGR triples in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        self.data
            .chunks_exact(CHANNELS)
            .map(|c| [c[0], c[1], c[2]])
    }

    /// Rectangle covering the whole frame.
    pub fn full_rect(&self) -> FaceRect {
        FaceRect::new(0, 0, self.width, self.height)
    }

    /// Copy out the part of `rect` that lies inside the frame.
    ///
    /// The result is empty (zero width or height) when the rectangle does not
    /// overlap the frame at all, or when the frame's buffer does not match its
    /// dimensions.
    pub fn crop(&self, rect: &FaceRect) -> BgrFrame {
        if !self.is_well_formed() {
            tracing::debug!(
                width = self.width,
                height = self.height,
                len = self.data.len(),
                "frame buffer does not match its dimensions"
            );
            return BgrFrame::filled(0, 0, [0; 3]);
        }
        let x0 = rect.x.min(self.width);
        let y0 = rect.y.min(self.height);
        let x1 = rect.x.saturating_add(rect.width).min(self.width);
        let y1 = rect.y.saturating_add(rect.height).min(self.height);
        let w = x1 - x0;
        let h = y1 - y0;

        let mut data = Vec::with_capacity(w as usize * h as usize * CHANNELS);
        let stride = self.width as usize * CHANNELS;
        for y in y0..y1 {
            let start = y as usize * stride + x0 as usize * CHANNELS;
            let end = start + w as usize * CHANNELS;
            data.extend_from_slice(&self.data[start..end]);
        }

        BgrFrame {
            data,
            width: w,
            height: h,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid BGR buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("failed to decode {path}: {reason}")]
    Decode { path: String, reason: String },
    #[error("image dimensions are zero")]
    ZeroDimensions,
}
