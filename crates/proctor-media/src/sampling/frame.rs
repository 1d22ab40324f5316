//! Decoded frame types.

use image::{GrayImage, RgbImage};

/// A frame as it comes out of the decoder, tagged with its decoded position.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Zero-based position of the frame in the decoded stream
    pub index: u64,
    pub image: RgbImage,
}

impl RawFrame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self { index, image }
    }
}

/// A sampled frame handed to the detectors.
///
/// `timestamp_seconds` is always `index / fps` for the measured (or default)
/// frame rate of the source.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub timestamp_seconds: f64,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, timestamp_seconds: f64, image: RgbImage) -> Self {
        Self {
            index,
            timestamp_seconds,
            image,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Frame area in pixels.
    pub fn area(&self) -> f64 {
        self.width() as f64 * self.height() as f64
    }

    /// True when the pixel buffer is unusable (zero-sized).
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Luma (grayscale) copy of the frame.
    pub fn luma(&self) -> GrayImage {
        image::imageops::grayscale(&self.image)
    }
}
