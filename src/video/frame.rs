//! Raw RGB frame geometry
//!
//! Frames travel through FFmpeg pipes as packed `rgb24`: three bytes per
//! pixel, rows top to bottom, no padding.

use std::fmt;
use std::str::FromStr;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use super::VideoError;

/// Bytes per packed RGB pixel
pub const BYTES_PER_PIXEL: usize = 3;

/// Frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size of `image`.
    pub fn of(image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self { width, height }
    }

    /// Expected byte count of one packed frame (width * height * 3)
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for FrameSize {
    type Err = String;

    /// Parse `WIDTHxHEIGHT`, e.g. `1920x1440`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {:?}", s))?;
        let width = w.trim().parse().map_err(|_| format!("invalid width {:?}", w))?;
        let height = h.trim().parse().map_err(|_| format!("invalid height {:?}", h))?;
        Ok(Self { width, height })
    }
}

/// Wrap one packed frame read from a pipe.
pub fn frame_from_raw(data: Vec<u8>, size: FrameSize) -> Result<RgbImage, VideoError> {
    let actual = data.len();
    RgbImage::from_raw(size.width, size.height, data).ok_or(VideoError::FrameLength {
        expected: size.byte_len(),
        actual,
    })
}

/// Fail unless `frame` has the size a sink was opened with.
pub(crate) fn check_size(frame: &RgbImage, expected: FrameSize) -> Result<(), VideoError> {
    let actual = FrameSize::of(frame);
    if actual != expected {
        return Err(VideoError::FrameSize { expected, actual });
    }
    Ok(())
}
