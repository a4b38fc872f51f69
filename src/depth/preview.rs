//! Grayscale renderings of raw depth and confidence grids

use image::{Rgb, RgbImage};
use ndarray::ArrayView2;

/// Global depth range used to normalize preview frames.
///
/// The minimum only considers non-zero cells, so the invalid-depth sentinel
/// does not pin the bottom of the range. NaN counts as zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthRange {
    pub min: f32,
    pub max: f32,
}

impl Default for DepthRange {
    fn default() -> Self {
        Self {
            min: f32::INFINITY,
            max: f32::NEG_INFINITY,
        }
    }
}

impl DepthRange {
    /// Widen the range to cover `grid`.
    pub fn include(&mut self, grid: ArrayView2<'_, f32>) {
        for &raw in grid.iter() {
            let d = sanitize(raw);
            self.max = self.max.max(d);
            if d != 0.0 {
                self.min = self.min.min(d);
            }
        }
    }

    /// No cell has been seen yet, or every cell was zero.
    pub fn is_empty(&self) -> bool {
        !self.min.is_finite() || !self.max.is_finite()
    }

    /// Map one depth value to a gray level.
    ///
    /// A degenerate range (`max <= min`) maps every non-zero cell to 255.
    pub fn normalize(&self, raw: f32) -> u8 {
        let d = sanitize(raw);
        if self.is_empty() {
            return 0;
        }
        let span = self.max - self.min;
        if span <= 0.0 {
            return if d != 0.0 { 255 } else { 0 };
        }
        (255.0 * (d - self.min) / span).clamp(0.0, 255.0) as u8
    }
}

fn sanitize(d: f32) -> f32 {
    if d.is_finite() {
        d
    } else {
        0.0
    }
}

/// Render a depth grid as a gray frame over `range`.
pub fn depth_preview_frame(grid: ArrayView2<'_, f32>, range: &DepthRange) -> RgbImage {
    gray_frame(grid, |&d| range.normalize(d))
}

/// Render a confidence grid as a gray frame, `255 * c / 3` per cell.
pub fn confidence_preview_frame(grid: ArrayView2<'_, u8>) -> RgbImage {
    gray_frame(grid, |&c| (255 * c as u32 / 3).min(255) as u8)
}

fn gray_frame<T>(grid: ArrayView2<'_, T>, level: impl Fn(&T) -> u8) -> RgbImage {
    let (height, width) = grid.dim();
    RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let v = level(&grid[[y as usize, x as usize]]);
        Rgb([v, v, v])
    })
}
