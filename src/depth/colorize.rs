//! False-color depth rendering
//!
//! Depth is mapped through a logarithmic hue ramp so each e-fold of distance
//! cycles once through the hue wheel. Within each cycle, the lower part of every
//! tenth of a cycle is painted black, which draws contour lines over the image.

use image::{Rgb, RgbImage};
use ndarray::{Array2, ArrayView2, Zip};

/// Default multiplier applied to depth before taking the logarithm
pub const DEFAULT_SCALE: f64 = 2.0;

/// Fraction of each contour band painted black
pub const DEFAULT_BAND_THRESHOLD: f64 = 0.6;

const BLACK: [u8; 3] = [0, 0, 0];

/// Maps scalar depth to RGB.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Colorizer {
    /// Multiplier applied before the logarithm
    pub scale: f64,
    /// Band fractions below this are black
    pub band_threshold: f64,
}

impl Default for Colorizer {
    fn default() -> Self {
        Self {
            scale: DEFAULT_SCALE,
            band_threshold: DEFAULT_BAND_THRESHOLD,
        }
    }
}

impl Colorizer {
    pub fn new(scale: f64) -> Self {
        Self {
            scale,
            ..Self::default()
        }
    }

    /// Color of a single depth value.
    ///
    /// Zero, negative and non-finite values are black; the logarithm is never
    /// evaluated for them.
    pub fn colorize(&self, value: f32) -> [u8; 3] {
        let value = value as f64;
        if !value.is_finite() || value <= 0.0 {
            return BLACK;
        }

        let n = (value * self.scale).ln();
        if !n.is_finite() {
            return BLACK;
        }
        if frac(n * 10.0) < self.band_threshold {
            return BLACK;
        }

        let [r, g, b] = hue_to_rgb(frac(n) * 6.0);
        [to_channel(r), to_channel(g), to_channel(b)]
    }

    /// Render a whole grid, one output pixel per cell.
    pub fn colorize_grid(&self, grid: ArrayView2<'_, f32>) -> RgbImage {
        let (height, width) = grid.dim();
        let mut pixels = Array2::from_elem((height, width), BLACK);
        Zip::from(&mut pixels)
            .and(&grid)
            .par_for_each(|pixel, &depth| *pixel = self.colorize(depth));

        RgbImage::from_fn(width as u32, height as u32, |x, y| {
            Rgb(pixels[[y as usize, x as usize]])
        })
    }
}

/// Fully saturated hue ramp.
///
/// `h` is a position in `[0, 6)`; each unit segment raises or lowers one
/// channel linearly. Values outside the range are clamped to the ends.
pub fn hue_to_rgb(h: f64) -> [f64; 3] {
    let h = h.clamp(0.0, 6.0);
    match h {
        h if h < 1.0 => [1.0, h, 0.0],
        h if h < 2.0 => [2.0 - h, 1.0, 0.0],
        h if h < 3.0 => [0.0, 1.0, h - 2.0],
        h if h < 4.0 => [0.0, 4.0 - h, 1.0],
        h if h < 5.0 => [h - 4.0, 0.0, 1.0],
        h => [1.0, 0.0, 6.0 - h],
    }
}

/// Fractional part towards negative infinity, so `frac(-0.25) == 0.75`.
fn frac(x: f64) -> f64 {
    x - x.floor()
}

fn to_channel(c: f64) -> u8 {
    (c * 255.0).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn close(a: [u8; 3], b: [u8; 3]) -> bool {
        a.iter().zip(b.iter()).all(|(&x, &y)| (x as i16 - y as i16).abs() <= 1)
    }

    #[test]
    fn test_non_positive_is_black() {
        let colorizer = Colorizer::default();
        for value in [0.0f32, -0.0, -1.0, -1e-6, f32::NEG_INFINITY, f32::NAN, f32::INFINITY] {
            assert_eq!(colorizer.colorize(value), BLACK, "value {}", value);
        }
    }

    #[test]
    fn test_known_color() {
        // ln(2) = 0.693: band 0.93 is colored, hue 4.159 is in the blue-magenta segment
        let colorizer = Colorizer::default();
        assert_eq!(colorizer.colorize(1.0), [41, 0, 255]);
    }

    #[test]
    fn test_contour_band_is_black() {
        // ln(2 * 0.5) = 0, band fraction 0.0
        let colorizer = Colorizer::default();
        assert_eq!(colorizer.colorize(0.5), BLACK);
    }

    #[test]
    fn test_periodic_in_log_space() {
        let colorizer = Colorizer::default();
        let e = std::f32::consts::E;
        for value in [1.0f32, 0.3, 2.2, 5.0] {
            let base = colorizer.colorize(value);
            assert!(close(base, colorizer.colorize(value * e)), "value {}", value);
            assert!(close(base, colorizer.colorize(value * e * e)), "value {}", value);
        }
    }

    #[test]
    fn test_scale_shifts_ramp() {
        let colorizer = Colorizer::new(1.0);
        assert_eq!(colorizer.colorize(2.0), Colorizer::default().colorize(1.0));
    }

    #[test]
    fn test_hue_segments() {
        assert_eq!(hue_to_rgb(0.0), [1.0, 0.0, 0.0]);
        assert_eq!(hue_to_rgb(0.5), [1.0, 0.5, 0.0]);
        assert_eq!(hue_to_rgb(1.5), [0.5, 1.0, 0.0]);
        assert_eq!(hue_to_rgb(2.5), [0.0, 1.0, 0.5]);
        assert_eq!(hue_to_rgb(3.5), [0.0, 0.5, 1.0]);
        assert_eq!(hue_to_rgb(4.5), [0.5, 0.0, 1.0]);
        assert_eq!(hue_to_rgb(5.5), [1.0, 0.0, 0.5]);
        assert_eq!(hue_to_rgb(6.0), [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_hue_ramp_is_continuous() {
        for boundary in 1..6 {
            let b = boundary as f64;
            let below = hue_to_rgb(b - 1e-9);
            let at = hue_to_rgb(b);
            for c in 0..3 {
                assert!((below[c] - at[c]).abs() < 1e-6, "boundary {}", boundary);
            }
        }
    }

    #[test]
    fn test_colorize_grid_matches_scalar() {
        let colorizer = Colorizer::default();
        let grid = array![[0.0f32, 1.0, 0.5], [2.2, -1.0, 5.0]];
        let image = colorizer.colorize_grid(grid.view());

        assert_eq!(image.dimensions(), (3, 2));
        for ((y, x), &depth) in grid.indexed_iter() {
            assert_eq!(image.get_pixel(x as u32, y as u32).0, colorizer.colorize(depth));
        }
    }

    #[test]
    fn test_zero_grid_is_black_image() {
        let grid = Array2::<f32>::zeros((4, 6));
        let image = Colorizer::default().colorize_grid(grid.view());
        assert!(image.pixels().all(|p| p.0 == BLACK));
    }
}
