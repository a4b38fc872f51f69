//! Frame compositor
//!
//! Scales the false-colored depth image up to the color frame's resolution
//! and blends the two into one output frame.

pub mod blend;

use std::borrow::Cow;

use image::imageops::{self, FilterType};
use image::RgbImage;

pub use blend::BlendWeights;

/// Combines a color frame with its false-colored depth.
#[derive(Debug, Clone, Copy)]
pub struct FrameCompositor {
    pub weights: BlendWeights,
    /// Filter used to scale the depth image
    pub filter: FilterType,
}

impl Default for FrameCompositor {
    fn default() -> Self {
        Self {
            weights: BlendWeights::default(),
            filter: FilterType::Triangle,
        }
    }
}

impl FrameCompositor {
    pub fn new(weights: BlendWeights) -> Self {
        Self {
            weights,
            ..Self::default()
        }
    }

    /// Produce one output frame at the color frame's resolution.
    pub fn composite(&self, color: &RgbImage, depth_color: &RgbImage) -> RgbImage {
        let (width, height) = color.dimensions();
        let overlay = if depth_color.dimensions() == (width, height) {
            Cow::Borrowed(depth_color)
        } else {
            Cow::Owned(imageops::resize(depth_color, width, height, self.filter))
        };
        self.weights.blend(color, &overlay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) * 3 % 256) as u8])
        })
    }

    #[test]
    fn test_composite_with_itself_is_identity() {
        let image = gradient(16, 9);
        let out = FrameCompositor::default().composite(&image, &image);
        assert_eq!(out, image);
    }

    #[test]
    fn test_black_overlay_halves_color() {
        let color = RgbImage::from_fn(8, 6, |x, y| Rgb([(x * 20 + 1) as u8, (y * 40 + 3) as u8, 254]));
        let black = RgbImage::new(4, 3);
        let out = FrameCompositor::default().composite(&color, &black);

        assert_eq!(out.dimensions(), (8, 6));
        for (x, y, pixel) in out.enumerate_pixels() {
            let c = color.get_pixel(x, y).0;
            // Odd channels land on a half and round to the even neighbour
            let half = |v: u8| {
                let h = v / 2;
                if v % 2 == 1 && h % 2 == 1 {
                    h + 1
                } else {
                    h
                }
            };
            assert_eq!(pixel.0, [half(c[0]), half(c[1]), half(c[2])]);
        }
    }

    #[test]
    fn test_uniform_overlay_is_resized() {
        let color = RgbImage::from_pixel(10, 8, Rgb([0, 0, 0]));
        let overlay = RgbImage::from_pixel(5, 4, Rgb([200, 100, 50]));
        let out = FrameCompositor::default().composite(&color, &overlay);

        assert_eq!(out.dimensions(), (10, 8));
        assert!(out.pixels().all(|p| p.0 == [100, 50, 25]));
    }
}
