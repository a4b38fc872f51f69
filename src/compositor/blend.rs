//! Weighted blending of two RGB frames
//!
//! `output = base * base_weight + overlay * overlay_weight + gamma`, rounded
//! half to even and saturated per channel.

use image::RgbImage;
use ndarray::{ArrayView1, ArrayViewMut1, Zip};
use serde::{Deserialize, Serialize};

/// Per-layer weights of a blend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendWeights {
    /// Weight of the color frame
    pub base: f32,
    /// Weight of the false-colored depth
    pub overlay: f32,
    /// Constant added to every channel
    pub gamma: f32,
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self {
            base: 0.5,
            overlay: 0.5,
            gamma: 0.0,
        }
    }
}

impl BlendWeights {
    pub fn new(base: f32, overlay: f32) -> Self {
        Self {
            base,
            overlay,
            gamma: 0.0,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.base.is_finite() && self.overlay.is_finite() && self.gamma.is_finite()
    }

    /// Blend one channel value. Exact halves round to the even neighbour.
    pub fn apply(&self, base: u8, overlay: u8) -> u8 {
        (base as f32 * self.base + overlay as f32 * self.overlay + self.gamma)
            .round_ties_even()
            .clamp(0.0, 255.0) as u8
    }

    /// Blend two frames of the same size.
    ///
    /// # Panics
    ///
    /// Panics if the frames differ in size.
    pub fn blend(&self, base: &RgbImage, overlay: &RgbImage) -> RgbImage {
        assert_eq!(
            base.dimensions(),
            overlay.dimensions(),
            "blended frames differ in size"
        );
        let (width, height) = base.dimensions();
        let mut out = RgbImage::new(width, height);

        let out_samples: &mut [u8] = &mut out;
        let base_samples: &[u8] = base;
        let overlay_samples: &[u8] = overlay;
        Zip::from(ArrayViewMut1::from(out_samples))
            .and(ArrayView1::from(base_samples))
            .and(ArrayView1::from(overlay_samples))
            .par_for_each(|o, &b, &v| *o = self.apply(b, v));
        out
    }
}
