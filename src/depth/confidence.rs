//! Confidence masking of depth grids

use std::fmt;

use ndarray::{ArrayView2, ArrayViewMut2, Zip};
use serde::{Deserialize, Serialize};

/// Per-cell confidence category written by the recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ConfidenceLevel {
    Low = 0,
    Medium = 1,
    #[default]
    High = 2,
}

impl ConfidenceLevel {
    /// Interpret a raw confidence byte. Unknown values return `None`.
    pub fn from_raw(value: u8) -> Option<Self> {
        match value {
            0 => Some(ConfidenceLevel::Low),
            1 => Some(ConfidenceLevel::Medium),
            2 => Some(ConfidenceLevel::High),
            _ => None,
        }
    }

    pub fn raw(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
        };
        f.write_str(name)
    }
}

/// Zeroes depth wherever confidence is not exactly the kept level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfidenceFilter {
    pub keep: ConfidenceLevel,
}

impl ConfidenceFilter {
    pub fn new(keep: ConfidenceLevel) -> Self {
        Self { keep }
    }

    /// Mask `depth` in place.
    ///
    /// # Panics
    ///
    /// Panics if the two grids differ in shape.
    pub fn apply(&self, mut depth: ArrayViewMut2<'_, f32>, confidence: ArrayView2<'_, u8>) {
        assert_eq!(
            depth.dim(),
            confidence.dim(),
            "depth and confidence grids differ in shape"
        );
        let keep = self.keep.raw();
        Zip::from(&mut depth)
            .and(&confidence)
            .par_for_each(|d, &c| {
                if c != keep {
                    *d = 0.0;
                }
            });
    }
}
