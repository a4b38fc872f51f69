//! Depth grid processing
//!
//! Confidence masking, false-color rendering of depth, and the grayscale
//! renderings used for preview videos.

pub mod colorize;
pub mod confidence;
pub mod preview;

pub use colorize::{hue_to_rgb, Colorizer, DEFAULT_BAND_THRESHOLD, DEFAULT_SCALE};
pub use confidence::{ConfidenceFilter, ConfidenceLevel};
pub use preview::{confidence_preview_frame, depth_preview_frame, DepthRange};
