//! Depth Overlay Library
//!
//! Reconstructs a single annotated video from a multi-stream sensor
//! recording: color video, compressed per-frame depth and confidence grids,
//! and a per-frame metadata stream saying which of them exist. Depth is masked
//! by confidence, false-colored, and blended over the color frame.

pub mod compositor;
pub mod depth;
pub mod pipeline;
pub mod recording;
pub mod settings;
pub mod telemetry;
pub mod video;

pub use compositor::{BlendWeights, FrameCompositor};
pub use depth::{Colorizer, ConfidenceFilter, ConfidenceLevel};
pub use pipeline::{render_previews, ComposeError, FrameOutcome, RunSummary, SkipReason, SyncDriver};
pub use recording::{
    CompressedFrameDecoder, FrameMetadata, GridShape, MetadataReader, StreamKind, StreamPresence,
    SubstreamError,
};
pub use settings::{ComposeConfig, PreviewConfig, RecordingInfo, SessionLayout};
pub use video::{FrameSink, FrameSize, FrameSource, VideoError};
