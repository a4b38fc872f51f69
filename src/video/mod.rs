//! Color video input and composited output
//!
//! The compositor only sees two seams: a [`FrameSource`] yielding color frames
//! in order and a [`FrameSink`] accepting output frames in order. Files are
//! handled by external FFmpeg processes over raw pipes; PNG sequences and
//! in-memory buffers cover tests and machines without FFmpeg.

pub mod decoder;
pub mod encoder;
pub mod ffmpeg;
pub mod frame;
pub mod memory;
pub mod sequence;
#[cfg(all(test, unix))]
pub(crate) mod testing;
pub mod traits;

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use thiserror::Error;

pub use decoder::FfmpegDecoder;
pub use encoder::{EncoderSettings, FfmpegEncoder};
pub use ffmpeg::{FfmpegTool, VideoInfo};
pub use frame::{frame_from_raw, FrameSize};
pub use memory::{MemorySink, MemorySource};
pub use sequence::ImageSequenceSink;
pub use traits::{FrameSink, FrameSource};

/// Errors from video decoding, encoding and frame output.
#[derive(Error, Debug)]
pub enum VideoError {
    #[error("FFmpeg binary not found. Install FFmpeg or place it in assets/ffmpeg/")]
    NotFound,

    #[error("ffprobe binary not found; pass the color frame size explicitly")]
    ProbeNotFound,

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to probe {}: {message}", path.display())]
    Probe { path: PathBuf, message: String },

    #[error("frame is {actual}, expected {expected}")]
    FrameSize {
        expected: FrameSize,
        actual: FrameSize,
    },

    #[error("raw frame has {actual} bytes, expected {expected}")]
    FrameLength { expected: usize, actual: usize },

    #[error("FFmpeg exited with {status}: {stderr}")]
    ProcessFailed { status: ExitStatus, stderr: String },

    #[error("video I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("failed to write image: {0}")]
    Image(#[from] image::ImageError),
}

/// Where output frames go, decided by the output path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Encoded video container (path has an extension)
    Video,
    /// Directory of numbered PNG files (path has no extension)
    ImageSequence,
}

impl OutputKind {
    pub fn for_path(path: &Path) -> Self {
        if path.extension().is_some() {
            OutputKind::Video
        } else {
            OutputKind::ImageSequence
        }
    }
}

/// Open the output sink for `path`.
///
/// `tool` is only needed for video output; pass `None` to force a failure
/// instead of searching for FFmpeg.
pub fn open_sink(
    path: &Path,
    size: FrameSize,
    fps: u32,
    settings: &EncoderSettings,
    tool: Option<&FfmpegTool>,
) -> Result<Box<dyn FrameSink>, VideoError> {
    match OutputKind::for_path(path) {
        OutputKind::ImageSequence => Ok(Box::new(ImageSequenceSink::create(path, size)?)),
        OutputKind::Video => {
            let tool = tool.ok_or(VideoError::NotFound)?;
            Ok(Box::new(FfmpegEncoder::create(tool, path, size, fps, settings)?))
        }
    }
}
