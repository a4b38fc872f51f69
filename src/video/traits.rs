//! Frame source and sink seams

use image::RgbImage;

use super::{FrameSize, VideoError};

/// Sequential source of decoded color frames.
pub trait FrameSource: Send {
    /// Size of every frame this source yields
    fn frame_size(&self) -> FrameSize;

    /// Next frame in presentation order, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>, VideoError>;
}

/// Sequential sink for output frames.
pub trait FrameSink: Send {
    /// Append one frame. Frames must match the size the sink was opened with.
    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), VideoError>;

    /// Frames accepted so far
    fn frames_written(&self) -> u64;

    /// Flush and close the output, returning the number of frames written.
    fn finish(self: Box<Self>) -> Result<u64, VideoError>;
}
