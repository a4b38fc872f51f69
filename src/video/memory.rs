//! In-memory frame source and sink

use std::collections::VecDeque;
use std::sync::Arc;

use image::RgbImage;
use parking_lot::Mutex;

use super::frame::check_size;
use super::{FrameSink, FrameSize, FrameSource, VideoError};

/// Yields a fixed list of frames.
pub struct MemorySource {
    frames: VecDeque<RgbImage>,
    size: FrameSize,
}

impl MemorySource {
    /// All frames must share `size`.
    pub fn new(size: FrameSize, frames: Vec<RgbImage>) -> Result<Self, VideoError> {
        for frame in &frames {
            check_size(frame, size)?;
        }
        Ok(Self {
            frames: frames.into(),
            size,
        })
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for MemorySource {
    fn frame_size(&self) -> FrameSize {
        self.size
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, VideoError> {
        Ok(self.frames.pop_front())
    }
}

/// Collects written frames into a shared buffer.
///
/// Clone the [`MemorySink::frames`] handle before giving the sink away to
/// read the output afterwards.
pub struct MemorySink {
    frames: Arc<Mutex<Vec<RgbImage>>>,
    size: Option<FrameSize>,
}

impl MemorySink {
    /// Accept frames of any size.
    pub fn new() -> Self {
        Self {
            frames: Arc::default(),
            size: None,
        }
    }

    /// Accept only frames of `size`.
    pub fn with_size(size: FrameSize) -> Self {
        Self {
            frames: Arc::default(),
            size: Some(size),
        }
    }

    pub fn frames(&self) -> Arc<Mutex<Vec<RgbImage>>> {
        Arc::clone(&self.frames)
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSink for MemorySink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), VideoError> {
        if let Some(size) = self.size {
            check_size(frame, size)?;
        }
        self.frames.lock().push(frame.clone());
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames.lock().len() as u64
    }

    fn finish(self: Box<Self>) -> Result<u64, VideoError> {
        Ok(self.frames_written())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_source_yields_in_order() {
        let frames = vec![
            RgbImage::from_pixel(2, 2, Rgb([1, 1, 1])),
            RgbImage::from_pixel(2, 2, Rgb([2, 2, 2])),
        ];
        let mut source = MemorySource::new(FrameSize::new(2, 2), frames).unwrap();
        assert_eq!(source.remaining(), 2);
        assert_eq!(source.next_frame().unwrap().unwrap().get_pixel(0, 0).0, [1, 1, 1]);
        assert_eq!(source.remaining(), 1);
        assert_eq!(source.next_frame().unwrap().unwrap().get_pixel(0, 0).0, [2, 2, 2]);
        assert!(source.next_frame().unwrap().is_none());
        assert_eq!(source.remaining(), 0);
    }

    #[test]
    fn test_source_rejects_mixed_sizes() {
        let frames = vec![RgbImage::new(2, 2), RgbImage::new(3, 2)];
        assert!(MemorySource::new(FrameSize::new(2, 2), frames).is_err());
    }

    #[test]
    fn test_sink_shares_frames() {
        let mut sink = MemorySink::with_size(FrameSize::new(1, 1));
        let frames = sink.frames();
        sink.write_frame(&RgbImage::new(1, 1)).unwrap();
        assert!(sink.write_frame(&RgbImage::new(2, 1)).is_err());

        let boxed: Box<dyn FrameSink> = Box::new(sink);
        assert_eq!(boxed.finish().unwrap(), 1);
        assert_eq!(frames.lock().len(), 1);
    }
}
