//! Numbered PNG output
//!
//! Used instead of a video container when the output path has no extension,
//! or when FFmpeg is not available.

use std::fs;
use std::path::PathBuf;

use image::RgbImage;

use super::frame::check_size;
use super::{FrameSink, FrameSize, VideoError};

/// Writes `frame_000000.png`, `frame_000001.png`, ... into a directory.
pub struct ImageSequenceSink {
    dir: PathBuf,
    size: FrameSize,
    frames_written: u64,
}

impl ImageSequenceSink {
    /// Create the directory if needed.
    pub fn create<P: Into<PathBuf>>(dir: P, size: FrameSize) -> Result<Self, VideoError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        tracing::info!("Writing PNG frames to {}", dir.display());
        Ok(Self {
            dir,
            size,
            frames_written: 0,
        })
    }

    /// Path of the frame with the given output number
    pub fn frame_path(&self, number: u64) -> PathBuf {
        self.dir.join(format!("frame_{:06}.png", number))
    }
}

impl FrameSink for ImageSequenceSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), VideoError> {
        check_size(frame, self.size)?;
        frame.save(self.frame_path(self.frames_written))?;
        self.frames_written += 1;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn finish(self: Box<Self>) -> Result<u64, VideoError> {
        Ok(self.frames_written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_writes_numbered_frames() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("frames");
        let size = FrameSize::new(4, 3);
        let mut sink = ImageSequenceSink::create(&out, size).unwrap();

        let first = RgbImage::from_pixel(4, 3, Rgb([10, 20, 30]));
        let second = RgbImage::from_pixel(4, 3, Rgb([40, 50, 60]));
        sink.write_frame(&first).unwrap();
        sink.write_frame(&second).unwrap();
        assert_eq!(Box::new(sink).finish().unwrap(), 2);

        let loaded = image::open(out.join("frame_000001.png")).unwrap().to_rgb8();
        assert_eq!(loaded, second);
        assert!(out.join("frame_000000.png").exists());
        assert!(!out.join("frame_000002.png").exists());
    }

    #[test]
    fn test_rejects_wrong_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ImageSequenceSink::create(dir.path(), FrameSize::new(4, 3)).unwrap();
        let err = sink.write_frame(&RgbImage::new(3, 4)).unwrap_err();
        assert!(matches!(err, VideoError::FrameSize { .. }));
        assert_eq!(sink.frames_written(), 0);
    }
}
