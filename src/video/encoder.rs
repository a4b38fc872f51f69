//! Output video encoding through an `ffmpeg` pipe

use std::io::{BufWriter, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Stdio};
use std::thread::JoinHandle;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use super::ffmpeg::{collect_stderr, join_stderr, FfmpegTool};
use super::frame::check_size;
use super::{FrameSink, FrameSize, VideoError};

/// Codec options for the output container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderSettings {
    /// FFmpeg encoder name
    pub codec: String,
    /// Fixed quantizer (`-q:v`); `None` leaves the encoder default
    pub quality: Option<u32>,
    /// Output pixel format
    pub pixel_format: String,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            codec: "mpeg4".to_string(),
            quality: Some(2),
            pixel_format: "yuv420p".to_string(),
        }
    }
}

impl EncoderSettings {
    fn output_args(&self) -> Vec<String> {
        let mut args = vec!["-c:v".to_string(), self.codec.clone()];
        if let Some(q) = self.quality {
            args.push("-q:v".to_string());
            args.push(q.to_string());
        }
        args.push("-pix_fmt".to_string());
        args.push(self.pixel_format.clone());
        args
    }
}

/// Encodes packed RGB frames to a video file at a fixed rate.
///
/// Dropping the encoder without [`FrameSink::finish`] still closes its input,
/// so FFmpeg finalizes the container with the frames written so far.
pub struct FfmpegEncoder {
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    stderr: Option<JoinHandle<String>>,
    size: FrameSize,
    frames_written: u64,
}

impl FfmpegEncoder {
    pub fn create(
        tool: &FfmpegTool,
        output: &Path,
        size: FrameSize,
        fps: u32,
        settings: &EncoderSettings,
    ) -> Result<Self, VideoError> {
        let mut cmd = tool.ffmpeg_command();
        cmd.args(["-y", "-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &size.to_string()])
            .args(["-r", &fps.to_string()])
            .args(["-i", "pipe:0", "-an"])
            .args(settings.output_args())
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| VideoError::Spawn {
            program: tool.ffmpeg_path().display().to_string(),
            source,
        })?;
        let stdin = child.stdin.take().map(BufWriter::new);
        let stderr = collect_stderr(&mut child);

        tracing::info!(
            "Encoding {} at {} {}fps ({})",
            output.display(),
            size,
            fps,
            settings.codec
        );
        Ok(Self {
            child,
            stdin,
            stderr,
            size,
            frames_written: 0,
        })
    }
}

impl FrameSink for FfmpegEncoder {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), VideoError> {
        check_size(frame, self.size)?;
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| VideoError::Io(std::io::ErrorKind::BrokenPipe.into()))?;
        stdin.write_all(frame.as_raw())?;
        self.frames_written += 1;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn finish(mut self: Box<Self>) -> Result<u64, VideoError> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.flush()?;
        }
        let status = self.child.wait()?;
        let stderr = join_stderr(self.stderr.take());
        if !status.success() {
            return Err(VideoError::ProcessFailed { status, stderr });
        }
        tracing::debug!("Encoder finished after {} frames", self.frames_written);
        Ok(self.frames_written)
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.flush();
        }
        let _ = self.child.wait();
        let _ = join_stderr(self.stderr.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const SIZE: FrameSize = FrameSize {
        width: 2,
        height: 2,
    };

    #[test]
    fn test_default_settings() {
        let settings = EncoderSettings::default();
        assert_eq!(settings.codec, "mpeg4");
        assert_eq!(settings.quality, Some(2));
        assert_eq!(
            settings.output_args(),
            vec!["-c:v", "mpeg4", "-q:v", "2", "-pix_fmt", "yuv420p"]
        );
    }

    #[test]
    fn test_settings_without_quality() {
        let settings = EncoderSettings {
            codec: "libx264".to_string(),
            quality: None,
            ..EncoderSettings::default()
        };
        assert_eq!(settings.output_args(), vec!["-c:v", "libx264", "-pix_fmt", "yuv420p"]);
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use crate::video::testing::{fake_ffmpeg, logged_args};
        use std::fs;

        #[test]
        fn test_frames_reach_ffmpeg_stdin() {
            let dir = tempfile::tempdir().unwrap();
            let capture = dir.path().join("stdin.raw");
            let tool = fake_ffmpeg(dir.path(), &format!("cat > '{}'", capture.display()));
            let output = dir.path().join("out.mp4");

            let mut encoder =
                FfmpegEncoder::create(&tool, &output, SIZE, 30, &EncoderSettings::default()).unwrap();
            encoder.write_frame(&RgbImage::from_pixel(2, 2, Rgb([1, 2, 3]))).unwrap();
            encoder.write_frame(&RgbImage::from_pixel(2, 2, Rgb([4, 5, 6]))).unwrap();
            assert!(encoder.write_frame(&RgbImage::new(3, 2)).is_err());
            assert_eq!(encoder.frames_written(), 2);

            let sink: Box<dyn FrameSink> = Box::new(encoder);
            assert_eq!(sink.finish().unwrap(), 2);

            let raw = fs::read(&capture).unwrap();
            assert_eq!(raw.len(), 2 * SIZE.byte_len());
            assert_eq!(&raw[..3], &[1, 2, 3]);
            assert_eq!(&raw[12..15], &[4, 5, 6]);

            let args = logged_args(dir.path());
            let rate = args.iter().position(|a| a == "-r").unwrap();
            assert_eq!(args[rate + 1], "30");
            let scale = args.iter().position(|a| a == "-s").unwrap();
            assert_eq!(args[scale + 1], "2x2");
            assert_eq!(args.last().map(String::as_str), output.to_str());
        }

        #[test]
        fn test_finish_reports_failed_exit() {
            let dir = tempfile::tempdir().unwrap();
            let tool = fake_ffmpeg(
                dir.path(),
                "cat > /dev/null; echo 'Unknown encoder' >&2; exit 1",
            );
            let mut encoder = FfmpegEncoder::create(
                &tool,
                &dir.path().join("out.mp4"),
                SIZE,
                60,
                &EncoderSettings::default(),
            )
            .unwrap();
            encoder.write_frame(&RgbImage::new(2, 2)).unwrap();

            match Box::new(encoder).finish() {
                Err(VideoError::ProcessFailed { status, stderr }) => {
                    assert_eq!(status.code(), Some(1));
                    assert_eq!(stderr, "Unknown encoder");
                }
                other => panic!("expected ProcessFailed, got {:?}", other),
            }
        }

        #[test]
        fn test_drop_closes_input_and_waits() {
            let dir = tempfile::tempdir().unwrap();
            let marker = dir.path().join("closed");
            let tool = fake_ffmpeg(
                dir.path(),
                &format!("cat > /dev/null; echo done > '{}'", marker.display()),
            );
            let mut encoder = FfmpegEncoder::create(
                &tool,
                &dir.path().join("out.mp4"),
                SIZE,
                60,
                &EncoderSettings::default(),
            )
            .unwrap();
            encoder.write_frame(&RgbImage::new(2, 2)).unwrap();
            drop(encoder);

            // FFmpeg saw end of input and exited before drop returned
            assert_eq!(fs::read_to_string(&marker).unwrap(), "done\n");
        }
    }
}
