//! Color video decoding through an `ffmpeg` pipe

use std::io::BufReader;
use std::path::Path;
use std::process::{Child, ChildStdout, Stdio};
use std::thread::JoinHandle;

use image::RgbImage;

use super::ffmpeg::{collect_stderr, join_stderr, FfmpegTool};
use super::{frame_from_raw, FrameSize, FrameSource, VideoError};
use crate::recording::read_up_to;

/// Decodes a video file to packed RGB frames.
///
/// Frames are scaled to the requested size by FFmpeg, so every frame has
/// exactly `size.byte_len()` bytes. Display rotation in the container is
/// ignored: frames keep the coded orientation, which is the sensor
/// orientation the depth grids share.
pub struct FfmpegDecoder {
    child: Child,
    stdout: Option<BufReader<ChildStdout>>,
    stderr: Option<JoinHandle<String>>,
    size: FrameSize,
    frames_read: u64,
}

impl FfmpegDecoder {
    pub fn open(tool: &FfmpegTool, input: &Path, size: FrameSize) -> Result<Self, VideoError> {
        let mut cmd = tool.ffmpeg_command();
        cmd.args(["-noautorotate", "-i"])
            .arg(input)
            .args(["-an", "-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &size.to_string()])
            .arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| VideoError::Spawn {
            program: tool.ffmpeg_path().display().to_string(),
            source,
        })?;
        let stdout = child.stdout.take().map(BufReader::new);
        let stderr = collect_stderr(&mut child);

        tracing::info!("Decoding {} at {}", input.display(), size);
        Ok(Self {
            child,
            stdout,
            stderr,
            size,
            frames_read: 0,
        })
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Wait for FFmpeg after its output ended and report a failed exit.
    fn close(&mut self) -> Result<(), VideoError> {
        self.stdout = None;
        let status = self.child.wait()?;
        let stderr = join_stderr(self.stderr.take());
        if !status.success() {
            return Err(VideoError::ProcessFailed { status, stderr });
        }
        Ok(())
    }
}

impl FrameSource for FfmpegDecoder {
    fn frame_size(&self) -> FrameSize {
        self.size
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, VideoError> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let mut data = vec![0u8; self.size.byte_len()];
        let got = read_up_to(stdout, &mut data)?;
        if got == data.len() {
            self.frames_read += 1;
            return frame_from_raw(data, self.size).map(Some);
        }

        if got > 0 {
            tracing::warn!(
                "Color stream ended inside frame {} ({} of {} bytes), dropping it",
                self.frames_read,
                got,
                data.len()
            );
        }
        self.close()?;
        tracing::debug!("Color stream ended after {} frames", self.frames_read);
        Ok(None)
    }
}

impl Drop for FfmpegDecoder {
    fn drop(&mut self) {
        if self.stdout.take().is_some() {
            // Stopped before end of stream; FFmpeg may be blocked on the pipe
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
        let _ = join_stderr(self.stderr.take());
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::video::testing::{fake_ffmpeg, logged_args};
    use std::time::{Duration, Instant};

    const SIZE: FrameSize = FrameSize {
        width: 2,
        height: 2,
    };

    #[test]
    fn test_decodes_in_coded_orientation() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_ffmpeg(dir.path(), "head -c 24 /dev/zero");
        let mut decoder = FfmpegDecoder::open(&tool, Path::new("camera.mp4"), SIZE).unwrap();

        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(frame.dimensions(), (2, 2));
        assert!(decoder.next_frame().unwrap().is_some());
        assert!(decoder.next_frame().unwrap().is_none());
        assert_eq!(decoder.frames_read(), 2);

        let args = logged_args(dir.path());
        let rotate = args.iter().position(|a| a == "-noautorotate").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(rotate < input, "-noautorotate must precede the input: {:?}", args);
        assert_eq!(args[input + 1], "camera.mp4");
        let scale = args.iter().position(|a| a == "-s").unwrap();
        assert_eq!(args[scale + 1], "2x2");
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }

    #[test]
    fn test_partial_trailing_frame_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_ffmpeg(dir.path(), "head -c 30 /dev/zero");
        let mut decoder = FfmpegDecoder::open(&tool, Path::new("camera.mp4"), SIZE).unwrap();

        assert!(decoder.next_frame().unwrap().is_some());
        assert!(decoder.next_frame().unwrap().is_some());
        assert!(decoder.next_frame().unwrap().is_none());
        assert!(decoder.next_frame().unwrap().is_none());
        assert_eq!(decoder.frames_read(), 2);
    }

    #[test]
    fn test_failed_exit_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_ffmpeg(
            dir.path(),
            "head -c 12 /dev/zero; echo 'Invalid data found' >&2; exit 3",
        );
        let mut decoder = FfmpegDecoder::open(&tool, Path::new("camera.mp4"), SIZE).unwrap();

        assert!(decoder.next_frame().unwrap().is_some());
        let err = decoder.next_frame().unwrap_err();
        match err {
            VideoError::ProcessFailed { status, stderr } => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "Invalid data found");
            }
            other => panic!("expected ProcessFailed, got {:?}", other),
        }
        // The process is gone; later reads see the end of the stream
        assert!(decoder.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_drop_mid_stream_stops_ffmpeg() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_ffmpeg(dir.path(), "head -c 12 /dev/zero; exec sleep 30");
        let mut decoder = FfmpegDecoder::open(&tool, Path::new("camera.mp4"), SIZE).unwrap();
        assert!(decoder.next_frame().unwrap().is_some());

        let started = Instant::now();
        drop(decoder);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_missing_binary_fails_to_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FfmpegTool::with_paths(dir.path().join("no-ffmpeg"), None);
        let err = FfmpegDecoder::open(&tool, Path::new("camera.mp4"), SIZE).err().unwrap();
        assert!(matches!(err, VideoError::Spawn { .. }));
    }
}
