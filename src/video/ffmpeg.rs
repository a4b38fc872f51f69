//! FFmpeg binary discovery and probing
//!
//! Video is decoded and encoded by external `ffmpeg` processes talking raw
//! `rgb24` over pipes. This module finds the binaries and reads stream
//! information with `ffprobe`.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::thread::JoinHandle;

use serde::Deserialize;

use super::{FrameSize, VideoError};

/// Upper bound on collected stderr; FFmpeg can be chatty on damaged input
const STDERR_LIMIT: usize = 16 * 1024;

/// Color stream information reported by ffprobe.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    /// Coded size, before any display rotation
    pub size: FrameSize,
    /// Display rotation in degrees from the container, 0 when absent
    pub rotation: i32,
    pub frame_rate: f64,
    pub duration_seconds: Option<f64>,
    pub codec: String,
}

/// Located `ffmpeg` and `ffprobe` binaries.
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    ffmpeg_path: PathBuf,
    ffprobe_path: Option<PathBuf>,
}

impl FfmpegTool {
    /// Search for FFmpeg: bundled location, then `PATH`, then common
    /// install locations.
    pub fn locate() -> Result<Self, VideoError> {
        let ffmpeg_path = find_binary("ffmpeg").ok_or(VideoError::NotFound)?;
        let ffprobe_path = find_binary("ffprobe");
        tracing::debug!(
            "Using ffmpeg at {} (ffprobe: {})",
            ffmpeg_path.display(),
            ffprobe_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "not found".to_string())
        );
        Ok(Self {
            ffmpeg_path,
            ffprobe_path,
        })
    }

    /// Use explicit binary paths.
    pub fn with_paths(ffmpeg_path: PathBuf, ffprobe_path: Option<PathBuf>) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
        }
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg_path
    }

    /// A new `ffmpeg` command with banner and interactive input disabled.
    pub(crate) fn ffmpeg_command(&self) -> Command {
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(["-hide_banner", "-nostdin", "-loglevel", "error"]);
        cmd
    }

    /// Read the first video stream's size and rate.
    pub fn probe(&self, input: &Path) -> Result<VideoInfo, VideoError> {
        let ffprobe = self.ffprobe_path.as_ref().ok_or(VideoError::ProbeNotFound)?;

        let output = Command::new(ffprobe)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_streams",
                "-select_streams",
                "v:0",
            ])
            .arg(input)
            .output()
            .map_err(|source| VideoError::Spawn {
                program: ffprobe.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(VideoError::Probe {
                path: input.to_path_buf(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_probe_output(&output.stdout).map_err(|message| VideoError::Probe {
            path: input.to_path_buf(),
            message,
        })
    }
}

fn find_binary(name: &str) -> Option<PathBuf> {
    let exe = if cfg!(target_os = "windows") {
        format!("{}.exe", name)
    } else {
        name.to_string()
    };

    let bundled = PathBuf::from("assets/ffmpeg").join(&exe);
    if bundled.exists() {
        return Some(bundled);
    }

    if let Ok(path) = which::which(name) {
        return Some(path);
    }

    let common_dirs: &[&str] = if cfg!(target_os = "macos") {
        &["/usr/local/bin", "/opt/homebrew/bin", "/opt/local/bin"]
    } else if cfg!(target_os = "windows") {
        &["C:\\ffmpeg\\bin", "C:\\Program Files\\ffmpeg\\bin"]
    } else {
        &["/usr/bin", "/usr/local/bin"]
    };

    common_dirs
        .iter()
        .map(|dir| Path::new(dir).join(&exe))
        .find(|path| path.exists())
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    codec_name: Option<String>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
    #[serde(default)]
    tags: ProbeTags,
}

#[derive(Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

/// Older FFmpeg builds report rotation as a stream tag
#[derive(Deserialize, Default)]
struct ProbeTags {
    rotate: Option<String>,
}

impl ProbeStream {
    fn rotation(&self) -> i32 {
        self.side_data_list
            .iter()
            .find_map(|d| d.rotation)
            .or_else(|| self.tags.rotate.as_deref().and_then(|r| r.trim().parse().ok()))
            .map(|deg: f64| deg.round() as i32)
            .unwrap_or(0)
    }
}

fn parse_probe_output(json: &[u8]) -> Result<VideoInfo, String> {
    let probe: ProbeOutput = serde_json::from_slice(json).map_err(|e| e.to_string())?;
    let stream = probe
        .streams
        .into_iter()
        .find(|s| s.width.is_some() && s.height.is_some())
        .ok_or_else(|| "no video stream".to_string())?;

    let size = FrameSize::new(stream.width.unwrap_or(0), stream.height.unwrap_or(0));
    let rotation = stream.rotation();
    let frame_rate = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate))
        .unwrap_or(30.0);

    Ok(VideoInfo {
        size,
        rotation,
        frame_rate,
        duration_seconds: stream.duration.and_then(|d| d.parse().ok()),
        codec: stream.codec_name.unwrap_or_else(|| "unknown".to_string()),
    })
}

/// Parse an FFmpeg rational like `30000/1001`.
fn parse_rate(rate: &str) -> Option<f64> {
    let (num, den) = rate.split_once('/')?;
    let num: f64 = num.parse().ok()?;
    let den: f64 = den.parse().ok()?;
    if den > 0.0 && num > 0.0 {
        Some(num / den)
    } else {
        None
    }
}

/// Drain a child's stderr on a thread so a full pipe never blocks it.
pub(crate) fn collect_stderr(child: &mut Child) -> Option<JoinHandle<String>> {
    let stderr = child.stderr.take()?;
    Some(std::thread::spawn(move || {
        let mut text = String::new();
        let mut limited = stderr.take(STDERR_LIMIT as u64);
        let _ = limited.read_to_string(&mut text);
        // Keep draining past the limit
        let _ = std::io::copy(&mut limited.into_inner(), &mut std::io::sink());
        text
    }))
}

/// Collected stderr text, or an empty string.
pub(crate) fn join_stderr(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}
