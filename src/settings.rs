//! Run configuration
//!
//! Settings are layered: built-in defaults, then the session's `info.json`,
//! then whatever the command line overrides. Every parameter ends up in an
//! explicit [`ComposeConfig`] or [`PreviewConfig`]; nothing is read from
//! ambient state once a run starts.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compositor::BlendWeights;
use crate::depth::{ConfidenceLevel, DEFAULT_SCALE};
use crate::recording::GridShape;
use crate::video::{EncoderSettings, FrameSize};

/// Metadata record stream
pub const METADATA_FILE: &str = "cameraFrameInfo";
/// Color video
pub const COLOR_FILE: &str = "camera.mp4";
/// Depth sub-stream (block file or frame directory)
pub const DEPTH_FILE: &str = "depth";
/// Confidence sub-stream (block file or frame directory)
pub const CONFIDENCE_FILE: &str = "confidence";
/// Stream dimensions written by the recorder
pub const INFO_FILE: &str = "info.json";

/// Grid shape used when nothing else says otherwise
pub const DEFAULT_GRID_SHAPE: GridShape = GridShape {
    width: 256,
    height: 192,
};

/// Output frame rate of the composited video
pub const DEFAULT_FPS: u32 = 60;

/// Settings-related errors
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Width and height of one stream as written in `info.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDimensions {
    pub width: u32,
    pub height: u32,
}

impl StreamDimensions {
    pub fn grid_shape(&self) -> GridShape {
        GridShape::new(self.width as usize, self.height as usize)
    }

    pub fn frame_size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }
}

/// Contents of a session's `info.json`. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingInfo {
    #[serde(rename = "camera.mp4", default, skip_serializing_if = "Option::is_none")]
    pub color: Option<StreamDimensions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<StreamDimensions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<StreamDimensions>,
}

impl RecordingInfo {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` if it exists, otherwise an empty info.
    pub fn load_optional(path: &Path) -> Result<Self, SettingsError> {
        if path.is_file() {
            let info = Self::load(path)?;
            tracing::debug!("Loaded stream dimensions from {}", path.display());
            Ok(info)
        } else {
            tracing::debug!("No {} found, using defaults", path.display());
            Ok(Self::default())
        }
    }
}

/// Locations of the five files that make up a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLayout {
    pub metadata: PathBuf,
    pub color: PathBuf,
    pub depth: PathBuf,
    pub confidence: PathBuf,
    pub info: PathBuf,
}

impl SessionLayout {
    /// Default file names inside a session directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            metadata: dir.join(METADATA_FILE),
            color: dir.join(COLOR_FILE),
            depth: dir.join(DEPTH_FILE),
            confidence: dir.join(CONFIDENCE_FILE),
            info: dir.join(INFO_FILE),
        }
    }
}

/// Grid shapes of the two compressed sub-streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridShapes {
    pub depth: GridShape,
    pub confidence: GridShape,
}

impl Default for GridShapes {
    fn default() -> Self {
        Self {
            depth: DEFAULT_GRID_SHAPE,
            confidence: DEFAULT_GRID_SHAPE,
        }
    }
}

impl GridShapes {
    /// Defaults overridden by whatever `info` provides.
    pub fn from_info(info: &RecordingInfo) -> Self {
        let defaults = Self::default();
        Self {
            depth: info.depth.map(|d| d.grid_shape()).unwrap_or(defaults.depth),
            confidence: info
                .confidence
                .map(|d| d.grid_shape())
                .unwrap_or(defaults.confidence),
        }
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.depth.is_empty() || self.confidence.is_empty() {
            return Err(SettingsError::Invalid(format!(
                "grid shapes must be non-empty (depth {}, confidence {})",
                self.depth, self.confidence
            )));
        }
        Ok(())
    }
}

fn validate_fps(fps: u32) -> Result<(), SettingsError> {
    if fps == 0 {
        return Err(SettingsError::Invalid("output rate must be at least 1 fps".to_string()));
    }
    Ok(())
}

/// Everything a compose run needs.
#[derive(Debug, Clone)]
pub struct ComposeConfig {
    pub layout: SessionLayout,
    pub output: PathBuf,
    pub shapes: GridShapes,
    /// Color frame size; probed from the video when `None`
    pub color_size: Option<FrameSize>,
    /// Colorizer scale applied before the logarithm
    pub scale: f64,
    pub fps: u32,
    pub encoder: EncoderSettings,
    /// Depth is kept only where confidence equals this level
    pub keep_confidence: ConfidenceLevel,
    pub blend: BlendWeights,
}

impl ComposeConfig {
    /// Defaults for a session directory, layered with its `info.json`.
    pub fn for_session(dir: &Path, output: PathBuf) -> Result<Self, SettingsError> {
        let layout = SessionLayout::in_dir(dir);
        let info = RecordingInfo::load_optional(&layout.info)?;
        let mut config = Self::new(layout, output);
        config.apply_info(&info);
        Ok(config)
    }

    /// Built-in defaults for explicit paths.
    pub fn new(layout: SessionLayout, output: PathBuf) -> Self {
        Self {
            layout,
            output,
            shapes: GridShapes::default(),
            color_size: None,
            scale: DEFAULT_SCALE,
            fps: DEFAULT_FPS,
            encoder: EncoderSettings::default(),
            keep_confidence: ConfidenceLevel::High,
            blend: BlendWeights::default(),
        }
    }

    pub fn apply_info(&mut self, info: &RecordingInfo) {
        self.shapes = GridShapes::from_info(info);
        if let Some(color) = info.color {
            self.color_size = Some(color.frame_size());
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        self.shapes.validate()?;
        if self.shapes.depth != self.shapes.confidence {
            return Err(SettingsError::Invalid(format!(
                "depth grid {} and confidence grid {} must match",
                self.shapes.depth, self.shapes.confidence
            )));
        }
        if let Some(size) = self.color_size {
            if size.is_empty() {
                return Err(SettingsError::Invalid(format!("color frame size {} is empty", size)));
            }
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(SettingsError::Invalid(format!(
                "colorizer scale must be positive, got {}",
                self.scale
            )));
        }
        validate_fps(self.fps)?;
        if !self.blend.is_finite() {
            return Err(SettingsError::Invalid("blend weights must be finite".to_string()));
        }
        Ok(())
    }
}

/// Everything a preview run needs.
#[derive(Debug, Clone)]
pub struct PreviewConfig {
    pub layout: SessionLayout,
    pub depth_output: PathBuf,
    pub confidence_output: PathBuf,
    pub shapes: GridShapes,
    pub fps: u32,
    pub encoder: EncoderSettings,
}

impl PreviewConfig {
    /// Defaults for a session directory, writing `depth.mp4` and
    /// `confidence.mp4` next to the streams.
    pub fn for_session(dir: &Path) -> Result<Self, SettingsError> {
        let layout = SessionLayout::in_dir(dir);
        let info = RecordingInfo::load_optional(&layout.info)?;
        Ok(Self {
            layout,
            depth_output: dir.join("depth.mp4"),
            confidence_output: dir.join("confidence.mp4"),
            shapes: GridShapes::from_info(&info),
            fps: DEFAULT_FPS,
            encoder: EncoderSettings::default(),
        })
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        self.shapes.validate()?;
        validate_fps(self.fps)
    }
}
