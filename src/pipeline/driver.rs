//! Synchronization driver
//!
//! One metadata record is one logical frame. For each record the driver pulls
//! exactly one unit from every stream the record flags as present, and nothing
//! from the others, so the four cursors stay aligned however the recorder
//! dropped data. A frame is written only when all three streams are flagged
//! and all three pulls succeeded. Everything else is a skip, except errors
//! that make the rest of the run meaningless (truncated metadata, failed reads,
//! video process failures), which end the run.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::time::Instant;

use image::RgbImage;

use super::report::{FrameOutcome, RunSummary, SkipReason};
use super::ComposeError;
use crate::compositor::FrameCompositor;
use crate::depth::{Colorizer, ConfidenceFilter};
use crate::recording::{
    open_substream, CompressedFrameDecoder, FrameMetadata, MetadataError, MetadataReader,
    StreamKind, SubstreamError,
};
use crate::settings::{ComposeConfig, SettingsError};
use crate::video::{open_sink, FfmpegDecoder, FfmpegTool, FrameSink, FrameSource};

/// Result of pulling one flagged stream
type Pulled<T> = Option<Result<T, SubstreamError>>;

/// Owns every input and the output sink for the length of a run.
pub struct SyncDriver<R> {
    metadata: MetadataReader<R>,
    color: Box<dyn FrameSource>,
    depth: CompressedFrameDecoder<f32>,
    confidence: CompressedFrameDecoder<u8>,
    sink: Box<dyn FrameSink>,
    colorizer: Colorizer,
    filter: ConfidenceFilter,
    compositor: FrameCompositor,
    summary: RunSummary,
}

impl SyncDriver<BufReader<File>> {
    /// Open every input named by `config`, then the output.
    ///
    /// The color frame size comes from the config, or from probing the color
    /// video when the config leaves it open.
    pub fn open(config: &ComposeConfig) -> Result<Self, ComposeError> {
        config.validate()?;
        let layout = &config.layout;

        let metadata = MetadataReader::open(&layout.metadata).map_err(|e| match e {
            MetadataError::Io(source) => ComposeError::open("metadata", &layout.metadata, source),
            other => other.into(),
        })?;
        let depth = open_substream(StreamKind::Depth, &layout.depth)
            .map_err(|e| ComposeError::open("depth stream", &layout.depth, e))?;
        let confidence = open_substream(StreamKind::Confidence, &layout.confidence)
            .map_err(|e| ComposeError::open("confidence stream", &layout.confidence, e))?;

        if !layout.color.is_file() {
            return Err(ComposeError::open(
                "color video",
                &layout.color,
                io::ErrorKind::NotFound.into(),
            ));
        }
        let tool = FfmpegTool::locate()?;
        let color_size = match config.color_size {
            Some(size) => size,
            None => {
                let info = tool.probe(&layout.color)?;
                tracing::info!(
                    "Probed {}: {} {} at {:.2}fps",
                    layout.color.display(),
                    info.codec,
                    info.size,
                    info.frame_rate
                );
                if info.rotation != 0 {
                    tracing::info!(
                        "Ignoring {}° display rotation; frames stay in sensor orientation",
                        info.rotation
                    );
                }
                info.size
            }
        };
        let color = FfmpegDecoder::open(&tool, &layout.color, color_size)?;

        let sink = open_sink(&config.output, color_size, config.fps, &config.encoder, Some(&tool))?;

        let driver = Self::new(
            metadata,
            Box::new(color),
            CompressedFrameDecoder::new(depth, config.shapes.depth),
            CompressedFrameDecoder::new(confidence, config.shapes.confidence),
            sink,
        )?
        .with_colorizer(Colorizer::new(config.scale))
        .with_filter(ConfidenceFilter::new(config.keep_confidence))
        .with_compositor(FrameCompositor::new(config.blend));

        tracing::info!(
            "Composing {} logical frames: depth {}, color {}, scale {}",
            driver
                .metadata
                .expected_records()
                .map(|n| n.to_string())
                .unwrap_or_else(|| "?".to_string()),
            config.shapes.depth,
            color_size,
            config.scale
        );
        Ok(driver)
    }
}

impl<R: BufRead> SyncDriver<R> {
    /// Assemble a driver from opened parts, with default processing.
    ///
    /// Depth and confidence grids must share a shape.
    pub fn new(
        metadata: MetadataReader<R>,
        color: Box<dyn FrameSource>,
        depth: CompressedFrameDecoder<f32>,
        confidence: CompressedFrameDecoder<u8>,
        sink: Box<dyn FrameSink>,
    ) -> Result<Self, ComposeError> {
        if depth.shape() != confidence.shape() {
            return Err(SettingsError::Invalid(format!(
                "depth grid {} and confidence grid {} must match",
                depth.shape(),
                confidence.shape()
            ))
            .into());
        }
        Ok(Self {
            metadata,
            color,
            depth,
            confidence,
            sink,
            colorizer: Colorizer::default(),
            filter: ConfidenceFilter::default(),
            compositor: FrameCompositor::default(),
            summary: RunSummary::default(),
        })
    }

    pub fn with_colorizer(mut self, colorizer: Colorizer) -> Self {
        self.colorizer = colorizer;
        self
    }

    pub fn with_filter(mut self, filter: ConfidenceFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_compositor(mut self, compositor: FrameCompositor) -> Self {
        self.compositor = compositor;
        self
    }

    /// Counts so far
    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Process the next logical frame. `None` at the end of the metadata.
    pub fn step(&mut self) -> Result<Option<FrameOutcome>, ComposeError> {
        let position = self.metadata.records_read();
        let Some(record) = self.metadata.read_next()? else {
            return Ok(None);
        };

        match self.metadata.expected_records() {
            Some(total) => tracing::info!("frame {} / {}", position, total.saturating_sub(1)),
            None => tracing::info!("frame {}", position),
        }
        if record.frame_index != position {
            tracing::warn!(
                "Record {} carries frame index {}",
                position,
                record.frame_index
            );
            self.summary.index_mismatches += 1;
        }

        let outcome = self.process(&record)?;
        if let FrameOutcome::Skipped(reason) = &outcome {
            tracing::warn!(frame = position, reason = reason.label(), "skip frame {}: {}", position, reason);
        }
        self.summary.record(&outcome);
        Ok(Some(outcome))
    }

    /// Process every logical frame, then finish the output.
    ///
    /// On a fatal error the sink is dropped unfinished; FFmpeg output still
    /// closes with the frames written so far.
    pub fn run(mut self) -> Result<RunSummary, ComposeError> {
        let started = Instant::now();
        while self.step()?.is_some() {}

        let written = self.sink.finish()?;
        let mut summary = self.summary;
        debug_assert_eq!(written, summary.frames_written);
        summary.elapsed = started.elapsed();
        summary.log();
        Ok(summary)
    }

    fn process(&mut self, record: &FrameMetadata) -> Result<FrameOutcome, ComposeError> {
        let presence = record.presence;

        // Pull every flagged stream, even after another one failed, so each
        // cursor moves exactly once per flagged record.
        let color = if presence.contains(StreamKind::Color) {
            Some(self.pull_color()?)
        } else {
            None
        };
        let depth = presence
            .contains(StreamKind::Depth)
            .then(|| self.depth.read_next());
        let confidence = presence
            .contains(StreamKind::Confidence)
            .then(|| self.confidence.read_next());

        let color = escalate(color)?;
        let depth = escalate(depth)?;
        let confidence = escalate(confidence)?;

        let (Some(color), Some(depth), Some(confidence)) = (color, depth, confidence) else {
            return Ok(FrameOutcome::Skipped(SkipReason::MissingStreams(presence)));
        };
        let (color, mut depth, confidence) = match (color, depth, confidence) {
            (Ok(color), Ok(depth), Ok(confidence)) => (color, depth, confidence),
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
                return Ok(FrameOutcome::Skipped(SkipReason::Substream(e)));
            }
        };

        self.filter.apply(depth.view_mut(), confidence.view());
        let depth_color = self.colorizer.colorize_grid(depth.view());
        let frame = self.compositor.composite(&color, &depth_color);
        self.sink.write_frame(&frame)?;
        Ok(FrameOutcome::Written)
    }

    /// Next color frame; end of video is a recoverable exhaustion.
    fn pull_color(&mut self) -> Result<Result<RgbImage, SubstreamError>, ComposeError> {
        Ok(self.color.next_frame()?.ok_or(SubstreamError::Exhausted {
            stream: StreamKind::Color,
        }))
    }
}

/// Turn non-recoverable sub-stream errors into fatal ones.
fn escalate<T>(pulled: Pulled<T>) -> Result<Pulled<T>, ComposeError> {
    match pulled {
        Some(Err(e)) if !e.is_recoverable() => Err(e.into()),
        other => Ok(other),
    }
}
