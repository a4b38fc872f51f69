//! Grayscale preview videos of the raw depth and confidence streams
//!
//! Depth needs two passes: the first finds the global range over every
//! frame, the second renders each frame normalized to it. The sub-streams are
//! forward-only, so each pass opens the stream again.

use std::path::Path;

use ndarray::Array2;

use super::ComposeError;
use crate::depth::{confidence_preview_frame, depth_preview_frame, DepthRange};
use crate::recording::{
    open_substream, CompressedFrameDecoder, GridElement, GridShape, StreamKind, SubstreamError,
};
use crate::settings::PreviewConfig;
use crate::video::{open_sink, EncoderSettings, FfmpegTool, FrameSink, FrameSize, OutputKind};

/// Frames written by a preview run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreviewSummary {
    pub depth_frames: u64,
    pub confidence_frames: u64,
    pub skipped: u64,
}

/// Decode every grid of a stream, skipping recoverable failures.
///
/// Returns the number of skipped blocks.
fn for_each_grid<T, F>(stream: StreamKind, path: &Path, shape: GridShape, mut f: F) -> Result<u64, ComposeError>
where
    T: GridElement,
    F: FnMut(Array2<T>) -> Result<(), ComposeError>,
{
    let source = open_substream(stream, path)
        .map_err(|e| ComposeError::open("sub-stream", path, e))?;
    let mut decoder = CompressedFrameDecoder::<T>::new(source, shape);
    let mut skipped = 0;
    let mut index = 0u64;
    loop {
        match decoder.read_next() {
            Ok(grid) => f(grid)?,
            Err(SubstreamError::Exhausted { .. }) => break,
            Err(e) if e.is_recoverable() => {
                tracing::warn!("skip {} frame {}: {}", stream, index, e);
                skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
        index += 1;
    }
    Ok(skipped)
}

/// First pass: global depth range over the whole stream.
pub fn scan_depth_range(path: &Path, shape: GridShape) -> Result<DepthRange, ComposeError> {
    let mut range = DepthRange::default();
    for_each_grid(StreamKind::Depth, path, shape, |grid: Array2<f32>| {
        range.include(grid.view());
        Ok(())
    })?;
    Ok(range)
}

fn grid_frame_size(shape: GridShape) -> FrameSize {
    FrameSize::new(shape.width as u32, shape.height as u32)
}

fn write_depth_preview(
    config: &PreviewConfig,
    range: &DepthRange,
    mut sink: Box<dyn FrameSink>,
) -> Result<(u64, u64), ComposeError> {
    let skipped = for_each_grid(StreamKind::Depth, &config.layout.depth, config.shapes.depth, |grid: Array2<f32>| {
        sink.write_frame(&depth_preview_frame(grid.view(), range))?;
        Ok(())
    })?;
    Ok((sink.finish()?, skipped))
}

fn write_confidence_preview(
    config: &PreviewConfig,
    mut sink: Box<dyn FrameSink>,
) -> Result<(u64, u64), ComposeError> {
    let skipped = for_each_grid(
        StreamKind::Confidence,
        &config.layout.confidence,
        config.shapes.confidence,
        |grid: Array2<u8>| {
            sink.write_frame(&confidence_preview_frame(grid.view()))?;
            Ok(())
        },
    )?;
    Ok((sink.finish()?, skipped))
}

fn preview_sink(
    path: &Path,
    shape: GridShape,
    fps: u32,
    encoder: &EncoderSettings,
    tool: Option<&FfmpegTool>,
) -> Result<Box<dyn FrameSink>, ComposeError> {
    Ok(open_sink(path, grid_frame_size(shape), fps, encoder, tool)?)
}

/// Write the depth and confidence preview videos.
pub fn render_previews(config: &PreviewConfig) -> Result<PreviewSummary, ComposeError> {
    config.validate()?;

    let needs_ffmpeg = [&config.depth_output, &config.confidence_output]
        .iter()
        .any(|p| OutputKind::for_path(p) == OutputKind::Video);
    let tool = if needs_ffmpeg {
        Some(FfmpegTool::locate()?)
    } else {
        None
    };

    let range = scan_depth_range(&config.layout.depth, config.shapes.depth)?;
    if range.is_empty() {
        tracing::warn!("Depth stream has no non-zero values; depth preview will be black");
    } else {
        tracing::info!("Depth range {:.3}..{:.3}", range.min, range.max);
    }

    let depth_sink = preview_sink(
        &config.depth_output,
        config.shapes.depth,
        config.fps,
        &config.encoder,
        tool.as_ref(),
    )?;
    let (depth_frames, depth_skipped) = write_depth_preview(config, &range, depth_sink)?;

    let confidence_sink = preview_sink(
        &config.confidence_output,
        config.shapes.confidence,
        config.fps,
        &config.encoder,
        tool.as_ref(),
    )?;
    let (confidence_frames, confidence_skipped) = write_confidence_preview(config, confidence_sink)?;

    let summary = PreviewSummary {
        depth_frames,
        confidence_frames,
        skipped: depth_skipped + confidence_skipped,
    };
    tracing::info!(
        "Wrote {} depth and {} confidence preview frames ({} skipped)",
        summary.depth_frames,
        summary.confidence_frames,
        summary.skipped
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::BlockWriter;
    use crate::settings::SessionLayout;
    use std::fs;

    const SHAPE: GridShape = GridShape {
        width: 3,
        height: 2,
    };

    fn write_depth(path: &Path, grids: &[Array2<f32>]) {
        let mut writer = BlockWriter::new(Vec::new());
        for grid in grids {
            writer.write_grid(grid).unwrap();
        }
        fs::write(path, writer.finish().unwrap()).unwrap();
    }

    fn write_confidence(path: &Path, grids: &[Array2<u8>]) {
        let mut writer = BlockWriter::new(Vec::new());
        for grid in grids {
            writer.write_grid(grid).unwrap();
        }
        fs::write(path, writer.finish().unwrap()).unwrap();
    }

    fn config(dir: &Path) -> PreviewConfig {
        PreviewConfig {
            layout: SessionLayout::in_dir(dir),
            depth_output: dir.join("depth_frames"),
            confidence_output: dir.join("confidence_frames"),
            shapes: crate::settings::GridShapes {
                depth: SHAPE,
                confidence: SHAPE,
            },
            fps: 60,
            encoder: EncoderSettings::default(),
        }
    }

    fn gray_levels(path: &Path) -> Vec<u8> {
        image::open(path)
            .unwrap()
            .to_rgb8()
            .pixels()
            .map(|p| p.0[0])
            .collect()
    }

    #[test]
    fn test_scan_range_spans_all_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("depth");
        write_depth(
            &path,
            &[
                ndarray::array![[0.0, 2.0, 3.0], [f32::NAN, 2.5, 2.0]],
                ndarray::array![[1.0, 0.0, 0.0], [0.0, 0.0, 4.0]],
            ],
        );
        let range = scan_depth_range(&path, SHAPE).unwrap();
        assert_eq!(range, DepthRange { min: 1.0, max: 4.0 });
    }

    #[test]
    fn test_render_previews_to_png() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        write_depth(
            &config.layout.depth,
            &[
                ndarray::array![[1.0, 2.0, 4.0], [0.0, 0.0, 0.0]],
                Array2::from_elem((2, 3), 4.0),
            ],
        );
        write_confidence(
            &config.layout.confidence,
            &[ndarray::array![[0, 1, 2], [3, 2, 1]]],
        );

        let summary = render_previews(&config).unwrap();
        assert_eq!(
            summary,
            PreviewSummary {
                depth_frames: 2,
                confidence_frames: 1,
                skipped: 0
            }
        );

        assert_eq!(
            gray_levels(&config.depth_output.join("frame_000000.png")),
            vec![0, 85, 255, 0, 0, 0]
        );
        assert_eq!(
            gray_levels(&config.confidence_output.join("frame_000000.png")),
            vec![0, 85, 170, 255, 170, 85]
        );
    }

    #[test]
    fn test_frame_directory_gaps_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        fs::create_dir(&config.layout.depth).unwrap();
        let mut writer = BlockWriter::new(Vec::new());
        writer.write_grid(&Array2::from_elem((2, 3), 1.0f32)).unwrap();
        let block = writer.finish().unwrap();
        // Strip the length prefix: frame files hold the bare payload
        fs::write(config.layout.depth.join("0"), &block[8..]).unwrap();
        fs::write(config.layout.depth.join("2"), &block[8..]).unwrap();
        write_confidence(&config.layout.confidence, &[]);

        let summary = render_previews(&config).unwrap();
        assert_eq!(summary.depth_frames, 2);
        assert_eq!(summary.confidence_frames, 0);
        assert_eq!(summary.skipped, 1);
    }
}
