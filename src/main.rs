//! Depth Overlay - command line entry point

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use depth_overlay::depth::ConfidenceLevel;
use depth_overlay::recording::{GridShape, MetadataReader};
use depth_overlay::settings::{ComposeConfig, GridShapes, PreviewConfig};
use depth_overlay::telemetry::{init_logging, LogConfig};
use depth_overlay::video::FrameSize;
use depth_overlay::{render_previews, SyncDriver};

#[derive(Parser, Debug)]
#[command(name = "depth-overlay", version, about = "Overlay false-colored depth on recorded color video")]
struct Cli {
    /// Log filter when DEPTH_OVERLAY_LOG and RUST_LOG are unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// JSON log output
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Composite depth over color into one output video
    Compose(ComposeArgs),
    /// Print every metadata record
    Inspect(InspectArgs),
    /// Write grayscale depth and confidence preview videos
    Preview(PreviewArgs),
}

/// Grid shape overrides shared by compose and preview
#[derive(Args, Debug)]
struct GridArgs {
    /// Depth grid size, WIDTHxHEIGHT
    #[arg(long)]
    depth_size: Option<FrameSize>,

    /// Confidence grid size, WIDTHxHEIGHT
    #[arg(long)]
    confidence_size: Option<FrameSize>,
}

impl GridArgs {
    fn apply(&self, shapes: &mut GridShapes) {
        if let Some(size) = self.depth_size {
            shapes.depth = grid_shape(size);
        }
        if let Some(size) = self.confidence_size {
            shapes.confidence = grid_shape(size);
        }
    }
}

/// Encoder overrides shared by compose and preview
#[derive(Args, Debug)]
struct OutputArgs {
    /// Output frame rate
    #[arg(long)]
    fps: Option<u32>,

    /// FFmpeg video encoder
    #[arg(long)]
    codec: Option<String>,

    /// Fixed quantizer passed as -q:v
    #[arg(long)]
    quality: Option<u32>,
}

#[derive(Args, Debug)]
struct ComposeArgs {
    /// Session directory holding cameraFrameInfo, camera.mp4, depth, confidence
    session: PathBuf,

    /// Output video, or a directory of PNG frames when it has no extension
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Metadata stream (default: <SESSION>/cameraFrameInfo)
    #[arg(long)]
    metadata: Option<PathBuf>,

    /// Color video (default: <SESSION>/camera.mp4)
    #[arg(long)]
    color: Option<PathBuf>,

    /// Depth stream file or frame directory (default: <SESSION>/depth)
    #[arg(long)]
    depth: Option<PathBuf>,

    /// Confidence stream file or frame directory (default: <SESSION>/confidence)
    #[arg(long)]
    confidence: Option<PathBuf>,

    #[command(flatten)]
    grids: GridArgs,

    /// Color frame size, WIDTHxHEIGHT (default: info.json, then ffprobe)
    #[arg(long)]
    color_size: Option<FrameSize>,

    /// Depth multiplier applied before the logarithm
    #[arg(long)]
    scale: Option<f64>,

    /// Keep depth only at this confidence level
    #[arg(long, value_parser = parse_confidence)]
    keep_confidence: Option<ConfidenceLevel>,

    #[command(flatten)]
    encoding: OutputArgs,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Metadata stream (cameraFrameInfo)
    metadata: PathBuf,

    /// Stop after this many records
    #[arg(long)]
    limit: Option<u64>,
}

#[derive(Args, Debug)]
struct PreviewArgs {
    /// Session directory holding depth and confidence
    session: PathBuf,

    /// Depth preview output (default: <SESSION>/depth.mp4)
    #[arg(long)]
    depth_out: Option<PathBuf>,

    /// Confidence preview output (default: <SESSION>/confidence.mp4)
    #[arg(long)]
    confidence_out: Option<PathBuf>,

    #[command(flatten)]
    grids: GridArgs,

    #[command(flatten)]
    encoding: OutputArgs,
}

fn grid_shape(size: FrameSize) -> GridShape {
    GridShape::new(size.width as usize, size.height as usize)
}

fn parse_confidence(s: &str) -> Result<ConfidenceLevel, String> {
    match s.to_ascii_lowercase().as_str() {
        "low" | "0" => Ok(ConfidenceLevel::Low),
        "medium" | "1" => Ok(ConfidenceLevel::Medium),
        "high" | "2" => Ok(ConfidenceLevel::High),
        _ => Err(format!("unknown confidence level {:?} (low, medium, high)", s)),
    }
}

fn compose(args: ComposeArgs) -> Result<()> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.session.join("output.mp4"));
    let mut config = ComposeConfig::for_session(&args.session, output)
        .with_context(|| format!("failed to read session {}", args.session.display()))?;

    if let Some(path) = args.metadata {
        config.layout.metadata = path;
    }
    if let Some(path) = args.color {
        config.layout.color = path;
    }
    if let Some(path) = args.depth {
        config.layout.depth = path;
    }
    if let Some(path) = args.confidence {
        config.layout.confidence = path;
    }
    args.grids.apply(&mut config.shapes);
    if let Some(size) = args.color_size {
        config.color_size = Some(size);
    }
    if let Some(scale) = args.scale {
        config.scale = scale;
    }
    if let Some(level) = args.keep_confidence {
        config.keep_confidence = level;
    }
    if let Some(fps) = args.encoding.fps {
        config.fps = fps;
    }
    if let Some(codec) = args.encoding.codec {
        config.encoder.codec = codec;
    }
    if let Some(quality) = args.encoding.quality {
        config.encoder.quality = Some(quality);
    }

    let summary = SyncDriver::open(&config)?.run()?;
    println!(
        "{}: {} frames written, {} skipped of {} logical frames",
        config.output.display(),
        summary.frames_written,
        summary.frames_skipped(),
        summary.logical_frames
    );
    Ok(())
}

fn inspect(args: InspectArgs) -> Result<()> {
    let reader = MetadataReader::open(&args.metadata)
        .with_context(|| format!("failed to open {}", args.metadata.display()))?;
    let limit = args.limit.unwrap_or(u64::MAX);

    let mut count = 0u64;
    for record in reader.take(limit.try_into().unwrap_or(usize::MAX)) {
        let record = record.with_context(|| format!("failed to read {}", args.metadata.display()))?;
        print!("{}", record);
        count += 1;
    }
    println!("{} records", count);
    Ok(())
}

fn preview(args: PreviewArgs) -> Result<()> {
    let mut config = PreviewConfig::for_session(&args.session)
        .with_context(|| format!("failed to read session {}", args.session.display()))?;

    if let Some(path) = args.depth_out {
        config.depth_output = path;
    }
    if let Some(path) = args.confidence_out {
        config.confidence_output = path;
    }
    args.grids.apply(&mut config.shapes);
    if let Some(fps) = args.encoding.fps {
        config.fps = fps;
    }
    if let Some(codec) = args.encoding.codec {
        config.encoder.codec = codec;
    }
    if let Some(quality) = args.encoding.quality {
        config.encoder.quality = Some(quality);
    }

    let summary = render_previews(&config)?;
    println!(
        "{}: {} frames, {}: {} frames",
        config.depth_output.display(),
        summary.depth_frames,
        config.confidence_output.display(),
        summary.confidence_frames
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_config = LogConfig {
        file_path: cli.log_file.clone(),
        json_format: cli.json_logs,
        default_level: cli.log_level.clone(),
        ..LogConfig::default()
    };
    let _log_guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Compose(args) => compose(args),
        Command::Inspect(args) => inspect(args),
        Command::Preview(args) => preview(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
