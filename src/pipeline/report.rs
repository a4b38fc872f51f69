//! Per-frame outcomes and the run summary

use std::fmt;
use std::time::Duration;

use crate::recording::{StreamKind, StreamPresence, SubstreamError};

/// Why a logical frame produced no output.
#[derive(Debug)]
pub enum SkipReason {
    /// The record does not flag every stream as present
    MissingStreams(StreamPresence),
    /// A flagged stream could not deliver its unit
    Substream(SubstreamError),
}

impl SkipReason {
    /// Short reason label used for counting.
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::MissingStreams(_) => "missing streams",
            SkipReason::Substream(SubstreamError::Exhausted { .. }) => "stream exhausted",
            SkipReason::Substream(SubstreamError::MissingFrame { .. }) => "missing frame file",
            SkipReason::Substream(SubstreamError::Truncated { .. }) => "truncated block",
            SkipReason::Substream(SubstreamError::Decompression { .. }) => "decompression failed",
            SkipReason::Substream(SubstreamError::ShapeMismatch { .. }) => "shape mismatch",
            SkipReason::Substream(SubstreamError::Io { .. }) => "read error",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingStreams(presence) => {
                let missing: Vec<&str> = presence.missing().into_iter().map(StreamKind::name).collect();
                write!(f, "no {} data", missing.join(", "))
            }
            SkipReason::Substream(err) => write!(f, "{}", err),
        }
    }
}

/// What happened to one logical frame.
#[derive(Debug)]
pub enum FrameOutcome {
    Written,
    Skipped(SkipReason),
}

impl FrameOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, FrameOutcome::Written)
    }
}

/// Counts for a finished run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Metadata records read
    pub logical_frames: u64,
    /// Frames handed to the output sink
    pub frames_written: u64,
    /// Frames skipped because a flag was clear
    pub skipped_missing: u64,
    /// Frames skipped because a flagged stream failed
    pub skipped_failed: u64,
    /// Records whose stored index disagreed with their position
    pub index_mismatches: u64,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn frames_skipped(&self) -> u64 {
        self.skipped_missing + self.skipped_failed
    }

    pub(crate) fn record(&mut self, outcome: &FrameOutcome) {
        self.logical_frames += 1;
        match outcome {
            FrameOutcome::Written => self.frames_written += 1,
            FrameOutcome::Skipped(SkipReason::MissingStreams(_)) => self.skipped_missing += 1,
            FrameOutcome::Skipped(SkipReason::Substream(_)) => self.skipped_failed += 1,
        }
    }

    /// Log the summary at info level.
    pub fn log(&self) {
        tracing::info!(
            logical_frames = self.logical_frames,
            written = self.frames_written,
            skipped_missing = self.skipped_missing,
            skipped_failed = self.skipped_failed,
            elapsed_ms = self.elapsed.as_millis() as u64,
            "Wrote {} of {} frames ({} skipped) in {:.1}s",
            self.frames_written,
            self.logical_frames,
            self.frames_skipped(),
            self.elapsed.as_secs_f64()
        );
    }
}
