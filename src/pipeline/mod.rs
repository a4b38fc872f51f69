//! Frame synchronization and output
//!
//! [`SyncDriver`] walks the metadata stream one logical frame at a time,
//! advances each sub-stream only when the record flags it present, and writes
//! a composited frame when all three streams delivered. The preview renderer
//! turns the raw depth and confidence streams into grayscale videos.

pub mod driver;
pub mod preview;
pub mod report;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::recording::{MetadataError, SubstreamError};
use crate::settings::SettingsError;
use crate::video::VideoError;

pub use driver::SyncDriver;
pub use preview::{render_previews, scan_depth_range, PreviewSummary};
pub use report::{FrameOutcome, RunSummary, SkipReason};

/// Fatal errors that end a run.
#[derive(Error, Debug)]
pub enum ComposeError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// A sub-stream failure that cannot be skipped
    #[error(transparent)]
    Substream(#[from] SubstreamError),

    #[error(transparent)]
    Video(#[from] VideoError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("failed to open {what} {}: {source}", path.display())]
    Open {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ComposeError {
    pub(crate) fn open(what: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        ComposeError::Open {
            what,
            path: path.into(),
            source,
        }
    }
}
