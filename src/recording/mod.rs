//! Recording session readers
//!
//! A session is made of one metadata stream plus three sub-streams:
//!
//! ```text
//! cameraFrameInfo   fixed 183-byte records, one per logical frame
//! camera.mp4        color video, decoded by the video module
//! depth             length-prefixed raw-deflate blocks of f32 grids
//! confidence        length-prefixed raw-deflate blocks of u8 grids
//! ```
//!
//! Each metadata record says which sub-streams hold data for that logical
//! frame. Sub-stream cursors only move when their flag is set.

use std::fmt;
use std::io::{self, Read};

mod grid;
mod metadata;
mod substream;

pub use grid::{decode_grid, encode_grid, ConfidenceGrid, DepthGrid, GridElement, GridShape};
pub use metadata::{FrameMetadata, MetadataError, MetadataReader, StreamPresence, RECORD_SIZE};
pub use substream::{
    inflate_raw, open_substream, BlockStream, BlockWriter, CompressedFrameDecoder, FrameDirectory,
    SubstreamError, SubstreamSource, LENGTH_PREFIX_SIZE,
};

/// The three sub-streams of a logical frame, in existence-flag order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Color video frame
    Color,
    /// Depth map in meters (f32)
    Depth,
    /// Per-pixel confidence category (u8)
    Confidence,
}

impl StreamKind {
    /// All streams, indexed the same way as the existence flags.
    pub const ALL: [StreamKind; 3] = [StreamKind::Color, StreamKind::Depth, StreamKind::Confidence];

    /// Position of this stream's flag in a metadata record.
    pub fn index(self) -> usize {
        match self {
            StreamKind::Color => 0,
            StreamKind::Depth => 1,
            StreamKind::Confidence => 2,
        }
    }

    /// Short lowercase name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            StreamKind::Color => "color",
            StreamKind::Depth => "depth",
            StreamKind::Confidence => "confidence",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Read into `buf` until it is full or the reader hits end of file.
///
/// Returns the number of bytes read, which is short only at end of file.
pub(crate) fn read_up_to<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
