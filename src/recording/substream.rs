//! Compressed depth and confidence sub-streams
//!
//! Each payload is a raw-deflate block (no zlib/gzip header or trailer) that
//! inflates to exactly one grid. Two on-disk layouts exist:
//!
//! - a single file of blocks, each preceded by an 8-byte little-endian length
//!   ([`BlockStream`])
//! - a directory with one compressed file per frame, named `0`, `1`, ...
//!   ([`FrameDirectory`], older recordings)

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use ndarray::Array2;
use thiserror::Error;

use super::grid::{decode_grid, encode_grid, GridElement, GridShape};
use super::{read_up_to, StreamKind};

/// Size of the block length prefix in bytes
pub const LENGTH_PREFIX_SIZE: usize = 8;

/// Errors pulling a frame from a sub-stream.
///
/// Everything except [`SubstreamError::Io`] only costs the current logical
/// frame; see [`SubstreamError::is_recoverable`].
#[derive(Error, Debug)]
pub enum SubstreamError {
    /// No more blocks in the stream
    #[error("{stream} stream is exhausted")]
    Exhausted { stream: StreamKind },

    /// Gap in a frame directory's numbering
    #[error("{stream} frame file {} is missing", path.display())]
    MissingFrame { stream: StreamKind, path: PathBuf },

    /// Length prefix or payload cut short by end of file
    #[error("{stream} block is truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        stream: StreamKind,
        expected: u64,
        actual: u64,
    },

    #[error("{stream} block failed to decompress: {source}")]
    Decompression {
        stream: StreamKind,
        #[source]
        source: io::Error,
    },

    /// Inflated byte count does not match the stream's grid shape.
    /// `actual` is capped at `expected + 1`.
    #[error("{stream} block inflated to {actual} bytes, expected {expected}")]
    ShapeMismatch {
        stream: StreamKind,
        expected: usize,
        actual: usize,
    },

    #[error("failed to read {stream} stream: {source}")]
    Io {
        stream: StreamKind,
        #[source]
        source: io::Error,
    },
}

impl SubstreamError {
    /// Whether the run may skip the frame and carry on.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SubstreamError::Io { .. })
    }

    pub fn stream(&self) -> StreamKind {
        match self {
            SubstreamError::Exhausted { stream }
            | SubstreamError::MissingFrame { stream, .. }
            | SubstreamError::Truncated { stream, .. }
            | SubstreamError::Decompression { stream, .. }
            | SubstreamError::ShapeMismatch { stream, .. }
            | SubstreamError::Io { stream, .. } => *stream,
        }
    }
}

/// A sequential source of compressed frame payloads.
pub trait SubstreamSource: Send {
    /// Which sub-stream this is
    fn stream(&self) -> StreamKind;

    /// Pull the next compressed payload, advancing the cursor by one frame.
    fn next_payload(&mut self) -> Result<Vec<u8>, SubstreamError>;
}

/// Length-prefixed blocks in a single file.
pub struct BlockStream<R> {
    stream: StreamKind,
    reader: R,
    blocks_read: u64,
    exhausted: bool,
}

impl BlockStream<BufReader<File>> {
    /// Open a block file.
    pub fn open<P: AsRef<Path>>(stream: StreamKind, path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(stream, BufReader::new(file)))
    }
}

impl<R: BufRead> BlockStream<R> {
    pub fn new(stream: StreamKind, reader: R) -> Self {
        Self {
            stream,
            reader,
            blocks_read: 0,
            exhausted: false,
        }
    }

    /// Number of complete blocks read so far
    pub fn blocks_read(&self) -> u64 {
        self.blocks_read
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    fn io_error(&self, source: io::Error) -> SubstreamError {
        SubstreamError::Io {
            stream: self.stream,
            source,
        }
    }

    fn at_end(&mut self) -> io::Result<bool> {
        loop {
            match self.reader.fill_buf() {
                Ok(buf) => return Ok(buf.is_empty()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl<R: BufRead + Send> SubstreamSource for BlockStream<R> {
    fn stream(&self) -> StreamKind {
        self.stream
    }

    fn next_payload(&mut self) -> Result<Vec<u8>, SubstreamError> {
        let stream = self.stream;
        if self.exhausted || self.at_end().map_err(|e| self.io_error(e))? {
            self.exhausted = true;
            return Err(SubstreamError::Exhausted { stream });
        }

        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        let got = read_up_to(&mut self.reader, &mut prefix).map_err(|e| self.io_error(e))?;
        if got < LENGTH_PREFIX_SIZE {
            self.exhausted = true;
            return Err(SubstreamError::Truncated {
                stream,
                expected: LENGTH_PREFIX_SIZE as u64,
                actual: got as u64,
            });
        }

        let len = u64::from_le_bytes(prefix);
        let mut payload = Vec::new();
        (&mut self.reader)
            .take(len)
            .read_to_end(&mut payload)
            .map_err(|e| self.io_error(e))?;
        if (payload.len() as u64) < len {
            self.exhausted = true;
            return Err(SubstreamError::Truncated {
                stream,
                expected: len,
                actual: payload.len() as u64,
            });
        }

        self.blocks_read += 1;
        Ok(payload)
    }
}

/// One compressed file per frame, named by sequence number.
///
/// A gap in the numbering is a missing frame; past the highest numbered file
/// the stream is exhausted.
pub struct FrameDirectory {
    stream: StreamKind,
    dir: PathBuf,
    next_index: u64,
    last_index: Option<u64>,
}

impl FrameDirectory {
    /// Scan `dir` for numbered frame files.
    pub fn open<P: Into<PathBuf>>(stream: StreamKind, dir: P) -> io::Result<Self> {
        let dir = dir.into();
        let mut last_index = None;
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if let Some(index) = entry.file_name().to_str().and_then(|n| n.parse::<u64>().ok()) {
                last_index = last_index.max(Some(index));
            }
        }
        Ok(Self {
            stream,
            dir,
            next_index: 0,
            last_index,
        })
    }

    /// Sequence number of the next file to read
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Number of frame slots, counting gaps
    pub fn frame_slots(&self) -> u64 {
        self.last_index.map_or(0, |last| last + 1)
    }
}

impl SubstreamSource for FrameDirectory {
    fn stream(&self) -> StreamKind {
        self.stream
    }

    fn next_payload(&mut self) -> Result<Vec<u8>, SubstreamError> {
        let index = self.next_index;
        // The slot is consumed even when the file is missing
        self.next_index += 1;
        if index >= self.frame_slots() {
            return Err(SubstreamError::Exhausted {
                stream: self.stream,
            });
        }

        let path = self.dir.join(index.to_string());
        match fs::read(&path) {
            Ok(payload) => Ok(payload),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(SubstreamError::MissingFrame {
                stream: self.stream,
                path,
            }),
            Err(source) => Err(SubstreamError::Io {
                stream: self.stream,
                source,
            }),
        }
    }
}

/// Open a sub-stream, picking the layout from the path: a directory is a
/// [`FrameDirectory`], anything else a [`BlockStream`].
pub fn open_substream(stream: StreamKind, path: &Path) -> io::Result<Box<dyn SubstreamSource>> {
    if path.is_dir() {
        tracing::debug!("{} stream: per-frame files in {}", stream, path.display());
        Ok(Box::new(FrameDirectory::open(stream, path)?))
    } else {
        tracing::debug!("{} stream: block file {}", stream, path.display());
        Ok(Box::new(BlockStream::open(stream, path)?))
    }
}

/// Inflate a raw-deflate payload, reading at most `expected + 1` bytes.
pub fn inflate_raw(payload: &[u8], expected: usize) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected);
    DeflateDecoder::new(payload)
        .take(expected as u64 + 1)
        .read_to_end(&mut out)?;
    Ok(out)
}

/// Decodes one grid per call from a compressed sub-stream.
pub struct CompressedFrameDecoder<T> {
    source: Box<dyn SubstreamSource>,
    shape: GridShape,
    _element: PhantomData<T>,
}

impl<T: GridElement> CompressedFrameDecoder<T> {
    pub fn new(source: Box<dyn SubstreamSource>, shape: GridShape) -> Self {
        Self {
            source,
            shape,
            _element: PhantomData,
        }
    }

    pub fn stream(&self) -> StreamKind {
        self.source.stream()
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    /// Consume exactly one payload and decode it into a grid.
    ///
    /// The payload is read in full before inflating, so a bad block never
    /// leaves the cursor in the middle of the stream.
    pub fn read_next(&mut self) -> Result<Array2<T>, SubstreamError> {
        let stream = self.source.stream();
        let payload = self.source.next_payload()?;

        let expected = self.shape.byte_len::<T>();
        let bytes = inflate_raw(&payload, expected)
            .map_err(|source| SubstreamError::Decompression { stream, source })?;

        decode_grid(&bytes, self.shape).ok_or(SubstreamError::ShapeMismatch {
            stream,
            expected,
            actual: bytes.len(),
        })
    }
}

/// Writes length-prefixed raw-deflate blocks.
pub struct BlockWriter<W: Write> {
    writer: W,
    blocks_written: u64,
}

impl<W: Write> BlockWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            blocks_written: 0,
        }
    }

    /// Write an already-compressed payload with its length prefix.
    pub fn write_payload(&mut self, payload: &[u8]) -> io::Result<()> {
        self.writer.write_all(&(payload.len() as u64).to_le_bytes())?;
        self.writer.write_all(payload)?;
        self.blocks_written += 1;
        Ok(())
    }

    /// Compress a grid and write it as one block.
    pub fn write_grid<T: GridElement>(&mut self, grid: &Array2<T>) -> io::Result<()> {
        let payload = compress_raw(&encode_grid(grid))?;
        self.write_payload(&payload)
    }

    pub fn blocks_written(&self) -> u64 {
        self.blocks_written
    }

    /// Flush and return the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Raw-deflate compress a payload.
pub(crate) fn compress_raw(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}
