//! Per-frame camera metadata stream (`cameraFrameInfo`)
//!
//! Fixed-size little-endian records, back to back, no header:
//!
//! ```text
//! offset  size  field
//!      0     8  frame index (u64)
//!      8     8  timestamp in seconds (f64)
//!     16     3  existence flags: color, depth, confidence (u8, 0/1)
//!     19    36  intrinsics, 3x3 f32 row-major
//!     55    64  projection matrix, 4x4 f32 row-major
//!    119    64  view matrix, 4x4 f32 row-major
//! ```
//!
//! The fields add up to 183 bytes per record.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use nalgebra::{Matrix3, Matrix4, SMatrix};
use thiserror::Error;

use super::{read_up_to, StreamKind};

/// Size of one metadata record in bytes
pub const RECORD_SIZE: usize = 8 + 8 + 3 + 9 * 4 + 16 * 4 + 16 * 4;

const INDEX_OFFSET: usize = 0;
const TIMESTAMP_OFFSET: usize = 8;
const FLAGS_OFFSET: usize = 16;
const INTRINSICS_OFFSET: usize = 19;
const PROJECTION_OFFSET: usize = INTRINSICS_OFFSET + 9 * 4;
const VIEW_OFFSET: usize = PROJECTION_OFFSET + 16 * 4;

/// Errors reading the metadata stream. Both are fatal for a run.
#[derive(Error, Debug)]
pub enum MetadataError {
    /// The stream ended in the middle of a record
    #[error("metadata record {record} is truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        record: u64,
        expected: usize,
        actual: usize,
    },

    #[error("failed to read metadata stream: {0}")]
    Io(#[from] io::Error),
}

/// Which sub-streams hold data for a logical frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StreamPresence([bool; 3]);

impl StreamPresence {
    pub fn new(color: bool, depth: bool, confidence: bool) -> Self {
        Self([color, depth, confidence])
    }

    /// All three sub-streams present
    pub fn all() -> Self {
        Self([true; 3])
    }

    /// Decode the three flag bytes. Any non-zero byte counts as present.
    pub fn from_flags(flags: [u8; 3]) -> Self {
        Self([flags[0] != 0, flags[1] != 0, flags[2] != 0])
    }

    pub fn to_flags(self) -> [u8; 3] {
        [self.0[0] as u8, self.0[1] as u8, self.0[2] as u8]
    }

    pub fn contains(self, stream: StreamKind) -> bool {
        self.0[stream.index()]
    }

    /// True when every sub-stream has data for this frame.
    pub fn is_complete(self) -> bool {
        self.0.iter().all(|&present| present)
    }

    /// Sub-streams without data for this frame, in flag order.
    pub fn missing(self) -> Vec<StreamKind> {
        StreamKind::ALL
            .into_iter()
            .filter(|&stream| !self.contains(stream))
            .collect()
    }
}

/// One parsed metadata record.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMetadata {
    /// Logical frame number, equal to the record's position in the stream
    pub frame_index: u64,
    /// Seconds since recording start
    pub timestamp: f64,
    pub presence: StreamPresence,
    pub intrinsics: Matrix3<f32>,
    pub projection: Matrix4<f32>,
    pub view: Matrix4<f32>,
}

impl FrameMetadata {
    /// Record with identity matrices, handy for synthetic sessions.
    pub fn new(frame_index: u64, timestamp: f64, presence: StreamPresence) -> Self {
        Self {
            frame_index,
            timestamp,
            presence,
            intrinsics: Matrix3::identity(),
            projection: Matrix4::identity(),
            view: Matrix4::identity(),
        }
    }

    /// Parse one full record.
    pub fn parse(buf: &[u8; RECORD_SIZE]) -> Self {
        let mut index_bytes = [0u8; 8];
        index_bytes.copy_from_slice(&buf[INDEX_OFFSET..INDEX_OFFSET + 8]);
        let mut timestamp_bytes = [0u8; 8];
        timestamp_bytes.copy_from_slice(&buf[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 8]);

        let flags = [
            buf[FLAGS_OFFSET],
            buf[FLAGS_OFFSET + 1],
            buf[FLAGS_OFFSET + 2],
        ];

        Self {
            frame_index: u64::from_le_bytes(index_bytes),
            timestamp: f64::from_le_bytes(timestamp_bytes),
            presence: StreamPresence::from_flags(flags),
            intrinsics: Matrix3::from_row_slice(&read_f32s::<9>(&buf[INTRINSICS_OFFSET..])),
            projection: Matrix4::from_row_slice(&read_f32s::<16>(&buf[PROJECTION_OFFSET..])),
            view: Matrix4::from_row_slice(&read_f32s::<16>(&buf[VIEW_OFFSET..])),
        }
    }

    /// Serialize to the on-disk layout.
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[INDEX_OFFSET..INDEX_OFFSET + 8].copy_from_slice(&self.frame_index.to_le_bytes());
        buf[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 8].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[FLAGS_OFFSET..FLAGS_OFFSET + 3].copy_from_slice(&self.presence.to_flags());

        let mut offset = INTRINSICS_OFFSET;
        for r in 0..3 {
            for c in 0..3 {
                buf[offset..offset + 4].copy_from_slice(&self.intrinsics[(r, c)].to_le_bytes());
                offset += 4;
            }
        }
        for matrix in [&self.projection, &self.view] {
            for r in 0..4 {
                for c in 0..4 {
                    buf[offset..offset + 4].copy_from_slice(&matrix[(r, c)].to_le_bytes());
                    offset += 4;
                }
            }
        }
        buf
    }

    /// Write this record to a metadata stream.
    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.to_bytes())
    }
}

impl fmt::Display for FrameMetadata {
    /// Multi-line dump with two decimals per matrix entry.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags: Vec<&str> = StreamKind::ALL
            .iter()
            .map(|&kind| if self.presence.contains(kind) { kind.name() } else { "-" })
            .collect();
        writeln!(
            f,
            "frame {} t={:.3}s [{}]",
            self.frame_index,
            self.timestamp,
            flags.join(" ")
        )?;
        write_matrix(f, "intrinsics", &self.intrinsics)?;
        write_matrix(f, "projection", &self.projection)?;
        write_matrix(f, "view", &self.view)
    }
}

fn write_matrix<const R: usize, const C: usize>(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    matrix: &SMatrix<f32, R, C>,
) -> fmt::Result {
    write!(f, "  {:<11}", name)?;
    for r in 0..R {
        let row: Vec<String> = (0..C).map(|c| format!("{:8.2}", matrix[(r, c)])).collect();
        if r > 0 {
            write!(f, "  {:<11}", "")?;
        }
        writeln!(f, "[{}]", row.join(" "))?;
    }
    Ok(())
}

fn read_f32s<const N: usize>(bytes: &[u8]) -> [f32; N] {
    let mut out = [0f32; N];
    for (i, value) in out.iter_mut().enumerate() {
        let at = i * 4;
        *value = f32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
    }
    out
}

/// Sequential reader over a metadata stream.
pub struct MetadataReader<R> {
    reader: R,
    records_read: u64,
    /// Record count derived from the file size, when known
    expected_records: Option<u64>,
    failed: bool,
}

impl MetadataReader<BufReader<File>> {
    /// Open a metadata file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MetadataError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        let record_size = RECORD_SIZE as u64;
        if len % record_size != 0 {
            tracing::warn!(
                "{} is {} bytes, not a multiple of {}; the last record is truncated",
                path.display(),
                len,
                RECORD_SIZE
            );
        }
        let mut reader = Self::new(BufReader::new(file));
        reader.expected_records = Some(len / record_size);
        Ok(reader)
    }
}

impl<R: BufRead> MetadataReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            records_read: 0,
            expected_records: None,
            failed: false,
        }
    }

    /// Attach a known record count (used for progress reporting only).
    pub fn with_expected_records(mut self, count: u64) -> Self {
        self.expected_records = Some(count);
        self
    }

    /// Read the next record, or `None` at a clean end of stream.
    ///
    /// Consumes exactly [`RECORD_SIZE`] bytes per record. A stream that ends
    /// mid-record yields [`MetadataError::Truncated`].
    pub fn read_next(&mut self) -> Result<Option<FrameMetadata>, MetadataError> {
        if self.at_end()? {
            return Ok(None);
        }

        let mut buf = [0u8; RECORD_SIZE];
        let actual = read_up_to(&mut self.reader, &mut buf)?;
        if actual < RECORD_SIZE {
            return Err(MetadataError::Truncated {
                record: self.records_read,
                expected: RECORD_SIZE,
                actual,
            });
        }

        self.records_read += 1;
        Ok(Some(FrameMetadata::parse(&buf)))
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

    /// Number of records returned so far
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Total record count, if known up front
    pub fn expected_records(&self) -> Option<u64> {
        self.expected_records
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: BufRead> Iterator for MetadataReader<R> {
    type Item = Result<FrameMetadata, MetadataError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.read_next() {
            Ok(record) => record.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_record(index: u64) -> FrameMetadata {
        let mut record = FrameMetadata::new(
            index,
            index as f64 / 60.0,
            StreamPresence::new(true, index % 2 == 0, true),
        );
        record.intrinsics = Matrix3::new(1400.0, 0.0, 960.0, 0.0, 1400.0, 720.0, 0.0, 0.0, 1.0);
        record.projection[(0, 3)] = 0.25;
        record.view[(2, 3)] = -1.5;
        record
    }

    fn stream_of(records: &[FrameMetadata]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for record in records {
            record.write(&mut bytes).unwrap();
        }
        bytes
    }

    #[test]
    fn test_record_size() {
        assert_eq!(RECORD_SIZE, 183);
        assert_eq!(VIEW_OFFSET + 64, RECORD_SIZE);
    }

    #[test]
    fn test_parse_field_offsets() {
        let mut buf = [0u8; RECORD_SIZE];
        buf[0..8].copy_from_slice(&7u64.to_le_bytes());
        buf[8..16].copy_from_slice(&1.25f64.to_le_bytes());
        buf[16..19].copy_from_slice(&[1, 0, 1]);
        // intrinsics[0][1] is the second f32 of the matrix block
        buf[23..27].copy_from_slice(&3.5f32.to_le_bytes());
        // view[3][3] is the last f32 of the record
        buf[179..183].copy_from_slice(&1.0f32.to_le_bytes());

        let record = FrameMetadata::parse(&buf);
        assert_eq!(record.frame_index, 7);
        assert_eq!(record.timestamp, 1.25);
        assert_eq!(record.presence, StreamPresence::new(true, false, true));
        assert_eq!(record.intrinsics[(0, 1)], 3.5);
        assert_eq!(record.intrinsics[(1, 0)], 0.0);
        assert_eq!(record.view[(3, 3)], 1.0);
    }

    #[test]
    fn test_reader_consumes_one_record_per_call() {
        let records: Vec<_> = (0..3).map(sample_record).collect();
        let mut reader = MetadataReader::new(Cursor::new(stream_of(&records)));

        for (i, expected) in records.iter().enumerate() {
            let record = reader.read_next().unwrap().unwrap();
            assert_eq!(&record, expected);
            assert_eq!(reader.reader.position(), ((i + 1) * RECORD_SIZE) as u64);
        }
        assert!(reader.read_next().unwrap().is_none());
        assert_eq!(reader.records_read(), 3);
    }

    #[test]
    fn test_reader_reports_n_frames() {
        let records: Vec<_> = (0..5).map(sample_record).collect();
        let reader = MetadataReader::new(Cursor::new(stream_of(&records)));
        let parsed: Vec<_> = reader.collect::<Result<_, _>>().unwrap();
        assert_eq!(parsed.len(), 5);
        assert_eq!(parsed.last().unwrap().frame_index, 4);
    }

    #[test]
    fn test_empty_stream_ends_cleanly() {
        let mut reader = MetadataReader::new(Cursor::new(Vec::new()));
        assert!(reader.read_next().unwrap().is_none());
    }

    #[test]
    fn test_truncated_record_is_an_error() {
        let mut bytes = stream_of(&[sample_record(0), sample_record(1)]);
        bytes.truncate(RECORD_SIZE + 40);
        let mut reader = MetadataReader::new(Cursor::new(bytes));

        assert!(reader.read_next().unwrap().is_some());
        match reader.read_next() {
            Err(MetadataError::Truncated {
                record,
                expected,
                actual,
            }) => {
                assert_eq!(record, 1);
                assert_eq!(expected, RECORD_SIZE);
                assert_eq!(actual, 40);
            }
            other => panic!("expected truncation error, got {:?}", other),
        }
    }

    #[test]
    fn test_iterator_stops_after_error() {
        let mut bytes = stream_of(&[sample_record(0)]);
        bytes.extend_from_slice(&[0u8; 10]);
        let mut reader = MetadataReader::new(Cursor::new(bytes));
        assert!(matches!(reader.next(), Some(Ok(_))));
        assert!(matches!(reader.next(), Some(Err(MetadataError::Truncated { .. }))));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_display_lists_flags_and_matrices() {
        let record = FrameMetadata::new(3, 0.05, StreamPresence::new(true, false, true));
        let text = record.to_string();
        assert!(text.starts_with("frame 3 t=0.050s [color - confidence]\n"));
        assert!(text.contains("intrinsics ["));
        assert!(text.contains("    1.00"));
        assert_eq!(text.lines().count(), 1 + 3 + 4 + 4);
    }

    #[test]
    fn test_presence_flags() {
        let presence = StreamPresence::from_flags([1, 0, 1]);
        assert!(presence.contains(StreamKind::Color));
        assert!(!presence.contains(StreamKind::Depth));
        assert!(!presence.is_complete());
        assert_eq!(presence.missing(), vec![StreamKind::Depth]);
        assert_eq!(presence.to_flags(), [1, 0, 1]);
        assert!(StreamPresence::all().is_complete());
    }

    #[test]
    fn test_open_counts_records_from_file_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cameraFrameInfo");
        std::fs::write(&path, stream_of(&[sample_record(0), sample_record(1)])).unwrap();

        let mut reader = MetadataReader::open(&path).unwrap();
        assert_eq!(reader.expected_records(), Some(2));
        assert_eq!(reader.read_next().unwrap().unwrap().frame_index, 0);
    }
}
