//! Fixed-shape numeric grids decoded from sub-stream payloads

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Depth map in meters, `height` rows by `width` columns.
pub type DepthGrid = Array2<f32>;

/// Confidence categories, same layout as [`DepthGrid`].
pub type ConfidenceGrid = Array2<u8>;

/// Element type stored in a sub-stream grid.
///
/// Payloads are little-endian, row-major.
pub trait GridElement: Copy + Default + Send + Sync + 'static {
    /// Size of one element in bytes
    const SIZE: usize;

    /// Decode one element from exactly `SIZE` bytes.
    fn from_le_slice(bytes: &[u8]) -> Self;

    /// Append the little-endian encoding of this element.
    fn extend_le(self, out: &mut Vec<u8>);
}

impl GridElement for f32 {
    const SIZE: usize = 4;

    fn from_le_slice(bytes: &[u8]) -> Self {
        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    fn extend_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl GridElement for u8 {
    const SIZE: usize = 1;

    fn from_le_slice(bytes: &[u8]) -> Self {
        bytes[0]
    }

    fn extend_le(self, out: &mut Vec<u8>) {
        out.push(self);
    }
}

/// Width and height of a sub-stream grid.
///
/// Fixed for the whole stream and supplied from outside (`info.json` or the
/// command line); it is not embedded in the blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridShape {
    pub width: usize,
    pub height: usize,
}

impl GridShape {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Number of cells
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Byte length of one decompressed payload of element type `T`.
    pub fn byte_len<T: GridElement>(&self) -> usize {
        self.len() * T::SIZE
    }

    /// Shape in ndarray order (rows, columns).
    pub fn dim(&self) -> (usize, usize) {
        (self.height, self.width)
    }
}

impl std::fmt::Display for GridShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Reinterpret a decompressed payload as a row-major grid.
///
/// Returns `None` when the byte count does not match the shape.
pub fn decode_grid<T: GridElement>(bytes: &[u8], shape: GridShape) -> Option<Array2<T>> {
    if bytes.len() != shape.byte_len::<T>() {
        return None;
    }
    let cells: Vec<T> = bytes.chunks_exact(T::SIZE).map(T::from_le_slice).collect();
    Array2::from_shape_vec(shape.dim(), cells).ok()
}

/// Serialize a grid back to its row-major little-endian payload.
pub fn encode_grid<T: GridElement>(grid: &Array2<T>) -> Vec<u8> {
    let mut out = Vec::with_capacity(grid.len() * T::SIZE);
    // Logical order, so transposed or sliced views still come out row-major
    for &value in grid.iter() {
        value.extend_le(&mut out);
    }
    out
}
