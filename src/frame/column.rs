//! Chunked column storage.
//!
//! A column is split into contiguous row ranges ("chunks") that all
//! columns of a frame share, so a chunk index addresses the same rows
//! in every column. Chunks are the unit of data locality and of
//! parallel work assignment.

use crate::core::error::{ChunktreeError, Result};
use crate::core::types::{NodeId, NID_EXCLUDED};

/// The chunk layout shared by every column of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkLayout {
    /// Start row of each chunk, plus a trailing sentinel equal to `nrows`.
    starts: Vec<usize>,
}

impl ChunkLayout {
    /// Builds a layout covering `nrows` rows in chunks of `chunk_rows`.
    pub fn new(nrows: usize, chunk_rows: usize) -> Result<Self> {
        if chunk_rows == 0 {
            return Err(ChunktreeError::frame("chunk_rows must be > 0"));
        }
        let mut starts: Vec<usize> = (0..nrows).step_by(chunk_rows).collect();
        if starts.is_empty() {
            starts.push(0);
        }
        starts.push(nrows);
        Ok(ChunkLayout { starts })
    }

    /// Total number of rows covered.
    pub fn nrows(&self) -> usize {
        *self.starts.last().unwrap()
    }

    /// Number of chunks.
    pub fn num_chunks(&self) -> usize {
        self.starts.len() - 1
    }

    /// Row range of chunk `ci`.
    pub fn chunk_range(&self, ci: usize) -> std::ops::Range<usize> {
        self.starts[ci]..self.starts[ci + 1]
    }

    /// Number of rows in chunk `ci`.
    pub fn chunk_len(&self, ci: usize) -> usize {
        self.starts[ci + 1] - self.starts[ci]
    }
}

/// A numeric column stored as chunks of `f64`; NaN encodes missing.
#[derive(Debug, Clone)]
pub struct Column {
    chunks: Vec<Box<[f64]>>,
}

impl Column {
    /// Builds a column from row-ordered values, split per `layout`.
    pub fn from_values(layout: &ChunkLayout, values: &[f64]) -> Result<Self> {
        if values.len() != layout.nrows() {
            return Err(ChunktreeError::frame(format!(
                "column has {} values but the layout covers {} rows",
                values.len(),
                layout.nrows()
            )));
        }
        let chunks = (0..layout.num_chunks())
            .map(|ci| values[layout.chunk_range(ci)].to_vec().into_boxed_slice())
            .collect();
        Ok(Column { chunks })
    }

    /// A column holding `value` in every row.
    pub fn constant(layout: &ChunkLayout, value: f64) -> Self {
        let chunks = (0..layout.num_chunks())
            .map(|ci| vec![value; layout.chunk_len(ci)].into_boxed_slice())
            .collect();
        Column { chunks }
    }

    /// An all-zero column.
    pub fn zeros(layout: &ChunkLayout) -> Self {
        Self::constant(layout, 0.0)
    }

    /// Read access to chunk `ci`.
    pub fn chunk(&self, ci: usize) -> &[f64] {
        &self.chunks[ci]
    }

    /// Write access to chunk `ci`.
    pub fn chunk_mut(&mut self, ci: usize) -> &mut [f64] {
        &mut self.chunks[ci]
    }

    /// Parallel-friendly access to all chunks.
    pub fn chunks(&self) -> &[Box<[f64]>] {
        &self.chunks
    }

    /// Mutable access to all chunks, for zipped per-chunk iteration.
    pub fn chunks_mut(&mut self) -> &mut [Box<[f64]>] {
        &mut self.chunks
    }

    /// Iterates over all values in row order.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.chunks.iter().flat_map(|c| c.iter().copied())
    }

    /// Total number of rows.
    pub fn len(&self) -> usize {
        self.chunks.iter().map(|c| c.len()).sum()
    }

    /// True when the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count of missing (NaN) entries.
    pub fn na_count(&self) -> usize {
        self.values().filter(|v| v.is_nan()).count()
    }

    /// Mean over the non-missing entries, or NaN when all are missing.
    pub fn mean(&self) -> f64 {
        let mut sum = 0.0;
        let mut n = 0usize;
        for v in self.values() {
            if !v.is_nan() {
                sum += v;
                n += 1;
            }
        }
        if n == 0 {
            f64::NAN
        } else {
            sum / n as f64
        }
    }

    /// Population standard deviation over the non-missing entries.
    pub fn sigma(&self) -> f64 {
        let mean = self.mean();
        if mean.is_nan() {
            return f64::NAN;
        }
        let mut ssq = 0.0;
        let mut n = 0usize;
        for v in self.values() {
            if !v.is_nan() {
                let d = v - mean;
                ssq += d * d;
                n += 1;
            }
        }
        (ssq / n as f64).sqrt()
    }

    /// Observed (min, max) over non-missing entries; `(NaN, NaN)` when
    /// every entry is missing.
    pub fn observed_range(&self) -> (f64, f64) {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut seen = false;
        for v in self.values() {
            if !v.is_nan() {
                min = min.min(v);
                max = max.max(v);
                seen = true;
            }
        }
        if seen {
            (min, max)
        } else {
            (f64::NAN, f64::NAN)
        }
    }
}

/// A per-row node-assignment column (`nids`), chunked like [`Column`].
#[derive(Debug, Clone)]
pub struct NodeIdColumn {
    chunks: Vec<Box<[NodeId]>>,
}

impl NodeIdColumn {
    /// A column with every row excluded.
    pub fn excluded(layout: &ChunkLayout) -> Self {
        let chunks = (0..layout.num_chunks())
            .map(|ci| vec![NID_EXCLUDED; layout.chunk_len(ci)].into_boxed_slice())
            .collect();
        NodeIdColumn { chunks }
    }

    /// Read access to chunk `ci`.
    pub fn chunk(&self, ci: usize) -> &[NodeId] {
        &self.chunks[ci]
    }

    /// Write access to chunk `ci`.
    pub fn chunk_mut(&mut self, ci: usize) -> &mut [NodeId] {
        &mut self.chunks[ci]
    }

    /// Mutable access to all chunks, for zipped per-chunk iteration.
    pub fn chunks_mut(&mut self) -> &mut [Box<[NodeId]>] {
        &mut self.chunks
    }

    /// Iterates over all assignments in row order.
    pub fn values(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.chunks.iter().flat_map(|c| c.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_chunking() {
        let layout = ChunkLayout::new(10, 4).unwrap();
        assert_eq!(layout.nrows(), 10);
        assert_eq!(layout.num_chunks(), 3);
        assert_eq!(layout.chunk_range(0), 0..4);
        assert_eq!(layout.chunk_range(2), 8..10);
        assert_eq!(layout.chunk_len(2), 2);
    }

    #[test]
    fn test_layout_empty_frame() {
        let layout = ChunkLayout::new(0, 8).unwrap();
        assert_eq!(layout.nrows(), 0);
        assert_eq!(layout.num_chunks(), 1);
        assert_eq!(layout.chunk_len(0), 0);
    }

    #[test]
    fn test_column_round_trip() {
        let layout = ChunkLayout::new(5, 2).unwrap();
        let col = Column::from_values(&layout, &[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(col.len(), 5);
        assert_eq!(col.chunk(1), &[3.0, 4.0]);
        let collected: Vec<f64> = col.values().collect();
        assert_eq!(collected, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_column_length_mismatch() {
        let layout = ChunkLayout::new(5, 2).unwrap();
        assert!(Column::from_values(&layout, &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_column_statistics() {
        let layout = ChunkLayout::new(4, 3).unwrap();
        let col = Column::from_values(&layout, &[1.0, f64::NAN, 3.0, 5.0]).unwrap();
        assert_eq!(col.na_count(), 1);
        assert!((col.mean() - 3.0).abs() < 1e-12);
        assert_eq!(col.observed_range(), (1.0, 5.0));
    }

    #[test]
    fn test_node_id_column_starts_excluded() {
        let layout = ChunkLayout::new(3, 2).unwrap();
        let nids = NodeIdColumn::excluded(&layout);
        assert!(nids.values().all(|n| n == NID_EXCLUDED));
    }
}
