//! Columnar chunked frames.
//!
//! A [`Frame`] is an immutable, column-oriented table whose columns all
//! share one chunk layout. The last column is the response. Mutable
//! per-class training state lives in a separate [`WorkingSet`] overlay
//! rather than inside the frame, so concurrent per-class builds never
//! alias each other's writes.

pub mod column;
pub mod working;

pub use column::{ChunkLayout, Column, NodeIdColumn};
pub use working::{ClassColumns, WorkingSet};

use crate::core::constants::DEFAULT_CHUNK_ROWS;
use crate::core::error::{ChunktreeError, Result};
use crate::core::types::{ColIndex, ColumnKind};
use ndarray::Array2;

/// An immutable columnar table with a shared chunk layout.
///
/// Feature columns occupy indices `0..ncols()`; the response is the
/// final column and is addressed separately.
#[derive(Debug, Clone)]
pub struct Frame {
    layout: ChunkLayout,
    cols: Vec<Column>,
    kinds: Vec<ColumnKind>,
    names: Vec<String>,
}

impl Frame {
    /// Builds a frame from `(name, kind, values)` triples. The last
    /// triple is the response column.
    pub fn new(columns: Vec<(String, ColumnKind, Vec<f64>)>, chunk_rows: usize) -> Result<Self> {
        if columns.len() < 2 {
            return Err(ChunktreeError::frame(
                "a frame needs at least one feature column and a response",
            ));
        }
        let nrows = columns[0].2.len();
        let layout = ChunkLayout::new(nrows, chunk_rows)?;
        let mut cols = Vec::with_capacity(columns.len());
        let mut kinds = Vec::with_capacity(columns.len());
        let mut names = Vec::with_capacity(columns.len());
        for (name, kind, values) in columns {
            if values.len() != nrows {
                return Err(ChunktreeError::frame(format!(
                    "column '{}' has {} rows, expected {}",
                    name,
                    values.len(),
                    nrows
                )));
            }
            if let ColumnKind::Categorical { domain } = &kind {
                let bad = values
                    .iter()
                    .find(|v| !v.is_nan() && (**v < 0.0 || **v >= domain.len() as f64));
                if let Some(v) = bad {
                    return Err(ChunktreeError::frame(format!(
                        "column '{}': category id {} outside domain of {} levels",
                        name,
                        v,
                        domain.len()
                    )));
                }
            }
            cols.push(Column::from_values(&layout, &values)?);
            kinds.push(kind);
            names.push(name);
        }
        Ok(Frame {
            layout,
            cols,
            kinds,
            names,
        })
    }

    /// Builds a frame from a dense feature matrix plus a response
    /// column, using the default chunk size. Feature columns are all
    /// numeric and named `C0..Cn`.
    pub fn from_ndarray(
        features: &Array2<f64>,
        response: Vec<f64>,
        response_kind: ColumnKind,
    ) -> Result<Self> {
        let mut columns: Vec<(String, ColumnKind, Vec<f64>)> = features
            .columns()
            .into_iter()
            .enumerate()
            .map(|(i, col)| (format!("C{}", i), ColumnKind::Numeric, col.to_vec()))
            .collect();
        columns.push(("response".to_string(), response_kind, response));
        Frame::new(columns, DEFAULT_CHUNK_ROWS)
    }

    /// The shared chunk layout.
    pub fn layout(&self) -> &ChunkLayout {
        &self.layout
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.layout.nrows()
    }

    /// Number of chunks.
    pub fn num_chunks(&self) -> usize {
        self.layout.num_chunks()
    }

    /// Number of feature columns (the response is not counted).
    pub fn ncols(&self) -> usize {
        self.cols.len() - 1
    }

    /// Feature column `c`.
    pub fn feature(&self, c: ColIndex) -> &Column {
        &self.cols[c]
    }

    /// Kind of feature column `c`.
    pub fn feature_kind(&self, c: ColIndex) -> &ColumnKind {
        &self.kinds[c]
    }

    /// Name of feature column `c`.
    pub fn feature_name(&self, c: ColIndex) -> &str {
        &self.names[c]
    }

    /// Names of all feature columns.
    pub fn feature_names(&self) -> Vec<String> {
        self.names[..self.ncols()].to_vec()
    }

    /// The response column.
    pub fn response(&self) -> &Column {
        &self.cols[self.cols.len() - 1]
    }

    /// Kind of the response column.
    pub fn response_kind(&self) -> &ColumnKind {
        &self.kinds[self.kinds.len() - 1]
    }

    /// Number of response classes: the categorical cardinality, or 1
    /// for a numeric (regression) response.
    pub fn nclass(&self) -> usize {
        self.response_kind().cardinality().unwrap_or(1)
    }

    /// True when the response is categorical.
    pub fn is_classifier(&self) -> bool {
        self.response_kind().is_categorical()
    }

    /// Observed `(min, max)` of every feature column, skipping NaNs.
    pub fn observed_ranges(&self) -> Vec<(f64, f64)> {
        (0..self.ncols())
            .map(|c| self.feature(c).observed_range())
            .collect()
    }

    /// Per-class row counts over the non-missing response.
    pub fn class_counts(&self) -> Vec<usize> {
        let nclass = self.nclass();
        let mut counts = vec![0usize; nclass];
        if nclass > 1 {
            for v in self.response().values() {
                if !v.is_nan() {
                    counts[v as usize] += 1;
                }
            }
        } else {
            counts[0] = self.response().len() - self.response().na_count();
        }
        counts
    }

    /// Per-class row fractions over the non-missing response.
    pub fn class_distribution(&self) -> Vec<f64> {
        let counts = self.class_counts();
        let total: usize = counts.iter().sum();
        if total == 0 {
            return vec![0.0; counts.len()];
        }
        counts.iter().map(|&c| c as f64 / total as f64).collect()
    }

    /// A new frame holding the given rows (in order, duplicates
    /// allowed), re-chunked with the same chunk size policy.
    pub fn select_rows(&self, rows: &[usize]) -> Result<Frame> {
        let chunk_rows = self.layout.chunk_len(0).max(1);
        let mut columns = Vec::with_capacity(self.cols.len());
        for (i, col) in self.cols.iter().enumerate() {
            let all: Vec<f64> = col.values().collect();
            let picked: Vec<f64> = rows.iter().map(|&r| all[r]).collect();
            columns.push((self.names[i].clone(), self.kinds[i].clone(), picked));
        }
        Frame::new(columns, chunk_rows)
    }
}
