//! Core data types shared across the chunktree crate.
//!
//! These aliases pin down the numeric widths used for row counts, node
//! ids, and accumulated statistics so the layer builder, histograms,
//! and the model agree on representation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Row indexing type. 32-bit, supporting up to 2 billion rows.
pub type DataSize = u32;

/// Tree node identifier as stored in the per-row `nids` working column.
/// Non-negative values reference a node in the in-progress tree;
/// [`NID_EXCLUDED`] marks a row that takes no part in the build.
pub type NodeId = i32;

/// Marker for rows excluded from tree building (missing response, or a
/// class with no rows).
pub const NID_EXCLUDED: NodeId = -1;

/// Node index inside a tree's node arena.
pub type NodeIndex = usize;

/// Column index into a frame's feature columns.
pub type ColIndex = usize;

/// Class index for multi-class builds (`0..nclass`).
pub type ClassIndex = usize;

/// Bin index inside a histogram.
pub type BinIndex = usize;

/// Prediction/score value type.
pub type Score = f64;

/// Kind of a frame column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnKind {
    /// Continuous values; NaN encodes a missing entry.
    Numeric,
    /// Category ids `0..domain.len()` with a string domain.
    Categorical {
        /// Human-readable category labels, indexed by category id.
        domain: Vec<String>,
    },
}

impl ColumnKind {
    /// Number of distinct categories, or `None` for numeric columns.
    pub fn cardinality(&self) -> Option<usize> {
        match self {
            ColumnKind::Numeric => None,
            ColumnKind::Categorical { domain } => Some(domain.len()),
        }
    }

    /// Returns true for categorical columns.
    pub fn is_categorical(&self) -> bool {
        matches!(self, ColumnKind::Categorical { .. })
    }
}

/// Which side of a split missing values are routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingSide {
    /// Missing values follow the left child.
    Left,
    /// Missing values follow the right child.
    Right,
}

impl Default for MissingSide {
    fn default() -> Self {
        MissingSide::Left
    }
}

impl fmt::Display for MissingSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingSide::Left => write!(f, "left"),
            MissingSide::Right => write!(f, "right"),
        }
    }
}

/// Identifier of a model inside a [`crate::model::ModelRegistry`].
pub type ModelId = String;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_kind_cardinality() {
        assert_eq!(ColumnKind::Numeric.cardinality(), None);
        let kind = ColumnKind::Categorical {
            domain: vec!["a".into(), "b".into(), "c".into()],
        };
        assert_eq!(kind.cardinality(), Some(3));
        assert!(kind.is_categorical());
    }

    #[test]
    fn test_missing_side_default() {
        assert_eq!(MissingSide::default(), MissingSide::Left);
    }
}
