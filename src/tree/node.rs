//! Tree node states and split descriptions.
//!
//! A node is exactly one of `Undecided` (histograms accumulated, no
//! decision yet), `Decided` (split chosen, or marked do-not-split), or
//! `Leaf` (terminal, holds a prediction). The only permitted
//! transitions are `Undecided -> Decided{split}` with both children
//! created atomically, and `Undecided -> Decided{terminal} -> Leaf`.

use crate::core::types::{BinIndex, ColIndex, MissingSide, NodeIndex, Score};
use crate::tree::histogram::{Histogram, NodeStats};
use serde::{Deserialize, Serialize};

/// A set of category ids, stored as a bitset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySet {
    words: Vec<u64>,
}

impl CategorySet {
    /// An empty set able to hold ids `0..cardinality`.
    pub fn new(cardinality: usize) -> Self {
        CategorySet {
            words: vec![0; (cardinality + 63) / 64],
        }
    }

    /// Inserts a category id.
    pub fn insert(&mut self, id: usize) {
        self.words[id / 64] |= 1u64 << (id % 64);
    }

    /// Membership test; ids beyond the stored range are absent.
    pub fn contains(&self, id: usize) -> bool {
        self.words
            .get(id / 64)
            .map_or(false, |w| w & (1u64 << (id % 64)) != 0)
    }

    /// Number of ids in the set.
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// True when no id is present.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }
}

/// How a decided node routes a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SplitKind {
    /// Rows with `value < threshold` go left.
    Numeric {
        /// Real-valued split threshold.
        threshold: f64,
    },
    /// Rows whose category id is in the set go left.
    Categorical {
        /// Left-routed category ids.
        left_set: CategorySet,
    },
}

/// A chosen split, including the children it created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    /// Split column.
    pub column: ColIndex,
    /// Boundary bin index the split was derived from; kept for
    /// reproducibility and tie-break provenance.
    pub bin: BinIndex,
    /// Routing rule.
    pub kind: SplitKind,
    /// Side missing values are routed to.
    pub missing: MissingSide,
    /// Left child node index.
    pub left: NodeIndex,
    /// Right child node index.
    pub right: NodeIndex,
    /// Squared error of the node before splitting.
    pub pre_split_se: f64,
    /// Combined squared error of the two children.
    pub se: f64,
    /// Rows routed left during histogram accumulation.
    pub left_count: f64,
    /// Rows routed right during histogram accumulation.
    pub right_count: f64,
}

impl Split {
    /// Squared-error improvement attributed to this split's column.
    pub fn improvement(&self) -> f64 {
        (self.pre_split_se - self.se).max(0.0)
    }

    /// Routes a row by its value in the split column.
    pub fn child_for(&self, value: f64) -> NodeIndex {
        let go_left = if value.is_nan() {
            self.missing == MissingSide::Left
        } else {
            match &self.kind {
                SplitKind::Numeric { threshold } => value < *threshold,
                SplitKind::Categorical { left_set } => left_set.contains(value as usize),
            }
        };
        if go_left {
            self.left
        } else {
            self.right
        }
    }
}

/// The outcome of deciding a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decision {
    /// Split on a column; children exist.
    Split(Split),
    /// Do-not-split marker: no improving split satisfied the
    /// constraints. The node becomes a leaf when the tree finishes.
    Terminal,
}

/// A node awaiting its decision. Owns the histogram skeletons its
/// layer accumulates into; they are read exactly once, by the
/// transition out of this state.
#[derive(Debug, Clone)]
pub struct UndecidedNode {
    /// Depth below the root.
    pub depth: usize,
    /// One histogram skeleton per feature column, boundaries fixed.
    pub hists: Vec<Histogram>,
}

/// A node whose decision has been made. The histograms are gone; the
/// small stats header remains as provenance.
#[derive(Debug, Clone)]
pub struct DecidedNode {
    /// Depth below the root.
    pub depth: usize,
    /// The decision made.
    pub decision: Decision,
    /// Working-response statistics at decision time.
    pub stats: NodeStats,
}

/// A terminal node.
#[derive(Debug, Clone)]
pub struct LeafNode {
    /// Depth below the root.
    pub depth: usize,
    /// Prediction contributed by rows reaching this leaf.
    pub prediction: Score,
    /// Working-response statistics retained as provenance.
    pub stats: NodeStats,
}

/// A tree node in one of its three states.
#[derive(Debug, Clone)]
pub enum DNode {
    /// Histograms accumulated, decision pending.
    Undecided(UndecidedNode),
    /// Decision made; either a split or a do-not-split marker.
    Decided(DecidedNode),
    /// Terminal.
    Leaf(LeafNode),
}

impl DNode {
    /// Depth below the root.
    pub fn depth(&self) -> usize {
        match self {
            DNode::Undecided(n) => n.depth,
            DNode::Decided(n) => n.depth,
            DNode::Leaf(n) => n.depth,
        }
    }

    /// The split, when this node decided to split.
    pub fn split(&self) -> Option<&Split> {
        match self {
            DNode::Decided(DecidedNode {
                decision: Decision::Split(split),
                ..
            }) => Some(split),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_set() {
        let mut set = CategorySet::new(70);
        set.insert(0);
        set.insert(65);
        assert!(set.contains(0));
        assert!(set.contains(65));
        assert!(!set.contains(1));
        assert!(!set.contains(500));
        assert_eq!(set.len(), 2);
    }

    fn numeric_split(missing: MissingSide) -> Split {
        Split {
            column: 0,
            bin: 1,
            kind: SplitKind::Numeric { threshold: 2.5 },
            missing,
            left: 1,
            right: 2,
            pre_split_se: 10.0,
            se: 4.0,
            left_count: 6.0,
            right_count: 4.0,
        }
    }

    #[test]
    fn test_numeric_routing() {
        let split = numeric_split(MissingSide::Left);
        assert_eq!(split.child_for(2.0), 1);
        assert_eq!(split.child_for(2.5), 2);
        assert_eq!(split.child_for(3.0), 2);
        assert_eq!(split.child_for(f64::NAN), 1);
        let split = numeric_split(MissingSide::Right);
        assert_eq!(split.child_for(f64::NAN), 2);
    }

    #[test]
    fn test_categorical_routing() {
        let mut left_set = CategorySet::new(4);
        left_set.insert(1);
        left_set.insert(3);
        let split = Split {
            column: 2,
            bin: 0,
            kind: SplitKind::Categorical { left_set },
            missing: MissingSide::Left,
            left: 5,
            right: 6,
            pre_split_se: 1.0,
            se: 0.5,
            left_count: 2.0,
            right_count: 2.0,
        };
        assert_eq!(split.child_for(1.0), 5);
        assert_eq!(split.child_for(2.0), 6);
        // Unseen category id routes right: it is not in the left set.
        assert_eq!(split.child_for(9.0), 6);
    }

    #[test]
    fn test_improvement_non_negative() {
        let split = numeric_split(MissingSide::Left);
        assert_eq!(split.improvement(), 6.0);
    }
}
