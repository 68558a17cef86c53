//! The in-progress decision tree and its frozen, scorable form.
//!
//! A [`DTree`] grows one whole layer at a time: the `leafs` watermark
//! separates nodes decided in earlier layers from the Undecided
//! frontier the current layer is accumulating histograms for. Once the
//! tree stops growing, every remaining Undecided or do-not-split node
//! is converted to a leaf and the tree is compiled into a
//! [`CompiledTree`] for the model.

use crate::core::error::{ChunktreeError, Result};
use crate::core::types::{ColIndex, MissingSide, NodeIndex, Score};
use crate::tree::histogram::{Histogram, NodeStats};
use crate::tree::node::{
    DNode, DecidedNode, Decision, LeafNode, Split, SplitKind, UndecidedNode,
};
use serde::{Deserialize, Serialize};

/// A growing tree: node arena plus layer bookkeeping.
#[derive(Debug)]
pub struct DTree {
    nodes: Vec<DNode>,
    /// First index of the current Undecided frontier.
    leafs: NodeIndex,
    depth: usize,
}

impl DTree {
    /// A new tree with an Undecided root owning the given skeletons.
    pub fn new(root_hists: Vec<Histogram>) -> Self {
        DTree {
            nodes: vec![DNode::Undecided(UndecidedNode {
                depth: 0,
                hists: root_hists,
            })],
            leafs: 0,
            depth: 0,
        }
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the tree has no nodes (never the case after `new`).
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Current depth (layers below the root).
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The frontier watermark: nodes at `leafs()..len()` are the
    /// Undecided nodes of the layer being built.
    pub fn leafs(&self) -> NodeIndex {
        self.leafs
    }

    /// The node at `index`.
    pub fn node(&self, index: NodeIndex) -> &DNode {
        &self.nodes[index]
    }

    /// The Undecided node at `index`.
    ///
    /// # Panics
    /// If the node is not Undecided; frontier bookkeeping guarantees it
    /// is for indices in `leafs()..len()` before decisions are made.
    pub fn undecided(&self, index: NodeIndex) -> &UndecidedNode {
        match &self.nodes[index] {
            DNode::Undecided(n) => n,
            other => panic!("node {} is not undecided: depth {}", index, other.depth()),
        }
    }

    /// Decides `index` with a split, creating both children atomically.
    /// Child skeletons inherit the parent ranges, with the split column
    /// narrowed per side. Returns the children's indices.
    #[allow(clippy::too_many_arguments)]
    pub fn decide_split(
        &mut self,
        index: NodeIndex,
        column: ColIndex,
        bin: usize,
        kind: SplitKind,
        missing: MissingSide,
        stats: NodeStats,
        se: f64,
        left_count: f64,
        right_count: f64,
        left_hists: Vec<Histogram>,
        right_hists: Vec<Histogram>,
    ) -> (NodeIndex, NodeIndex) {
        let depth = self.nodes[index].depth();
        let left = self.nodes.len();
        let right = left + 1;
        self.nodes.push(DNode::Undecided(UndecidedNode {
            depth: depth + 1,
            hists: left_hists,
        }));
        self.nodes.push(DNode::Undecided(UndecidedNode {
            depth: depth + 1,
            hists: right_hists,
        }));
        self.nodes[index] = DNode::Decided(DecidedNode {
            depth,
            decision: Decision::Split(Split {
                column,
                bin,
                kind,
                missing,
                left,
                right,
                pre_split_se: stats.se(),
                se,
                left_count,
                right_count,
            }),
            stats,
        });
        (left, right)
    }

    /// Decides `index` as do-not-split.
    pub fn decide_terminal(&mut self, index: NodeIndex, stats: NodeStats) {
        let depth = self.nodes[index].depth();
        self.nodes[index] = DNode::Decided(DecidedNode {
            depth,
            decision: Decision::Terminal,
            stats,
        });
    }

    /// Advances the frontier watermark after a layer's decisions, and
    /// bumps the depth only if the layer created new leaves.
    pub fn advance_frontier(&mut self, new_leafs: NodeIndex) {
        self.leafs = new_leafs;
        if self.nodes.len() > new_leafs {
            self.depth += 1;
        }
    }

    /// Converts a finished node (Undecided frontier leftover or
    /// do-not-split) into a leaf with the given prediction.
    pub fn to_leaf(&mut self, index: NodeIndex, prediction: Score) {
        let (depth, stats) = match &self.nodes[index] {
            DNode::Undecided(n) => (n.depth, NodeStats::default()),
            DNode::Decided(n) => (n.depth, n.stats),
            DNode::Leaf(n) => (n.depth, n.stats),
        };
        self.nodes[index] = DNode::Leaf(LeafNode {
            depth,
            prediction,
            stats,
        });
    }

    /// Follows split decisions from `start` until a node that is not a
    /// decided split. Rows are normally re-assigned one layer at a
    /// time; this deeper walk covers the tail after the layer loop
    /// stops (depth ceiling reached with splits in the final layer).
    pub fn descend<F: Fn(ColIndex) -> f64>(&self, start: NodeIndex, value_of: F) -> NodeIndex {
        let mut at = start;
        while let Some(split) = self.nodes[at].split() {
            at = split.child_for(value_of(split.column));
        }
        at
    }

    /// Indices of nodes that are not decided splits: the nodes that
    /// will carry predictions.
    pub fn leaf_indices(&self) -> Vec<NodeIndex> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.split().is_none())
            .map(|(i, _)| i)
            .collect()
    }

    /// Freezes the tree for the model. Every non-split node must have
    /// been converted to a leaf first.
    pub fn compile(&self) -> Result<CompiledTree> {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                DNode::Decided(DecidedNode {
                    decision: Decision::Split(split),
                    ..
                }) => nodes.push(FrozenNode::Split {
                    column: split.column,
                    kind: split.kind.clone(),
                    missing: split.missing,
                    left: split.left,
                    right: split.right,
                }),
                DNode::Leaf(leaf) => nodes.push(FrozenNode::Leaf {
                    prediction: leaf.prediction,
                }),
                _ => {
                    return Err(ChunktreeError::internal(format!(
                        "cannot compile: node {} was never finished",
                        i
                    )))
                }
            }
        }
        Ok(CompiledTree {
            nodes,
            depth: self.depth,
        })
    }
}

/// A frozen tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FrozenNode {
    /// Internal split node.
    Split {
        /// Split column.
        column: ColIndex,
        /// Routing rule.
        kind: SplitKind,
        /// Missing-value side.
        missing: MissingSide,
        /// Left child index.
        left: NodeIndex,
        /// Right child index.
        right: NodeIndex,
    },
    /// Terminal node.
    Leaf {
        /// Prediction contributed by this leaf.
        prediction: Score,
    },
}

/// An immutable, scorable tree as stored in the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledTree {
    nodes: Vec<FrozenNode>,
    depth: usize,
}

impl CompiledTree {
    /// Tree depth.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of leaves.
    pub fn num_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, FrozenNode::Leaf { .. }))
            .count()
    }

    /// Scores one row, reading column values through `value_of`.
    pub fn score_row<F: Fn(ColIndex) -> f64>(&self, value_of: F) -> Score {
        let mut at = 0usize;
        loop {
            match &self.nodes[at] {
                FrozenNode::Leaf { prediction } => return *prediction,
                FrozenNode::Split {
                    column,
                    kind,
                    missing,
                    left,
                    right,
                } => {
                    let value = value_of(*column);
                    let go_left = if value.is_nan() {
                        *missing == MissingSide::Left
                    } else {
                        match kind {
                            SplitKind::Numeric { threshold } => value < *threshold,
                            SplitKind::Categorical { left_set } => {
                                left_set.contains(value as usize)
                            }
                        }
                    };
                    at = if go_left { *left } else { *right };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_hists() -> Vec<Histogram> {
        vec![
            Histogram::numeric(0.0, 10.0, 4),
            Histogram::numeric(-1.0, 1.0, 4),
        ]
    }

    fn split_root(tree: &mut DTree) -> (NodeIndex, NodeIndex) {
        let stats = NodeStats {
            count: 10.0,
            sum: 5.0,
            ssq: 30.0,
        };
        tree.decide_split(
            0,
            0,
            1,
            SplitKind::Numeric { threshold: 5.0 },
            MissingSide::Left,
            stats,
            4.0,
            6.0,
            4.0,
            two_hists(),
            two_hists(),
        )
    }

    #[test]
    fn test_new_tree_is_single_undecided_root() {
        let tree = DTree::new(two_hists());
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.leafs(), 0);
        assert!(matches!(tree.node(0), DNode::Undecided(_)));
    }

    #[test]
    fn test_decide_split_creates_children_atomically() {
        let mut tree = DTree::new(two_hists());
        let (left, right) = split_root(&mut tree);
        assert_eq!((left, right), (1, 2));
        assert_eq!(tree.len(), 3);
        assert!(tree.node(0).split().is_some());
        assert!(matches!(tree.node(1), DNode::Undecided(_)));
        assert!(matches!(tree.node(2), DNode::Undecided(_)));
        assert_eq!(tree.node(1).depth(), 1);
    }

    #[test]
    fn test_depth_grows_at_most_one_per_layer() {
        let mut tree = DTree::new(two_hists());
        split_root(&mut tree);
        let before = tree.depth();
        tree.advance_frontier(1);
        assert_eq!(tree.depth(), before + 1);
        // A layer with no new leaves leaves the depth unchanged.
        tree.decide_terminal(1, NodeStats::default());
        tree.decide_terminal(2, NodeStats::default());
        tree.advance_frontier(3);
        assert_eq!(tree.depth(), before + 1);
    }

    #[test]
    fn test_descend_follows_splits() {
        let mut tree = DTree::new(two_hists());
        split_root(&mut tree);
        tree.advance_frontier(1);
        assert_eq!(tree.descend(0, |_| 3.0), 1);
        assert_eq!(tree.descend(0, |_| 7.0), 2);
        assert_eq!(tree.descend(0, |_| f64::NAN), 1);
        assert_eq!(tree.descend(1, |_| 3.0), 1);
    }

    #[test]
    fn test_compile_requires_finished_nodes() {
        let mut tree = DTree::new(two_hists());
        split_root(&mut tree);
        tree.advance_frontier(1);
        assert!(tree.compile().is_err());
        tree.to_leaf(1, 0.5);
        tree.to_leaf(2, -0.5);
        let compiled = tree.compile().unwrap();
        assert_eq!(compiled.num_nodes(), 3);
        assert_eq!(compiled.num_leaves(), 2);
        assert_eq!(compiled.depth(), 1);
        assert_eq!(compiled.score_row(|_| 3.0), 0.5);
        assert_eq!(compiled.score_row(|_| 8.0), -0.5);
    }

    #[test]
    fn test_compiled_tree_serialization_round_trip() {
        let mut tree = DTree::new(two_hists());
        split_root(&mut tree);
        tree.advance_frontier(1);
        tree.to_leaf(1, 1.0);
        tree.to_leaf(2, 2.0);
        let compiled = tree.compile().unwrap();
        let json = serde_json::to_string(&compiled).unwrap();
        let back: CompiledTree = serde_json::from_str(&json).unwrap();
        assert_eq!(compiled, back);
    }
}
