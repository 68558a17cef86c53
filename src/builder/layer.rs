//! One fused score-and-build pass over the data, for one class.
//!
//! The pass does two conceptual jobs in a single scan of the chunks:
//!
//! 1. Re-score every row whose assigned node was decided in the
//!    previous layer, writing its new child assignment into `nids`.
//! 2. Accumulate fresh histograms (and node statistics) for whichever
//!    frontier node each row lands in.
//!
//! Chunk sub-tasks fold into local accumulators that merge with an
//! associative combine, so the reduction can run on any worker in any
//! order. Nothing reads a frontier node's histograms until the whole
//! pass has completed; the decisions then happen behind the barrier.

use crate::builder::variant::TreeVariant;
use crate::config::BuildParams;
use crate::core::error::Result;
use crate::core::types::NodeId;
use crate::core::utils::AtomicF64Vec;
use crate::frame::{ClassColumns, Frame};
use crate::tree::dtree::DTree;
use crate::tree::histogram::{Histogram, NodeStats};
use crate::tree::node::SplitKind;
use crate::tree::split::SplitCandidate;
use rayon::prelude::*;

/// Per-frontier-node accumulation local to one chunk sub-task.
struct LayerAcc {
    hists: Vec<Vec<Histogram>>,
    stats: Vec<NodeStats>,
}

impl LayerAcc {
    fn empty_like(skeletons: &[Vec<Histogram>]) -> Self {
        LayerAcc {
            hists: skeletons
                .iter()
                .map(|cols| cols.iter().map(|h| h.empty_like()).collect())
                .collect(),
            stats: vec![NodeStats::default(); skeletons.len()],
        }
    }

    fn merge(mut self, other: LayerAcc) -> Self {
        for (mine, theirs) in self.hists.iter_mut().zip(other.hists.iter()) {
            for (a, b) in mine.iter_mut().zip(theirs.iter()) {
                a.merge(b);
            }
        }
        for (a, b) in self.stats.iter_mut().zip(other.stats.iter()) {
            a.merge(b);
        }
        self
    }
}

/// Builds one layer of class `k`'s tree: the fused pass, then the
/// decisions for every frontier node. Returns whether any node split.
pub fn build_layer(
    frame: &Frame,
    cols: &mut ClassColumns,
    tree: &mut DTree,
    variant: &dyn TreeVariant,
    params: &BuildParams,
    improvements: &AtomicF64Vec,
) -> Result<bool> {
    let leaf0 = tree.leafs();
    let tmax = tree.len();
    if leaf0 >= tmax {
        return Ok(false);
    }

    // Empty clones of the frontier's skeletons define the bin layout
    // every chunk sub-task accumulates into.
    let skeletons: Vec<Vec<Histogram>> = (leaf0..tmax)
        .map(|i| tree.undecided(i).hists.iter().map(|h| h.empty_like()).collect())
        .collect();

    let acc = fused_pass(frame, cols, tree, leaf0, &skeletons);

    // Barrier passed: turn every frontier node into a decision.
    let mut did_split = false;
    for leaf in leaf0..tmax {
        let slot = leaf - leaf0;
        let stats = acc.stats[slot];
        match variant.make_decision(&stats, &acc.hists[slot], params.min_rows_per_leaf) {
            Some(cand) => {
                let (left_hists, right_hists) =
                    child_skeletons(&acc.hists[slot], &cand, params.nbins);
                let improvement = cand.improvement_over(&stats);
                tree.decide_split(
                    leaf,
                    cand.column,
                    cand.bin,
                    cand.kind,
                    params.missing_side,
                    stats,
                    cand.se,
                    cand.left.count,
                    cand.right.count,
                    left_hists,
                    right_hists,
                );
                improvements.add(cand.column, improvement);
                did_split = true;
            }
            None => tree.decide_terminal(leaf, stats),
        }
    }

    tree.advance_frontier(tmax);
    Ok(did_split)
}

/// The chunk-parallel scan: re-assign rows out of decided nodes, then
/// accumulate each active row into its frontier node's histograms.
fn fused_pass(
    frame: &Frame,
    cols: &mut ClassColumns,
    tree: &DTree,
    leaf0: usize,
    skeletons: &[Vec<Histogram>],
) -> LayerAcc {
    let ncols = frame.ncols();
    let nids = &mut cols.nids;
    let work = &cols.work;

    // Chunk results are folded in chunk order: float accumulation is
    // then independent of work stealing, so identical inputs produce
    // bit-identical histograms (and therefore bit-identical trees).
    let locals: Vec<LayerAcc> = nids
        .chunks_mut()
        .par_iter_mut()
        .enumerate()
        .map(|(ci, nid_chunk)| {
            let work_chunk = work.chunk(ci);
            let mut local = LayerAcc::empty_like(skeletons);
            for (row, slot) in nid_chunk.iter_mut().enumerate() {
                let mut nid = *slot;
                if nid < 0 {
                    continue;
                }
                // Rows still pointing at a node split last layer take
                // exactly one step down into a frontier child.
                if let Some(split) = tree.node(nid as usize).split() {
                    let value = frame.feature(split.column).chunk(ci)[row];
                    nid = split.child_for(value) as NodeId;
                    *slot = nid;
                }
                let node = nid as usize;
                if node < leaf0 {
                    // Resting in a do-not-split node from an earlier
                    // layer; it will become a leaf.
                    continue;
                }
                let at = node - leaf0;
                let w = work_chunk[row];
                local.stats[at].add(w);
                for c in 0..ncols {
                    let value = frame.feature(c).chunk(ci)[row];
                    if !value.is_nan() {
                        local.hists[at][c].accumulate(value, w);
                    }
                }
            }
            local
        })
        .collect();
    locals
        .into_iter()
        .fold(LayerAcc::empty_like(skeletons), LayerAcc::merge)
}

/// Histogram skeletons for a fresh pair of children. Every column
/// starts from the parent's observed range; the split column is
/// narrowed to the rows that actually route to each side.
fn child_skeletons(
    hists: &[Histogram],
    cand: &SplitCandidate,
    nbins: usize,
) -> (Vec<Histogram>, Vec<Histogram>) {
    let mut left = Vec::with_capacity(hists.len());
    let mut right = Vec::with_capacity(hists.len());
    for (c, hist) in hists.iter().enumerate() {
        if hist.is_categorical() {
            left.push(hist.empty_like());
            right.push(hist.empty_like());
            continue;
        }
        let (l_range, r_range) = if c == cand.column {
            split_column_ranges(hist, cand)
        } else {
            let range = hist.observed_range();
            (range, range)
        };
        left.push(Histogram::numeric(l_range.0, l_range.1, nbins));
        right.push(Histogram::numeric(r_range.0, r_range.1, nbins));
    }
    (left, right)
}

fn split_column_ranges(hist: &Histogram, cand: &SplitCandidate) -> ((f64, f64), (f64, f64)) {
    match &cand.kind {
        SplitKind::Numeric { .. } => (
            hist.observed_range_over(0..=cand.bin),
            hist.observed_range_over(cand.bin + 1..hist.num_bins()),
        ),
        // A categorical candidate on a numeric histogram cannot occur;
        // numeric ranges only make sense for numeric kinds.
        SplitKind::Categorical { .. } => {
            let range = hist.observed_range();
            (range, range)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::variant::GradientBoosting;
    use crate::core::types::{ColumnKind, NID_EXCLUDED};
    use crate::frame::WorkingSet;

    /// A regression frame where x < 4 has response 0 and x >= 4 has
    /// response 10, split across three chunks.
    fn stepped_frame() -> Frame {
        let x: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let y: Vec<f64> = (0..8).map(|i| if i < 4 { 0.0 } else { 10.0 }).collect();
        Frame::new(
            vec![
                ("x".to_string(), ColumnKind::Numeric, x),
                ("y".to_string(), ColumnKind::Numeric, y),
            ],
            3,
        )
        .unwrap()
    }

    fn root_tree(frame: &Frame, nbins: usize) -> DTree {
        let hists = frame
            .observed_ranges()
            .into_iter()
            .map(|(lo, hi)| Histogram::numeric(lo, hi, nbins))
            .collect();
        DTree::new(hists)
    }

    fn prepared_working(frame: &Frame) -> WorkingSet {
        let mut ws = WorkingSet::new(frame, 1);
        ws.reset_assignments(frame, &[1.0]);
        let variant = GradientBoosting::new(1);
        variant.update_working(frame, 0.0, &mut ws);
        ws
    }

    #[test]
    fn test_first_layer_splits_root() {
        let frame = stepped_frame();
        let mut ws = prepared_working(&frame);
        let mut tree = root_tree(&frame, 8);
        let variant = GradientBoosting::new(1);
        let improvements = AtomicF64Vec::zeros(frame.ncols());
        let params = BuildParams::builder().min_rows_per_leaf(1).build();

        let did = build_layer(
            &frame,
            ws.class_mut(0),
            &mut tree,
            &variant,
            &params,
            &improvements,
        )
        .unwrap();
        assert!(did);
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.leafs(), 1);
        let split = tree.node(0).split().unwrap();
        assert_eq!(split.column, 0);
        assert_eq!(split.left_count, 4.0);
        assert_eq!(split.right_count, 4.0);
        assert!(improvements.get(0) > 0.0);
    }

    #[test]
    fn test_second_layer_reassigns_rows_and_terminates() {
        let frame = stepped_frame();
        let mut ws = prepared_working(&frame);
        let mut tree = root_tree(&frame, 8);
        let variant = GradientBoosting::new(1);
        let improvements = AtomicF64Vec::zeros(frame.ncols());
        let params = BuildParams::builder().min_rows_per_leaf(1).build();

        build_layer(&frame, ws.class_mut(0), &mut tree, &variant, &params, &improvements).unwrap();
        // Children carry constant working responses: no further split.
        let did = build_layer(
            &frame,
            ws.class_mut(0),
            &mut tree,
            &variant,
            &params,
            &improvements,
        )
        .unwrap();
        assert!(!did);
        // Depth grew exactly once over both layers.
        assert_eq!(tree.depth(), 1);
        // Every row now sits in one of the two children.
        let nids: Vec<NodeId> = ws.class(0).nids.values().collect();
        assert!(nids.iter().all(|&n| n == 1 || n == 2));
        let low: Vec<NodeId> = nids[..4].to_vec();
        assert!(low.iter().all(|&n| n == 1));
        assert!(nids[4..].iter().all(|&n| n == 2));
    }

    #[test]
    fn test_excluded_rows_never_accumulate() {
        let x: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let mut y: Vec<f64> = (0..8).map(|i| if i < 4 { 0.0 } else { 10.0 }).collect();
        y[2] = f64::NAN;
        let frame = Frame::new(
            vec![
                ("x".to_string(), ColumnKind::Numeric, x),
                ("y".to_string(), ColumnKind::Numeric, y),
            ],
            3,
        )
        .unwrap();
        let mut ws = prepared_working(&frame);
        let mut tree = root_tree(&frame, 8);
        let variant = GradientBoosting::new(1);
        let improvements = AtomicF64Vec::zeros(frame.ncols());
        let params = BuildParams::builder().min_rows_per_leaf(1).build();
        build_layer(&frame, ws.class_mut(0), &mut tree, &variant, &params, &improvements).unwrap();

        // The NA row stayed excluded and was not counted anywhere.
        let nids: Vec<NodeId> = ws.class(0).nids.values().collect();
        assert_eq!(nids[2], NID_EXCLUDED);
        let split = tree.node(0).split().unwrap();
        assert_eq!(split.left_count + split.right_count, 7.0);
    }
}
