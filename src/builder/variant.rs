//! The algorithm-variant capability interface.
//!
//! Tree-type-specific behavior lives behind one small trait instead of
//! an inheritance chain: how a node's histograms become a decision, how
//! the per-row working response is refreshed each round, and how a
//! finished leaf turns its accumulated sums into a prediction. The
//! driver and layer builder only ever talk to this trait, so a new
//! variant (e.g. a sampled forest) plugs in without touching them.

use crate::core::types::{DataSize, Score};
use crate::frame::{Frame, WorkingSet};
use crate::tree::histogram::{Histogram, NodeStats};
use crate::tree::split::{find_best_split, SplitCandidate};
use rayon::prelude::*;

/// Capability interface implemented per algorithm variant.
pub trait TreeVariant: Send + Sync {
    /// Decides one frontier node from its merged histograms: a split
    /// candidate, or `None` to mark the node do-not-split.
    fn make_decision(
        &self,
        stats: &NodeStats,
        hists: &[Histogram],
        min_rows: DataSize,
    ) -> Option<SplitCandidate>;

    /// Refreshes every class's working response at the start of a
    /// round, from the response and the accumulated tree sums.
    fn update_working(&self, frame: &Frame, init_f: f64, working: &mut WorkingSet);

    /// Per-row contribution to the leaf-gamma denominator.
    fn gamma_denominator(&self, work: f64) -> f64;

    /// Unshrunken leaf prediction from the accumulated gamma sums.
    fn leaf_value(&self, num: f64, den: f64) -> Score;
}

/// Squared-error gradient boosting: plain residuals for regression,
/// softmax residuals with the multinomial gamma for classification.
#[derive(Debug, Clone)]
pub struct GradientBoosting {
    nclass: usize,
}

impl GradientBoosting {
    /// A variant for `nclass` response classes (1 = regression).
    pub fn new(nclass: usize) -> Self {
        GradientBoosting { nclass }
    }

    /// Softmax probabilities per chunk, laid out `[class * len + row]`.
    fn chunk_probabilities(&self, working: &WorkingSet, ci: usize, len: usize) -> Vec<f64> {
        let nclass = self.nclass;
        let mut probs = vec![0.0; nclass * len];
        let mut scores = vec![0.0; nclass];
        for row in 0..len {
            let mut max = f64::NEG_INFINITY;
            for (k, score) in scores.iter_mut().enumerate() {
                *score = working.class(k).tree.chunk(ci)[row];
                max = max.max(*score);
            }
            let mut sum = 0.0;
            for score in scores.iter_mut() {
                *score = (*score - max).exp();
                sum += *score;
            }
            for k in 0..nclass {
                probs[k * len + row] = scores[k] / sum;
            }
        }
        probs
    }
}

impl TreeVariant for GradientBoosting {
    fn make_decision(
        &self,
        stats: &NodeStats,
        hists: &[Histogram],
        min_rows: DataSize,
    ) -> Option<SplitCandidate> {
        find_best_split(hists, stats, min_rows)
    }

    fn update_working(&self, frame: &Frame, init_f: f64, working: &mut WorkingSet) {
        if self.nclass == 1 {
            let cols = working.class_mut(0);
            let tree = &cols.tree;
            cols.work
                .chunks_mut()
                .par_iter_mut()
                .enumerate()
                .for_each(|(ci, work_chunk)| {
                    let resp = frame.response().chunk(ci);
                    let tree_chunk = tree.chunk(ci);
                    for (row, w) in work_chunk.iter_mut().enumerate() {
                        let y = resp[row];
                        *w = if y.is_nan() {
                            0.0
                        } else {
                            y - (init_f + tree_chunk[row])
                        };
                    }
                });
            return;
        }

        // Classification: probabilities first (read-only over the
        // overlay), residuals second (one exclusive pass per class).
        let snapshot: &WorkingSet = working;
        let probs: Vec<Vec<f64>> = (0..frame.num_chunks())
            .into_par_iter()
            .map(|ci| self.chunk_probabilities(snapshot, ci, frame.layout().chunk_len(ci)))
            .collect();
        working
            .classes_mut()
            .par_iter_mut()
            .enumerate()
            .for_each(|(k, cols)| {
                for ci in 0..frame.num_chunks() {
                    let resp = frame.response().chunk(ci);
                    let len = resp.len();
                    let work = cols.work.chunk_mut(ci);
                    for (row, w) in work.iter_mut().enumerate() {
                        let y = resp[row];
                        *w = if y.is_nan() {
                            0.0
                        } else {
                            let y_k = if y as usize == k { 1.0 } else { 0.0 };
                            y_k - probs[ci][k * len + row]
                        };
                    }
                }
            });
    }

    fn gamma_denominator(&self, work: f64) -> f64 {
        if self.nclass == 1 {
            1.0
        } else {
            let a = work.abs();
            a * (1.0 - a)
        }
    }

    fn leaf_value(&self, num: f64, den: f64) -> Score {
        if den.abs() < 1e-12 {
            return 0.0;
        }
        if self.nclass == 1 {
            num / den
        } else {
            let k = self.nclass as f64;
            (k - 1.0) / k * (num / den)
        }
    }
}
