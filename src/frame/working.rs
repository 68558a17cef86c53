//! Per-class working columns, kept as an overlay over the frame.
//!
//! Each class `k` owns three columns for the in-progress build: the
//! running sum of tree outputs (`tree`), the current working response
//! (`work`), and the per-row node assignment (`nids`). The overlay is
//! created at build start, handed to class `k`'s layer task for
//! exclusive mutation, and dropped when the build finishes, so nothing
//! of it leaks into the persisted model.

use crate::core::types::{NodeId, NID_EXCLUDED};
use crate::frame::column::{Column, NodeIdColumn};
use crate::frame::Frame;
use rayon::prelude::*;

/// The working columns owned by one class.
#[derive(Debug, Clone)]
pub struct ClassColumns {
    /// Sum of this class's tree outputs across completed trees.
    pub tree: Column,
    /// Working response the in-progress tree is fit against.
    pub work: Column,
    /// Current node assignment per row.
    pub nids: NodeIdColumn,
}

/// The full overlay: one [`ClassColumns`] per class.
#[derive(Debug)]
pub struct WorkingSet {
    classes: Vec<ClassColumns>,
}

impl WorkingSet {
    /// Creates zeroed working columns for `nclass` classes, with every
    /// row initially excluded until [`reset_assignments`] runs.
    ///
    /// [`reset_assignments`]: WorkingSet::reset_assignments
    pub fn new(frame: &Frame, nclass: usize) -> Self {
        let layout = frame.layout();
        let classes = (0..nclass)
            .map(|_| ClassColumns {
                tree: Column::zeros(layout),
                work: Column::zeros(layout),
                nids: NodeIdColumn::excluded(layout),
            })
            .collect();
        WorkingSet { classes }
    }

    /// Number of classes.
    pub fn nclass(&self) -> usize {
        self.classes.len()
    }

    /// Class `k`'s columns.
    pub fn class(&self, k: usize) -> &ClassColumns {
        &self.classes[k]
    }

    /// Mutable access to class `k`'s columns.
    pub fn class_mut(&mut self, k: usize) -> &mut ClassColumns {
        &mut self.classes[k]
    }

    /// Splits the overlay into one exclusive borrow per class, so the
    /// K per-class layer tasks can run in parallel without sharing any
    /// mutable state.
    pub fn classes_mut(&mut self) -> &mut [ClassColumns] {
        &mut self.classes
    }

    /// Points every participating row at the root node and tags the
    /// rest as excluded, in one pass over the data.
    ///
    /// A row is excluded for class `k` when its response is missing or
    /// when the class has no rows in `distribution`. Runs at build
    /// start and again at the start of every round; missing-response
    /// rows therefore stay at [`NID_EXCLUDED`] for the entire build.
    pub fn reset_assignments(&mut self, frame: &Frame, distribution: &[f64]) {
        self.classes
            .par_iter_mut()
            .enumerate()
            .for_each(|(k, cols)| {
                let empty_class = distribution.get(k).copied().unwrap_or(0.0) == 0.0;
                for ci in 0..frame.num_chunks() {
                    let resp = frame.response().chunk(ci);
                    let nids = cols.nids.chunk_mut(ci);
                    for (row, nid) in nids.iter_mut().enumerate() {
                        *nid = if empty_class || resp[row].is_nan() {
                            NID_EXCLUDED
                        } else {
                            0 as NodeId
                        };
                    }
                }
            });
    }
}
