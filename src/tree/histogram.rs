//! Per-(node, column) binned sufficient statistics.
//!
//! A histogram fixes its bin boundaries at creation time from the
//! column range observed so far, so sibling histograms built in the
//! same layer are directly comparable. Each bin accumulates the row
//! count, working-response sum and sum of squares, and the min/max of
//! the column value seen in the bin; the per-bin extremes are what
//! lets a child histogram start from a tighter range than its parent.
//!
//! Merging is element-wise add / min / max, hence associative and
//! commutative: chunk sub-tasks can combine in any order.

use crate::core::types::BinIndex;
use serde::{Deserialize, Serialize};

/// One histogram bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    /// Rows accumulated into this bin.
    pub count: f64,
    /// Sum of the working response over those rows.
    pub sum: f64,
    /// Sum of squares of the working response.
    pub ssq: f64,
    /// Smallest column value seen in this bin.
    pub min: f64,
    /// Largest column value seen in this bin.
    pub max: f64,
}

impl Bin {
    fn empty() -> Self {
        Bin {
            count: 0.0,
            sum: 0.0,
            ssq: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    fn merge(&mut self, other: &Bin) {
        self.count += other.count;
        self.sum += other.sum;
        self.ssq += other.ssq;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }
}

/// Sufficient statistics of the working response over a set of rows.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeStats {
    /// Row count.
    pub count: f64,
    /// Working-response sum.
    pub sum: f64,
    /// Working-response sum of squares.
    pub ssq: f64,
}

impl NodeStats {
    /// Accumulates one row.
    pub fn add(&mut self, work: f64) {
        self.count += 1.0;
        self.sum += work;
        self.ssq += work * work;
    }

    /// Merges another accumulator into this one.
    pub fn merge(&mut self, other: &NodeStats) {
        self.count += other.count;
        self.sum += other.sum;
        self.ssq += other.ssq;
    }

    /// Squared error around the mean; zero for an empty set.
    pub fn se(&self) -> f64 {
        if self.count <= 0.0 {
            return 0.0;
        }
        (self.ssq - self.sum * self.sum / self.count).max(0.0)
    }

    /// Mean working response; zero for an empty set.
    pub fn mean(&self) -> f64 {
        if self.count <= 0.0 {
            0.0
        } else {
            self.sum / self.count
        }
    }
}

/// A per-(node, column) histogram with boundaries fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// Creation-time lower bound of the binned range.
    min: f64,
    /// Creation-time upper bound of the binned range.
    max: f64,
    /// Bin width; zero for degenerate or categorical histograms.
    step: f64,
    /// Categorical histograms bin by category id, one bin per level.
    categorical: bool,
    bins: Vec<Bin>,
}

impl Histogram {
    /// A numeric histogram over `[min, max]` with up to `nbins` bins.
    /// A degenerate range (min == max, or no observed rows) collapses
    /// to a single bin, which offers no split candidates.
    pub fn numeric(min: f64, max: f64, nbins: usize) -> Self {
        let degenerate = !(max > min) || min.is_nan() || max.is_nan();
        let nbins = if degenerate { 1 } else { nbins.max(2) };
        let (min, max) = if degenerate && (min.is_nan() || max.is_nan()) {
            (0.0, 0.0)
        } else {
            (min, max)
        };
        let step = if degenerate {
            0.0
        } else {
            (max - min) / nbins as f64
        };
        Histogram {
            min,
            max,
            step,
            categorical: false,
            bins: vec![Bin::empty(); nbins],
        }
    }

    /// A categorical histogram with one bin per category id.
    pub fn categorical(cardinality: usize) -> Self {
        Histogram {
            min: 0.0,
            max: cardinality.max(1) as f64,
            step: 0.0,
            categorical: true,
            bins: vec![Bin::empty(); cardinality.max(1)],
        }
    }

    /// An empty histogram with this one's exact bin layout.
    pub fn empty_like(&self) -> Self {
        Histogram {
            min: self.min,
            max: self.max,
            step: self.step,
            categorical: self.categorical,
            bins: vec![Bin::empty(); self.bins.len()],
        }
    }

    /// True for categorical histograms.
    pub fn is_categorical(&self) -> bool {
        self.categorical
    }

    /// Number of bins.
    pub fn num_bins(&self) -> usize {
        self.bins.len()
    }

    /// Read access to the bins.
    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    /// Bin index for a non-missing column value, clamped into range.
    pub fn bin_of(&self, value: f64) -> BinIndex {
        if self.categorical {
            let id = value as usize;
            return id.min(self.bins.len() - 1);
        }
        if self.step == 0.0 {
            return 0;
        }
        let idx = ((value - self.min) / self.step).floor() as i64;
        idx.clamp(0, self.bins.len() as i64 - 1) as BinIndex
    }

    /// Accumulates one row. The caller must skip missing column values;
    /// they are routed by policy at split time, not binned.
    pub fn accumulate(&mut self, value: f64, work: f64) {
        let idx = self.bin_of(value);
        let bin = &mut self.bins[idx];
        bin.count += 1.0;
        bin.sum += work;
        bin.ssq += work * work;
        bin.min = bin.min.min(value);
        bin.max = bin.max.max(value);
    }

    /// Merges another histogram with the same layout into this one.
    pub fn merge(&mut self, other: &Histogram) {
        debug_assert_eq!(self.bins.len(), other.bins.len());
        for (a, b) in self.bins.iter_mut().zip(other.bins.iter()) {
            a.merge(b);
        }
    }

    /// Aggregate statistics over every bin.
    pub fn total(&self) -> NodeStats {
        let mut stats = NodeStats::default();
        for bin in &self.bins {
            stats.count += bin.count;
            stats.sum += bin.sum;
            stats.ssq += bin.ssq;
        }
        stats
    }

    /// The real-valued threshold separating bins `0..=bin` from the
    /// rest. Rows with `value < threshold` go left.
    pub fn threshold_after(&self, bin: BinIndex) -> f64 {
        self.min + self.step * (bin as f64 + 1.0)
    }

    /// Observed `(min, max)` over a subset of bins, falling back to the
    /// creation-time range when the subset holds no rows. Used to give
    /// child histograms a tighter range than their parent.
    pub fn observed_range_over<I: Iterator<Item = BinIndex>>(&self, bins: I) -> (f64, f64) {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for b in bins {
            let bin = &self.bins[b];
            if bin.count > 0.0 {
                min = min.min(bin.min);
                max = max.max(bin.max);
            }
        }
        if min > max {
            (self.min, self.max)
        } else {
            (min, max)
        }
    }

    /// Observed range over all bins.
    pub fn observed_range(&self) -> (f64, f64) {
        self.observed_range_over(0..self.bins.len())
    }
}
