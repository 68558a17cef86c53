//! Histogram-based split search.
//!
//! For every column and every candidate boundary, the squared-error
//! reduction is computed from bin prefix statistics alone; no raw rows
//! are rescanned. The globally best candidate wins, with ties broken
//! by lowest column index, then lowest boundary index, so repeated
//! runs over the same histograms pick the same split.

use crate::core::types::{BinIndex, ColIndex, DataSize};
use crate::tree::histogram::{Histogram, NodeStats};
use crate::tree::node::{CategorySet, SplitKind};

/// A candidate split, before children exist.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitCandidate {
    /// Split column.
    pub column: ColIndex,
    /// Boundary bin index (position in response-mean order for
    /// categorical columns).
    pub bin: BinIndex,
    /// Routing rule.
    pub kind: SplitKind,
    /// Combined squared error of the two sides.
    pub se: f64,
    /// Left-side statistics.
    pub left: NodeStats,
    /// Right-side statistics.
    pub right: NodeStats,
}

/// Finds the best split over a node's histograms, or `None` when no
/// candidate both improves the squared error and keeps `min_rows` on
/// each side.
pub fn find_best_split(
    hists: &[Histogram],
    stats: &NodeStats,
    min_rows: DataSize,
) -> Option<SplitCandidate> {
    if stats.count < 2.0 * min_rows as f64 {
        return None;
    }
    let mut best: Option<SplitCandidate> = None;
    for (column, hist) in hists.iter().enumerate() {
        let candidate = if hist.is_categorical() {
            best_categorical_split(column, hist, min_rows)
        } else {
            best_numeric_split(column, hist, min_rows)
        };
        if let Some(cand) = candidate {
            // Strict comparison keeps the earlier (lower column, lower
            // bin) candidate on equal error.
            let better = match &best {
                None => true,
                Some(b) => cand.se < b.se,
            };
            if better {
                best = Some(cand);
            }
        }
    }
    let best = best?;
    if best.se < stats.se() {
        Some(best)
    } else {
        None
    }
}

fn best_numeric_split(
    column: ColIndex,
    hist: &Histogram,
    min_rows: DataSize,
) -> Option<SplitCandidate> {
    let total = hist.total();
    let mut best: Option<SplitCandidate> = None;
    let mut left = NodeStats::default();
    for bin in 0..hist.num_bins().saturating_sub(1) {
        let b = &hist.bins()[bin];
        left.count += b.count;
        left.sum += b.sum;
        left.ssq += b.ssq;
        let right = NodeStats {
            count: total.count - left.count,
            sum: total.sum - left.sum,
            ssq: total.ssq - left.ssq,
        };
        if left.count < min_rows as f64 || right.count < min_rows as f64 {
            continue;
        }
        let se = left.se() + right.se();
        if se >= total.se() {
            continue;
        }
        let better = best.as_ref().map_or(true, |b| se < b.se);
        if better {
            best = Some(SplitCandidate {
                column,
                bin,
                kind: SplitKind::Numeric {
                    threshold: hist.threshold_after(bin),
                },
                se,
                left,
                right,
            });
        }
    }
    best
}

fn best_categorical_split(
    column: ColIndex,
    hist: &Histogram,
    min_rows: DataSize,
) -> Option<SplitCandidate> {
    let total = hist.total();
    // Scan category ids in response-mean order; ties fall back to the
    // id so the order, and therefore the chosen subset, is stable.
    let mut order: Vec<BinIndex> = (0..hist.num_bins())
        .filter(|&b| hist.bins()[b].count > 0.0)
        .collect();
    order.sort_by(|&a, &b| {
        let ma = hist.bins()[a].sum / hist.bins()[a].count;
        let mb = hist.bins()[b].sum / hist.bins()[b].count;
        ma.partial_cmp(&mb)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    if order.len() < 2 {
        return None;
    }
    let mut best: Option<SplitCandidate> = None;
    let mut left = NodeStats::default();
    for position in 0..order.len() - 1 {
        let b = &hist.bins()[order[position]];
        left.count += b.count;
        left.sum += b.sum;
        left.ssq += b.ssq;
        let right = NodeStats {
            count: total.count - left.count,
            sum: total.sum - left.sum,
            ssq: total.ssq - left.ssq,
        };
        if left.count < min_rows as f64 || right.count < min_rows as f64 {
            continue;
        }
        let se = left.se() + right.se();
        if se >= total.se() {
            continue;
        }
        let better = best.as_ref().map_or(true, |b| se < b.se);
        if better {
            let mut left_set = CategorySet::new(hist.num_bins());
            for &cat in &order[..=position] {
                left_set.insert(cat);
            }
            best = Some(SplitCandidate {
                column,
                bin: position,
                kind: SplitKind::Categorical { left_set },
                se,
                left,
                right,
            });
        }
    }
    best
}

impl SplitCandidate {
    /// Squared-error improvement relative to the undivided node.
    /// Candidates are missing-side agnostic; the configured side is
    /// stamped on when the split is installed in the tree.
    pub fn improvement_over(&self, stats: &NodeStats) -> f64 {
        (stats.se() - self.se).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hist_from(values: &[(f64, f64)], min: f64, max: f64, nbins: usize) -> Histogram {
        let mut h = Histogram::numeric(min, max, nbins);
        for &(v, w) in values {
            h.accumulate(v, w);
        }
        h
    }

    #[test]
    fn test_clear_numeric_split_found() {
        // Low half of the column carries work 0, high half work 10.
        let rows: Vec<(f64, f64)> = (0..8)
            .map(|i| (i as f64, if i < 4 { 0.0 } else { 10.0 }))
            .collect();
        let h = hist_from(&rows, 0.0, 8.0, 8);
        let stats = h.total();
        let cand = find_best_split(&[h], &stats, 1).unwrap();
        assert_eq!(cand.column, 0);
        assert_eq!(cand.bin, 3);
        assert_eq!(cand.left.count, 4.0);
        assert_eq!(cand.right.count, 4.0);
        assert!(cand.se < 1e-9);
        match cand.kind {
            SplitKind::Numeric { threshold } => assert!((threshold - 4.0).abs() < 1e-9),
            _ => panic!("expected a numeric split"),
        }
    }

    #[test]
    fn test_min_rows_rejects_split() {
        let rows: Vec<(f64, f64)> = (0..8)
            .map(|i| (i as f64, if i < 4 { 0.0 } else { 10.0 }))
            .collect();
        let h = hist_from(&rows, 0.0, 8.0, 8);
        let stats = h.total();
        // Each side would hold 4 rows; demanding 5 forbids every cut.
        assert!(find_best_split(&[h], &stats, 5).is_none());
    }

    #[test]
    fn test_constant_work_is_terminal() {
        let rows: Vec<(f64, f64)> = (0..8).map(|i| (i as f64, 3.0)).collect();
        let h = hist_from(&rows, 0.0, 8.0, 8);
        let stats = h.total();
        assert!(find_best_split(&[h], &stats, 1).is_none());
    }

    #[test]
    fn test_tie_broken_by_lower_column_then_bin() {
        // Two identical columns: both offer the same best cut; the
        // lower column index must win, repeatably.
        let rows: Vec<(f64, f64)> = (0..8)
            .map(|i| (i as f64, if i < 4 { -1.0 } else { 1.0 }))
            .collect();
        let h0 = hist_from(&rows, 0.0, 8.0, 8);
        let h1 = hist_from(&rows, 0.0, 8.0, 8);
        let stats = h0.total();
        for _ in 0..10 {
            let cand =
                find_best_split(&[h0.clone(), h1.clone()], &stats, 1).unwrap();
            assert_eq!(cand.column, 0);
            assert_eq!(cand.bin, 3);
        }
    }

    #[test]
    fn test_tie_within_column_picks_lower_bin() {
        // Work values symmetric around the middle: cutting after bin 1
        // and after bin 5 produce mirrored, equally good partitions of
        // the same squared error only when the pattern repeats; use a
        // flat two-level pattern where bins 3 and 4 boundaries tie.
        let rows: Vec<(f64, f64)> = vec![
            (0.5, 0.0),
            (1.5, 0.0),
            (2.5, 0.0),
            (3.5, 0.0),
            (4.5, 8.0),
            (5.5, 8.0),
            (6.5, 8.0),
            (7.5, 8.0),
        ];
        let h = hist_from(&rows, 0.0, 8.0, 8);
        let stats = h.total();
        let cand = find_best_split(&[h], &stats, 1).unwrap();
        // Bins 0..=3 hold work 0 rows: every boundary in 3..=3 reaches
        // zero se; boundaries 0,1,2 leave mixed sides. The first bin
        // reaching the minimum must be chosen.
        assert_eq!(cand.bin, 3);
    }

    #[test]
    fn test_categorical_subset_split() {
        let mut h = Histogram::categorical(3);
        // Category 1 carries high work, categories 0 and 2 low.
        for _ in 0..4 {
            h.accumulate(0.0, 1.0);
            h.accumulate(1.0, 9.0);
            h.accumulate(2.0, 1.0);
        }
        let stats = h.total();
        let cand = find_best_split(&[h], &stats, 1).unwrap();
        match &cand.kind {
            SplitKind::Categorical { left_set } => {
                // Low-mean categories 0 and 2 group on the left.
                assert!(left_set.contains(0));
                assert!(left_set.contains(2));
                assert!(!left_set.contains(1));
            }
            _ => panic!("expected a categorical split"),
        }
        assert_eq!(cand.left.count, 8.0);
        assert_eq!(cand.right.count, 4.0);
    }
}
