//! Property suites for the order-invariance guarantees.

use chunktree::core::utils::AtomicF64Vec;
use chunktree::tree::Histogram;
use proptest::prelude::*;

proptest! {
    /// Summing the same multiset of per-split improvements in any
    /// order yields the same total. Increments are dyadic rationals,
    /// so every partial sum is exact and the equality is bitwise.
    #[test]
    fn importance_accumulation_is_order_invariant(
        raw in prop::collection::vec(0u32..4096, 1..64),
    ) {
        let increments: Vec<f64> = raw.iter().map(|v| *v as f64 / 64.0).collect();

        let forward = AtomicF64Vec::zeros(1);
        for x in &increments {
            forward.add(0, *x);
        }

        let backward = AtomicF64Vec::zeros(1);
        for x in increments.iter().rev() {
            backward.add(0, *x);
        }

        // A third order: odd positions first, then even.
        let interleaved = AtomicF64Vec::zeros(1);
        for x in increments.iter().skip(1).step_by(2) {
            interleaved.add(0, *x);
        }
        for x in increments.iter().step_by(2) {
            interleaved.add(0, *x);
        }

        prop_assert_eq!(forward.get(0), backward.get(0));
        prop_assert_eq!(forward.get(0), interleaved.get(0));
        prop_assert!(forward.get(0) >= 0.0);
    }

    /// Histogram merging is associative and commutative: splitting the
    /// same rows across chunk sub-tasks in any way produces the same
    /// merged histogram, bin for bin.
    #[test]
    fn histogram_merge_is_partition_invariant(
        rows in prop::collection::vec((0u32..256, -64i32..64), 1..80),
        cut in 0usize..80,
    ) {
        let rows: Vec<(f64, f64)> = rows
            .iter()
            .map(|(v, w)| (*v as f64, *w as f64 / 4.0))
            .collect();
        let cut = cut.min(rows.len());

        let mut whole = Histogram::numeric(0.0, 256.0, 16);
        for (v, w) in &rows {
            whole.accumulate(*v, *w);
        }

        let mut first = whole.empty_like();
        for (v, w) in &rows[..cut] {
            first.accumulate(*v, *w);
        }
        let mut second = whole.empty_like();
        for (v, w) in &rows[cut..] {
            second.accumulate(*v, *w);
        }
        first.merge(&second);

        prop_assert_eq!(&first, &whole);
    }
}
