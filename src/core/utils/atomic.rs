//! Lock-free floating-point accumulation.
//!
//! The per-column squared-error improvement vector is the only state
//! mutated by concurrently completing node decisions, so it gets a
//! dedicated compare-and-swap accumulator instead of a lock.

use std::sync::atomic::{AtomicU64, Ordering};

/// A fixed-length vector of `f64` cells supporting concurrent addition.
///
/// Addition is associative and commutative over the logically
/// independent, non-negative contributions accumulated here, so the
/// final value does not depend on completion order.
#[derive(Debug)]
pub struct AtomicF64Vec {
    cells: Vec<AtomicU64>,
}

impl AtomicF64Vec {
    /// Creates a zeroed vector of the given length.
    pub fn zeros(len: usize) -> Self {
        AtomicF64Vec {
            cells: (0..len).map(|_| AtomicU64::new(0f64.to_bits())).collect(),
        }
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True when the vector has no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Atomically adds `delta` to cell `index`.
    pub fn add(&self, index: usize, delta: f64) {
        let cell = &self.cells[index];
        let mut current = cell.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + delta).to_bits();
            match cell.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Reads cell `index`.
    pub fn get(&self, index: usize) -> f64 {
        f64::from_bits(self.cells[index].load(Ordering::Relaxed))
    }

    /// Copies the current contents out as a plain vector.
    pub fn snapshot(&self) -> Vec<f64> {
        self.cells
            .iter()
            .map(|c| f64::from_bits(c.load(Ordering::Relaxed)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_zeroed() {
        let v = AtomicF64Vec::zeros(4);
        assert_eq!(v.len(), 4);
        assert_eq!(v.snapshot(), vec![0.0; 4]);
    }

    #[test]
    fn test_concurrent_add() {
        let v = AtomicF64Vec::zeros(2);
        (0..1000usize).into_par_iter().for_each(|i| {
            v.add(i % 2, 0.25);
        });
        assert_eq!(v.get(0), 125.0);
        assert_eq!(v.get(1), 125.0);
    }

    #[test]
    fn test_order_invariance_for_dyadic_increments() {
        // Dyadic rationals accumulate exactly, so any completion order
        // must produce the same total.
        let increments = [0.5, 0.25, 1.75, 2.5, 0.125, 3.0];
        let forward = AtomicF64Vec::zeros(1);
        for x in increments {
            forward.add(0, x);
        }
        let reverse = AtomicF64Vec::zeros(1);
        for x in increments.iter().rev() {
            reverse.add(0, *x);
        }
        assert_eq!(forward.get(0), reverse.get(0));
    }
}
