//! Stratified class balancing.
//!
//! Imbalanced classification frames can be over/under-sampled per
//! class before building. Factors are relative: a factor of 1.0 aims
//! each class at `total / nclass` rows, so all-1.0 factors equalize
//! the classes. The resampled row count is capped, and the cap is
//! applied by scaling every class target proportionally.

use crate::core::error::{ChunktreeError, Result};
use crate::frame::Frame;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// The factor vector meaning "equalize all classes".
pub fn default_sampling_factors(nclass: usize) -> Vec<f64> {
    vec![1.0; nclass]
}

/// Stratified over/under-sampling of a classification frame.
///
/// Class `k`'s target row count is `factor_k * total / nclass`,
/// with all targets scaled down proportionally if their sum exceeds
/// `max_rows`. Rows with a missing response carry no class and are
/// dropped. Deterministic for a fixed `seed`.
pub fn sample_frame_stratified(
    frame: &Frame,
    factors: &[f64],
    max_rows: usize,
    seed: u64,
) -> Result<Frame> {
    let nclass = frame.nclass();
    if factors.len() != nclass {
        return Err(ChunktreeError::frame(format!(
            "expected {} sampling factors, got {}",
            nclass,
            factors.len()
        )));
    }

    // Row indices per class.
    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); nclass];
    for (row, y) in frame.response().values().enumerate() {
        if !y.is_nan() {
            by_class[y as usize].push(row);
        }
    }
    let total: usize = by_class.iter().map(|c| c.len()).sum();

    let mut targets: Vec<f64> = factors
        .iter()
        .map(|f| f * total as f64 / nclass as f64)
        .collect();
    let planned: f64 = targets.iter().sum();
    if planned > max_rows as f64 && planned > 0.0 {
        let scale = max_rows as f64 / planned;
        for t in targets.iter_mut() {
            *t *= scale;
        }
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut selected = Vec::with_capacity(planned.min(max_rows as f64) as usize);
    for (k, rows) in by_class.iter().enumerate() {
        if rows.is_empty() {
            continue;
        }
        let target = targets[k].round() as usize;
        if target <= rows.len() {
            // Under-sample without replacement.
            let mut shuffled = rows.clone();
            shuffled.shuffle(&mut rng);
            shuffled.truncate(target);
            selected.extend(shuffled);
        } else {
            // Keep every row, then over-sample with replacement.
            selected.extend(rows.iter().copied());
            for _ in 0..target - rows.len() {
                selected.push(rows[rng.gen_range(0..rows.len())]);
            }
        }
    }
    selected.sort_unstable();

    frame.select_rows(&selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ColumnKind;

    fn skewed_frame() -> Frame {
        // 90 rows of class 0, 10 rows of class 1.
        let n = 100;
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let y: Vec<f64> = (0..n).map(|i| if i < 90 { 0.0 } else { 1.0 }).collect();
        Frame::new(
            vec![
                ("x".to_string(), ColumnKind::Numeric, x),
                (
                    "y".to_string(),
                    ColumnKind::Categorical {
                        domain: vec!["no".into(), "yes".into()],
                    },
                    y,
                ),
            ],
            16,
        )
        .unwrap()
    }

    #[test]
    fn test_equalizing_factors_balance_classes() {
        let frame = skewed_frame();
        let balanced =
            sample_frame_stratified(&frame, &default_sampling_factors(2), 500, 42).unwrap();
        let counts = balanced.class_counts();
        assert_eq!(counts[0], 50);
        assert_eq!(counts[1], 50);
    }

    #[test]
    fn test_cap_scales_targets() {
        let frame = skewed_frame();
        let balanced =
            sample_frame_stratified(&frame, &default_sampling_factors(2), 50, 42).unwrap();
        assert!(balanced.nrows() <= 50);
        let counts = balanced.class_counts();
        // Both classes shrank proportionally.
        assert_eq!(counts[0], counts[1]);
    }

    #[test]
    fn test_deterministic_for_fixed_seed() {
        let frame = skewed_frame();
        let a = sample_frame_stratified(&frame, &[1.0, 1.0], 500, 7).unwrap();
        let b = sample_frame_stratified(&frame, &[1.0, 1.0], 500, 7).unwrap();
        let xa: Vec<f64> = a.feature(0).values().collect();
        let xb: Vec<f64> = b.feature(0).values().collect();
        assert_eq!(xa, xb);
    }

    #[test]
    fn test_factor_arity_checked() {
        let frame = skewed_frame();
        assert!(sample_frame_stratified(&frame, &[1.0], 500, 7).is_err());
    }
}
