//! Shared fixtures for the integration suites.

use chunktree::core::types::ColumnKind;
use chunktree::Frame;

/// 150 rows, 3 classes of 50 rows each, with one informative numeric
/// feature (the class id plus a small deterministic wobble) and one
/// noise feature.
pub fn three_class_frame() -> Frame {
    let n = 150;
    let x: Vec<f64> = (0..n)
        .map(|i| (i / 50) as f64 * 10.0 + (i % 50) as f64 * 0.01)
        .collect();
    let noise: Vec<f64> = (0..n).map(|i| ((i * 7) % 13) as f64).collect();
    let y: Vec<f64> = (0..n).map(|i| (i / 50) as f64).collect();
    Frame::new(
        vec![
            ("signal".to_string(), ColumnKind::Numeric, x),
            ("noise".to_string(), ColumnKind::Numeric, noise),
            (
                "class".to_string(),
                ColumnKind::Categorical {
                    domain: vec!["red".into(), "green".into(), "blue".into()],
                },
                y,
            ),
        ],
        32,
    )
    .unwrap()
}

/// A smooth deterministic regression frame.
pub fn regression_frame(n: usize) -> Frame {
    let x1: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let x2: Vec<f64> = (0..n).map(|i| ((i * 31) % 17) as f64).collect();
    let y: Vec<f64> = (0..n)
        .map(|i| {
            let a = i as f64;
            let b = ((i * 31) % 17) as f64;
            3.0 * a + 0.5 * b * b
        })
        .collect();
    Frame::new(
        vec![
            ("x1".to_string(), ColumnKind::Numeric, x1),
            ("x2".to_string(), ColumnKind::Numeric, x2),
            ("y".to_string(), ColumnKind::Numeric, y),
        ],
        32,
    )
    .unwrap()
}
