//! Frame scoring and the zero-tree baseline.
//!
//! The builder consumes aggregate error metrics; it only ever computes
//! the per-row prediction sum itself. Scoring walks the persisted
//! trees chunk-parallel and reduces MSE and confusion counts.

use crate::core::error::{ChunktreeError, Result};
use crate::frame::column::Column;
use crate::frame::Frame;
use crate::model::EnsembleModel;
use rayon::prelude::*;

/// Aggregate metrics for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResult {
    /// Mean squared error. For classifiers this is the mean over rows
    /// of the squared distance between the one-hot response and the
    /// predicted class distribution.
    pub mse: f64,
    /// Rows scored (missing responses are skipped).
    pub nrows: u64,
    /// `confusion[actual][predicted]` counts; classifiers only.
    pub confusion: Option<Vec<Vec<u64>>>,
}

impl ScoreResult {
    /// Misclassified row count from the confusion matrix.
    pub fn error_count(&self) -> Option<u64> {
        self.confusion.as_ref().map(|cm| {
            cm.iter()
                .enumerate()
                .map(|(actual, row)| {
                    row.iter()
                        .enumerate()
                        .filter(|(predicted, _)| *predicted != actual)
                        .map(|(_, n)| *n)
                        .sum::<u64>()
                })
                .sum()
        })
    }
}

struct ChunkScore {
    sse: f64,
    nrows: u64,
    confusion: Option<Vec<Vec<u64>>>,
}

impl ChunkScore {
    fn empty(nclass: usize) -> Self {
        ChunkScore {
            sse: 0.0,
            nrows: 0,
            confusion: (nclass > 1).then(|| vec![vec![0u64; nclass]; nclass]),
        }
    }

    fn merge(mut self, other: ChunkScore) -> Self {
        self.sse += other.sse;
        self.nrows += other.nrows;
        if let (Some(mine), Some(theirs)) = (self.confusion.as_mut(), other.confusion.as_ref()) {
            for (a, b) in mine.iter_mut().zip(theirs.iter()) {
                for (x, y) in a.iter_mut().zip(b.iter()) {
                    *x += *y;
                }
            }
        }
        self
    }
}

/// Scores a frame against a model.
pub fn score_frame(model: &EnsembleModel, frame: &Frame) -> Result<ScoreResult> {
    let nclass = model.output.nclass;
    if frame.ncols() != model.output.feature_names.len() {
        return Err(ChunktreeError::frame(format!(
            "frame has {} feature columns, model expects {}",
            frame.ncols(),
            model.output.feature_names.len()
        )));
    }

    // Chunk results fold in chunk order so repeated scoring of the
    // same model and frame reports bit-identical numbers.
    let locals: Vec<ChunkScore> = (0..frame.num_chunks())
        .into_par_iter()
        .map(|ci| {
            let mut local = ChunkScore::empty(nclass);
            let resp = frame.response().chunk(ci);
            for (row, &y) in resp.iter().enumerate() {
                if y.is_nan() {
                    continue;
                }
                let fs = model
                    .output
                    .raw_scores(|c| frame.feature(c).chunk(ci)[row]);
                local.nrows += 1;
                if nclass > 1 {
                    let p = model.output.class_probabilities(&fs);
                    let actual = y as usize;
                    for (k, pk) in p.iter().enumerate() {
                        let yk = if k == actual { 1.0 } else { 0.0 };
                        local.sse += (yk - pk) * (yk - pk);
                    }
                    let predicted = crate::core::utils::max_index(&p);
                    local.confusion.as_mut().unwrap()[actual][predicted] += 1;
                } else {
                    let d = y - fs[0];
                    local.sse += d * d;
                }
            }
            local
        })
        .collect();
    let total = locals
        .into_iter()
        .fold(ChunkScore::empty(nclass), ChunkScore::merge);

    if total.nrows == 0 {
        return Err(ChunktreeError::frame(
            "no scorable rows: every response is missing",
        ));
    }
    Ok(ScoreResult {
        mse: total.sse / total.nrows as f64,
        nrows: total.nrows,
        confusion: total.confusion,
    })
}

/// Zero-tree baseline error: the error of guessing only the class
/// distribution (classification) or the training mean (regression).
///
/// For classification with majority-class fraction `q` guessed and the
/// class's actual fraction `a` in the scored frame, the per-row error
/// is `q^2 + a - 2*a*q`. For regression it is the scored frame's
/// variance plus the squared train/test mean bias.
pub fn baseline_error(train_resp: &Column, test_resp: &Column, class_counts: Option<&[usize]>) -> f64 {
    match class_counts {
        Some(counts) => {
            let cls = {
                let mut best = 0;
                for (i, &c) in counts.iter().enumerate().skip(1) {
                    if c > counts[best] {
                        best = i;
                    }
                }
                best
            };
            let train_n = (train_resp.len() - train_resp.na_count()) as f64;
            let guess = counts[cls] as f64 / train_n;
            let mut test_counts = vec![0usize; counts.len()];
            let mut test_n = 0f64;
            for y in test_resp.values() {
                if !y.is_nan() {
                    test_counts[y as usize] += 1;
                    test_n += 1.0;
                }
            }
            let actual = test_counts[cls] as f64 / test_n;
            guess * guess + actual - 2.0 * actual * guess
        }
        None => {
            let stddev = test_resp.sigma();
            let bias = train_resp.mean() - test_resp.mean();
            stddev * stddev + bias * bias
        }
    }
}
