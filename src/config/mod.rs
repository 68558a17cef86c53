//! Build parameters, validation, and the scoring throttle policy.
//!
//! Validation collects every violated constraint before aborting, so a
//! caller sees all problems with a configuration at once instead of
//! fixing them one re-submission at a time.

use crate::core::constants::{
    DEFAULT_LEARNING_RATE, DEFAULT_MAX_AFTER_BALANCE_SIZE, DEFAULT_MAX_DEPTH,
    DEFAULT_MIN_ROWS_PER_LEAF, DEFAULT_NBINS, DEFAULT_TREE_COUNT, MAX_SUPPORTED_CLASSES,
    MAX_TREES, SCORE_DUTY_CYCLE, SCORE_MIN_GAP, SCORE_WARMUP,
};
use crate::core::error::{ChunktreeError, Result};
use crate::core::types::{DataSize, MissingSide, ModelId};
use crate::frame::Frame;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Parameters for one ensemble build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildParams {
    /// Total trees requested, including any checkpointed prior trees.
    /// Signed so that nonsensical negative requests are representable
    /// and rejected by validation rather than by the type system.
    pub tree_count: i64,
    /// Minimum number of rows each leaf must keep.
    pub min_rows_per_leaf: DataSize,
    /// Maximum tree depth (layers below the root).
    pub max_depth: usize,
    /// Histogram bins per (node, column) pair.
    pub nbins: usize,
    /// Shrinkage applied to each leaf prediction.
    pub learning_rate: f64,
    /// Resume from this registered model instead of starting fresh.
    pub checkpoint_model_id: Option<ModelId>,
    /// Stratified over/under-sampling of classes before building.
    pub balance_classes: bool,
    /// Caller-supplied per-class sampling factors; defaults applied
    /// when absent. Only meaningful with `balance_classes`.
    pub class_sampling_factors: Option<Vec<f64>>,
    /// Cap on the resampled row count, as a multiple of the original.
    pub max_after_balance_size: f64,
    /// Scoring throttle policy.
    pub score_schedule: ScoreSchedule,
    /// Side missing values are routed to at numeric splits.
    pub missing_side: MissingSide,
    /// Seed for every randomized step (resampling).
    pub seed: u64,
    /// Worker threads for the build pool; 0 picks the machine default.
    pub num_threads: usize,
}

impl Default for BuildParams {
    fn default() -> Self {
        BuildParams {
            tree_count: DEFAULT_TREE_COUNT,
            min_rows_per_leaf: DEFAULT_MIN_ROWS_PER_LEAF,
            max_depth: DEFAULT_MAX_DEPTH,
            nbins: DEFAULT_NBINS,
            learning_rate: DEFAULT_LEARNING_RATE,
            checkpoint_model_id: None,
            balance_classes: false,
            class_sampling_factors: None,
            max_after_balance_size: DEFAULT_MAX_AFTER_BALANCE_SIZE,
            score_schedule: ScoreSchedule::default(),
            missing_side: MissingSide::default(),
            seed: 0,
            num_threads: 0,
        }
    }
}

impl BuildParams {
    /// Starts a builder with default values.
    pub fn builder() -> BuildParamsBuilder {
        BuildParamsBuilder {
            params: BuildParams::default(),
        }
    }

    /// Validates this configuration against the training frame.
    ///
    /// Every violated constraint is collected; the result carries all
    /// of them together. Nothing here scans row data — only shapes and
    /// counts already known to the frame.
    pub fn validate(&self, train: &Frame) -> Result<()> {
        let mut messages = Vec::new();

        if self.tree_count < 1 || self.tree_count > MAX_TREES {
            messages.push(format!(
                "tree_count must be between 1 and {}, got {}",
                MAX_TREES, self.tree_count
            ));
        }
        if self.min_rows_per_leaf < 1 {
            messages.push(format!(
                "min_rows_per_leaf must be >= 1, got {}",
                self.min_rows_per_leaf
            ));
        }
        if self.max_depth == 0 {
            messages.push("max_depth must be >= 1".to_string());
        }
        if self.nbins < 2 {
            messages.push(format!("nbins must be >= 2, got {}", self.nbins));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            messages.push(format!(
                "learning_rate must be in (0, 1], got {}",
                self.learning_rate
            ));
        }
        if self.max_after_balance_size <= 0.0 {
            messages.push(format!(
                "max_after_balance_size must be > 0, got {}",
                self.max_after_balance_size
            ));
        }

        let nclass = train.nclass();
        if nclass > MAX_SUPPORTED_CLASSES {
            messages.push(format!(
                "response has {} levels, more than the supported {}",
                nclass, MAX_SUPPORTED_CLASSES
            ));
        }
        if let Some(factors) = &self.class_sampling_factors {
            if factors.len() != nclass {
                messages.push(format!(
                    "class_sampling_factors must have {} elements, got {}",
                    nclass,
                    factors.len()
                ));
            }
        }

        let insufficient = self.min_rows_per_leaf >= 1
            && (train.nrows() as u64) < 2 * self.min_rows_per_leaf as u64;
        if insufficient && messages.is_empty() {
            return Err(ChunktreeError::data_insufficiency(format!(
                "the dataset is too small to split for min_rows_per_leaf={}: {} rows < 2*{}",
                self.min_rows_per_leaf,
                train.nrows(),
                self.min_rows_per_leaf
            )));
        }
        if insufficient {
            messages.push(format!(
                "the dataset is too small to split for min_rows_per_leaf={}: {} rows < 2*{}",
                self.min_rows_per_leaf,
                train.nrows(),
                self.min_rows_per_leaf
            ));
        }

        if messages.is_empty() {
            Ok(())
        } else {
            Err(ChunktreeError::config(messages))
        }
    }

    /// Worker threads to use, resolving 0 to the machine default.
    pub fn resolved_threads(&self) -> usize {
        if self.num_threads == 0 {
            num_cpus::get()
        } else {
            self.num_threads
        }
    }
}

/// Fluent construction of [`BuildParams`].
#[derive(Debug, Clone)]
pub struct BuildParamsBuilder {
    params: BuildParams,
}

impl BuildParamsBuilder {
    /// Total trees requested.
    pub fn tree_count(mut self, n: i64) -> Self {
        self.params.tree_count = n;
        self
    }

    /// Minimum rows per leaf.
    pub fn min_rows_per_leaf(mut self, n: DataSize) -> Self {
        self.params.min_rows_per_leaf = n;
        self
    }

    /// Maximum tree depth.
    pub fn max_depth(mut self, d: usize) -> Self {
        self.params.max_depth = d;
        self
    }

    /// Histogram bins per (node, column).
    pub fn nbins(mut self, n: usize) -> Self {
        self.params.nbins = n;
        self
    }

    /// Leaf shrinkage.
    pub fn learning_rate(mut self, rate: f64) -> Self {
        self.params.learning_rate = rate;
        self
    }

    /// Resume from a checkpointed model.
    pub fn checkpoint(mut self, model_id: impl Into<ModelId>) -> Self {
        self.params.checkpoint_model_id = Some(model_id.into());
        self
    }

    /// Enable stratified class balancing.
    pub fn balance_classes(mut self, on: bool) -> Self {
        self.params.balance_classes = on;
        self
    }

    /// Per-class sampling factors for balancing.
    pub fn class_sampling_factors(mut self, factors: Vec<f64>) -> Self {
        self.params.class_sampling_factors = Some(factors);
        self
    }

    /// Score after every round regardless of the duty cycle.
    pub fn score_each_iteration(mut self, on: bool) -> Self {
        self.params.score_schedule.score_each_iteration = on;
        self
    }

    /// Missing-value routing side.
    pub fn missing_side(mut self, side: MissingSide) -> Self {
        self.params.missing_side = side;
        self
    }

    /// Build seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.params.seed = seed;
        self
    }

    /// Worker thread count (0 = machine default).
    pub fn num_threads(mut self, n: usize) -> Self {
        self.params.num_threads = n;
        self
    }

    /// Finishes the builder.
    pub fn build(self) -> BuildParams {
        self.params
    }
}

/// Scoring throttle policy.
///
/// The thresholds are tuned constants carried over from the original
/// system, not derived from a model; they are data so callers can
/// retune them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreSchedule {
    /// Score unconditionally after every round.
    pub score_each_iteration: bool,
    /// Score every round for this long after the first score.
    pub warmup: Duration,
    /// Minimum wall-clock gap between throttled scores.
    pub min_gap: Duration,
    /// Allowed fraction of elapsed time spent scoring after warm-up.
    pub duty_cycle: f64,
}

impl Default for ScoreSchedule {
    fn default() -> Self {
        ScoreSchedule {
            score_each_iteration: false,
            warmup: SCORE_WARMUP,
            min_gap: SCORE_MIN_GAP,
            duty_cycle: SCORE_DUTY_CYCLE,
        }
    }
}

/// Mutable throttle state owned by the driver.
#[derive(Debug, Default)]
pub struct ScoreClock {
    first_score: Option<Instant>,
    last_start: Option<Instant>,
    last_end: Option<Instant>,
}

impl ScoreClock {
    /// Creates a fresh clock.
    pub fn new() -> Self {
        ScoreClock::default()
    }

    /// Decides whether to score now under `schedule`. The final round
    /// always scores.
    pub fn should_score(&self, schedule: &ScoreSchedule, final_scoring: bool) -> bool {
        if schedule.score_each_iteration || final_scoring {
            return true;
        }
        let now = Instant::now();
        let first = match self.first_score {
            None => return true,
            Some(first) => first,
        };
        if now.duration_since(first) < schedule.warmup {
            return true;
        }
        let (start, end) = match (self.last_start, self.last_end) {
            (Some(s), Some(e)) => (s, e),
            _ => return true,
        };
        let since_last = now.duration_since(start);
        since_last > schedule.min_gap
            && end.duration_since(start).as_secs_f64() / since_last.as_secs_f64()
                < schedule.duty_cycle
    }

    /// Marks the start of a scoring pass.
    pub fn begin(&mut self) {
        let now = Instant::now();
        if self.first_score.is_none() {
            self.first_score = Some(now);
        }
        self.last_start = Some(now);
    }

    /// Marks the end of a scoring pass.
    pub fn end(&mut self) {
        self.last_end = Some(Instant::now());
    }
}
