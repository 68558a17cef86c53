//! The persisted ensemble model and its registry.

pub mod registry;

pub use registry::ModelRegistry;

use crate::core::error::Result;
use crate::core::types::{ColIndex, ModelId, Score};
use crate::tree::dtree::CompiledTree;
use chrono::{DateTime, Utc};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Summary statistics over every tree in the ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TreeStats {
    /// Smallest tree depth.
    pub min_depth: usize,
    /// Largest tree depth.
    pub max_depth: usize,
    /// Mean tree depth.
    pub mean_depth: f64,
    /// Smallest leaf count.
    pub min_leaves: usize,
    /// Largest leaf count.
    pub max_leaves: usize,
    /// Mean leaf count.
    pub mean_leaves: f64,
}

/// Everything the build produces, as stored in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleOutput {
    /// Number of response classes (1 = regression).
    pub nclass: usize,
    /// Rounds completed so far (each round grows one tree per class).
    pub ntrees: usize,
    /// Trees grouped by round; `None` marks an empty class.
    pub trees: Vec<Vec<Option<CompiledTree>>>,
    /// Zero-tree initial prediction (training mean for regression).
    pub init_f: f64,
    /// Training MSE history: entry 0 is the zero-tree baseline, entry
    /// `m` the error after `m` rounds; unscored rounds hold NaN.
    pub mse_train: Vec<f64>,
    /// Validation MSE history, same convention; empty without a
    /// validation frame.
    pub mse_valid: Vec<f64>,
    /// Accumulated squared-error improvement per feature column.
    /// Unscaled, as accumulated by this build.
    pub variable_importance: Vec<f64>,
    /// Feature column names, aligned with the importance vector.
    pub feature_names: Vec<String>,
    /// Class distribution of the original training frame.
    pub prior_class_dist: Option<Vec<f64>>,
    /// Class distribution actually modeled (differs after balancing).
    pub model_class_dist: Option<Vec<f64>>,
    /// Per-tree summary statistics.
    pub tree_stats: TreeStats,
}

impl EnsembleOutput {
    /// A fresh output for a build of `nclass` classes.
    pub fn new(nclass: usize, init_f: f64, feature_names: Vec<String>) -> Self {
        let ncols = feature_names.len();
        EnsembleOutput {
            nclass,
            ntrees: 0,
            trees: Vec::new(),
            init_f,
            mse_train: Vec::new(),
            mse_valid: Vec::new(),
            variable_importance: vec![0.0; ncols],
            feature_names,
            prior_class_dist: None,
            model_class_dist: None,
            tree_stats: TreeStats::default(),
        }
    }

    /// Grows the MSE histories to cover `total` rounds (plus the
    /// baseline entry), padding with NaN.
    pub fn ensure_history_len(&mut self, total: usize, with_valid: bool) {
        self.mse_train.resize(total + 1, f64::NAN);
        if with_valid {
            self.mse_valid.resize(total + 1, f64::NAN);
        }
    }

    /// Appends one round of per-class trees.
    pub fn add_round(&mut self, round: Vec<Option<CompiledTree>>) {
        self.trees.push(round);
        self.ntrees += 1;
    }

    /// Recomputes [`TreeStats`] from the stored trees.
    pub fn refresh_tree_stats(&mut self) {
        let mut stats = TreeStats {
            min_depth: usize::MAX,
            min_leaves: usize::MAX,
            ..TreeStats::default()
        };
        let mut count = 0usize;
        let mut depth_sum = 0usize;
        let mut leaves_sum = 0usize;
        for round in &self.trees {
            for tree in round.iter().flatten() {
                count += 1;
                let depth = tree.depth();
                let leaves = tree.num_leaves();
                stats.min_depth = stats.min_depth.min(depth);
                stats.max_depth = stats.max_depth.max(depth);
                stats.min_leaves = stats.min_leaves.min(leaves);
                stats.max_leaves = stats.max_leaves.max(leaves);
                depth_sum += depth;
                leaves_sum += leaves;
            }
        }
        if count == 0 {
            self.tree_stats = TreeStats::default();
        } else {
            stats.mean_depth = depth_sum as f64 / count as f64;
            stats.mean_leaves = leaves_sum as f64 / count as f64;
            self.tree_stats = stats;
        }
    }

    /// Per-class raw prediction sums for one row.
    pub fn raw_scores<F: Fn(ColIndex) -> f64>(&self, value_of: F) -> Vec<Score> {
        let mut fs = vec![0.0; self.nclass];
        if self.nclass == 1 {
            fs[0] = self.init_f;
        }
        for round in &self.trees {
            for (k, tree) in round.iter().enumerate() {
                if let Some(tree) = tree {
                    fs[k] += tree.score_row(&value_of);
                }
            }
        }
        fs
    }

    /// Softmax distribution over the raw class scores.
    pub fn class_probabilities(&self, fs: &[Score]) -> Vec<f64> {
        let max = fs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = fs.iter().map(|f| (f - max).exp()).collect();
        let sum: f64 = exps.iter().sum();
        exps.into_iter().map(|e| e / sum).collect()
    }

    /// Importance normalized so the strongest column reads 1.0.
    pub fn scaled_importance(&self) -> Array1<f64> {
        let max = self
            .variable_importance
            .iter()
            .cloned()
            .fold(0.0f64, f64::max);
        if max <= 0.0 {
            return Array1::zeros(self.variable_importance.len());
        }
        Array1::from_iter(self.variable_importance.iter().map(|v| v / max))
    }
}

/// A persisted ensemble model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleModel {
    /// Registry identifier.
    pub id: ModelId,
    /// When the build that produced this snapshot started.
    pub built_at: DateTime<Utc>,
    /// Model content.
    pub output: EnsembleOutput,
}

impl EnsembleModel {
    /// A fresh model shell.
    pub fn new(id: ModelId, output: EnsembleOutput) -> Self {
        EnsembleModel {
            id,
            built_at: Utc::now(),
            output,
        }
    }

    /// Serializes the model to a registry snapshot.
    pub fn to_snapshot(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Restores a model from a registry snapshot.
    pub fn from_snapshot(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Human-readable JSON dump of the model.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Restores a model from its JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
