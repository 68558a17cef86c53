//! The ensemble driver.
//!
//! Orchestrates one build: collected validation, resume-or-create
//! against the registry, optional class balancing, the working-column
//! overlay, the per-round layer loop with its K parallel per-class
//! builds, the leaf-gamma pass, throttled scoring, and finalization.
//! Cancellation is checked between layers and rounds; whatever happens,
//! the model is unlocked and the overlay discarded before returning.

use crate::builder::layer::build_layer;
use crate::builder::sampling::{default_sampling_factors, sample_frame_stratified};
use crate::builder::variant::{GradientBoosting, TreeVariant};
use crate::config::{BuildParams, ScoreClock};
use crate::core::error::{ChunktreeError, Result};
use crate::core::types::{ModelId, NodeId};
use crate::core::utils::AtomicF64Vec;
use crate::frame::{Frame, WorkingSet};
use crate::model::{EnsembleModel, EnsembleOutput, ModelRegistry};
use crate::scoring::{baseline_error, score_frame};
use crate::tree::dtree::DTree;
use crate::tree::histogram::Histogram;
use chrono::Utc;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static MODEL_SEQ: AtomicU64 = AtomicU64::new(0);

fn generate_model_id() -> ModelId {
    format!(
        "gbm-{}-{}",
        Utc::now().timestamp_millis(),
        MODEL_SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

/// Drives one ensemble build to completion.
pub struct Driver {
    params: BuildParams,
    registry: Arc<ModelRegistry>,
    cancel: Arc<AtomicBool>,
    pool: rayon::ThreadPool,
}

impl Driver {
    /// Creates a driver with its own worker pool.
    pub fn new(
        params: BuildParams,
        registry: Arc<ModelRegistry>,
        cancel: Arc<AtomicBool>,
    ) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(params.resolved_threads())
            .build()
            .map_err(|e| ChunktreeError::internal(format!("failed to build worker pool: {}", e)))?;
        Ok(Driver {
            params,
            registry,
            cancel,
            pool,
        })
    }

    /// Runs the build and returns the persisted model's id.
    pub fn run(&self, train: &Frame, valid: Option<&Frame>) -> Result<ModelId> {
        // All parameter and shape problems surface here, together,
        // before any data scan.
        self.params.validate(train)?;
        let nclass = train.nclass();

        // Resume from a checkpoint, or start a fresh model.
        let model_id = self
            .params
            .checkpoint_model_id
            .clone()
            .unwrap_or_else(generate_model_id);
        let checkpoint = match &self.params.checkpoint_model_id {
            Some(id) => self.registry.get(id)?,
            None => None,
        };
        let resumed = checkpoint.is_some();
        let (mut model, remaining) = match checkpoint {
            Some(existing) => {
                let built = existing.output.ntrees;
                if self.params.tree_count <= built as i64 {
                    return Err(ChunktreeError::checkpoint_mismatch(
                        model_id.as_str(),
                        self.params.tree_count,
                        built,
                    ));
                }
                let remaining = (self.params.tree_count - built as i64) as usize;
                log::info!(
                    "resuming model '{}' holding {} round(s); {} more to build",
                    model_id,
                    built,
                    remaining
                );
                (existing, remaining)
            }
            None => {
                let init_f = if train.is_classifier() {
                    0.0
                } else {
                    train.response().mean()
                };
                let mut output = EnsembleOutput::new(nclass, init_f, train.feature_names());
                if train.is_classifier() {
                    output.prior_class_dist = Some(train.class_distribution());
                    output.model_class_dist = output.prior_class_dist.clone();
                }
                (
                    EnsembleModel::new(model_id.clone(), output),
                    self.params.tree_count as usize,
                )
            }
        };
        let total_rounds = model.output.ntrees + remaining;
        model
            .output
            .ensure_history_len(total_rounds, valid.is_some());

        // Zero-tree baseline error, recorded before any balancing so it
        // reflects the data as given.
        if !resumed {
            let class_counts = train.is_classifier().then(|| train.class_counts());
            model.output.mse_train[0] =
                baseline_error(train.response(), train.response(), class_counts.as_deref());
            if let Some(v) = valid {
                model.output.mse_valid[0] =
                    baseline_error(train.response(), v.response(), class_counts.as_deref());
            }
        }

        // Stratified class balancing may replace the training frame.
        let balanced;
        let train: &Frame = if train.is_classifier() && self.params.balance_classes {
            let factors = self
                .params
                .class_sampling_factors
                .clone()
                .unwrap_or_else(|| default_sampling_factors(nclass));
            let cap = (self.params.max_after_balance_size * train.nrows() as f64) as usize;
            balanced = sample_frame_stratified(train, &factors, cap, self.params.seed)?;
            // The training set changed: recompute what the model sees.
            model.output.model_class_dist = Some(balanced.class_distribution());
            log::info!(
                "prior class distribution: {:?}",
                model.output.prior_class_dist.as_deref().unwrap_or(&[])
            );
            log::info!(
                "model class distribution: {:?}",
                model.output.model_class_dist.as_deref().unwrap_or(&[])
            );
            &balanced
        } else {
            train
        };

        let dist = if train.is_classifier() {
            train.class_distribution()
        } else {
            vec![1.0]
        };

        // Write-lock the model for the whole build.
        if resumed {
            self.registry.lock(&model.id)?;
        } else {
            self.registry.create_locked(&model)?;
        }

        // The working overlay: created here, dropped before we return.
        let mut working = WorkingSet::new(train, nclass);
        working.reset_assignments(train, &dist);
        if resumed {
            replay_checkpoint(&model.output, train, &mut working);
        }

        let outcome = self.pool.install(|| {
            self.grow(train, valid, &mut model, &mut working, &dist, remaining)
        });
        match &outcome {
            Ok(()) => log::info!(
                "model '{}' finished with {} round(s) x {} class(es)",
                model.id,
                model.output.ntrees,
                nclass
            ),
            Err(e) if e.is_cancelled() => {
                log::info!("build of model '{}' cancelled by caller", model.id)
            }
            Err(e) => log::error!(
                "build of model '{}' failed ({}): {}",
                model.id,
                e.category(),
                e
            ),
        }
        drop(working);
        let unlocked = self.registry.unlock(&model.id);
        outcome?;
        unlocked?;
        Ok(model_id)
    }

    /// The per-round build loop.
    fn grow(
        &self,
        train: &Frame,
        valid: Option<&Frame>,
        model: &mut EnsembleModel,
        working: &mut WorkingSet,
        dist: &[f64],
        remaining: usize,
    ) -> Result<()> {
        let nclass = model.output.nclass;
        let variant = GradientBoosting::new(nclass);
        let ranges = train.observed_ranges();
        let improvements = AtomicF64Vec::zeros(train.ncols());
        let mut clock = ScoreClock::new();

        for round in 0..remaining {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(ChunktreeError::Cancelled);
            }
            working.reset_assignments(train, dist);
            variant.update_working(train, model.output.init_f, working);

            // One tree per class; empty classes grow nothing.
            let mut trees: Vec<Option<DTree>> = (0..nclass)
                .map(|k| {
                    (dist[k] > 0.0).then(|| DTree::new(self.root_histograms(train, &ranges)))
                })
                .collect();

            for _layer in 0..self.params.max_depth {
                if self.cancel.load(Ordering::Relaxed) {
                    return Err(ChunktreeError::Cancelled);
                }
                let flags: Result<Vec<bool>> = working
                    .classes_mut()
                    .par_iter_mut()
                    .zip(trees.par_iter_mut())
                    .map(|(cols, tree)| match tree.as_mut() {
                        Some(tree) => {
                            build_layer(train, cols, tree, &variant, &self.params, &improvements)
                        }
                        None => Ok(false),
                    })
                    .collect();
                if !flags?.into_iter().any(|did| did) {
                    break;
                }
            }

            finish_round(
                train,
                working,
                &mut trees,
                &variant,
                self.params.learning_rate,
            );
            let compiled = trees
                .iter()
                .map(|t| t.as_ref().map(|t| t.compile()).transpose())
                .collect::<Result<Vec<_>>>()?;
            model.output.add_round(compiled);

            let final_round = round + 1 == remaining;
            self.score_and_save(train, valid, model, &improvements, &mut clock, final_round)?;
        }
        Ok(())
    }

    /// Root histogram skeletons from the frame's observed ranges.
    fn root_histograms(&self, train: &Frame, ranges: &[(f64, f64)]) -> Vec<Histogram> {
        (0..train.ncols())
            .map(|c| match train.feature_kind(c).cardinality() {
                Some(card) => Histogram::categorical(card),
                None => Histogram::numeric(ranges[c].0, ranges[c].1, self.params.nbins),
            })
            .collect()
    }

    /// Scoring pass under the duty-cycle throttle, persisting the model
    /// before and after so readers always see a consistent snapshot.
    fn score_and_save(
        &self,
        train: &Frame,
        valid: Option<&Frame>,
        model: &mut EnsembleModel,
        improvements: &AtomicF64Vec,
        clock: &mut ScoreClock,
        final_round: bool,
    ) -> Result<()> {
        if !clock.should_score(&self.params.score_schedule, final_round) {
            return Ok(());
        }
        clock.begin();
        model.output.variable_importance = improvements.snapshot();
        self.registry.update(model)?;

        let ntrees = model.output.ntrees;
        let sc = score_frame(model, train)?;
        model.output.mse_train[ntrees] = sc.mse;
        log::info!(
            "model '{}': {} round(s) x {} class(es), training MSE {:.6}",
            model.id,
            ntrees,
            model.output.nclass,
            sc.mse
        );
        if sc.confusion.is_some() {
            log::info!(
                "training errors: {} of {} rows",
                sc.error_count().unwrap_or(0),
                sc.nrows
            );
        }
        if let Some(vframe) = valid {
            let scv = score_frame(model, vframe)?;
            model.output.mse_valid[ntrees] = scv.mse;
            log::info!("model '{}': validation MSE {:.6}", model.id, scv.mse);
        }
        model.output.refresh_tree_stats();

        clock.end();
        self.registry.update(model)?;
        Ok(())
    }
}

/// Re-applies a checkpoint's trees to the `tree` working columns so
/// residuals continue from the persisted ensemble.
fn replay_checkpoint(output: &EnsembleOutput, frame: &Frame, working: &mut WorkingSet) {
    working
        .classes_mut()
        .par_iter_mut()
        .enumerate()
        .for_each(|(k, cols)| {
            cols.tree
                .chunks_mut()
                .par_iter_mut()
                .enumerate()
                .for_each(|(ci, tree_chunk)| {
                    for (row, t) in tree_chunk.iter_mut().enumerate() {
                        let mut sum = 0.0;
                        for round in &output.trees {
                            if let Some(tree) = &round[k] {
                                sum += tree.score_row(|c| frame.feature(c).chunk(ci)[row]);
                            }
                        }
                        *t = sum;
                    }
                });
        });
}

/// Finishes a round's trees: walk every active row to its final node,
/// accumulate the per-leaf gamma sums, convert every non-split node to
/// a leaf, and fold the new tree into the running prediction sums.
fn finish_round(
    frame: &Frame,
    working: &mut WorkingSet,
    trees: &mut [Option<DTree>],
    variant: &dyn TreeVariant,
    learning_rate: f64,
) {
    working
        .classes_mut()
        .par_iter_mut()
        .zip(trees.par_iter_mut())
        .for_each(|(cols, tree_opt)| {
            let tree = match tree_opt.as_mut() {
                Some(tree) => tree,
                None => return,
            };
            let len = tree.len();

            // Final placement plus gamma numerator/denominator, folded
            // across chunks in chunk order for run-to-run determinism.
            let (nums, dens) = {
                let tree_ref: &DTree = tree;
                let nids = &mut cols.nids;
                let work = &cols.work;
                let locals: Vec<(Vec<f64>, Vec<f64>)> = nids
                    .chunks_mut()
                    .par_iter_mut()
                    .enumerate()
                    .map(|(ci, nid_chunk)| {
                        let mut num = vec![0.0; len];
                        let mut den = vec![0.0; len];
                        let work_chunk = work.chunk(ci);
                        for (row, slot) in nid_chunk.iter_mut().enumerate() {
                            let nid = *slot;
                            if nid < 0 {
                                continue;
                            }
                            let leaf = tree_ref
                                .descend(nid as usize, |c| frame.feature(c).chunk(ci)[row]);
                            *slot = leaf as NodeId;
                            let w = work_chunk[row];
                            num[leaf] += w;
                            den[leaf] += variant.gamma_denominator(w);
                        }
                        (num, den)
                    })
                    .collect();
                locals.into_iter().fold(
                    (vec![0.0; len], vec![0.0; len]),
                    |(mut na, mut da), (nb, db)| {
                        for (a, b) in na.iter_mut().zip(nb) {
                            *a += b;
                        }
                        for (a, b) in da.iter_mut().zip(db) {
                            *a += b;
                        }
                        (na, da)
                    },
                )
            };

            // Every node that is not a decided split carries a
            // prediction now.
            let mut leaf_preds = vec![0.0; len];
            for idx in tree.leaf_indices() {
                let pred = learning_rate * variant.leaf_value(nums[idx], dens[idx]);
                leaf_preds[idx] = pred;
                tree.to_leaf(idx, pred);
            }

            // Fold the finished tree into the running sums.
            let nids = &cols.nids;
            cols.tree
                .chunks_mut()
                .par_iter_mut()
                .enumerate()
                .for_each(|(ci, tree_chunk)| {
                    let nid_chunk = nids.chunk(ci);
                    for (row, t) in tree_chunk.iter_mut().enumerate() {
                        let nid = nid_chunk[row];
                        if nid >= 0 {
                            *t += leaf_preds[nid as usize];
                        }
                    }
                });
        });
}
