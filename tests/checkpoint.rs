//! Checkpoint and resume behavior.

mod common;

use chunktree::{build_ensemble, BuildParams, ChunktreeError, EnsembleModel, ModelRegistry};
use common::{regression_frame, three_class_frame};
use std::sync::Arc;

fn build(
    tree_count: i64,
    checkpoint: Option<&str>,
    registry: &Arc<ModelRegistry>,
) -> chunktree::Result<Option<EnsembleModel>> {
    let mut builder = BuildParams::builder()
        .tree_count(tree_count)
        .min_rows_per_leaf(2)
        .max_depth(3)
        .learning_rate(0.5)
        .score_each_iteration(true)
        .seed(13)
        .num_threads(2);
    if let Some(id) = checkpoint {
        builder = builder.checkpoint(id);
    }
    build_ensemble(regression_frame(120), None, builder.build(), registry.clone()).result_model()
}

fn trees_as_json(model: &EnsembleModel, rounds: usize) -> String {
    serde_json::to_string(&model.output.trees[..rounds]).unwrap()
}

#[test]
fn identical_builds_are_bit_identical() {
    let registry = registry_pair();
    let a = build(3, None, &registry.0).unwrap().unwrap();
    let b = build(3, None, &registry.1).unwrap().unwrap();
    assert_eq!(trees_as_json(&a, 3), trees_as_json(&b, 3));
    assert_eq!(a.output.mse_train, b.output.mse_train);
}

fn registry_pair() -> (Arc<ModelRegistry>, Arc<ModelRegistry>) {
    (Arc::new(ModelRegistry::new()), Arc::new(ModelRegistry::new()))
}

#[test]
fn resume_extends_without_touching_prior_trees() {
    let registry = Arc::new(ModelRegistry::new());

    // Standalone 2-round build.
    let first = build(2, None, &registry).unwrap().unwrap();
    assert_eq!(first.output.ntrees, 2);

    // An independent 2-round build for the bit-identity comparison.
    let standalone = build(2, None, &Arc::new(ModelRegistry::new()))
        .unwrap()
        .unwrap();

    // Resume the first model up to 5 rounds.
    let resumed = build(5, Some(first.id.as_str()), &registry).unwrap().unwrap();
    assert_eq!(resumed.id, first.id);
    assert_eq!(resumed.output.ntrees, 5);

    // The first two rounds are bit-identical to the standalone build.
    assert_eq!(trees_as_json(&resumed, 2), trees_as_json(&standalone, 2));

    // History convention: baseline entry plus one entry per round, all
    // populated because every iteration scored.
    assert_eq!(resumed.output.mse_train.len(), 6);
    for m in 0..6 {
        assert!(
            resumed.output.mse_train[m].is_finite(),
            "round {} missing from history: {:?}",
            m,
            resumed.output.mse_train
        );
    }
    // Training error never rises across the checkpoint boundary.
    for m in 1..6 {
        assert!(
            resumed.output.mse_train[m] <= resumed.output.mse_train[m - 1] + 1e-9,
            "training MSE rose at round {}: {:?}",
            m,
            resumed.output.mse_train
        );
    }
}

#[test]
fn resumed_training_matches_uninterrupted_run() {
    // 2 rounds then 3 more must equal 5 rounds in one go.
    let registry = Arc::new(ModelRegistry::new());
    let first = build(2, None, &registry).unwrap().unwrap();
    let resumed = build(5, Some(first.id.as_str()), &registry).unwrap().unwrap();

    let straight = build(5, None, &Arc::new(ModelRegistry::new()))
        .unwrap()
        .unwrap();
    assert_eq!(trees_as_json(&resumed, 5), trees_as_json(&straight, 5));
}

#[test]
fn requesting_no_more_trees_than_checkpoint_is_a_mismatch() {
    let registry = Arc::new(ModelRegistry::new());
    let first = build(3, None, &registry).unwrap().unwrap();

    for requested in [1i64, 2, 3] {
        match build(requested, Some(first.id.as_str()), &registry) {
            Err(ChunktreeError::CheckpointMismatch {
                requested: r,
                existing,
                ..
            }) => {
                assert_eq!(r, requested);
                assert_eq!(existing, 3);
            }
            other => panic!(
                "requested={} should mismatch, got {:?}",
                requested,
                other.map(|_| ())
            ),
        }
    }
}

#[test]
fn missing_checkpoint_id_builds_fresh_under_that_id() {
    let registry = Arc::new(ModelRegistry::new());
    let model = build(2, Some("adopted-id"), &registry).unwrap().unwrap();
    assert_eq!(model.id, "adopted-id");
    assert_eq!(model.output.ntrees, 2);
    assert!(registry.contains("adopted-id"));
}

#[test]
fn multiclass_resume_keeps_per_class_trees_aligned() {
    let registry = Arc::new(ModelRegistry::new());
    let params = BuildParams::builder()
        .tree_count(1)
        .min_rows_per_leaf(1)
        .max_depth(3)
        .score_each_iteration(true)
        .seed(29)
        .num_threads(2)
        .build();
    let first = build_ensemble(three_class_frame(), None, params, registry.clone())
        .result_model()
        .unwrap()
        .unwrap();

    let params = BuildParams::builder()
        .tree_count(3)
        .min_rows_per_leaf(1)
        .max_depth(3)
        .score_each_iteration(true)
        .seed(29)
        .num_threads(2)
        .checkpoint(first.id.as_str())
        .build();
    let resumed = build_ensemble(three_class_frame(), None, params, registry)
        .result_model()
        .unwrap()
        .unwrap();

    assert_eq!(resumed.output.ntrees, 3);
    for round in &resumed.output.trees {
        assert_eq!(round.len(), 3);
        assert_eq!(round.iter().filter(|t| t.is_some()).count(), 3);
    }
    // Training error keeps improving over the checkpoint.
    let history = &resumed.output.mse_train;
    assert!(history[3] <= history[1]);
}
