//! # Chunktree
//!
//! Distributed, layer-synchronized decision tree ensembles over
//! chunked columnar frames.
//!
//! Chunktree builds one tree per response class per boosting round,
//! growing every tree a whole breadth layer at a time. A fused pass
//! over the data re-assigns each row to its new node and accumulates
//! histogram statistics for the fresh frontier in a single scan;
//! split search then turns finished histograms into decisions behind
//! the layer barrier. Builds checkpoint into a model registry and can
//! resume, growing an existing ensemble to a larger tree count.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use chunktree::{build_ensemble, BuildParams, Frame, ModelRegistry};
//! use chunktree::core::types::ColumnKind;
//! use std::sync::Arc;
//!
//! # fn main() -> chunktree::Result<()> {
//! let train = Frame::new(
//!     vec![
//!         ("x".to_string(), ColumnKind::Numeric, vec![1.0, 2.0, 3.0, 4.0]),
//!         ("y".to_string(), ColumnKind::Numeric, vec![2.0, 4.0, 6.0, 8.0]),
//!     ],
//!     2,
//! )?;
//!
//! let params = BuildParams::builder()
//!     .tree_count(10)
//!     .min_rows_per_leaf(1)
//!     .max_depth(3)
//!     .build();
//!
//! let registry = Arc::new(ModelRegistry::new());
//! let job = build_ensemble(train, None, params, registry);
//! let model = job.result_model()?.expect("build finished");
//! println!("built {} rounds", model.output.ntrees);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: shared types, constants, errors, atomic accumulation
//! - [`frame`]: chunked columnar frames and the working-column overlay
//! - [`tree`]: nodes, the growing tree, histograms, split search
//! - [`builder`]: the driver, the fused layer pass, variants, jobs
//! - [`model`]: the persisted ensemble and its registry
//! - [`scoring`]: frame scoring and the zero-tree baseline

#![warn(missing_docs)]
#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod builder;
pub mod config;
pub mod core;
pub mod frame;
pub mod model;
pub mod scoring;
pub mod tree;

pub use crate::builder::{build_ensemble, BuildJob, Driver, GradientBoosting, JobStatus, TreeVariant};
pub use crate::config::{BuildParams, BuildParamsBuilder, ScoreSchedule};
pub use crate::core::error::{ChunktreeError, Result};
pub use crate::frame::{Frame, WorkingSet};
pub use crate::model::{EnsembleModel, EnsembleOutput, ModelRegistry, TreeStats};
pub use crate::scoring::{baseline_error, score_frame, ScoreResult};
pub use crate::tree::{CompiledTree, DTree, Histogram};

use std::sync::atomic::{AtomicBool, Ordering};

static LOGGING_READY: AtomicBool = AtomicBool::new(false);

/// Initializes crate-wide logging. Safe to call more than once; later
/// calls are no-ops.
pub fn init() {
    if !LOGGING_READY.swap(true, Ordering::SeqCst) {
        let _ = env_logger::Builder::from_default_env().try_init();
    }
}
