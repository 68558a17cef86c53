//! The job handle exposed to callers.
//!
//! [`build_ensemble`] spawns the driver on its own thread and returns
//! immediately. The handle reports status, cancels cooperatively, and
//! joins for the result. Cancellation is a clean stop, not an error:
//! the caller gets back whatever the registry last persisted.

use crate::config::BuildParams;
use crate::builder::driver::Driver;
use crate::core::error::{ChunktreeError, Result};
use crate::core::types::ModelId;
use crate::frame::Frame;
use crate::model::{EnsembleModel, ModelRegistry};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Observable state of a build job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// The build is still running.
    Running,
    /// The build finished and the model is persisted.
    Done,
    /// The build stopped cleanly after a cancellation request.
    Cancelled,
    /// The build failed; the error is returned by `result_model`.
    Failed,
}

struct JobState {
    status: JobStatus,
    model_id: Option<ModelId>,
    error: Option<ChunktreeError>,
}

/// A running (or finished) ensemble build.
pub struct BuildJob {
    cancel: Arc<AtomicBool>,
    state: Arc<Mutex<JobState>>,
    registry: Arc<ModelRegistry>,
    handle: Option<JoinHandle<()>>,
}

/// Starts an ensemble build and returns its job handle.
pub fn build_ensemble(
    train: Frame,
    valid: Option<Frame>,
    params: BuildParams,
    registry: Arc<ModelRegistry>,
) -> BuildJob {
    let cancel = Arc::new(AtomicBool::new(false));
    let state = Arc::new(Mutex::new(JobState {
        status: JobStatus::Running,
        model_id: None,
        error: None,
    }));

    let handle = {
        let cancel = Arc::clone(&cancel);
        let state = Arc::clone(&state);
        let registry = Arc::clone(&registry);
        std::thread::spawn(move || {
            let result = Driver::new(params, registry, cancel)
                .and_then(|driver| driver.run(&train, valid.as_ref()));
            let mut st = state.lock().unwrap();
            match result {
                Ok(id) => {
                    st.status = JobStatus::Done;
                    st.model_id = Some(id);
                }
                Err(e) if e.is_cancelled() => st.status = JobStatus::Cancelled,
                Err(e) => {
                    st.status = JobStatus::Failed;
                    st.error = Some(e);
                }
            }
        })
    };

    BuildJob {
        cancel,
        state,
        registry,
        handle: Some(handle),
    }
}

impl BuildJob {
    /// Current status.
    pub fn status(&self) -> JobStatus {
        self.state.lock().unwrap().status
    }

    /// Requests a cooperative stop; the driver checks between layers
    /// and rounds.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// The persisted model's id, once the build has finished.
    pub fn model_id(&self) -> Option<ModelId> {
        self.state.lock().unwrap().model_id.clone()
    }

    /// Waits for the build and returns the persisted model.
    ///
    /// `Ok(Some(model))` on success, `Ok(None)` after a clean
    /// cancellation, and the build's error on failure.
    pub fn result_model(mut self) -> Result<Option<EnsembleModel>> {
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| ChunktreeError::internal("build worker panicked"))?;
        }
        let mut st = self.state.lock().unwrap();
        match st.status {
            JobStatus::Done => {
                let id = st
                    .model_id
                    .clone()
                    .ok_or_else(|| ChunktreeError::internal("finished job lost its model id"))?;
                self.registry.get(&id)
            }
            JobStatus::Cancelled => Ok(None),
            JobStatus::Failed => Err(st
                .error
                .take()
                .unwrap_or_else(|| ChunktreeError::internal("failed job lost its error"))),
            JobStatus::Running => Err(ChunktreeError::internal(
                "job still running after worker join",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ColumnKind;

    fn linear_frame(n: usize) -> Frame {
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let y: Vec<f64> = (0..n).map(|i| 3.0 * i as f64).collect();
        Frame::new(
            vec![
                ("x".to_string(), ColumnKind::Numeric, x),
                ("y".to_string(), ColumnKind::Numeric, y),
            ],
            16,
        )
        .unwrap()
    }

    #[test]
    fn test_job_runs_to_done() {
        let registry = Arc::new(ModelRegistry::new());
        let params = BuildParams::builder()
            .tree_count(2)
            .min_rows_per_leaf(2)
            .num_threads(2)
            .build();
        let job = build_ensemble(linear_frame(64), None, params, registry.clone());
        let model = job.result_model().unwrap().expect("model persisted");
        assert_eq!(model.output.ntrees, 2);
        assert!(registry.contains(&model.id));
    }

    #[test]
    fn test_job_reports_config_failure() {
        let registry = Arc::new(ModelRegistry::new());
        let params = BuildParams::builder().tree_count(200_000).build();
        let job = build_ensemble(linear_frame(64), None, params, registry);
        match job.result_model() {
            Err(ChunktreeError::Config { messages }) => {
                assert!(messages.iter().any(|m| m.contains("tree_count")));
            }
            other => panic!("expected a config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_immediate_cancel_is_clean() {
        let registry = Arc::new(ModelRegistry::new());
        let params = BuildParams::builder()
            .tree_count(10_000)
            .min_rows_per_leaf(2)
            .num_threads(2)
            .build();
        let job = build_ensemble(linear_frame(64), None, params, registry);
        job.cancel();
        // Clean stop either way: cancellation never surfaces as an
        // error, even if the build won the race and finished.
        let _ = job.result_model().unwrap();
    }
}
