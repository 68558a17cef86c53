//! Ensemble building: driver, fused layer pass, variants, jobs.

pub mod driver;
pub mod job;
pub mod layer;
pub mod sampling;
pub mod variant;

pub use driver::Driver;
pub use job::{build_ensemble, BuildJob, JobStatus};
pub use layer::build_layer;
pub use sampling::{default_sampling_factors, sample_frame_stratified};
pub use variant::{GradientBoosting, TreeVariant};
