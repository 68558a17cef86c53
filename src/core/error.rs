//! Error handling for the chunktree crate.
//!
//! The taxonomy follows the build lifecycle: configuration and data
//! sufficiency problems are collected and surfaced together before any
//! computation; checkpoint mismatches abort immediately; cancellation
//! is a clean, non-retried stop; everything else is an internal failure
//! that is logged, re-raised, and never silently swallowed.

use std::io;
use thiserror::Error;

/// Main error type for the chunktree crate.
#[derive(Error, Debug)]
pub enum ChunktreeError {
    /// Invalid build parameters. Carries every violation found during
    /// validation, not just the first one.
    #[error("Configuration error: {}", messages.join("; "))]
    Config {
        /// One message per violated constraint.
        messages: Vec<String>,
    },

    /// The training set is too small for the requested constraints.
    #[error("Insufficient data: {message}")]
    DataInsufficiency { message: String },

    /// Requested tree count does not extend the checkpointed model.
    #[error("Checkpoint mismatch: requested {requested} trees but checkpoint '{model_id}' already holds {existing}")]
    CheckpointMismatch {
        model_id: String,
        requested: i64,
        existing: usize,
    },

    /// The build was cancelled by the caller. A clean stop, not a failure.
    #[error("Build cancelled")]
    Cancelled,

    /// Frame construction or access errors.
    #[error("Frame error: {message}")]
    Frame { message: String },

    /// Model registry errors (unknown model, lock conflicts).
    #[error("Registry error: {message}")]
    Registry { message: String },

    /// File I/O errors.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// JSON serialization errors.
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    /// Bincode snapshot errors.
    #[error("Bincode error: {source}")]
    Bincode {
        #[from]
        source: bincode::Error,
    },

    /// Unexpected failure during a layer build or scoring pass.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Type alias for Results using [`ChunktreeError`].
pub type Result<T> = std::result::Result<T, ChunktreeError>;

impl ChunktreeError {
    /// Create a configuration error from collected validation messages.
    pub fn config(messages: Vec<String>) -> Self {
        ChunktreeError::Config { messages }
    }

    /// Create a data-insufficiency error.
    pub fn data_insufficiency<S: Into<String>>(message: S) -> Self {
        ChunktreeError::DataInsufficiency {
            message: message.into(),
        }
    }

    /// Create a checkpoint-mismatch error.
    pub fn checkpoint_mismatch<S: Into<String>>(model_id: S, requested: i64, existing: usize) -> Self {
        ChunktreeError::CheckpointMismatch {
            model_id: model_id.into(),
            requested,
            existing,
        }
    }

    /// Create a frame error.
    pub fn frame<S: Into<String>>(message: S) -> Self {
        ChunktreeError::Frame {
            message: message.into(),
        }
    }

    /// Create a registry error.
    pub fn registry<S: Into<String>>(message: S) -> Self {
        ChunktreeError::Registry {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        ChunktreeError::Internal {
            message: message.into(),
        }
    }

    /// True for the clean, caller-initiated stop.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ChunktreeError::Cancelled)
    }

    /// True for errors raised before any data scan (bad configuration,
    /// too little data, checkpoint mismatch). These are never retried.
    pub fn is_pre_build(&self) -> bool {
        matches!(
            self,
            ChunktreeError::Config { .. }
                | ChunktreeError::DataInsufficiency { .. }
                | ChunktreeError::CheckpointMismatch { .. }
        )
    }

    /// Error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            ChunktreeError::Config { .. } => "config",
            ChunktreeError::DataInsufficiency { .. } => "data_insufficiency",
            ChunktreeError::CheckpointMismatch { .. } => "checkpoint_mismatch",
            ChunktreeError::Cancelled => "cancelled",
            ChunktreeError::Frame { .. } => "frame",
            ChunktreeError::Registry { .. } => "registry",
            ChunktreeError::Io { .. } => "io",
            ChunktreeError::Json { .. } => "json",
            ChunktreeError::Bincode { .. } => "bincode",
            ChunktreeError::Internal { .. } => "internal",
        }
    }
}
