//! Error taxonomy for the anytime detector.
//!
//! Only structural problems are errors. A missed deadline or an empty frame is
//! reported through [`FrameDiagnostics`](crate::diagnostics::FrameDiagnostics)
//! and never aborts the pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AnytimeError>;

/// Errors raised by configuration, calibration loading and the timed pipeline.
#[derive(Error, Debug)]
pub enum AnytimeError {
    /// Tile/head counts or table sizes disagree with the running configuration.
    /// Fatal: must abort before the first frame.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Calibration data file is absent. Callers fall back to the calibration sweep.
    #[error("calibration data not found at {}", path.display())]
    MissingCalibrationData { path: PathBuf },

    /// A detection references a pose that is no longer in the history.
    #[error("history inconsistency: pose index {pose_index} with {poses} retained poses")]
    HistoryInconsistency { pose_index: usize, poses: usize },

    /// Malformed per-frame input (coordinates outside the grid, bad pose vector, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Timing backend failure (event record, stream sync, elapsed query).
    #[error("backend error: {0}")]
    Backend(String),

    /// A model stage kernel reported a failure.
    #[error("stage {stage} failed: {message}")]
    Stage { stage: &'static str, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AnytimeError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        AnytimeError::Configuration(msg.into())
    }

    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        AnytimeError::InvalidInput(msg.into())
    }

    pub fn backend<S: Into<String>>(msg: S) -> Self {
        AnytimeError::Backend(msg.into())
    }

    pub fn stage<S: Into<String>>(stage: &'static str, msg: S) -> Self {
        AnytimeError::Stage {
            stage,
            message: msg.into(),
        }
    }

    /// True for errors that must halt startup rather than degrade a frame.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, AnytimeError::MissingCalibrationData { .. })
    }
}
