//! Time prediction and calibration.
//!
//! - `data`: the calibration file (per-sample bb3d series and lookup tables).
//! - `tables`: filtering WCET plus exact-replay tables keyed by subset id.
//! - `scaler` / `predictor`: standardized regression for the 3D backbone.
//! - `fit`: offline least-squares fit producing a predictor checkpoint.
//! - `sweep`: subset enumeration and recording for data-collection mode.

mod data;
mod fit;
mod predictor;
mod scaler;
mod sweep;
mod tables;

pub use data::CalibrationData;
pub use fit::{fit_linear, FitReport, ResidualStats};
pub use predictor::{
    DenseLayer, PredictorCheckpoint, RegressionModel, TimePredictor, TotalPrediction,
};
pub use scaler::StandardScaler;
pub use sweep::{sweep_windows, CalibrationRecorder, SweepTiming};
pub use tables::{percentile_lower, CalibrationTables, DEFAULT_FILTERING_WCET_MS};
