#![doc = include_str!("../README.md")]

// Public modules (stable-ish surface)
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod pipeline;
pub mod types;

// “Expert” modules – public for tools and tests, considered unstable internals.
pub mod backend;
pub mod calibration;
pub mod io;
pub mod projection;
pub mod scheduler;
pub mod synthetic;
pub mod tiles;
pub mod voxelize;

// --- High-level re-exports -------------------------------------------------

// Main entry points: pipeline + per-frame results.
pub use crate::config::PipelineConfig;
pub use crate::error::{AnytimeError, Result};
pub use crate::pipeline::{AnytimePipeline, FrameOutput, PerceptionModel};
pub use crate::types::{Box3d, Detection, DetectionSet, FrameInput, LidarPoint};

// Reports returned by the pipeline.
pub use crate::diagnostics::{FrameDiagnostics, RunSummary};

// Scheduling and prediction building blocks.
pub use crate::calibration::TimePredictor;
pub use crate::projection::SensorPose;
pub use crate::scheduler::RoundRobinScheduler;

// --- Prelude ---------------------------------------------------------------

/// Small prelude for quick experiments.
///
/// ```no_run
/// use anytime_detector::prelude::*;
/// use anytime_detector::backend::{CpuBackend, ManualClock};
/// use anytime_detector::synthetic::{SceneConfig, SyntheticModel, SyntheticScene};
///
/// # fn main() -> anytime_detector::Result<()> {
/// let config = PipelineConfig::default();
/// let clock = ManualClock::new(0.0);
/// let model = SyntheticModel::new(&config, Default::default())?.with_clock(clock.clone());
/// let mut pipeline = AnytimePipeline::new(config, CpuBackend::new(clock.clone()), model)?;
///
/// let scene = SyntheticScene::new(SceneConfig::default())?;
/// let frames: Vec<FrameInput> = (0..4).map(|i| scene.frame(i, 0.0, 30.0)).collect();
/// let data = pipeline.collect_calibration(&frames)?;
/// let fit = anytime_detector::calibration::fit_linear(&data)?;
/// let predictor = TimePredictor::from_parts(&data, fit.checkpoint)?;
/// let mut pipeline = pipeline.with_predictor(predictor)?;
///
/// clock.set_sec(100.0);
/// let out = pipeline.process(&scene.frame(0, 100.0, 30.0))?;
/// println!("{} detections, missed={}", out.detections.len(), out.diagnostics.deadline_missed);
/// # Ok(())
/// # }
/// ```
pub mod prelude {
    pub use crate::pipeline::{AnytimePipeline, FrameOutput, PerceptionModel};
    pub use crate::types::{DetectionSet, FrameInput};
    pub use crate::{PipelineConfig, TimePredictor};
}

// --- Stage-level API (for tools & advanced users) --------------------------

pub mod stages {
    // Per-stage building blocks.
    pub use crate::backend::{InferenceBackend, Stage, StageSpan, Stream};
    pub use crate::calibration::{sweep_windows, CalibrationRecorder, SweepTiming};
    pub use crate::projection::{split_by_head, transform_box, ProjectionEngine};
    pub use crate::scheduler::{remaining_time_ms, CandidateTable, ScheduleDecision};
    pub use crate::tiles::{NonemptyTiles, TileLayout, TilePartition};
    pub use crate::voxelize::{PillarGrid, VoxelSet};

    // Structured diagnostics types.
    pub use crate::diagnostics::{StageTiming, TimingBreakdown};
    pub use crate::scheduler::Schedule3Check;
}
