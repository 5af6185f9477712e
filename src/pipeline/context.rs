//! State threaded through the pipeline.
//!
//! `SchedulerContext` lives across frames and is owned by the pipeline.
//! `FrameContext` lives for one frame and holds every intermediate value a
//! stage reads or writes.

use crate::calibration::TimePredictor;
use crate::diagnostics::FrameDiagnostics;
use crate::projection::ProjectionEngine;
use crate::scheduler::{RoundRobinScheduler, ScheduleDecision};
use crate::tiles::TilePartition;
use crate::types::DetectionSet;
use crate::voxelize::VoxelSet;
use log::info;

/// Cross-frame state: round-robin pointer, predictor and detection history.
#[derive(Clone, Debug)]
pub struct SchedulerContext {
    pub scheduler: RoundRobinScheduler,
    pub predictor: Option<TimePredictor>,
    pub projection: ProjectionEngine,
    pub prev_scene: Option<String>,
}

impl SchedulerContext {
    pub fn new(scheduler: RoundRobinScheduler, projection: ProjectionEngine) -> Self {
        Self {
            scheduler,
            predictor: None,
            projection,
            prev_scene: None,
        }
    }

    /// Reset history and the round-robin pointer when `scene_token` differs
    /// from the previous frame's. Returns true when a reset happened.
    pub fn enter_scene(&mut self, scene_token: &str) -> bool {
        if self.prev_scene.as_deref() == Some(scene_token) {
            return false;
        }
        let had_scene = self.prev_scene.is_some();
        if had_scene {
            info!("scene change -> {scene_token}: resetting history");
        }
        self.reset();
        self.prev_scene = Some(scene_token.to_string());
        had_scene
    }

    pub fn reset(&mut self) {
        self.projection.reset();
        self.scheduler.reset();
    }
}

/// Typed per-frame state.
#[derive(Debug, Default)]
pub struct FrameContext {
    pub voxels: VoxelSet,
    pub partition: TilePartition,
    pub decision: ScheduleDecision,
    /// Projected history split per detection head.
    pub projections: Option<Vec<DetectionSet>>,
    /// Fresh detections per detection head.
    pub head_detections: Vec<DetectionSet>,
    pub diagnostics: FrameDiagnostics,
}
