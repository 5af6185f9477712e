use super::TimingBreakdown;
use crate::scheduler::Schedule3Check;
use crate::tiles::TileId;
use serde::Serialize;

/// Everything recorded about one processed frame for offline analysis.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameDiagnostics {
    pub frame_index: usize,
    pub scene_token: String,
    pub timestamp_us: i64,
    /// History and the round-robin pointer were reset before this frame.
    pub scene_reset: bool,
    /// No voxel survived voxelization; all stages ran as no-ops.
    pub empty_input: bool,
    pub num_voxels: usize,
    pub nonempty_tiles: Vec<TileId>,
    pub occupancy: Vec<u32>,
    /// Tiles chosen by schedule1.
    pub chosen_tiles_1: Vec<TileId>,
    /// Tiles after schedule2.
    pub chosen_tiles_2: Vec<TileId>,
    pub filtered: bool,
    pub remaining_ms_at_schedule1: f64,
    pub remaining_ms_at_schedule2: f64,
    pub predicted_total_ms: Option<f64>,
    pub predicted_bb3d_ms: Option<f64>,
    pub measured_bb3d_ms: f64,
    pub active_heads: Vec<usize>,
    pub schedule3: Option<Schedule3Check>,
    pub fresh_detections: usize,
    pub projected_detections: usize,
    pub output_detections: usize,
    pub deadline_sec: f64,
    pub finished_sec: f64,
    pub deadline_missed: bool,
    /// `finished - deadline` in ms; negative means slack.
    pub lateness_ms: f64,
    pub timing: TimingBreakdown,
}
