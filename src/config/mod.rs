//! JSON configuration for the pipeline and the demo binaries.

pub mod replay;

use crate::error::{AnytimeError, Result};
use crate::io::read_json_file;
use crate::projection::{NmsParams, DEFAULT_DECAY_OFFSET, DEFAULT_HORIZON_US};
use crate::tiles::{TileLayout, MAX_TILE_COUNT};
use crate::voxelize::PillarGrid;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Largest supported detection-head count (`2^16` head-post table).
pub const MAX_DET_HEADS: usize = 16;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    pub enabled: bool,
    /// Poses older than this (µs) are evicted with their detections.
    pub horizon_us: i64,
    pub decay_offset: f32,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            horizon_us: DEFAULT_HORIZON_US,
            decay_offset: DEFAULT_DECAY_OFFSET,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NmsConfig {
    pub iou_threshold: f32,
    pub pre_max_size: usize,
    pub post_max_size: usize,
}

impl Default for NmsConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.2,
            pre_max_size: 1000,
            post_max_size: 83,
        }
    }
}

impl NmsConfig {
    pub fn params(&self) -> NmsParams {
        NmsParams {
            iou_threshold: self.iou_threshold,
            pre_max_size: self.pre_max_size,
            post_max_size: self.post_max_size,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationPaths {
    pub data_path: PathBuf,
    pub checkpoint_path: PathBuf,
}

impl Default for CalibrationPaths {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("calib_data.json"),
            checkpoint_path: PathBuf::from("time_pred_model.json"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tile_count: usize,
    /// `[x_min, y_min, z_min, x_max, y_max, z_max]` in metres.
    pub point_cloud_range: [f32; 6],
    pub voxel_size: [f32; 3],
    pub num_det_heads: usize,
    /// Class index (label - 1) → detection head.
    pub class_to_head: Vec<usize>,
    pub score_threshold: f32,
    pub projection: ProjectionConfig,
    pub nms: NmsConfig,
    pub calibration: CalibrationPaths,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tile_count: 16,
            point_cloud_range: [-51.2, -51.2, -5.0, 51.2, 51.2, 3.0],
            voxel_size: [0.2, 0.2, 8.0],
            num_det_heads: 6,
            // car | truck, construction_vehicle | bus, trailer | barrier |
            // motorcycle, bicycle | pedestrian, traffic_cone
            class_to_head: vec![0, 1, 1, 2, 2, 3, 4, 4, 5, 5],
            score_threshold: 0.1,
            projection: ProjectionConfig::default(),
            nms: NmsConfig::default(),
            calibration: CalibrationPaths::default(),
        }
    }
}

impl PipelineConfig {
    pub fn pillar_grid(&self) -> Result<PillarGrid> {
        PillarGrid::new(self.point_cloud_range, self.voxel_size)
    }

    pub fn tile_layout(&self) -> Result<TileLayout> {
        let grid = self.pillar_grid()?;
        TileLayout::new(self.tile_count, grid.grid_size()[0] as usize)
    }

    /// Reject configurations that cannot run; called before the first frame.
    pub fn validate(&self) -> Result<()> {
        if self.tile_count == 0 || self.tile_count > MAX_TILE_COUNT {
            return Err(AnytimeError::config(format!(
                "tile_count {} outside [1, {MAX_TILE_COUNT}]",
                self.tile_count
            )));
        }
        if !self.tile_count.is_power_of_two() {
            return Err(AnytimeError::config(format!(
                "tile_count {} is not a power of two",
                self.tile_count
            )));
        }
        self.tile_layout()?;
        if self.num_det_heads == 0 || self.num_det_heads > MAX_DET_HEADS {
            return Err(AnytimeError::config(format!(
                "num_det_heads {} outside [1, {MAX_DET_HEADS}]",
                self.num_det_heads
            )));
        }
        if let Some((cls, &head)) = self
            .class_to_head
            .iter()
            .enumerate()
            .find(|&(_, &h)| h >= self.num_det_heads)
        {
            return Err(AnytimeError::config(format!(
                "class {cls} mapped to head {head} of {}",
                self.num_det_heads
            )));
        }
        if !(self.score_threshold > 0.0 && self.score_threshold < 1.0) {
            return Err(AnytimeError::config(format!(
                "score_threshold {} outside (0, 1)",
                self.score_threshold
            )));
        }
        if self.projection.horizon_us <= 0 || !(self.projection.decay_offset > 0.0) {
            return Err(AnytimeError::config(
                "projection horizon and decay offset must be positive",
            ));
        }
        Ok(())
    }
}

/// Load and validate a pipeline configuration.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let config: PipelineConfig = read_json_file(path)?;
    config.validate()?;
    Ok(config)
}
