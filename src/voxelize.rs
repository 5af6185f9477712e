//! Pillar voxelization of raw LiDAR points.
//!
//! Points are binned into vertical pillars on a BEV grid. Each nonempty pillar
//! becomes one voxel with integer coordinates `(y, x)` and a mean-position
//! feature. The `x` coordinate is the tiling axis.

use crate::error::{AnytimeError, Result};
use crate::tiles::TileId;
use crate::types::LidarPoint;
use serde::{Deserialize, Serialize};

/// Integer pillar coordinate on the BEV grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoxelCoord {
    pub y: u32,
    pub x: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PillarFeature {
    pub mean: [f32; 3],
    pub num_points: u32,
}

/// Sparse voxel tensor: parallel coordinate and feature arrays.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VoxelSet {
    pub coords: Vec<VoxelCoord>,
    pub features: Vec<PillarFeature>,
}

impl VoxelSet {
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// Keep the voxels whose tile is in `chosen`, preserving order.
    ///
    /// `voxel_tiles` is the per-voxel tile id from the frame's partition.
    pub fn retain_tiles(&self, voxel_tiles: &[TileId], chosen: &[TileId]) -> Result<VoxelSet> {
        if voxel_tiles.len() != self.coords.len() {
            return Err(AnytimeError::invalid_input(format!(
                "tile map covers {} voxels, set has {}",
                voxel_tiles.len(),
                self.coords.len()
            )));
        }
        let Some(&max_tile) = voxel_tiles.iter().chain(chosen.iter()).max() else {
            return Ok(VoxelSet::default());
        };
        let mut mask = vec![false; max_tile + 1];
        for &t in chosen {
            mask[t] = true;
        }
        let mut out = VoxelSet::default();
        for ((coord, feat), &tile) in self.coords.iter().zip(&self.features).zip(voxel_tiles) {
            if mask[tile] {
                out.coords.push(*coord);
                out.features.push(*feat);
            }
        }
        Ok(out)
    }
}

/// BEV pillar grid over a fixed point-cloud range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PillarGrid {
    /// `[x_min, y_min, z_min, x_max, y_max, z_max]` in metres.
    pub point_cloud_range: [f32; 6],
    /// `[dx, dy, dz]` in metres; `dz` spans the whole z range for pillars.
    pub voxel_size: [f32; 3],
    grid_x: u32,
    grid_y: u32,
}

impl PillarGrid {
    pub fn new(point_cloud_range: [f32; 6], voxel_size: [f32; 3]) -> Result<Self> {
        if voxel_size.iter().any(|&v| !(v > 0.0)) {
            return Err(AnytimeError::config(format!(
                "voxel sizes must be positive, got {voxel_size:?}"
            )));
        }
        let extent_x = point_cloud_range[3] - point_cloud_range[0];
        let extent_y = point_cloud_range[4] - point_cloud_range[1];
        if !(extent_x > 0.0 && extent_y > 0.0 && point_cloud_range[5] > point_cloud_range[2]) {
            return Err(AnytimeError::config(format!(
                "degenerate point cloud range {point_cloud_range:?}"
            )));
        }
        let grid_x = (extent_x / voxel_size[0]).round() as u32;
        let grid_y = (extent_y / voxel_size[1]).round() as u32;
        Ok(Self {
            point_cloud_range,
            voxel_size,
            grid_x,
            grid_y,
        })
    }

    /// Grid size `[nx, ny]`.
    pub fn grid_size(&self) -> [u32; 2] {
        [self.grid_x, self.grid_y]
    }

    /// Pillar of a point, or `None` when the point lies outside the range.
    pub fn pillar_of(&self, p: &LidarPoint) -> Option<VoxelCoord> {
        let r = &self.point_cloud_range;
        let [x, y, z] = p.xyz;
        if !(z >= r[2] && z < r[5]) {
            return None;
        }
        let fx = ((x - r[0]) / self.voxel_size[0]).floor();
        let fy = ((y - r[1]) / self.voxel_size[1]).floor();
        if fx < 0.0 || fy < 0.0 || fx >= self.grid_x as f32 || fy >= self.grid_y as f32 {
            return None;
        }
        Some(VoxelCoord {
            y: fy as u32,
            x: fx as u32,
        })
    }

    /// Merge in-range points into unique pillars, sorted by `(y, x)`.
    pub fn pillarize(&self, points: &[LidarPoint]) -> VoxelSet {
        let mut keyed: Vec<(VoxelCoord, [f32; 3])> = points
            .iter()
            .filter_map(|p| self.pillar_of(p).map(|c| (c, p.xyz)))
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));

        let mut out = VoxelSet::default();
        let mut iter = keyed.into_iter().peekable();
        while let Some((coord, xyz)) = iter.next() {
            let mut sum = [xyz[0] as f64, xyz[1] as f64, xyz[2] as f64];
            let mut n = 1u32;
            while let Some((_, next)) = iter.next_if(|(c, _)| *c == coord) {
                sum[0] += next[0] as f64;
                sum[1] += next[1] as f64;
                sum[2] += next[2] as f64;
                n += 1;
            }
            let inv = 1.0 / n as f64;
            out.coords.push(coord);
            out.features.push(PillarFeature {
                mean: [
                    (sum[0] * inv) as f32,
                    (sum[1] * inv) as f32,
                    (sum[2] * inv) as f32,
                ],
                num_points: n,
            });
        }
        out
    }
}
