use crate::backend::ManualClock;
use crate::config::PipelineConfig;
use crate::error::{AnytimeError, Result};
use crate::pipeline::PerceptionModel;
use crate::tiles::{TileId, TileLayout};
use crate::types::{Box3d, Detection, DetectionSet};
use crate::voxelize::{VoxelCoord, VoxelSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Simulated kernel costs (ms).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostModel {
    pub bb3d_base_ms: f64,
    pub bb3d_ms_per_kvoxel: f64,
    pub bb2d_ms_per_tile: f64,
    pub head_pre_ms_per_tile: f64,
    pub head_post_base_ms: f64,
    pub head_post_ms_per_head: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            bb3d_base_ms: 4.0,
            bb3d_ms_per_kvoxel: 1.5,
            bb2d_ms_per_tile: 0.8,
            head_pre_ms_per_tile: 0.5,
            head_post_base_ms: 1.0,
            head_post_ms_per_head: 0.7,
        }
    }
}

impl CostModel {
    pub fn bb3d_ms(&self, voxels: usize) -> f64 {
        self.bb3d_base_ms + self.bb3d_ms_per_kvoxel * voxels as f64 * 1e-3
    }

    pub fn bb2d_ms(&self, tiles: usize) -> f64 {
        self.bb2d_ms_per_tile * tiles as f64
    }

    pub fn head_pre_ms(&self, tiles: usize) -> f64 {
        self.head_pre_ms_per_tile * tiles as f64
    }

    pub fn head_post_ms(&self, heads: usize) -> f64 {
        self.head_post_base_ms + self.head_post_ms_per_head * heads as f64
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticModelConfig {
    pub cost: CostModel,
    pub ground_z: f32,
    /// Pillars whose mean z is this far above ground count as obstacle returns.
    pub min_elevation: f32,
    /// Smallest cluster turned into a detection.
    pub min_pillars: usize,
    /// Clusters at least this tall are labelled truck, others car.
    pub truck_min_height: f32,
}

impl Default for SyntheticModelConfig {
    fn default() -> Self {
        Self {
            cost: CostModel::default(),
            ground_z: -1.8,
            min_elevation: 0.25,
            min_pillars: 4,
            truck_min_height: 2.5,
        }
    }
}

/// BEV cluster of elevated pillars.
#[derive(Clone, Debug, PartialEq)]
pub struct PillarCluster {
    pub pillars: usize,
    pub min_xy: [f32; 2],
    pub max_xy: [f32; 2],
    pub top_z: f32,
}

const CAR_LABEL: u32 = 1;
const TRUCK_LABEL: u32 = 2;

/// Geometric stand-in for the detection network.
///
/// bb3d keeps elevated pillars, bb2d clusters them per chosen tile, head-pre
/// turns clusters into per-head candidates and head-post emits them. Every
/// stage charges its cost to an optional [`ManualClock`], so deadline
/// behaviour is reproducible.
#[derive(Clone, Debug)]
pub struct SyntheticModel {
    params: SyntheticModelConfig,
    layout: TileLayout,
    voxel_xy: [f32; 2],
    num_det_heads: usize,
    class_to_head: Vec<usize>,
    clock: Option<ManualClock>,
}

impl SyntheticModel {
    pub fn new(config: &PipelineConfig, params: SyntheticModelConfig) -> Result<Self> {
        Ok(Self {
            params,
            layout: config.tile_layout()?,
            voxel_xy: [config.voxel_size[0], config.voxel_size[1]],
            num_det_heads: config.num_det_heads,
            class_to_head: config.class_to_head.clone(),
            clock: None,
        })
    }

    /// Charge stage costs to `clock`.
    pub fn with_clock(mut self, clock: ManualClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn params(&self) -> &SyntheticModelConfig {
        &self.params
    }

    fn charge(&self, ms: f64) {
        if let Some(clock) = &self.clock {
            clock.advance_ms(ms);
        }
    }

    fn head_of(&self, label: u32) -> Option<usize> {
        (label as usize)
            .checked_sub(1)
            .and_then(|cls| self.class_to_head.get(cls))
            .copied()
            .filter(|&h| h < self.num_det_heads)
    }
}

impl PerceptionModel for SyntheticModel {
    type Features = VoxelSet;
    type BevFeatures = Vec<PillarCluster>;
    type HeadMaps = Vec<Vec<Detection>>;

    fn num_det_heads(&self) -> usize {
        self.num_det_heads
    }

    fn backbone_3d(&self, voxels: &VoxelSet) -> Result<VoxelSet> {
        self.charge(self.params.cost.bb3d_ms(voxels.len()));
        let floor = self.params.ground_z + self.params.min_elevation;
        let mut out = VoxelSet::default();
        for (c, f) in voxels.coords.iter().zip(&voxels.features) {
            if f.mean[2] > floor {
                out.coords.push(*c);
                out.features.push(*f);
            }
        }
        Ok(out)
    }

    fn backbone_2d(&self, features: VoxelSet, tiles: &[TileId]) -> Result<Vec<PillarCluster>> {
        self.charge(self.params.cost.bb2d_ms(tiles.len()));
        let index: HashMap<VoxelCoord, usize> = features
            .coords
            .iter()
            .enumerate()
            .filter(|(_, c)| tiles.contains(&self.layout.tile_of(c)))
            .map(|(i, c)| (*c, i))
            .collect();
        let mut seen = vec![false; features.len()];
        let mut clusters = Vec::new();
        for (&seed, &seed_idx) in &index {
            if seen[seed_idx] {
                continue;
            }
            seen[seed_idx] = true;
            let mut stack = vec![seed];
            let first = features.features[seed_idx].mean;
            let mut cluster = PillarCluster {
                pillars: 0,
                min_xy: [first[0], first[1]],
                max_xy: [first[0], first[1]],
                top_z: first[2],
            };
            while let Some(c) = stack.pop() {
                let Some(&i) = index.get(&c) else { continue };
                let m = features.features[i].mean;
                cluster.pillars += 1;
                cluster.min_xy = [cluster.min_xy[0].min(m[0]), cluster.min_xy[1].min(m[1])];
                cluster.max_xy = [cluster.max_xy[0].max(m[0]), cluster.max_xy[1].max(m[1])];
                cluster.top_z = cluster.top_z.max(m[2]);
                for n in neighbours(c) {
                    if let Some(&j) = index.get(&n) {
                        if !seen[j] {
                            seen[j] = true;
                            stack.push(n);
                        }
                    }
                }
            }
            clusters.push(cluster);
        }
        // HashMap iteration order is arbitrary.
        clusters.sort_by(|a, b| {
            a.min_xy[0]
                .total_cmp(&b.min_xy[0])
                .then(a.min_xy[1].total_cmp(&b.min_xy[1]))
        });
        Ok(clusters)
    }

    fn head_pre(&self, bev: Vec<PillarCluster>, tiles: &[TileId]) -> Result<Vec<Vec<Detection>>> {
        self.charge(self.params.cost.head_pre_ms(tiles.len()));
        let p = &self.params;
        let mut maps = vec![Vec::new(); self.num_det_heads];
        for cl in bev.into_iter().filter(|c| c.pillars >= p.min_pillars) {
            let height = cl.top_z - p.ground_z;
            let label = if height >= p.truck_min_height {
                TRUCK_LABEL
            } else {
                CAR_LABEL
            };
            let Some(head) = self.head_of(label) else {
                continue;
            };
            let size = [
                cl.max_xy[0] - cl.min_xy[0] + self.voxel_xy[0],
                cl.max_xy[1] - cl.min_xy[1] + self.voxel_xy[1],
                height,
            ];
            let bbox = Box3d {
                center: [
                    0.5 * (cl.min_xy[0] + cl.max_xy[0]),
                    0.5 * (cl.min_xy[1] + cl.max_xy[1]),
                    p.ground_z + 0.5 * height,
                ],
                size,
                heading: 0.0,
                velocity: [0.0, 0.0],
            };
            let score = 0.5 + 0.45 * (cl.pillars as f32 / 100.0).min(1.0);
            maps[head].push(Detection { bbox, score, label });
        }
        Ok(maps)
    }

    fn active_heads(&self, maps: &Vec<Vec<Detection>>) -> Vec<usize> {
        maps.iter()
            .enumerate()
            .filter(|(_, m)| !m.is_empty())
            .map(|(h, _)| h)
            .collect()
    }

    fn head_post(&self, maps: Vec<Vec<Detection>>, heads: &[usize]) -> Result<Vec<DetectionSet>> {
        self.charge(self.params.cost.head_post_ms(heads.len()));
        if maps.len() != self.num_det_heads {
            return Err(AnytimeError::stage(
                "head_post",
                format!("{} head maps for {} heads", maps.len(), self.num_det_heads),
            ));
        }
        Ok(maps
            .into_iter()
            .enumerate()
            .map(|(h, m)| {
                if heads.contains(&h) {
                    m.into_iter().collect()
                } else {
                    DetectionSet::new()
                }
            })
            .collect())
    }
}

fn neighbours(c: VoxelCoord) -> impl Iterator<Item = VoxelCoord> {
    (-1i64..=1)
        .flat_map(|dy| (-1i64..=1).map(move |dx| (dy, dx)))
        .filter(|&(dy, dx)| dy != 0 || dx != 0)
        .filter_map(move |(dy, dx)| {
            let y = u32::try_from(c.y as i64 + dy).ok()?;
            let x = u32::try_from(c.x as i64 + dx).ok()?;
            Some(VoxelCoord { y, x })
        })
}
