use super::history::{DetectionRecord, PoseHistory};
use super::SensorPose;
use crate::error::Result;
use crate::types::{Box3d, Detection, DetectionSet};
use log::{debug, info};
use nalgebra::{Isometry3, Point3, Vector3};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Projection horizon of the reference configuration: 1.6 s.
pub const DEFAULT_HORIZON_US: i64 = 1_600_000;
/// Offset in the freshness decay `thr - thr / (pose_index + offset)`.
pub const DEFAULT_DECAY_OFFSET: f32 = 2.0;

/// Motion-compensates past detections into the current frame.
#[derive(Clone, Debug)]
pub struct ProjectionEngine {
    score_threshold: f32,
    horizon_us: i64,
    decay_offset: f32,
    history: PoseHistory,
}

impl ProjectionEngine {
    pub fn new(score_threshold: f32, horizon_us: i64, decay_offset: f32) -> Self {
        Self {
            score_threshold,
            horizon_us,
            decay_offset,
            history: PoseHistory::default(),
        }
    }

    pub fn history(&self) -> &PoseHistory {
        &self.history
    }

    pub fn score_threshold(&self) -> f32 {
        self.score_threshold
    }

    /// Drop all history (scene change).
    pub fn reset(&mut self) {
        if !self.history.is_empty() {
            info!(
                "projection reset: dropping {} poses, {} detections",
                self.history.num_poses(),
                self.history.num_records()
            );
        }
        self.history.clear();
    }

    /// Append the frame's fresh detections (`score > threshold`) with its pose.
    /// Returns the number of detections recorded.
    pub fn record(
        &mut self,
        detections: &DetectionSet,
        pose: &SensorPose,
        timestamp_us: i64,
    ) -> usize {
        self.history.evict_older_than(timestamp_us, self.horizon_us);
        let fresh: Vec<Detection> = detections
            .iter()
            .filter(|d| d.score > self.score_threshold)
            .copied()
            .collect();
        let n = fresh.len();
        self.history.push(*pose, timestamp_us, fresh);
        n
    }

    /// Freshness-decayed score for a record `pose_index` poses after the
    /// oldest retained one. Strictly below the threshold.
    pub fn decayed_score(&self, pose_index: usize) -> f32 {
        let thr = self.score_threshold;
        thr - thr / (pose_index as f32 + self.decay_offset)
    }

    /// Project every retained detection into `target_pose` at `target_ts_us`.
    ///
    /// Boxes are extrapolated along their velocity over the time delta in the
    /// frame they were observed in, then moved into the target LiDAR frame.
    pub fn project(&mut self, target_pose: &SensorPose, target_ts_us: i64) -> Result<DetectionSet> {
        let evicted = self.history.evict_older_than(target_ts_us, self.horizon_us);
        if evicted > 0 {
            debug!("projection: evicted {evicted} poses past the horizon");
        }
        self.history.validate()?;
        if self.history.num_records() == 0 {
            return Ok(DetectionSet::new());
        }
        let target_inv = target_pose.lidar_to_global().inverse();
        let history = &self.history;
        let project_one = |rec: &DetectionRecord| -> Option<Detection> {
            let entry = history.pose_entry(rec.pose_index)?;
            let rel = target_inv * entry.lidar_to_global;
            let dt_sec = (target_ts_us - entry.timestamp_us) as f64 * 1e-6;
            Some(Detection {
                bbox: transform_box(&rec.detection.bbox, &rel, dt_sec),
                score: self.decayed_score(rec.pose_index),
                label: rec.detection.label,
            })
        };
        let records = history.record_slice();
        #[cfg(feature = "parallel")]
        let projected: Vec<Detection> = records.par_iter().filter_map(project_one).collect();
        #[cfg(not(feature = "parallel"))]
        let projected: Vec<Detection> = records.iter().filter_map(project_one).collect();
        debug!(
            "projection: {} detections from {} poses",
            projected.len(),
            history.num_poses()
        );
        Ok(DetectionSet {
            detections: projected,
        })
    }
}

/// Apply velocity extrapolation over `dt_sec`, then the rigid transform `rel`.
pub fn transform_box(b: &Box3d, rel: &Isometry3<f64>, dt_sec: f64) -> Box3d {
    let [vx, vy] = [b.velocity[0] as f64, b.velocity[1] as f64];
    let center = Point3::new(
        b.center[0] as f64 + vx * dt_sec,
        b.center[1] as f64 + vy * dt_sec,
        b.center[2] as f64,
    );
    let c = rel * center;
    let h = b.heading as f64;
    let dir = rel.rotation * Vector3::new(h.cos(), h.sin(), 0.0);
    let vel = rel.rotation * Vector3::new(vx, vy, 0.0);
    Box3d {
        center: [c.x as f32, c.y as f32, c.z as f32],
        size: b.size,
        heading: dir.y.atan2(dir.x) as f32,
        velocity: [vel.x as f32, vel.y as f32],
    }
}

/// Split detections per detection head using the 1-based label and the
/// class→head map. Detections with unmapped labels are dropped.
pub fn split_by_head(
    dets: &DetectionSet,
    class_to_head: &[usize],
    num_heads: usize,
) -> Vec<DetectionSet> {
    let mut out = vec![DetectionSet::new(); num_heads];
    for det in dets.iter() {
        let head = (det.label as usize)
            .checked_sub(1)
            .and_then(|cls| class_to_head.get(cls))
            .copied()
            .filter(|&h| h < num_heads);
        match head {
            Some(h) => out[h].push(*det),
            None => debug!("split_by_head: dropping label {}", det.label),
        }
    }
    out
}
