use super::SensorPose;
use crate::error::{AnytimeError, Result};
use crate::types::Detection;
use nalgebra::Isometry3;
use std::collections::VecDeque;

/// A retained detection and the index of the pose it was observed at.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionRecord {
    pub detection: Detection,
    pub pose_index: usize,
}

#[derive(Clone, Debug)]
pub(crate) struct PoseEntry {
    pub pose: SensorPose,
    pub lidar_to_global: Isometry3<f64>,
    pub timestamp_us: i64,
    num_dets: usize,
}

/// Past poses and the detections recorded at each of them.
///
/// Records are stored in pose order, so evicting the oldest pose drops a
/// prefix of the records. `pose_index` always addresses `poses`.
#[derive(Clone, Debug, Default)]
pub struct PoseHistory {
    poses: VecDeque<PoseEntry>,
    records: VecDeque<DetectionRecord>,
}

impl PoseHistory {
    pub fn clear(&mut self) {
        self.poses.clear();
        self.records.clear();
    }

    pub fn num_poses(&self) -> usize {
        self.poses.len()
    }

    pub fn num_records(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &DetectionRecord> {
        self.records.iter()
    }

    pub(crate) fn record_slice(&self) -> &VecDeque<DetectionRecord> {
        &self.records
    }

    pub(crate) fn pose_entry(&self, index: usize) -> Option<&PoseEntry> {
        self.poses.get(index)
    }

    pub fn timestamps(&self) -> impl Iterator<Item = i64> + '_ {
        self.poses.iter().map(|p| p.timestamp_us)
    }

    pub fn pose(&self, index: usize) -> Option<&SensorPose> {
        self.poses.get(index).map(|p| &p.pose)
    }

    /// Append a pose and the detections observed at it.
    pub fn push<I>(&mut self, pose: SensorPose, timestamp_us: i64, detections: I)
    where
        I: IntoIterator<Item = Detection>,
    {
        let pose_index = self.poses.len();
        let before = self.records.len();
        self.records.extend(
            detections
                .into_iter()
                .map(|detection| DetectionRecord {
                    detection,
                    pose_index,
                }),
        );
        self.poses.push_back(PoseEntry {
            lidar_to_global: pose.lidar_to_global(),
            pose,
            timestamp_us,
            num_dets: self.records.len() - before,
        });
    }

    /// Evict every pose with `now_us - timestamp > horizon_us` together with
    /// its detections; surviving indices shift down by the number evicted.
    pub fn evict_older_than(&mut self, now_us: i64, horizon_us: i64) -> usize {
        let mut evicted = 0;
        while let Some(front) = self.poses.front() {
            if now_us - front.timestamp_us <= horizon_us {
                break;
            }
            let n = front.num_dets;
            self.poses.pop_front();
            self.records.drain(..n.min(self.records.len()));
            evicted += 1;
        }
        if evicted > 0 {
            for rec in &mut self.records {
                rec.pose_index -= evicted;
            }
        }
        evicted
    }

    /// Check that every record addresses a retained pose.
    pub fn validate(&self) -> Result<()> {
        let poses = self.poses.len();
        if let Some(bad) = self.records.iter().find(|r| r.pose_index >= poses) {
            return Err(AnytimeError::HistoryInconsistency {
                pose_index: bad.pose_index,
                poses,
            });
        }
        let expected: usize = self.poses.iter().map(|p| p.num_dets).sum();
        if expected != self.records.len() {
            return Err(AnytimeError::HistoryInconsistency {
                pose_index: self.records.len(),
                poses,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Box3d;

    fn det(score: f32) -> Detection {
        Detection {
            bbox: Box3d::default(),
            score,
            label: 1,
        }
    }

    #[test]
    fn eviction_shifts_pose_indices() {
        let mut h = PoseHistory::default();
        for (i, n) in [2usize, 0, 3, 1].into_iter().enumerate() {
            h.push(SensorPose::identity(), i as i64 * 100, (0..n).map(|_| det(0.5)));
        }
        assert_eq!(h.num_records(), 6);
        let evicted = h.evict_older_than(300, 150);
        assert_eq!(evicted, 2);
        assert_eq!(h.num_poses(), 2);
        let idx: Vec<usize> = h.records().map(|r| r.pose_index).collect();
        assert_eq!(idx, vec![0, 0, 0, 1]);
        assert!(h.validate().is_ok());
    }

    #[test]
    fn nothing_evicted_inside_horizon() {
        let mut h = PoseHistory::default();
        h.push(SensorPose::identity(), 0, [det(0.9)]);
        assert_eq!(h.evict_older_than(100, 100), 0);
        assert_eq!(h.evict_older_than(101, 100), 1);
        assert!(h.is_empty());
        assert_eq!(h.num_records(), 0);
    }
}
